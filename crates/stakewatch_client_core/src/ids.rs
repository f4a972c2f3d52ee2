//! Strongly-typed IDs with UUID validation. Use these instead of raw strings.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::Error;

fn validate_uuid(s: &str, what: &str) -> Result<Uuid, Error> {
    Uuid::parse_str(s.trim()).map_err(|e| Error::Decode(format!("invalid {}: {}", what, e)))
}

/// Auth user id (`auth.users.id`, also `user_id` on every user-owned table).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UserId(Uuid);

/// Primary key of a row (deposit, withdrawal, NFT package, network, ...).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RecordId(Uuid);

macro_rules! id_type {
    ($name:ident, $what:literal) => {
        impl $name {
            pub fn new(id: Uuid) -> Self {
                Self(id)
            }

            pub fn parse(s: impl AsRef<str>) -> Result<Self, Error> {
                Self::from_str(s.as_ref())
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }

            /// First 8 characters, as shown in admin tables.
            pub fn short(&self) -> String {
                self.0.to_string()[..8].to_string()
            }
        }
        impl FromStr for $name {
            type Err = Error;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                validate_uuid(s, $what).map(Self)
            }
        }
        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, ser: S) -> Result<S::Ok, S::Error> {
                ser.serialize_str(&self.0.to_string())
            }
        }
        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(de: D) -> Result<Self, D::Error> {
                let s = String::deserialize(de)?;
                Self::from_str(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}
id_type!(UserId, "user id");
id_type!(RecordId, "record id");
