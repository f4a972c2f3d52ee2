//! Typed rows of the remote store's tables, one struct per table.
//! Amounts are USDT as `f64`; PostgREST may render `numeric` columns either as
//! JSON numbers or strings, so amount fields go through `de_amount`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::ids::{RecordId, UserId};

fn de_amount<'de, D: Deserializer<'de>>(de: D) -> Result<f64, D::Error> {
    de_amount_opt(de).map(|v| v.unwrap_or(0.0))
}

fn de_amount_opt<'de, D: Deserializer<'de>>(de: D) -> Result<Option<f64>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(f64),
        Text(String),
    }
    match Option::<Raw>::deserialize(de)? {
        None => Ok(None),
        Some(Raw::Num(n)) => Ok(Some(n)),
        Some(Raw::Text(s)) => s.trim().parse().map(Some).map_err(serde::de::Error::custom),
    }
}

/// Review state of a deposit or withdrawal request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// `user_wallets` row as stored.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WalletRow {
    pub id: RecordId,
    pub user_id: UserId,
    #[serde(default, deserialize_with = "de_amount_opt")]
    pub total_deposit: Option<f64>,
    #[serde(default, deserialize_with = "de_amount_opt")]
    pub total_profit: Option<f64>,
    #[serde(default, deserialize_with = "de_amount_opt")]
    pub daily_earnings: Option<f64>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub last_earnings_update: Option<DateTime<Utc>>,
    #[serde(default)]
    pub nft_maturity_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WalletRow {
    /// Projector view of the row. Nulls take the column defaults.
    pub fn snapshot(&self) -> WalletSnapshot {
        WalletSnapshot {
            user_id: self.user_id,
            principal: self.total_deposit.unwrap_or(0.0).max(0.0),
            accrued_profit: self.total_profit.unwrap_or(0.0).max(0.0),
            last_update_at: self.last_earnings_update.unwrap_or(self.updated_at),
            is_active: self.is_active.unwrap_or(true),
            maturity_at: self.nft_maturity_date,
            version: self.last_earnings_update,
        }
    }
}

/// The part of a wallet the profit projector reads and checkpoints.
#[derive(Clone, Debug, PartialEq)]
pub struct WalletSnapshot {
    pub user_id: UserId,
    pub principal: f64,
    pub accrued_profit: f64,
    pub last_update_at: DateTime<Utc>,
    pub is_active: bool,
    pub maturity_at: Option<DateTime<Utc>>,
    /// Raw `last_earnings_update` exactly as the store holds it; the
    /// concurrency token for conditional writes (`None` = column is null).
    pub version: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Deposit {
    pub id: RecordId,
    pub user_id: UserId,
    #[serde(deserialize_with = "de_amount")]
    pub amount: f64,
    pub blockchain: String,
    pub deposit_address: String,
    pub status: RequestStatus,
    #[serde(default)]
    pub transaction_screenshot: Option<String>,
    #[serde(default)]
    pub admin_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NewDeposit {
    pub user_id: UserId,
    pub amount: f64,
    pub blockchain: String,
    pub deposit_address: String,
    pub transaction_screenshot: Option<String>,
    pub status: RequestStatus,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Withdrawal {
    pub id: RecordId,
    pub user_id: UserId,
    #[serde(deserialize_with = "de_amount")]
    pub amount: f64,
    pub blockchain: String,
    pub wallet_address: String,
    pub status: RequestStatus,
    #[serde(default)]
    pub admin_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NewWithdrawal {
    pub user_id: UserId,
    pub amount: f64,
    pub blockchain: String,
    pub wallet_address: String,
    pub status: RequestStatus,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlockchainNetwork {
    pub id: RecordId,
    pub name: String,
    pub network_type: String,
    pub deposit_address: String,
    pub is_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NftPackage {
    pub id: RecordId,
    pub name: String,
    #[serde(deserialize_with = "de_amount")]
    pub price: f64,
    /// Percent per day, e.g. 2.2.
    #[serde(deserialize_with = "de_amount")]
    pub daily_profit_rate: f64,
    pub duration_days: i32,
    #[serde(default)]
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert/update payload for `nft_packages`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NftPackageDraft {
    pub name: String,
    pub price: f64,
    pub daily_profit_rate: f64,
    pub duration_days: i32,
    pub description: Option<String>,
    pub is_active: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: RecordId,
    pub user_id: UserId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub is_blocked: Option<bool>,
    #[serde(default)]
    pub blocked_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub blocked_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MiningWallet {
    pub id: RecordId,
    pub user_id: UserId,
    pub today_claims: i32,
    #[serde(deserialize_with = "de_amount")]
    pub today_points: f64,
    #[serde(deserialize_with = "de_amount")]
    pub total_points: f64,
    pub last_reset_date: String,
    pub updated_at: DateTime<Utc>,
}

/// Result of the `process_mining_claim` RPC.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MiningClaim {
    #[serde(default)]
    pub success: bool,
    #[serde(default, deserialize_with = "de_amount_opt")]
    pub points_earned: Option<f64>,
    #[serde(default)]
    pub next_available_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Result of the `get_admin_dashboard_stats` RPC.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AdminStats {
    #[serde(default, deserialize_with = "de_amount")]
    pub total_deposits: f64,
    #[serde(default)]
    pub active_users: i64,
    #[serde(default, deserialize_with = "de_amount")]
    pub total_nft_locked: f64,
    #[serde(default, deserialize_with = "de_amount")]
    pub today_profit: f64,
}

/// Admin users table row overview: a profile next to its wallet, when any.
#[derive(Clone, Debug, PartialEq)]
pub struct UserOverview {
    pub profile: Profile,
    pub wallet: Option<WalletRow>,
}
