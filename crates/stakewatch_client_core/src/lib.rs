//! Client core of the stakewatch staking platform: the local profit projector,
//! typed access to the remote store, request validation and admin workflows.
//!
//! All authoritative state lives in the remote store. The only stateful
//! computation here is the projector ([`projector`], driven by [`session`]),
//! which extrapolates accrued profit between checkpoints.

pub mod activity;
pub mod admin;
pub mod api;
pub mod auth;
mod backoff;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod ids;
pub mod mining;
pub mod models;
pub mod projector;
pub mod realtime;
pub mod requests;
pub mod session;
pub mod storage;

pub use api::SupabaseClient;
pub use auth::Session;
pub use checkpoint::{Checkpoint, SnapshotStore};
pub use config::{ClientConfig, ProjectorConfig, WithdrawalLimits};
pub use error::{Error, Result};
pub use ids::{RecordId, UserId};
pub use models::WalletSnapshot;
pub use requests::ValidationError;
pub use session::{ProjectorHandle, ProjectorView};
pub use storage::Storage;
