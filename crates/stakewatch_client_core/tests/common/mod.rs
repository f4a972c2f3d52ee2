//! Shared helpers for integration tests.

pub mod memory_store;
pub mod mock_server;

use chrono::{DateTime, TimeZone, Utc};
use stakewatch_client_core::{UserId, WalletSnapshot};

pub fn test_user() -> UserId {
    UserId::parse("f27978af-e56a-4b45-aede-fb450557699a").unwrap()
}

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 15, 8, 0, 0).unwrap()
}

/// Active wallet last checkpointed at `t0()`.
pub fn wallet(principal: f64, accrued: f64) -> WalletSnapshot {
    WalletSnapshot {
        user_id: test_user(),
        principal,
        accrued_profit: accrued,
        last_update_at: t0(),
        is_active: true,
        maturity_at: None,
        version: Some(t0()),
    }
}

/// Live Supabase project for `#[ignore]` tests. Override with env `TEST_SUPABASE_URL`.
pub fn test_supabase_url() -> String {
    std::env::var("TEST_SUPABASE_URL").unwrap_or_else(|_| "http://127.0.0.1:54321".to_string())
}
