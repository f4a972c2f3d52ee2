//! Tests against a real Supabase project. Ignored by default.
//!
//! Needs `TEST_SUPABASE_URL`, `TEST_SUPABASE_ANON_KEY`, `TEST_EMAIL` and `TEST_PASSWORD`.

use std::sync::Arc;

use stakewatch_client_core::{auth, session, ClientConfig, Error, SnapshotStore, SupabaseClient};

use crate::common::test_supabase_url;

fn env(key: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| panic!("{} must be set for live tests", key))
}

async fn live_client() -> SupabaseClient {
    let client = SupabaseClient::new(ClientConfig::new(test_supabase_url(), env("TEST_SUPABASE_ANON_KEY"))).unwrap();
    auth::sign_in(&client, &env("TEST_EMAIL"), &env("TEST_PASSWORD")).await.expect("sign in");
    client
}

#[tokio::test]
#[ignore]
async fn live_snapshot_and_session_start() {
    let client = Arc::new(live_client().await);
    let user = client.user_id().unwrap();
    match client.fetch_snapshot(user).await {
        Ok(snapshot) => {
            let config = client.config().projector.clone();
            let handle = session::start(client.clone(), user, &config).await.expect("start");
            assert!(handle.current().value >= snapshot.accrued_profit);
            handle.stop();
        }
        Err(Error::NotFound(_)) => {}
        Err(e) => panic!("fetch_snapshot: {}", e),
    }
}

#[tokio::test]
#[ignore]
async fn live_admin_flag_is_readable() {
    let client = live_client().await;
    auth::is_admin(&client).await.expect("is_admin");
}
