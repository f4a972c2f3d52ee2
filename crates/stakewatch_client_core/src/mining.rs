//! Mining claims. Cooldown and daily limits are enforced by the store.

use serde::Serialize;

use crate::api::{eq, SupabaseClient};
use crate::error::Result;
use crate::ids::UserId;
use crate::models::{MiningClaim, MiningWallet};

#[derive(Serialize)]
struct ClaimArgs {
    user_id_param: UserId,
}

pub async fn claim(client: &SupabaseClient, user: UserId) -> Result<MiningClaim> {
    let result: MiningClaim = client
        .rpc("process_mining_claim", &ClaimArgs { user_id_param: user })
        .await?;
    if result.success {
        log::info!("mining: claimed {:?} points user_id={}", result.points_earned, user);
    } else {
        log::debug!("mining: claim refused user_id={} ({:?})", user, result.message);
    }
    Ok(result)
}

pub async fn wallet(client: &SupabaseClient, user: UserId) -> Result<Option<MiningWallet>> {
    client.select_one("mining_wallets", &[("user_id", eq(user))]).await
}
