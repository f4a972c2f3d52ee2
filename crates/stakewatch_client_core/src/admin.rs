//! Admin console operations. Approvals are multi-step: the request row flips
//! from `pending` first (conditionally, so two admins cannot both approve),
//! then the wallet is mutated with a conditional write. If the wallet step
//! fails the request is put back to `pending`, unless it moved on from
//! `approved` in the meantime.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;

use crate::api::{eq, timestamp_operand, version_filter, SupabaseClient};
use crate::auth;
use crate::error::{Error, Result};
use crate::ids::{RecordId, UserId};
use crate::models::{
    AdminStats, Deposit, NftPackage, NftPackageDraft, Profile, RequestStatus, UserOverview, WalletRow,
    WalletSnapshot, Withdrawal,
};
use crate::projector::Projection;
use crate::requests::ValidationError;

const WALLET_WRITE_ATTEMPTS: usize = 3;
const HISTORY_STATUSES: &str = "in.(approved,rejected)";

#[derive(Serialize)]
struct StatusChange<'a> {
    status: RequestStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    admin_notes: Option<&'a str>,
    updated_at: String,
}

#[derive(Serialize)]
struct NewWallet {
    user_id: UserId,
    total_deposit: f64,
    total_profit: f64,
    daily_earnings: f64,
    is_active: bool,
    last_earnings_update: String,
    nft_maturity_date: String,
}

#[derive(Debug, Serialize)]
struct WalletPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    total_deposit: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    daily_earnings: Option<f64>,
    total_profit: f64,
    last_earnings_update: String,
    updated_at: String,
}

#[derive(Serialize)]
struct BlockChange {
    is_blocked: bool,
    blocked_at: Option<String>,
    blocked_by: Option<UserId>,
}

/// Wallet with accrual folded up to `now` at the old principal.
struct Folded {
    snapshot: WalletSnapshot,
    profit: f64,
    at: DateTime<Utc>,
}

pub struct AdminConsole<'c> {
    client: &'c SupabaseClient,
    admin: UserId,
}

impl<'c> AdminConsole<'c> {
    /// `Error::Forbidden` unless the signed-in user is an administrator.
    pub async fn connect(client: &'c SupabaseClient) -> Result<Self> {
        let admin = client.user_id()?;
        if !auth::is_admin(client).await? {
            return Err(Error::Forbidden(format!("user {} is not an administrator", admin)));
        }
        log::info!("admin: console opened by {}", admin);
        Ok(Self { client, admin })
    }

    pub fn admin(&self) -> UserId {
        self.admin
    }

    pub async fn stats(&self) -> Result<AdminStats> {
        self.client.rpc("get_admin_dashboard_stats", &serde_json::json!({})).await
    }

    // Deposits

    pub async fn pending_deposits(&self) -> Result<Vec<Deposit>> {
        self.client
            .select("deposits", &[("status", eq("pending")), ("order", "created_at.desc".to_string())])
            .await
    }

    pub async fn deposit_history(&self) -> Result<Vec<Deposit>> {
        self.client
            .select(
                "deposits",
                &[("status", HISTORY_STATUSES.to_string()), ("order", "created_at.desc".to_string())],
            )
            .await
    }

    /// Approve a pending deposit and credit its amount to the user's principal.
    pub async fn approve_deposit(&self, id: RecordId) -> Result<Deposit> {
        let deposit: Deposit = self.change_status("deposits", id, RequestStatus::Approved, None).await?;
        if let Err(e) = self.credit_deposit(deposit.user_id, deposit.amount).await {
            log::warn!("admin: crediting deposit {} failed, reverting to pending: {}", id, e);
            self.revert_to_pending::<Deposit>("deposits", id).await;
            return Err(e);
        }
        log::info!("admin: approved deposit {} amount={} user_id={}", id, deposit.amount, deposit.user_id);
        Ok(deposit)
    }

    pub async fn reject_deposit(&self, id: RecordId, note: Option<&str>) -> Result<Deposit> {
        let deposit = self.change_status("deposits", id, RequestStatus::Rejected, note).await?;
        log::info!("admin: rejected deposit {}", id);
        Ok(deposit)
    }

    // Withdrawals

    pub async fn pending_withdrawals(&self) -> Result<Vec<Withdrawal>> {
        self.client
            .select("withdrawals", &[("status", eq("pending")), ("order", "created_at.desc".to_string())])
            .await
    }

    pub async fn withdrawal_history(&self) -> Result<Vec<Withdrawal>> {
        self.client
            .select(
                "withdrawals",
                &[("status", HISTORY_STATUSES.to_string()), ("order", "created_at.desc".to_string())],
            )
            .await
    }

    /// Approve a pending withdrawal and debit it from accrued profit.
    pub async fn approve_withdrawal(&self, id: RecordId) -> Result<Withdrawal> {
        let pending: Withdrawal = self
            .client
            .select_one("withdrawals", &[("id", eq(id)), ("status", eq("pending"))])
            .await?
            .ok_or_else(|| Error::NotFound(format!("pending withdrawal {}", id)))?;
        let folded = self.fold(pending.user_id).await?;
        if folded.profit < pending.amount {
            return Err(ValidationError::ExceedsAvailable { available: folded.profit }.into());
        }
        let withdrawal: Withdrawal = self
            .change_status("withdrawals", id, RequestStatus::Approved, None)
            .await?;
        if let Err(e) = self.debit_profit(withdrawal.user_id, withdrawal.amount).await {
            log::warn!("admin: debiting withdrawal {} failed, reverting to pending: {}", id, e);
            self.revert_to_pending::<Withdrawal>("withdrawals", id).await;
            return Err(e);
        }
        log::info!("admin: approved withdrawal {} amount={}", id, withdrawal.amount);
        Ok(withdrawal)
    }

    pub async fn reject_withdrawal(&self, id: RecordId, note: Option<&str>) -> Result<Withdrawal> {
        let withdrawal = self.change_status("withdrawals", id, RequestStatus::Rejected, note).await?;
        log::info!("admin: rejected withdrawal {}", id);
        Ok(withdrawal)
    }

    // NFT packages

    pub async fn packages(&self) -> Result<Vec<NftPackage>> {
        list_packages(self.client, false).await
    }

    pub async fn create_package(&self, draft: &NftPackageDraft) -> Result<NftPackage> {
        validate_package(draft)?;
        self.client.insert("nft_packages", draft).await
    }

    pub async fn update_package(&self, id: RecordId, draft: &NftPackageDraft) -> Result<NftPackage> {
        validate_package(draft)?;
        let rows: Vec<NftPackage> = self.client.update("nft_packages", &[("id", eq(id))], draft).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| Error::NotFound(format!("package {}", id)))
    }

    pub async fn delete_package(&self, id: RecordId) -> Result<()> {
        self.client.delete("nft_packages", &[("id", eq(id))]).await
    }

    // Users

    /// Every profile, newest first, next to its wallet when it has one.
    pub async fn users(&self) -> Result<Vec<UserOverview>> {
        let profiles: Vec<Profile> = self
            .client
            .select("profiles", &[("order", "created_at.desc".to_string())])
            .await?;
        let wallets: Vec<WalletRow> = self.client.select("user_wallets", &[]).await?;
        Ok(join_users(profiles, wallets))
    }

    pub async fn set_blocked(&self, user: UserId, blocked: bool) -> Result<Profile> {
        let body = BlockChange {
            is_blocked: blocked,
            blocked_at: blocked.then(|| timestamp_operand(Utc::now())),
            blocked_by: blocked.then_some(self.admin),
        };
        let rows: Vec<Profile> = self.client.update("profiles", &[("user_id", eq(user))], &body).await?;
        let profile = rows
            .into_iter()
            .next()
            .ok_or_else(|| Error::NotFound(format!("profile of {}", user)))?;
        log::info!("admin: user {} blocked={}", user, blocked);
        Ok(profile)
    }

    // Internals

    async fn change_status<T: serde::de::DeserializeOwned>(
        &self,
        table: &str,
        id: RecordId,
        status: RequestStatus,
        note: Option<&str>,
    ) -> Result<T> {
        let body = StatusChange {
            status,
            admin_notes: note,
            updated_at: timestamp_operand(Utc::now()),
        };
        let rows: Vec<T> = self
            .client
            .update(table, &[("id", eq(id)), ("status", eq("pending"))], &body)
            .await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| Error::Conflict(format!("{} {} is no longer pending", table, id)))
    }

    async fn revert_to_pending<T: serde::de::DeserializeOwned>(&self, table: &str, id: RecordId) {
        let body = StatusChange {
            status: RequestStatus::Pending,
            admin_notes: None,
            updated_at: timestamp_operand(Utc::now()),
        };
        let filters = [("id", eq(id)), ("status", eq("approved"))];
        let result: Result<Vec<T>> = self.client.update(table, &filters, &body).await;
        match result {
            Ok(rows) if rows.is_empty() => {
                log::warn!("admin: {} {} changed status meanwhile, not reverting", table, id);
            }
            Ok(_) => {}
            Err(e) => log::error!("admin: could not revert {} {} to pending: {}", table, id, e),
        }
    }

    async fn fold(&self, user: UserId) -> Result<Folded> {
        let snapshot = self
            .client
            .wallet_row(user)
            .await?
            .map(|row| row.snapshot())
            .ok_or_else(|| Error::NotFound(format!("wallet for user {}", user)))?;
        Ok(fold_accrual(snapshot, self.client.config().projector.daily_rate, Utc::now()))
    }

    async fn credit_deposit(&self, user: UserId, amount: f64) -> Result<()> {
        let config = &self.client.config().projector;
        for _ in 0..WALLET_WRITE_ATTEMPTS {
            let Some(row) = self.client.wallet_row(user).await? else {
                let now = Utc::now();
                let wallet = NewWallet {
                    user_id: user,
                    total_deposit: amount,
                    total_profit: 0.0,
                    daily_earnings: amount * config.daily_rate,
                    is_active: true,
                    last_earnings_update: timestamp_operand(now),
                    nft_maturity_date: timestamp_operand(now + Duration::days(config.maturity_days)),
                };
                let _: WalletRow = self.client.insert("user_wallets", &wallet).await?;
                log::info!("admin: created wallet for {} with {}", user, amount);
                return Ok(());
            };
            let folded = fold_accrual(row.snapshot(), config.daily_rate, Utc::now());
            let principal = folded.snapshot.principal + amount;
            let patch = WalletPatch {
                total_deposit: Some(principal),
                daily_earnings: Some(principal * config.daily_rate),
                total_profit: folded.profit,
                last_earnings_update: timestamp_operand(folded.at),
                updated_at: timestamp_operand(Utc::now()),
            };
            if self.write_wallet(&folded.snapshot, &patch).await? {
                return Ok(());
            }
        }
        Err(Error::Conflict(format!("wallet of {} kept changing", user)))
    }

    async fn debit_profit(&self, user: UserId, amount: f64) -> Result<()> {
        for _ in 0..WALLET_WRITE_ATTEMPTS {
            let folded = self.fold(user).await?;
            if folded.profit < amount {
                return Err(ValidationError::ExceedsAvailable { available: folded.profit }.into());
            }
            let patch = WalletPatch {
                total_deposit: None,
                daily_earnings: None,
                total_profit: folded.profit - amount,
                last_earnings_update: timestamp_operand(folded.at),
                updated_at: timestamp_operand(Utc::now()),
            };
            if self.write_wallet(&folded.snapshot, &patch).await? {
                return Ok(());
            }
        }
        Err(Error::Conflict(format!("wallet of {} kept changing", user)))
    }

    /// Conditional on the snapshot's version. False when someone else wrote first.
    async fn write_wallet(&self, snapshot: &WalletSnapshot, patch: &WalletPatch) -> Result<bool> {
        let filters = [
            ("user_id", eq(snapshot.user_id)),
            ("last_earnings_update", version_filter(snapshot.version)),
        ];
        let rows: Vec<WalletRow> = self.client.update("user_wallets", &filters, patch).await?;
        if rows.is_empty() {
            log::info!("admin: wallet of {} changed underneath, retrying", snapshot.user_id);
        }
        Ok(!rows.is_empty())
    }
}

fn fold_accrual(snapshot: WalletSnapshot, daily_rate: f64, now: DateTime<Utc>) -> Folded {
    let projection = Projection::resume(&snapshot, daily_rate, now);
    Folded {
        profit: projection.value(),
        at: projection.position(),
        snapshot,
    }
}

/// Packages by ascending price; `active_only` for the user-facing list.
pub async fn list_packages(client: &SupabaseClient, active_only: bool) -> Result<Vec<NftPackage>> {
    let mut filters = vec![("order", "price.asc".to_string())];
    if active_only {
        filters.push(("is_active", eq(true)));
    }
    client.select("nft_packages", &filters).await
}

pub fn validate_package(draft: &NftPackageDraft) -> Result<(), ValidationError> {
    if draft.name.trim().is_empty() {
        return Err(ValidationError::Field("Package name is required".to_string()));
    }
    if !(draft.price.is_finite() && draft.price > 0.0) {
        return Err(ValidationError::Field("Price must be greater than zero".to_string()));
    }
    if !(draft.daily_profit_rate.is_finite() && draft.daily_profit_rate > 0.0) {
        return Err(ValidationError::Field("Daily profit rate must be greater than zero".to_string()));
    }
    if draft.duration_days <= 0 {
        return Err(ValidationError::Field("Duration must be at least one day".to_string()));
    }
    Ok(())
}

fn join_users(profiles: Vec<Profile>, wallets: Vec<WalletRow>) -> Vec<UserOverview> {
    let mut by_user: HashMap<UserId, WalletRow> = wallets.into_iter().map(|w| (w.user_id, w)).collect();
    profiles
        .into_iter()
        .map(|profile| {
            let wallet = by_user.remove(&profile.user_id);
            UserOverview { profile, wallet }
        })
        .collect()
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// `User ID,Network,Amount,Date,Status`, one row per deposit.
pub fn deposit_history_csv(deposits: &[Deposit]) -> String {
    let mut out = String::from("User ID,Network,Amount,Date,Status\n");
    for d in deposits {
        out.push_str(&format!(
            "{}...,{},{},{},{}\n",
            d.user_id.short(),
            csv_field(&d.blockchain),
            d.amount,
            d.created_at.format("%Y-%m-%d"),
            d.status
        ));
    }
    out
}
