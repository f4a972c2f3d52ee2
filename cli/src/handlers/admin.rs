use anyhow::Context as _;

use stakewatch_client_core::admin::{self, AdminConsole};
use stakewatch_client_core::models::{Deposit, NftPackage, NftPackageDraft, Withdrawal};
use stakewatch_client_core::{activity, realtime, RecordId, UserId};

use super::{usd, Context};
use crate::cli::{AdminCommand, PackageArgs};

fn record_id(raw: &str) -> anyhow::Result<RecordId> {
    RecordId::parse(raw).with_context(|| format!("`{}` is not a valid id", raw))
}

fn user_id(raw: &str) -> anyhow::Result<UserId> {
    UserId::parse(raw).with_context(|| format!("`{}` is not a valid user id", raw))
}

impl From<PackageArgs> for NftPackageDraft {
    fn from(args: PackageArgs) -> Self {
        Self {
            name: args.name,
            price: args.price,
            daily_profit_rate: args.rate,
            duration_days: args.days,
            description: args.description,
            is_active: !args.inactive,
        }
    }
}

fn print_deposits(deposits: &[Deposit]) {
    if deposits.is_empty() {
        println!("(none)");
    }
    for d in deposits {
        println!(
            "{}  {}  {:>12}  {:<8} {:<8} {}",
            d.id,
            d.created_at.format("%Y-%m-%d %H:%M"),
            usd(d.amount),
            d.blockchain,
            d.status.as_str(),
            d.transaction_screenshot.as_deref().unwrap_or("-")
        );
    }
}

fn print_withdrawals(withdrawals: &[Withdrawal]) {
    if withdrawals.is_empty() {
        println!("(none)");
    }
    for w in withdrawals {
        println!(
            "{}  {}  {:>12}  {:<8} {:<8} {}",
            w.id,
            w.created_at.format("%Y-%m-%d %H:%M"),
            usd(w.amount),
            w.blockchain,
            w.status.as_str(),
            w.wallet_address
        );
    }
}

fn print_packages(packages: &[NftPackage]) {
    for p in packages {
        println!(
            "{}  {:<16} {:>10}  {}%/day  {} days  {}",
            p.id,
            p.name,
            usd(p.price),
            p.daily_profit_rate,
            p.duration_days,
            if p.is_active { "active" } else { "inactive" }
        );
    }
}

pub async fn dispatch(ctx: &Context, command: AdminCommand) -> anyhow::Result<()> {
    ctx.user()?;
    let console = AdminConsole::connect(&ctx.client).await?;
    tracing::debug!(admin = %console.admin(), ?command, "admin command");

    match command {
        AdminCommand::Stats { json } => {
            let stats = console.stats().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("Total deposits:   {}", usd(stats.total_deposits));
                println!("Active users:     {}", stats.active_users);
                println!("NFT locked:       {}", usd(stats.total_nft_locked));
                println!("Profit today:     {}", usd(stats.today_profit));
            }
        }
        AdminCommand::Deposits { history } => {
            let deposits = if history {
                console.deposit_history().await?
            } else {
                console.pending_deposits().await?
            };
            print_deposits(&deposits);
        }
        AdminCommand::ApproveDeposit { id } => {
            let d = console.approve_deposit(record_id(&id)?).await?;
            println!("Approved deposit of {} for {}", usd(d.amount), d.user_id);
        }
        AdminCommand::RejectDeposit { id, note } => {
            let d = console.reject_deposit(record_id(&id)?, note.as_deref()).await?;
            println!("Rejected deposit of {} for {}", usd(d.amount), d.user_id);
        }
        AdminCommand::Withdrawals { history } => {
            let withdrawals = if history {
                console.withdrawal_history().await?
            } else {
                console.pending_withdrawals().await?
            };
            print_withdrawals(&withdrawals);
        }
        AdminCommand::ApproveWithdrawal { id } => {
            let w = console.approve_withdrawal(record_id(&id)?).await?;
            println!("Approved withdrawal of {} to {}", usd(w.amount), w.wallet_address);
        }
        AdminCommand::RejectWithdrawal { id, note } => {
            let w = console.reject_withdrawal(record_id(&id)?, note.as_deref()).await?;
            println!("Rejected withdrawal of {} for {}", usd(w.amount), w.user_id);
        }
        AdminCommand::ExportDeposits { out } => {
            let csv = admin::deposit_history_csv(&console.deposit_history().await?);
            match out {
                Some(path) => {
                    tokio::fs::write(&path, csv)
                        .await
                        .with_context(|| format!("writing {}", path.display()))?;
                    println!("Wrote {}", path.display());
                }
                None => print!("{}", csv),
            }
        }
        AdminCommand::Packages => print_packages(&console.packages().await?),
        AdminCommand::AddPackage(args) => {
            let p = console.create_package(&args.into()).await?;
            println!("Created package {} ({})", p.name, p.id);
        }
        AdminCommand::UpdatePackage { id, package } => {
            let p = console.update_package(record_id(&id)?, &package.into()).await?;
            println!("Updated package {}", p.name);
        }
        AdminCommand::DeletePackage { id } => {
            console.delete_package(record_id(&id)?).await?;
            println!("Deleted package {}", id);
        }
        AdminCommand::Users => {
            for u in console.users().await? {
                let wallet = u.wallet.as_ref();
                println!(
                    "{}  {:<28} {:>12} {:>14}  {}",
                    u.profile.user_id,
                    u.profile.email.as_deref().unwrap_or("-"),
                    usd(wallet.and_then(|w| w.total_deposit).unwrap_or(0.0)),
                    format!("{:.4}", wallet.and_then(|w| w.total_profit).unwrap_or(0.0)),
                    if u.profile.is_blocked.unwrap_or(false) { "blocked" } else { "" }
                );
            }
        }
        AdminCommand::Block { user_id: raw } => {
            let p = console.set_blocked(user_id(&raw)?, true).await?;
            println!("Blocked {}", p.email.as_deref().unwrap_or(&raw));
        }
        AdminCommand::Unblock { user_id: raw } => {
            let p = console.set_blocked(user_id(&raw)?, false).await?;
            println!("Unblocked {}", p.email.as_deref().unwrap_or(&raw));
        }
        AdminCommand::Activity { follow } => {
            if !follow {
                for item in activity::load_recent(&ctx.client).await?.items() {
                    println!("{}", item);
                }
                return Ok(());
            }
            let mut subscription = realtime::subscribe(&ctx.client).await?;
            for item in subscription.current().items() {
                println!("{}", item);
            }
            let mut newest = subscription.current().items().first().cloned();
            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    feed = subscription.changed() => {
                        let feed = feed?;
                        if let Some(top) = feed.items().first() {
                            if newest.as_ref() != Some(top) {
                                println!("{}", top);
                                newest = Some(top.clone());
                            }
                        }
                    }
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn package_args_become_active_drafts() {
        let draft: NftPackageDraft = PackageArgs {
            name: "Gold".into(),
            price: 500.0,
            rate: 2.2,
            days: 45,
            description: None,
            inactive: false,
        }
        .into();
        assert!(draft.is_active);
        assert_eq!(draft.daily_profit_rate, 2.2);
        assert!(admin::validate_package(&draft).is_ok());
    }

    #[test]
    fn bad_ids_are_reported() {
        let err = record_id("not-a-uuid").unwrap_err();
        assert!(format!("{:#}", err).contains("not-a-uuid"));
    }
}
