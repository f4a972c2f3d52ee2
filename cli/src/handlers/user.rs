use anyhow::Context as _;
use chrono::Utc;
use std::io::Write;
use std::path::Path;

use stakewatch_client_core::projector::{Countdown, Projection, ProjectorState, StopReason};
use stakewatch_client_core::requests::{self, DepositForm, Screenshot, WithdrawalForm};
use stakewatch_client_core::session::{self, ProjectorView};
use stakewatch_client_core::{admin, auth, mining, Error, SnapshotStore};

use super::{usd, Context};

pub async fn login(ctx: &Context, email: &str, password: &str) -> anyhow::Result<()> {
    let session = auth::sign_in(&ctx.client, email, password).await?;
    ctx.remember(&session)?;
    println!("Signed in as {}", session.email.as_deref().unwrap_or(email));
    Ok(())
}

pub async fn logout(ctx: &Context) -> anyhow::Result<()> {
    if let Err(e) = auth::sign_out(&ctx.client).await {
        tracing::warn!("remote sign-out failed: {}", e);
    }
    ctx.storage.session_clear()?;
    println!("Signed out");
    Ok(())
}

/// Profit as of now; zero when the user has no wallet yet.
async fn available_profit(ctx: &Context) -> anyhow::Result<f64> {
    let user = ctx.user()?;
    match ctx.client.fetch_snapshot(user).await {
        Ok(snapshot) => Ok(Projection::resume(&snapshot, ctx.config.client.projector.daily_rate, Utc::now()).value()),
        Err(Error::NotFound(_)) => Ok(0.0),
        Err(e) => Err(e.into()),
    }
}

pub async fn status(ctx: &Context) -> anyhow::Result<()> {
    let user = ctx.user()?;
    let now = Utc::now();
    match ctx.client.fetch_snapshot(user).await {
        Ok(snapshot) => {
            let rate = ctx.config.client.projector.daily_rate;
            let projection = Projection::resume(&snapshot, rate, now);
            println!("Total deposit:   {}", usd(snapshot.principal));
            println!("Total profit:    {:.6} USDT", projection.value());
            println!("Daily earnings:  {}", usd(snapshot.principal * rate));
            println!("Status:          {}", describe(projection.state(), projection.stop_reason()));
            if let Some(countdown) = projection.countdown(now) {
                println!("Matures in:      {}", countdown);
            }
        }
        Err(Error::NotFound(_)) => println!("No wallet yet. Your first approved deposit creates one."),
        Err(e) => return Err(e.into()),
    }
    if let Some(points) = mining::wallet(&ctx.client, user).await? {
        println!(
            "Mining:          {} points ({} today, {} claims today)",
            points.total_points, points.today_points, points.today_claims
        );
    }
    Ok(())
}

fn describe(state: ProjectorState, reason: Option<StopReason>) -> &'static str {
    match (state, reason) {
        (ProjectorState::Running, _) => "earning",
        (_, Some(StopReason::Matured)) => "matured",
        (_, Some(StopReason::Inactive)) | (_, Some(StopReason::Deactivated)) => "inactive",
        (_, Some(StopReason::SignedOut)) => "signed out, run `stakewatch login`",
        (_, Some(StopReason::Rejected)) => "stopped, the server refused the last checkpoint",
        _ => "stopped",
    }
}

fn render(view: &ProjectorView) -> String {
    let countdown = view
        .countdown(Utc::now())
        .map(|c: Countdown| format!(" | matures in {}", c))
        .unwrap_or_default();
    format!(
        "\rProfit: {:.6} USDT | +{:.8}/s{} ",
        view.value, view.rate_per_second, countdown
    )
}

pub async fn watch(ctx: &Context) -> anyhow::Result<()> {
    let user = ctx.user()?;
    let mut handle = session::start(ctx.client.clone(), user, &ctx.config.client.projector)
        .await
        .context("could not load wallet")?;
    let mut views = handle.subscribe();
    let mut stdout = std::io::stdout();
    write!(stdout, "{}", render(&handle.current()))?;
    stdout.flush()?;

    if handle.is_running() {
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => break,
                changed = views.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let view = views.borrow_and_update().clone();
                    write!(stdout, "{}", render(&view))?;
                    stdout.flush()?;
                    if view.state == ProjectorState::Stopped {
                        break;
                    }
                }
            }
        }
    } else {
        handle.finished().await;
    }
    let last = handle.current();
    println!("\n{}", describe(last.state, last.stop_reason));
    handle.stop();
    // Checkpoints may have renewed the access token.
    if let Some(session) = ctx.client.session() {
        ctx.remember(&session)?;
    }
    Ok(())
}

fn content_type(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "application/octet-stream",
    }
}

pub async fn deposit(ctx: &Context, amount: String, network: String, screenshot: &Path) -> anyhow::Result<()> {
    ctx.user()?;
    let bytes = tokio::fs::read(screenshot)
        .await
        .with_context(|| format!("reading {}", screenshot.display()))?;
    let file_name = screenshot
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("screenshot")
        .to_string();
    let form = DepositForm {
        amount,
        network,
        screenshot: Some(Screenshot {
            file_name,
            content_type: content_type(screenshot).to_string(),
            bytes,
        }),
    };
    let networks = requests::list_networks(&ctx.client).await?;
    let deposit = requests::submit_deposit(&ctx.client, &form, &networks).await?;
    println!(
        "Deposit of {} on {} submitted ({}). Send funds to {}",
        usd(deposit.amount),
        deposit.blockchain,
        deposit.status,
        deposit.deposit_address
    );
    Ok(())
}

pub async fn withdraw(ctx: &Context, amount: String, address: String, network: String) -> anyhow::Result<()> {
    let available = available_profit(ctx).await?;
    let form = WithdrawalForm { amount, address, network };
    let withdrawal = requests::submit_withdrawal(&ctx.client, &form, available).await?;
    println!("Withdrawal of {} submitted ({})", usd(withdrawal.amount), withdrawal.status);
    Ok(())
}

pub async fn mine(ctx: &Context) -> anyhow::Result<()> {
    let user = ctx.user()?;
    let claim = mining::claim(&ctx.client, user).await?;
    if claim.success {
        println!("Claimed {} points", claim.points_earned.unwrap_or(0.0));
    } else {
        println!("{}", claim.message.as_deref().unwrap_or("Claim not available yet"));
    }
    if let Some(next) = claim.next_available_time {
        println!("Next claim: {}", next.format("%Y-%m-%d %H:%M UTC"));
    }
    Ok(())
}

pub async fn packages(ctx: &Context) -> anyhow::Result<()> {
    for p in admin::list_packages(&ctx.client, true).await? {
        println!(
            "{:<16} {:>10}  {}%/day  {} days  {}",
            p.name,
            usd(p.price),
            p.daily_profit_rate,
            p.duration_days,
            p.description.unwrap_or_default()
        );
    }
    Ok(())
}

pub async fn history(ctx: &Context) -> anyhow::Result<()> {
    let user = ctx.user()?;
    println!("Deposits:");
    for d in requests::my_deposits(&ctx.client, user).await? {
        println!("  {}  {:>12}  {:<8} {}", d.created_at.format("%Y-%m-%d"), usd(d.amount), d.blockchain, d.status);
    }
    println!("Withdrawals:");
    for w in requests::my_withdrawals(&ctx.client, user).await? {
        println!("  {}  {:>12}  {:<8} {}", w.created_at.format("%Y-%m-%d"), usd(w.amount), w.blockchain, w.status);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn screenshot_content_types() {
        assert_eq!(content_type(Path::new("proof.PNG")), "image/png");
        assert_eq!(content_type(Path::new("a/b/tx.jpeg")), "image/jpeg");
        assert_eq!(content_type(Path::new("noext")), "application/octet-stream");
    }

    #[test]
    fn stop_reasons_read_plainly() {
        assert_eq!(describe(ProjectorState::Running, None), "earning");
        assert_eq!(describe(ProjectorState::Stopped, Some(StopReason::Matured)), "matured");
        assert_eq!(describe(ProjectorState::Stopped, Some(StopReason::Deactivated)), "inactive");
        assert_eq!(describe(ProjectorState::Stopped, Some(StopReason::TornDown)), "stopped");
        assert!(describe(ProjectorState::Stopped, Some(StopReason::SignedOut)).contains("login"));
    }
}
