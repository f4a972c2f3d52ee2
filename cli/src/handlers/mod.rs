pub mod admin;
pub mod user;

use anyhow::Context as _;
use chrono::{Duration, Utc};
use std::sync::Arc;

use stakewatch_client_core::{auth, Error, Session, Storage, SupabaseClient, UserId};

use crate::cli::Command;
use crate::config::Config;

/// Everything a command needs: config, the saved session and a client carrying it.
pub struct Context {
    pub config: Config,
    pub storage: Storage,
    pub client: Arc<SupabaseClient>,
}

impl Context {
    pub async fn open(config: Config) -> anyhow::Result<Self> {
        let storage = Storage::open(&config.data_dir)
            .with_context(|| format!("opening local database in {}", config.data_dir.display()))?;
        let client = Arc::new(SupabaseClient::new(config.client.clone())?);
        let ctx = Self { config, storage, client };
        ctx.restore_session().await?;
        Ok(ctx)
    }

    /// Reinstall the saved session, refreshing it when close to expiry.
    async fn restore_session(&self) -> anyhow::Result<()> {
        let Some(session) = self.storage.session_load()? else {
            return Ok(());
        };
        if !session.expires_within(Utc::now(), Duration::seconds(60)) {
            self.client.set_session(Some(session));
            return Ok(());
        }
        match auth::refresh(&self.client, &session.refresh_token).await {
            Ok(fresh) => self.remember(&fresh)?,
            Err(e) => {
                tracing::warn!("saved session could not be refreshed: {}", e);
                self.storage.session_clear()?;
            }
        }
        Ok(())
    }

    pub fn remember(&self, session: &Session) -> anyhow::Result<()> {
        self.storage.session_save(session)?;
        Ok(())
    }

    pub fn user(&self) -> anyhow::Result<UserId> {
        self.client
            .user_id()
            .map_err(|_| anyhow::anyhow!(Error::NotAuthenticated).context("run `stakewatch login` first"))
    }
}

pub async fn dispatch(ctx: &Context, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Login { email, password } => user::login(ctx, &email, &password).await,
        Command::Logout => user::logout(ctx).await,
        Command::Status => user::status(ctx).await,
        Command::Watch => user::watch(ctx).await,
        Command::Deposit { amount, network, screenshot } => user::deposit(ctx, amount, network, &screenshot).await,
        Command::Withdraw { amount, address, network } => user::withdraw(ctx, amount, address, network).await,
        Command::Mine => user::mine(ctx).await,
        Command::Packages => user::packages(ctx).await,
        Command::History => user::history(ctx).await,
        Command::Admin(cmd) => admin::dispatch(ctx, cmd).await,
    }
}

pub(crate) fn usd(amount: f64) -> String {
    stakewatch_client_core::activity::format_usd(amount)
}
