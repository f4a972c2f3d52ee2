use std::env;
use std::time::Duration;

use crate::error::{Error, Result};

/// Accrual parameters for the local profit projector.
#[derive(Clone, Debug, PartialEq)]
pub struct ProjectorConfig {
    /// Fraction of principal credited per day (0.022 = 2.2%).
    pub daily_rate: f64,
    pub tick: Duration,
    /// Persist the running total every this many ticks.
    pub checkpoint_every: u32,
    /// Length of the accrual window started by a wallet's first approved deposit.
    pub maturity_days: i64,
}

impl Default for ProjectorConfig {
    fn default() -> Self {
        Self {
            daily_rate: 0.022,
            tick: Duration::from_secs(1),
            checkpoint_every: 10,
            maturity_days: 45,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WithdrawalLimits {
    pub min: f64,
    pub max: f64,
}

impl Default for WithdrawalLimits {
    fn default() -> Self {
        Self { min: 5.0, max: 5000.0 }
    }
}

#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub supabase_url: String,
    pub anon_key: String,
    pub projector: ProjectorConfig,
    pub withdrawal: WithdrawalLimits,
    pub screenshot_bucket: String,
    pub http_timeout: Duration,
}

impl ClientConfig {
    pub fn new(supabase_url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            supabase_url: supabase_url.into().trim_end_matches('/').to_string(),
            anon_key: anon_key.into(),
            projector: ProjectorConfig::default(),
            withdrawal: WithdrawalLimits::default(),
            screenshot_bucket: "deposit-screenshots".to_string(),
            http_timeout: Duration::from_secs(30),
        }
    }

    pub fn from_env() -> Result<Self> {
        let url = env::var("SUPABASE_URL")
            .map_err(|_| Error::Config("SUPABASE_URL is not set".to_string()))?;
        let key = env::var("SUPABASE_ANON_KEY")
            .map_err(|_| Error::Config("SUPABASE_ANON_KEY is not set".to_string()))?;
        let defaults = ProjectorConfig::default();
        let limits = WithdrawalLimits::default();
        let mut config = Self::new(url, key);
        config.projector = ProjectorConfig {
            daily_rate: env_parse("STAKEWATCH_DAILY_RATE", defaults.daily_rate)?,
            tick: Duration::from_millis(env_parse("STAKEWATCH_TICK_MS", 1000u64)?),
            checkpoint_every: env_parse("STAKEWATCH_CHECKPOINT_TICKS", defaults.checkpoint_every)?,
            maturity_days: env_parse("STAKEWATCH_MATURITY_DAYS", defaults.maturity_days)?,
        };
        config.withdrawal = WithdrawalLimits {
            min: env_parse("STAKEWATCH_WITHDRAW_MIN", limits.min)?,
            max: env_parse("STAKEWATCH_WITHDRAW_MAX", limits.max)?,
        };
        if let Ok(bucket) = env::var("STAKEWATCH_SCREENSHOT_BUCKET") {
            config.screenshot_bucket = bucket;
        }
        config.http_timeout = Duration::from_secs(env_parse("STAKEWATCH_HTTP_TIMEOUT_SECS", 30u64)?);
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.supabase_url.starts_with("http://") && !self.supabase_url.starts_with("https://") {
            return Err(Error::Config(format!("SUPABASE_URL must be http(s): {}", self.supabase_url)));
        }
        if !(self.projector.daily_rate.is_finite() && self.projector.daily_rate >= 0.0) {
            return Err(Error::Config("daily rate must be a non-negative number".to_string()));
        }
        if self.projector.tick.is_zero() || self.projector.checkpoint_every == 0 {
            return Err(Error::Config("tick and checkpoint cadence must be non-zero".to_string()));
        }
        if self.withdrawal.min > self.withdrawal.max {
            return Err(Error::Config("withdrawal minimum exceeds maximum".to_string()));
        }
        Ok(())
    }

    pub fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.supabase_url, table)
    }

    pub fn rpc_url(&self, function: &str) -> String {
        format!("{}/rest/v1/rpc/{}", self.supabase_url, function)
    }

    pub fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.supabase_url, path)
    }

    pub fn storage_url(&self, path: &str) -> String {
        format!("{}/storage/v1/{}", self.supabase_url, path)
    }

    /// `ws(s)://host/realtime/v1/websocket?apikey=...&vsn=1.0.0`
    pub fn realtime_url(&self) -> String {
        let ws_base = if let Some(rest) = self.supabase_url.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = self.supabase_url.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            self.supabase_url.clone()
        };
        format!(
            "{}/realtime/v1/websocket?apikey={}&vsn=1.0.0",
            ws_base,
            urlencoding::encode(&self.anon_key)
        )
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("{} has an invalid value: {}", key, raw))),
        Err(_) => Ok(default),
    }
}
