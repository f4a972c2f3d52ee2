use std::env;
use std::path::PathBuf;

use stakewatch_client_core::ClientConfig;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub client: ClientConfig,
    /// Directory holding the local SQLite database (saved login).
    pub data_dir: PathBuf,
    pub log_format: LogFormat,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            client: ClientConfig::from_env()?,
            data_dir: env::var("STAKEWATCH_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| default_data_dir()),
            log_format: log_format_from_env(),
        })
    }
}

pub fn log_format_from_env() -> LogFormat {
    match env::var("STAKEWATCH_LOG_FORMAT").as_deref() {
        Ok("json") => LogFormat::Json,
        _ => LogFormat::Text,
    }
}

fn default_data_dir() -> PathBuf {
    env::var("HOME")
        .map(|home| PathBuf::from(home).join(".stakewatch"))
        .unwrap_or_else(|_| PathBuf::from(".stakewatch"))
}
