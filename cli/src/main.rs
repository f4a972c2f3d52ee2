use clap::Parser;
use std::process::ExitCode;
use tracing::debug;

use stakewatch_cli::cli::Cli;
use stakewatch_cli::config::{log_format_from_env, Config, LogFormat};
use stakewatch_cli::handlers::{self, Context};
use stakewatch_client_core::Error;

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "stakewatch=info,stakewatch_cli=info,stakewatch_client_core=info".into());
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match log_format_from_env() {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::from_env()?;
    debug!("Using {}", config.client.supabase_url);
    let ctx = Context::open(config).await?;
    handlers::dispatch(&ctx, cli.command).await
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    init_tracing();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // Form problems are shown as-is, like an inline field message.
            if let Some(Error::Validation(v)) = e.downcast_ref::<Error>() {
                eprintln!("{}", v);
            } else {
                debug!("command failed: {:?}", e);
                eprintln!("Error: {:#}", e);
            }
            ExitCode::FAILURE
        }
    }
}
