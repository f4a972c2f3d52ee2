//! Command-line argument definitions for `stakewatch`.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "stakewatch", version, about = "Staking dashboard and admin console")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Sign in and remember the session locally.
    Login {
        #[arg(long)]
        email: String,
        /// Read from STAKEWATCH_PASSWORD when omitted.
        #[arg(long, env = "STAKEWATCH_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Sign out and forget the saved session.
    Logout,
    /// Wallet balances, maturity and mining points.
    Status,
    /// Live profit counter until Ctrl+C, maturity or deactivation.
    Watch,
    /// Submit a deposit request with a payment screenshot.
    Deposit {
        #[arg(long)]
        amount: String,
        /// Network name, e.g. TRC20.
        #[arg(long)]
        network: String,
        #[arg(long)]
        screenshot: PathBuf,
    },
    /// Submit a withdrawal request from accrued profit.
    Withdraw {
        #[arg(long)]
        amount: String,
        #[arg(long)]
        address: String,
        #[arg(long)]
        network: String,
    },
    /// Claim mining points.
    Mine,
    /// List active NFT packages.
    Packages,
    /// My deposit and withdrawal requests.
    History,
    #[command(subcommand)]
    Admin(AdminCommand),
}

#[derive(Debug, Subcommand)]
pub enum AdminCommand {
    /// Dashboard totals.
    Stats {
        #[arg(long)]
        json: bool,
    },
    /// Pending deposits, or approved/rejected ones with --history.
    Deposits {
        #[arg(long)]
        history: bool,
    },
    ApproveDeposit { id: String },
    RejectDeposit {
        id: String,
        #[arg(long)]
        note: Option<String>,
    },
    /// Pending withdrawals, or approved/rejected ones with --history.
    Withdrawals {
        #[arg(long)]
        history: bool,
    },
    ApproveWithdrawal { id: String },
    RejectWithdrawal {
        id: String,
        #[arg(long)]
        note: Option<String>,
    },
    /// Deposit history as CSV, to stdout or --out.
    ExportDeposits {
        #[arg(long)]
        out: Option<PathBuf>,
    },
    Packages,
    AddPackage(PackageArgs),
    UpdatePackage {
        id: String,
        #[command(flatten)]
        package: PackageArgs,
    },
    DeletePackage { id: String },
    Users,
    Block { user_id: String },
    Unblock { user_id: String },
    /// Recent deposits and withdrawals; --follow keeps streaming changes.
    Activity {
        #[arg(long)]
        follow: bool,
    },
}

#[derive(Debug, Args)]
pub struct PackageArgs {
    #[arg(long)]
    pub name: String,
    #[arg(long)]
    pub price: f64,
    /// Percent per day, e.g. 2.2.
    #[arg(long)]
    pub rate: f64,
    #[arg(long, default_value_t = 45)]
    pub days: i32,
    #[arg(long)]
    pub description: Option<String>,
    #[arg(long)]
    pub inactive: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_admin_subcommands() {
        let cli = Cli::try_parse_from([
            "stakewatch",
            "admin",
            "reject-deposit",
            "cb203efe-c27c-470e-bbc6-588172c3b1ae",
            "--note",
            "blurry",
        ])
        .unwrap();
        match cli.command {
            Command::Admin(AdminCommand::RejectDeposit { id, note }) => {
                assert_eq!(id, "cb203efe-c27c-470e-bbc6-588172c3b1ae");
                assert_eq!(note.as_deref(), Some("blurry"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn package_days_default_to_45() {
        let cli = Cli::try_parse_from([
            "stakewatch", "admin", "add-package", "--name", "Gold", "--price", "500", "--rate", "2.2",
        ])
        .unwrap();
        match cli.command {
            Command::Admin(AdminCommand::AddPackage(p)) => {
                assert_eq!(p.days, 45);
                assert!(!p.inactive);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn withdraw_keeps_amount_as_text_for_validation() {
        let cli = Cli::try_parse_from([
            "stakewatch", "withdraw", "--amount", "abc", "--address", "T1", "--network", "TRC20",
        ])
        .unwrap();
        assert!(matches!(cli.command, Command::Withdraw { ref amount, .. } if amount == "abc"));
    }

    #[test]
    fn definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
