pub mod cli;
pub mod toml_config;

#[cfg(feature = "cli")]
use crate::domain::model::FixStatus;
#[cfg(feature = "cli")]
use clap::{Parser, Subcommand};
#[cfg(feature = "cli")]
use std::path::PathBuf;

pub const DEFAULT_CONFIG_FILE: &str = "kintsugi.toml";

#[cfg(feature = "cli")]
#[derive(Debug, Parser)]
#[command(name = "kintsugi")]
#[command(about = "Analyze CI failures, suggest fixes and manage their approval")]
pub struct Cli {
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, global = true, help = "Emit logs as JSON lines")]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[cfg(feature = "cli")]
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Analyze a single CI log (file or stdin) and print the suggestion
    Analyze {
        #[arg(long, help = "Log file, reads stdin when omitted")]
        log: Option<PathBuf>,
        #[arg(long, default_value = "")]
        repository: String,
        #[arg(long, help = "Print the suggestion as JSON")]
        json: bool,
    },
    /// Collect failures, analyze them and propose fixes
    Run,
    /// List proposed fixes
    List {
        #[arg(long, value_parser = parse_fix_status)]
        status: Option<FixStatus>,
    },
    /// Show one fix record
    Show { id: String },
    /// Approve a pending fix
    Approve {
        id: String,
        #[arg(long)]
        reviewer: Option<String>,
        #[arg(long)]
        comment: Option<String>,
    },
    /// Reject a pending fix
    Reject {
        id: String,
        #[arg(long)]
        reviewer: Option<String>,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Push an approved fix to GitHub and open a pull request
    Apply { id: String },
    /// Print dashboard summary numbers as JSON
    Summary,
    /// Export fix records as CSV
    Export {
        #[arg(long, help = "Output file, prints to stdout when omitted")]
        output: Option<PathBuf>,
    },
}

#[cfg(feature = "cli")]
fn parse_fix_status(value: &str) -> Result<FixStatus, String> {
    serde_json::from_value(serde_json::Value::String(value.to_lowercase()))
        .map_err(|_| format!("unknown fix status: {}", value))
}

#[cfg(all(test, feature = "cli"))]
mod tests {
    use super::*;

    #[test]
    fn test_parse_list_with_status() {
        let cli = Cli::try_parse_from(["kintsugi", "list", "--status", "apply_failed"]).unwrap();
        match cli.command {
            Command::List { status } => assert_eq!(status, Some(FixStatus::ApplyFailed)),
            other => panic!("unexpected command: {:?}", other),
        }
        assert_eq!(cli.config, PathBuf::from(DEFAULT_CONFIG_FILE));
    }

    #[test]
    fn test_unknown_status_is_rejected() {
        assert!(Cli::try_parse_from(["kintsugi", "list", "--status", "merged"]).is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "kintsugi",
            "approve",
            "fix-1",
            "--reviewer",
            "alice",
            "--config",
            "/etc/kintsugi.toml",
            "-v",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config, PathBuf::from("/etc/kintsugi.toml"));
        match cli.command {
            Command::Approve { id, reviewer, .. } => {
                assert_eq!(id, "fix-1");
                assert_eq!(reviewer.as_deref(), Some("alice"));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
