//! CLI argument parsing using clap.
//!
//! Defines the command-line interface for ddas-cli.

use clap::Parser;
use std::path::PathBuf;

/// DDAS CLI - duplicate download alerts from the terminal
#[derive(Parser, Debug, Clone)]
#[command(name = "ddas-cli")]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Settings file (default: ~/.ddas/settings.toml)
    #[arg(long, env = "DDAS_SETTINGS")]
    pub settings: Option<PathBuf>,

    /// Data directory for pending entries and history (overrides settings)
    #[arg(long, env = "DDAS_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Processing service URL (overrides settings)
    #[arg(long, env = "DDAS_SERVICE_URL")]
    pub service_url: Option<String>,

    /// Accept every file without asking
    #[arg(long)]
    pub auto_accept: bool,

    /// Output events as JSON lines (for scripting/parsing)
    #[arg(long)]
    pub json: bool,

    /// Show verbose output (debug information)
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Probe the processing service and exit
    #[arg(long, conflicts_with_all = ["history", "pending"])]
    pub health: bool,

    /// Print the history and exit
    #[arg(long, conflicts_with = "pending")]
    pub history: bool,

    /// Print the pending entries and exit
    #[arg(long)]
    pub pending: bool,
}

impl Args {
    /// True when a one-shot flag was given instead of the REPL.
    pub fn is_one_shot(&self) -> bool {
        self.health || self.history || self.pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_default_values() {
        let args = Args::parse_from(["ddas-cli"]);
        assert!(args.settings.is_none());
        assert!(!args.auto_accept);
        assert!(!args.json);
        assert!(!args.verbose);
        assert!(!args.is_one_shot());
    }

    #[test]
    fn test_args_overrides() {
        let args = Args::parse_from([
            "ddas-cli",
            "--service-url",
            "http://127.0.0.1:6000",
            "--data-dir",
            "/tmp/ddas",
            "--auto-accept",
        ]);
        assert_eq!(args.service_url.as_deref(), Some("http://127.0.0.1:6000"));
        assert_eq!(args.data_dir, Some(PathBuf::from("/tmp/ddas")));
        assert!(args.auto_accept);
    }

    #[test]
    fn test_args_output_modes() {
        let args = Args::parse_from(["ddas-cli", "--json", "-v"]);
        assert!(args.json);
        assert!(args.verbose);
    }

    #[test]
    fn test_args_one_shot_flags_conflict() {
        assert!(Args::parse_from(["ddas-cli", "--history"]).is_one_shot());
        assert!(Args::try_parse_from(["ddas-cli", "--health", "--pending"]).is_err());
    }
}
