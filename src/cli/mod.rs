//! CLI interface and argument parsing
//!
//! This module provides the command-line interface for phimask using clap.

pub mod commands;

use clap::{Parser, Subcommand};

/// Phimask - PHI/PII masking pipeline
#[derive(Parser, Debug)]
#[command(name = "phimask")]
#[command(version, about, long_about = None)]
#[command(author = "Phimask Contributors")]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "phimask.toml", env = "PHIMASK_CONFIG")]
    pub config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "PHIMASK_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Mask the source collection into the destination
    Mask(commands::mask::MaskArgs),

    /// Compare a sample of source and destination documents
    Verify(commands::verify::VerifyArgs),

    /// Validate configuration file and rule set
    ValidateConfig(commands::validate::ValidateArgs),

    /// Show run checkpoints
    Status(commands::status::StatusArgs),

    /// Initialize a new configuration file
    Init(commands::init::InitArgs),
}

/// Exit codes shared by every command
pub mod exit_code {
    /// Success
    pub const OK: i32 = 0;
    /// Completed with skipped documents or verification findings
    pub const PARTIAL: i32 = 1;
    /// Invalid configuration or rule set
    pub const CONFIGURATION: i32 = 2;
    /// Store unreachable
    pub const CONNECTION: i32 = 4;
    /// Run failed
    pub const FATAL: i32 = 5;
    /// Stopped by SIGINT/SIGTERM
    pub const INTERRUPTED: i32 = 130;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_mask() {
        let cli = Cli::parse_from(["phimask", "mask"]);
        assert_eq!(cli.config, "phimask.toml");
        assert!(matches!(cli.command, Commands::Mask(_)));
    }

    #[test]
    fn test_cli_parse_mask_flags() {
        let cli = Cli::parse_from([
            "phimask", "mask", "--dry-run", "--resume", "--mode", "incremental", "--workers", "4",
            "--verify", "--yes",
        ]);
        let Commands::Mask(args) = cli.command else {
            panic!("expected mask");
        };
        assert!(args.dry_run && args.resume && args.verify && args.yes);
        assert_eq!(args.mode.as_deref(), Some("incremental"));
        assert_eq!(args.workers, Some(4));
    }

    #[test]
    fn test_cli_parse_with_config() {
        let cli = Cli::parse_from(["phimask", "--config", "custom.toml", "mask"]);
        assert_eq!(cli.config, "custom.toml");
    }

    #[test]
    fn test_cli_parse_with_log_level() {
        let cli = Cli::parse_from(["phimask", "--log-level", "debug", "mask"]);
        assert_eq!(cli.log_level, Some("debug".to_string()));
    }

    #[test]
    fn test_cli_parse_verify() {
        let cli = Cli::parse_from(["phimask", "verify", "--sample-size", "50", "--random", "--json"]);
        let Commands::Verify(args) = cli.command else {
            panic!("expected verify");
        };
        assert_eq!(args.sample_size, Some(50));
        assert!(args.random && args.json);
    }

    #[test]
    fn test_cli_parse_validate_config() {
        let cli = Cli::parse_from(["phimask", "validate-config"]);
        assert!(matches!(cli.command, Commands::ValidateConfig(_)));
    }

    #[test]
    fn test_cli_parse_status() {
        let cli = Cli::parse_from(["phimask", "status"]);
        assert!(matches!(cli.command, Commands::Status(_)));
    }

    #[test]
    fn test_cli_parse_init() {
        let cli = Cli::parse_from(["phimask", "init", "--force", "--with-examples"]);
        assert!(matches!(cli.command, Commands::Init(_)));
    }
}
