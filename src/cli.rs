//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use clap::Parser;
use std::path::PathBuf;

/// abtest-notify - post running A/B experiment results to chat
///
/// Fetches every running experiment of the configured analytics projects,
/// summarizes conversion rates per variation and goal (baseline first), and
/// posts one message per experiment to the configured channel.
///
/// Examples:
///   abtest-notify
///   abtest-notify --config ./notify.toml
///   abtest-notify --dry-run --project Storefront
///   abtest-notify --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Path to configuration file
    ///
    /// If not specified, looks for .abtest-notify.toml in the current directory
    #[arg(short, long, value_name = "FILE", env = "ABTEST_NOTIFY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Only process target entries with this project_name
    #[arg(short, long, value_name = "NAME")]
    pub project: Option<String>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (errors only)
    #[arg(short, long)]
    pub quiet: bool,

    /// Dry run: fetch and render reports, print them instead of posting
    #[arg(long)]
    pub dry_run: bool,

    /// Generate a starter .abtest-notify.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if self.init_config {
            return Ok(());
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let Some(ref project) = self.project {
            if project.trim().is_empty() {
                return Err("--project must not be empty".to_string());
            }
        }

        if let Some(ref path) = self.config {
            if !path.is_file() {
                return Err(format!("Config file does not exist: {}", path.display()));
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_args() -> Args {
        Args {
            config: None,
            project: None,
            verbose: false,
            quiet: false,
            dry_run: false,
            init_config: false,
        }
    }

    #[test]
    fn test_parse_flags() {
        let args = Args::try_parse_from([
            "abtest-notify",
            "--config",
            "notify.toml",
            "--project",
            "Storefront",
            "--dry-run",
        ])
        .unwrap();

        assert_eq!(args.config, Some(PathBuf::from("notify.toml")));
        assert_eq!(args.project.as_deref(), Some("Storefront"));
        assert!(args.dry_run);
    }

    #[test]
    fn test_validation_conflicting_options() {
        let mut args = make_args();
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_missing_config_file() {
        let mut args = make_args();
        args.config = Some(PathBuf::from("/nonexistent/notify.toml"));
        assert!(args.validate().is_err());

        args.init_config = true;
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_validation_empty_project() {
        let mut args = make_args();
        args.project = Some(" ".to_string());
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_log_level() {
        let mut args = make_args();
        assert_eq!(args.log_level(), tracing::Level::INFO);

        args.verbose = true;
        assert_eq!(args.log_level(), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(), tracing::Level::ERROR);
    }
}
