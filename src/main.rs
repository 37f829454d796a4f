//! abtest-notify - A/B experiment results to chat
//!
//! A batch job that polls the analytics provider for running experiments,
//! aggregates their per-variation/per-goal statistics into a report, and
//! posts one message per experiment to a chat channel.
//!
//! Exit codes:
//!   0 - Success (every report delivered)
//!   1 - Runtime error (missing or invalid config, client setup, etc.)
//!   2 - Run completed but some targets, projects or experiments failed

mod analysis;
mod cli;
mod config;
mod delivery;
mod error;
mod models;
mod pipeline;
mod provider;
mod report;
mod retry;

use anyhow::{Context, Result};
use chrono::Utc;
use cli::Args;
use config::{Config, DEFAULT_CONFIG_FILE};
use delivery::{SlackClient, StdoutDelivery};
use pipeline::{Pipeline, RunSummary};
use provider::OptimizelyClient;
use std::time::Instant;
use tracing::level_filters::LevelFilter;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    init_logging(&args);

    info!("abtest-notify v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    match run(args).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Run failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a starter .abtest-notify.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(DEFAULT_CONFIG_FILE);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            DEFAULT_CONFIG_FILE
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", DEFAULT_CONFIG_FILE))?;

    println!("✅ Created {} with example settings.", DEFAULT_CONFIG_FILE);
    println!("   Fill in the tokens and target_projects before the first run.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args) {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = log_filter(args.log_level(), rust_log.as_deref());

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// `RUST_LOG` directives when set and valid, otherwise the level from -v/-q.
fn log_filter(level: tracing::Level, rust_log: Option<&str>) -> EnvFilter {
    rust_log
        .filter(|directives| !directives.trim().is_empty())
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| {
            EnvFilter::default().add_directive(LevelFilter::from_level(level).into())
        })
}

/// Load configuration from the explicit path or the default location.
fn load_config(args: &Args) -> Result<Config> {
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    match Config::load_default()? {
        Some(config) => {
            info!("Loaded config from {}", DEFAULT_CONFIG_FILE);
            Ok(config)
        }
        None => Err(anyhow::anyhow!(
            "No config file found. Pass --config or run --init-config to create {}",
            DEFAULT_CONFIG_FILE
        )),
    }
}

/// Run the whole pipeline. Returns exit code (0 or 2).
async fn run(args: Args) -> Result<i32> {
    let start_time = Instant::now();

    let config = load_config(&args)?;
    for warning in config.validate() {
        warn!("{}", warning);
    }

    let provider = OptimizelyClient::new(&config.provider)?;
    let today = Utc::now().date_naive();

    let summary = if args.dry_run {
        info!("Dry run: reports will be printed, not posted");
        Pipeline::new(&config, &provider, &StdoutDelivery, today)
            .with_project_filter(args.project.clone())
            .run()
            .await
    } else {
        let delivery = SlackClient::new(&config.delivery)?;
        Pipeline::new(&config, &provider, &delivery, today)
            .with_project_filter(args.project.clone())
            .run()
            .await
    };

    print_summary(&summary, start_time.elapsed().as_secs_f64());

    if summary.has_failures() {
        return Ok(2);
    }

    Ok(0)
}

fn print_summary(summary: &RunSummary, duration: f64) {
    info!(
        "Targets: {} processed, {} skipped, {} failed",
        summary.targets_processed, summary.targets_skipped, summary.targets_failed
    );
    if summary.projects_failed > 0 {
        warn!("Projects failed: {}", summary.projects_failed);
    }
    info!(
        "Experiments: {} delivered, {} failed ({:.1}s)",
        summary.experiments_delivered, summary.experiments_failed, duration
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_filter_uses_flag_level_without_rust_log() {
        let filter = log_filter(tracing::Level::DEBUG, None);
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::DEBUG));

        let filter = log_filter(tracing::Level::ERROR, Some("  "));
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::ERROR));
    }

    #[test]
    fn test_log_filter_honours_rust_log() {
        let filter = log_filter(tracing::Level::INFO, Some("trace"));
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::TRACE));
    }

    #[test]
    fn test_log_filter_ignores_invalid_rust_log() {
        let filter = log_filter(tracing::Level::INFO, Some("abtest_notify=notalevel"));
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::INFO));
    }
}
