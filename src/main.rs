use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::Parser;
use log::{error, info, warn, LevelFilter};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;
use surveil::config::Properties;
use surveil::error::ConfigError;
use surveil::registry::RegistryAppender;
use surveil::{Status, Surveillance, Timestamp};

/// Command-line arguments for the surveillance poller
#[derive(Parser)]
#[command(
    name = "surveil",
    about = "Status surveillance - polls configured surveyables and prints their status",
    long_about = "Aggregates the status of the configured surveyables, including warnings and \
                  errors captured from this process's own log, and prints new messages as \
                  they appear."
)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "Configuration file path (TOML format)"
    )]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, help = "Enable verbose logging output (debug level)")]
    verbose: bool,

    /// Seconds between polls
    #[arg(short, long, default_value_t = 5, value_name = "SECS")]
    interval: u64,

    /// Poll once and exit
    #[arg(long)]
    once: bool,

    /// Print each status as a JSON line
    #[arg(long)]
    json: bool,
}

impl Cli {
    /// Validate the CLI arguments
    fn validate(&self) -> Result<(), String> {
        if self.interval == 0 && !self.once {
            return Err("Polling interval must be at least one second".to_string());
        }

        if let Some(ref config_path) = self.config {
            // Missing files fall back to defaults; directories are a mistake
            if config_path.exists() && !config_path.is_file() {
                return Err(format!(
                    "Configuration path is not a file: {}",
                    config_path.display()
                ));
            }
        }

        Ok(())
    }
}

/// Load configuration from file, or empty properties if none is given
///
/// Returns the error alongside the fallback so it can be reported once
/// logging is set up.
fn load_config(path: Option<&Path>) -> (Properties, Option<ConfigError>) {
    match path {
        Some(path) => match Properties::from_file(path) {
            Ok(properties) => (properties, None),
            Err(e) => (Properties::new(), Some(e)),
        },
        None => (Properties::new(), None),
    }
}

/// Install the registry appender as the global logger
fn init_logging(verbose: bool, surveillance: &Surveillance) -> anyhow::Result<()> {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if verbose {
        builder.filter_level(LevelFilter::Debug);
    }

    RegistryAppender::new(
        builder.build(),
        surveillance.log_registry_factory(),
        LevelFilter::Info,
    )
    .install()
    .context("Failed to install logger")
}

fn format_time(timestamp: Timestamp) -> String {
    DateTime::<Utc>::from_timestamp_millis(timestamp)
        .map(|time| time.format("%Y-%m-%d %H:%M:%S%.3f").to_string())
        .unwrap_or_else(|| timestamp.to_string())
}

fn print_status(status: &Status, json: bool) -> anyhow::Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string(status).context("Failed to serialize status")?
        );
        return Ok(());
    }

    for message in status.messages() {
        println!(
            "{} {:<6} [{}] {}{}",
            format_time(message.timestamp()),
            format!("{:?}", message.severity()).to_uppercase(),
            status.name(),
            message.text(),
            if message.is_log_derived() { " (log)" } else { "" }
        );
    }
    Ok(())
}

/// Where the next incremental poll resumes
///
/// Only log-derived messages advance the position; real-time messages are
/// stamped after the log cache was read and would skip events logged in
/// between.
fn next_since(since: Timestamp, status: &Status) -> Timestamp {
    status
        .latest_log_timestamp()
        .map_or(since, |latest| since.max(latest))
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let (properties, config_error) = load_config(cli.config.as_deref());
    let properties = Arc::new(properties);
    let surveillance = Surveillance::new(properties.clone());

    init_logging(cli.verbose, &surveillance)?;
    info!("Starting status surveillance");

    if let Err(e) = cli.validate() {
        error!("Invalid arguments: {}", e);
        std::process::exit(1);
    }

    match (&cli.config, config_error) {
        (Some(path), None) => info!("Loaded {} settings from {}", properties.len(), path.display()),
        (Some(path), Some(ConfigError::ReadError(_))) => warn!(
            "Configuration file '{}' not found or unreadable, using defaults",
            path.display()
        ),
        (Some(path), Some(e)) => {
            error!("Configuration error in '{}': {}", path.display(), e);
            warn!("Using default configuration due to invalid config file");
        }
        (None, _) => info!("Using default configuration"),
    }

    let (shutdown_sender, shutdown_receiver) = mpsc::channel();
    ctrlc::set_handler(move || {
        if let Err(e) = shutdown_sender.send(()) {
            eprintln!("Failed to send shutdown signal: {}", e);
        }
    })
    .context("Error setting SIGINT handler")?;

    let interval = Duration::from_secs(cli.interval);
    let mut since: Timestamp = 0;

    loop {
        let surveyable = surveillance
            .surveyable()
            .context("No surveyable available")?;
        let status = surveyable.status_since(since);
        print_status(&status, cli.json)?;

        since = next_since(since, &status);

        if cli.once {
            break;
        }

        match shutdown_receiver.recv_timeout(interval) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                info!("Shutdown signal received");
                break;
            }
            Err(RecvTimeoutError::Timeout) => {}
        }
    }

    info!("Status surveillance stopped");
    Ok(())
}
