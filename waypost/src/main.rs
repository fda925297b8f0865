//! waypost - CLI host for the store-and-forward location tracker
//!
//! This binary stands in for the platform host: it feeds captures and
//! wake-ups into a `Tracker` and manages its persisted configuration. The
//! pipeline itself lives entirely in `waypost-core`.
//!
//! Uses XDG Base Directory specification for file locations:
//! - State store: $XDG_DATA_HOME/waypost/state.db (~/.local/share/waypost/state.db)
//! - Config: $XDG_CONFIG_HOME/waypost/config.toml (~/.config/waypost/config.toml)

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::collections::HashMap;
use waypost_core::{Config, FailureKind, FlushOutcome, Sample, SkipReason, Tracker, TriggerKind};

#[derive(Parser)]
#[command(name = "waypost")]
#[command(about = "Buffer location samples and deliver them to an HTTP endpoint")]
#[command(version)]
struct Args {
    /// Verbose output (write a log file)
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show tracker configuration and buffer status
    Status,

    /// Set the delivery endpoint and headers, and enable tracking
    Configure {
        /// Endpoint URL to POST batches to
        endpoint: String,

        /// Request header, as "Name: value" (repeatable)
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,
    },

    /// Resume processing of captured samples
    Enable,

    /// Pause processing of captured samples (buffer and target are kept)
    Disable,

    /// Feed one captured position into the pipeline
    Capture {
        /// Latitude in decimal degrees
        #[arg(allow_negative_numbers = true)]
        lat: f64,

        /// Longitude in decimal degrees
        #[arg(allow_negative_numbers = true)]
        long: f64,
    },

    /// Attempt a delivery now, regardless of the throttle interval
    Flush {
        /// Abort the attempt after this many seconds
        #[arg(long)]
        deadline_secs: Option<u64>,
    },

    /// Disable tracking and drop the persisted target and buffer
    Stop,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    Config::ensure_xdg_env();

    let config = Config::load().context("failed to load configuration")?;

    let _log_guard = if args.verbose {
        Some(
            waypost_core::logging::init(&config.logging)
                .context("failed to initialize logging")?,
        )
    } else {
        None
    };

    let tracker = Tracker::open(&config).context("failed to open tracker state")?;

    match args.command {
        Command::Status => cmd_status(&config, &tracker).await,
        Command::Configure { endpoint, headers } => {
            cmd_configure(&tracker, &endpoint, &headers).await
        }
        Command::Enable => {
            tracker.set_enabled(true).await?;
            println!("Tracking enabled");
            Ok(())
        }
        Command::Disable => {
            tracker.set_enabled(false).await?;
            println!("Tracking disabled (buffer and target kept)");
            Ok(())
        }
        Command::Capture { lat, long } => cmd_capture(&tracker, lat, long).await,
        Command::Flush { deadline_secs } => cmd_flush(&tracker, deadline_secs).await,
        Command::Stop => {
            tracker.stop().await?;
            println!("Tracking stopped; persisted target and buffer cleared");
            Ok(())
        }
    }
}

async fn cmd_status(config: &Config, tracker: &Tracker) -> Result<()> {
    println!("Waypost Tracker Status");
    println!("======================");
    println!();

    println!("Enabled:        {}", tracker.is_enabled().await?);

    match tracker.delivery_target().await? {
        Some(target) => {
            println!("Endpoint:       {}", target.endpoint);
            println!("Headers:        {} configured", target.headers.len());
        }
        None => {
            println!("Endpoint:       <not set>");
            println!();
            println!("No delivery target. Set one with:");
            println!();
            println!("  waypost configure https://your-endpoint.example.com/locations \\");
            println!("      --header 'Authorization: Bearer ...'");
        }
    }

    println!("Buffered:       {} sample(s)", tracker.buffered().await?.len());

    let last_attempt = tracker
        .last_attempt_at()
        .await?
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "never".to_string());
    println!("Last attempt:   {}", last_attempt);

    println!();
    println!("Min interval:   {}s", config.tracking.min_interval_secs);
    println!("HTTP timeout:   {}s", config.tracking.request_timeout_secs);

    Ok(())
}

async fn cmd_configure(tracker: &Tracker, endpoint: &str, raw_headers: &[String]) -> Result<()> {
    let mut headers = HashMap::new();
    for raw in raw_headers {
        let (name, value) = parse_header(raw)?;
        headers.insert(name, value);
    }

    tracker
        .configure(endpoint, headers)
        .await
        .context("failed to configure delivery target")?;

    println!("Delivery target set to {}", endpoint);
    println!("Tracking enabled");
    Ok(())
}

async fn cmd_capture(tracker: &Tracker, lat: f64, long: f64) -> Result<()> {
    let sample = Sample::new(lat, long, chrono::Utc::now());
    let outcome = tracker
        .on_sample_captured(sample, TriggerKind::SignificantChange)
        .await?;

    println!("{}", describe_outcome(&outcome));
    Ok(())
}

async fn cmd_flush(tracker: &Tracker, deadline_secs: Option<u64>) -> Result<()> {
    let deadline = deadline_secs.map(std::time::Duration::from_secs);
    let outcome = tracker.force_flush(deadline).await?;

    println!("{}", describe_outcome(&outcome));
    Ok(())
}

/// Parse a "Name: value" header argument
fn parse_header(raw: &str) -> Result<(String, String)> {
    let Some((name, value)) = raw.split_once(':') else {
        bail!("header {:?} is not in \"Name: value\" form", raw);
    };

    let name = name.trim();
    if name.is_empty() {
        bail!("header {:?} has an empty name", raw);
    }

    Ok((name.to_string(), value.trim().to_string()))
}

fn describe_outcome(outcome: &FlushOutcome) -> String {
    match outcome {
        FlushOutcome::Delivered { sent } => format!("Delivered {} sample(s)", sent),
        FlushOutcome::Skipped(SkipReason::TrackingDisabled) => {
            "Tracking is disabled; sample dropped (run 'waypost enable')".to_string()
        }
        FlushOutcome::Skipped(SkipReason::Throttled) => {
            "Buffered; minimum interval since the last attempt has not elapsed".to_string()
        }
        FlushOutcome::Skipped(SkipReason::EmptyBuffer) => "Nothing buffered".to_string(),
        FlushOutcome::Skipped(SkipReason::NotConfigured) => {
            "Buffered; no delivery target configured (run 'waypost configure')".to_string()
        }
        FlushOutcome::Failed(FailureKind::Transport) => {
            "Delivery failed in transport; samples kept for the next attempt".to_string()
        }
        FlushOutcome::Failed(FailureKind::Status(status)) => format!(
            "Server answered {}; samples kept for the next attempt",
            status
        ),
        FlushOutcome::Failed(FailureKind::Serialization) => {
            "Payload could not be encoded; buffer was reset".to_string()
        }
    }
}
