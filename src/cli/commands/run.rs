//! Run command implementation
//!
//! This module implements the `run` command, which starts the dispatcher
//! supervisor and keeps it running until a shutdown signal arrives.

use crate::config::load_config;
use crate::core::dispatch::Supervisor;
use crate::domain::RelayError;
use clap::Args;
use tokio::sync::watch;

/// Arguments for the run command
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Override the channels to dispatch (comma-separated names)
    #[arg(long)]
    pub channel: Option<String>,

    /// Override the instance name registered in storage
    #[arg(long)]
    pub instance_name: Option<String>,
}

impl RunArgs {
    /// Execute the run command
    pub async fn execute(
        &self,
        config_path: &str,
        shutdown_signal: watch::Receiver<bool>,
    ) -> anyhow::Result<i32> {
        tracing::info!("Starting run command");

        let mut config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load configuration");
                eprintln!("Failed to load configuration: {e}");
                return Ok(2); // Configuration error exit code
            }
        };

        // Apply CLI overrides
        if let Some(channels) = &self.channel {
            let names: Vec<String> = channels
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            tracing::info!(channels = ?names, "Overriding channels from CLI");
            config.processing.channels = names;
        }

        if let Some(name) = &self.instance_name {
            tracing::info!(instance = %name, "Overriding instance name from CLI");
            config.application.instance_name = Some(name.clone());
        }

        let supervisor = match Supervisor::from_config(&config).await {
            Ok(s) => s,
            Err(RelayError::Configuration(e)) => {
                tracing::error!(error = %e, "Invalid configuration");
                eprintln!("Invalid configuration: {e}");
                return Ok(2);
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to initialize supervisor");
                eprintln!("Failed to initialize: {e}");
                return Ok(4); // Connection error exit code
            }
        };

        println!(
            "🚀 Dispatching as instance '{}' (Ctrl+C to stop)",
            supervisor.instance_name()
        );

        let summary = match supervisor.run(shutdown_signal).await {
            Ok(s) => s,
            Err(RelayError::Configuration(e)) => {
                tracing::error!(error = %e, "Nothing to dispatch");
                eprintln!("{e}");
                return Ok(2);
            }
            Err(e) => {
                tracing::error!(error = %e, "Supervisor failed");
                eprintln!("Supervisor failed: {e}");
                return Ok(5); // Fatal error exit code
            }
        };

        println!();
        println!("📊 Dispatch Summary:");
        for channel in &summary.channels {
            println!(
                "  {:<20} succeeded: {:<6} failed: {:<6} duration: {:.2}s",
                channel.channel_name,
                channel.succeeded,
                channel.total_failed(),
                channel.duration.as_secs_f64()
            );
            for (status, count) in &channel.failed {
                println!("    {status}: {count}");
            }
        }
        if !summary.aborted.is_empty() {
            println!("  ⚠️  Aborted after shutdown timeout: {}", summary.aborted.join(", "));
        }
        println!();

        if summary.interrupted {
            println!("⚠️  Stopped by signal. Unfinished messages resume on next run.");
            tracing::info!("Run interrupted by user signal");
            Ok(130) // SIGINT exit code (standard Unix convention)
        } else {
            Ok(0)
        }
    }
}
