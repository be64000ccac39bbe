//! Status command implementation
//!
//! This module implements the `status` command for displaying per-channel
//! backlog, the failing head of each backlog and who holds each channel lock.

use crate::adapters::database::{create_storage, ChannelStatus};
use crate::config::load_config;
use clap::Args;

/// Arguments for the status command
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Filter by channel name
    #[arg(long)]
    pub channel: Option<String>,

    /// Only show channels with a backlog
    #[arg(long)]
    pub backlog_only: bool,
}

impl StatusArgs {
    /// Execute the status command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!("Checking channel status");

        println!("📊 Channel Status");
        println!();

        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                println!("❌ Failed to load configuration file");
                println!("   Error: {e}");
                return Ok(2); // Configuration error exit code
            }
        };

        let storage = match create_storage(&config).await {
            Ok(s) => s,
            Err(e) => {
                println!("❌ Failed to connect to database");
                println!("   Error: {e}");
                return Ok(4); // Connection error exit code
            }
        };

        let statuses = match storage.channels.channel_status().await {
            Ok(s) => s,
            Err(e) => {
                println!("❌ Failed to load channel status");
                println!("   Error: {e}");
                return Ok(5); // Fatal error exit code
            }
        };

        let filtered = self.filter(statuses);
        if filtered.is_empty() {
            println!("No channels match the specified filters.");
            return Ok(0);
        }

        println!(
            "{:<20} {:<8} {:<10} {:<10} {:<28} {:<25}",
            "Channel", "Active", "Backlog", "Attempts", "Last Status", "Lock Holder"
        );
        println!("{}", "-".repeat(105));

        for status in &filtered {
            let last_status = status
                .head_last_status
                .map(|s| s.to_string())
                .unwrap_or_else(|| "-".to_string());
            let holder = match (&status.lock_holder, status.lock_heartbeat) {
                (Some(holder), Some(heartbeat)) => {
                    format!("{holder} @ {}", heartbeat.format("%H:%M:%S"))
                }
                (Some(holder), None) => holder.clone(),
                _ => "-".to_string(),
            };

            println!(
                "{:<20} {:<8} {:<10} {:<10} {:<28} {:<25}",
                status.channel_name,
                if status.is_active { "yes" } else { "no" },
                status.backlog,
                status.head_attempt_count,
                last_status,
                holder
            );

            if let Some(ref error) = status.head_last_error {
                let first_line = error.lines().next().unwrap_or_default();
                let message_id = status
                    .head_message_id
                    .map(|id| id.to_string())
                    .unwrap_or_default();
                println!("    ↳ message {message_id}: {first_line}");
            }
        }

        println!();
        Ok(0)
    }

    fn filter(&self, statuses: Vec<ChannelStatus>) -> Vec<ChannelStatus> {
        statuses
            .into_iter()
            .filter(|s| {
                self.channel
                    .as_ref()
                    .map_or(true, |name| s.channel_name.eq_ignore_ascii_case(name))
            })
            .filter(|s| !self.backlog_only || s.backlog > 0)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ChannelId;

    fn status(name: &str, backlog: u64) -> ChannelStatus {
        ChannelStatus {
            channel_id: ChannelId::new(1),
            channel_name: name.to_string(),
            is_active: true,
            backlog,
            head_message_id: None,
            head_attempt_count: 0,
            head_last_status: None,
            head_last_error: None,
            lock_holder: None,
            lock_heartbeat: None,
        }
    }

    #[test]
    fn test_status_args_defaults() {
        let args = StatusArgs {
            channel: None,
            backlog_only: false,
        };
        assert_eq!(args.filter(vec![status("pas", 0), status("ed", 3)]).len(), 2);
    }

    #[test]
    fn test_status_args_with_filters() {
        let args = StatusArgs {
            channel: Some("PAS".to_string()),
            backlog_only: false,
        };
        let filtered = args.filter(vec![status("pas", 0), status("ed", 3)]);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].channel_name, "pas");

        let args = StatusArgs {
            channel: None,
            backlog_only: true,
        };
        let filtered = args.filter(vec![status("pas", 0), status("ed", 3)]);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].channel_name, "ed");
    }
}
