//! Validate config command implementation
//!
//! This module implements the `validate-config` command for validating
//! the HL7 Relay configuration file.

use crate::config::load_config;
use crate::config::schema::DatabaseTarget;
use clap::Args;

/// Arguments for the validate-config command
#[derive(Args, Debug)]
pub struct ValidateArgs {}

impl ValidateArgs {
    /// Execute the validate-config command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!(config_path = %config_path, "Validating configuration");

        println!("🔍 Validating configuration file: {config_path}");
        println!();

        // load_config validates after parsing and overrides
        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                println!("❌ Configuration validation failed");
                println!("   Error: {e}");
                println!();
                return Ok(2); // Configuration error exit code
            }
        };

        println!("✅ Configuration is valid");
        println!();
        println!("Configuration Summary:");
        println!("  Environment: {:?}", config.environment);
        println!("  Log Level: {}", config.application.log_level);
        println!(
            "  Instance Name: {}",
            config
                .application
                .instance_name
                .as_deref()
                .unwrap_or("(host name)")
        );

        match config.database_target {
            DatabaseTarget::PostgreSQL => {
                if let Some(ref pg_config) = config.postgresql {
                    use secrecy::ExposeSecret;
                    println!("  Database Target: PostgreSQL");
                    println!(
                        "  PostgreSQL Connection: {}",
                        pg_config
                            .connection_string
                            .expose_secret()
                            .as_str()
                            .split('@')
                            .next_back()
                            .unwrap_or("***")
                    );
                    println!("  Max Connections: {}", pg_config.max_connections);
                    println!("  SSL Mode: {}", pg_config.ssl_mode);
                }
            }
            DatabaseTarget::Memory => {
                println!("  Database Target: in-memory (state is lost on exit)");
            }
        }

        println!("  Downstream URL: {}", config.downstream.url);
        println!(
            "  Source Software: {} {}",
            config.downstream.software_name, config.downstream.software_version
        );
        println!("  Auth Type: {}", config.downstream.auth.auth_type);
        println!(
            "  Lock Renewal / Break: {}s / {}s",
            config.processing.lock_renewal_interval_seconds,
            config.processing.lock_break_after_seconds
        );
        println!(
            "  Retry Backoff: {:?}s",
            config.processing.retry_backoff_seconds
        );
        if config.processing.channels.is_empty() {
            println!("  Channels: all active");
        } else {
            println!("  Channels: {}", config.processing.channels.join(", "));
        }
        println!();
        Ok(0)
    }
}
