//! Configuration management for HL7 Relay.
//!
//! This module provides TOML-based configuration loading, parsing, and validation.
//!
//! # Overview
//!
//! HL7 Relay uses TOML configuration files with support for:
//! - Environment variable substitution (`${VAR_NAME}`)
//! - `HL7RELAY_<SECTION>_<KEY>` environment overrides
//! - Default values for optional settings
//! - Comprehensive validation
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use hl7_relay::config::load_config;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("hl7relay.toml")?;
//!
//! println!("Downstream: {}", config.downstream.url);
//! println!("Lock renewal: {}s", config.processing.lock_renewal_interval_seconds);
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration Structure
//!
//! - [`ApplicationConfig`] - Log level and instance name
//! - [`PostgreSQLConfig`] - Connection pool and TLS settings
//! - [`DownstreamConfig`] / [`AuthConfig`] - Delivery endpoint and credentials
//! - [`ProcessingConfig`] - Lock timing, polling, retry backoff, shutdown
//! - [`LoggingConfig`] - Local file logging
//!
//! # Example Configuration
//!
//! ```toml
//! environment = "production"
//! database_target = "postgresql"
//!
//! [application]
//! log_level = "info"
//!
//! [postgresql]
//! connection_string = "${HL7RELAY_PG_CONNECTION}"
//! ssl_mode = "require"
//!
//! [downstream]
//! url = "https://eds.example.nhs.uk/fhir/$process-message"
//!
//! [downstream.auth]
//! auth_type = "keycloak"
//! token_uri = "https://auth.example.nhs.uk"
//! realm = "eds"
//! username = "hl7relay"
//! password = "${HL7RELAY_AUTH_PASSWORD}"
//! client_id = "hl7relay"
//!
//! [processing]
//! lock_renewal_interval_seconds = 60
//! lock_break_after_seconds = 360
//! retry_backoff_seconds = [0, 10, 60, 300]
//! ```

pub mod loader;
pub mod schema;
pub mod secret;

// Re-export commonly used types
pub use loader::load_config;
pub use schema::{
    ApplicationConfig, AuthConfig, DatabaseTarget, DownstreamConfig, Environment, LoggingConfig,
    PostgreSQLConfig, ProcessingConfig, RelayConfig,
};
pub use secret::{secret_string, SecretString, SecretValue};
