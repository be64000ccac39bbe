//! External system integrations for HL7 Relay.
//!
//! This module provides adapters for integrating with external systems:
//!
//! - [`database`] - Storage abstraction layer (trait-based)
//! - [`postgresql`] - PostgreSQL implementation
//! - [`memory`] - Process-local implementation for development and tests
//! - [`delivery`] - Envelope composition and the downstream HTTP client
//!
//! # Design Pattern
//!
//! Adapters isolate external dependencies behind traits so the core can be
//! exercised with in-memory or mock implementations. The storage layer is
//! selected at startup:
//!
//! ```rust,no_run
//! use hl7_relay::adapters::database::create_storage;
//! use hl7_relay::config::load_config;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("hl7relay.toml")?;
//! let storage = create_storage(&config).await?;
//! storage.database.test_connection().await?;
//! # Ok(())
//! # }
//! ```

pub mod database;
pub mod delivery;
pub mod memory;
pub mod postgresql;
