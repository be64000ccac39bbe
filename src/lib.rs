// HL7 Relay - HL7v2 to FHIR message processing engine
// Copyright (c) 2025 HL7 Relay Contributors
// Licensed under the MIT License

//! # HL7 Relay - HL7v2 to FHIR message processing engine
//!
//! HL7 Relay takes HL7v2 ADT messages that a listener has already stored,
//! transforms each one into a FHIR message bundle and delivers it to a
//! downstream clinical data service, recording every attempt.
//!
//! ## Overview
//!
//! This library provides the core functionality for:
//! - **Mapping** business identifiers (patients, episodes, practitioners,
//!   organisations, locations) to stable resource UUIDs
//! - **Transforming** ADT messages into FHIR bundles deterministically
//! - **Dispatching** each channel's backlog in arrival order under a
//!   cross-instance channel lock
//! - **Recording** every processing attempt with a classified outcome
//!
//! ## Architecture
//!
//! HL7 Relay follows a layered architecture:
//!
//! - [`cli`] - Command-line interface and argument parsing
//! - [`core`] - Business logic (mapping, transform, state, lock, dispatch)
//! - [`adapters`] - External integrations (PostgreSQL, in-memory store, downstream delivery)
//! - [`hl7`] - ER7 message tokenizer and typed field views
//! - [`domain`] - Core domain types and models
//! - [`config`] - Configuration management
//! - [`logging`] - Structured logging and observability
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use hl7_relay::config::load_config;
//! use hl7_relay::core::dispatch::Supervisor;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = load_config("hl7relay.toml")?;
//!     let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//!
//!     tokio::spawn(async move {
//!         let _ = tokio::signal::ctrl_c().await;
//!         let _ = shutdown_tx.send(true);
//!     });
//!
//!     let supervisor = Supervisor::from_config(&config).await?;
//!     let summary = supervisor.run(shutdown_rx).await?;
//!
//!     println!("Delivered {} messages", summary.succeeded());
//!     Ok(())
//! }
//! ```
//!
//! ## Processing Outcomes
//!
//! Each attempt ends in one status. The first failing stage decides it:
//!
//! | Stage | Status |
//! |-------|--------|
//! | parse, validate, transform | `TRANSFORM_FAILURE` |
//! | envelope | `ENVELOPE_GENERATION_FAILURE` |
//! | credentials, send | `SEND_FAILURE` |
//! | anything else | `UNEXPECTED_ERROR` |
//!
//! Failed messages stay at the head of their channel and are retried after
//! the configured backoff.
//!
//! ## Error Handling
//!
//! HL7 Relay uses the [`domain::RelayError`] type for all errors:
//!
//! ```rust,no_run
//! use hl7_relay::domain::RelayError;
//!
//! fn example() -> Result<(), RelayError> {
//!     let config = hl7_relay::config::load_config("hl7relay.toml")?;
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod hl7;
pub mod logging;
