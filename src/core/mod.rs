//! Core business logic for HL7 Relay.
//!
//! # Modules
//!
//! - [`mapping`] - Canonical business keys and the identity mapper
//! - [`transform`] - HL7v2 ADT to FHIR bundle transformation
//! - [`state`] - Processing attempts and retry policy
//! - [`lock`] - Per-channel lease coordination across instances
//! - [`dispatch`] - Message processor, channel dispatchers and their supervisor
//!
//! # Processing Workflow
//!
//! For each active channel:
//!
//! 1. **Lock**: Acquire or renew the channel lock
//! 2. **Select**: Fetch the earliest unprocessed message that is due
//! 3. **Transform**: Convert it to a FHIR bundle with stable resource ids
//! 4. **Envelope**: Wrap the bundle for the downstream service
//! 5. **Send**: Post it with current credentials
//! 6. **Record**: Close the attempt with its status
//!
//! # Example
//!
//! ```rust,no_run
//! use hl7_relay::config::load_config;
//! use hl7_relay::core::dispatch::Supervisor;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("hl7relay.toml")?;
//! let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//!
//! let supervisor = Supervisor::from_config(&config).await?;
//! let summary = supervisor.run(shutdown_rx).await?;
//!
//! println!("Succeeded: {}", summary.succeeded());
//! println!("Failed: {}", summary.failed());
//! # Ok(())
//! # }
//! ```

pub mod dispatch;
pub mod lock;
pub mod mapping;
pub mod state;
pub mod transform;
