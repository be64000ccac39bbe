//! Domain models and types for HL7 Relay.
//!
//! This module contains the core domain models, types, and business rules.
//!
//! # Overview
//!
//! The domain layer provides:
//! - **Strongly-typed identifiers** ([`ChannelId`], [`InstanceId`], [`MessageId`], [`AttemptId`])
//! - **Domain models** ([`Channel`], [`InboundMessage`], [`ProcessingAttempt`])
//! - **Outcome classification** ([`ProcessingStatus`], [`ProcessingFailure`])
//! - **Error types** ([`RelayError`], [`DeliveryError`])
//! - **Result type alias** ([`Result`])
//!
//! # Error Handling
//!
//! All fallible operations return [`Result<T, RelayError>`]:
//!
//! ```rust
//! use hl7_relay::domain::{RelayError, Result};
//!
//! fn example() -> Result<()> {
//!     Err(RelayError::Configuration("channel name cannot be blank".to_string()))
//! }
//! ```
//!
//! Pipeline failures are values, not errors: a stage that fails returns a
//! [`ProcessingFailure`] carrying its [`ProcessingStatus`] and a readable cause.

pub mod channel;
pub mod errors;
pub mod ids;
pub mod mapping;
pub mod message;
pub mod processing;
pub mod resource;
pub mod result;

// Re-export commonly used types for convenience
pub use channel::{Channel, ChannelBuilder, PatientIdentifierField};
pub use errors::{DeliveryError, RelayError};
pub use ids::{AttemptId, ChannelId, InstanceId, MessageId};
pub use mapping::{MappingNamespace, ResourceMapping};
pub use message::{InboundMessage, LastAttempt, PendingMessage};
pub use processing::{ProcessingAttempt, ProcessingFailure, ProcessingStatus};
pub use resource::ResourceType;
pub use result::Result;
