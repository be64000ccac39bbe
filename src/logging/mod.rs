//! Logging and observability
//!
//! This module provides structured logging with support for:
//! - Console output for operators
//! - JSON-formatted local log files with rotation
//! - Configurable log levels
//!
//! # Example
//!
//! ```no_run
//! use hl7_relay::logging::init_logging;
//! use hl7_relay::config::LoggingConfig;
//!
//! let config = LoggingConfig::default();
//! let _guard = init_logging("info", &config).expect("Failed to initialize logging");
//!
//! tracing::info!("Application started");
//! tracing::error!(error = "Something went wrong", "Error occurred");
//! ```

pub mod structured;

// Re-export commonly used items
pub use structured::{init_logging, LoggingGuard};

/// Log a channel lock transition
///
/// # Example
///
/// ```no_run
/// use hl7_relay::log_lock_transition;
/// use hl7_relay::core::lock::LockTransition;
/// use hl7_relay::domain::{ChannelId, InstanceId};
///
/// log_lock_transition!(ChannelId::new(3), InstanceId::new(1), LockTransition::Acquired);
/// ```
#[macro_export]
macro_rules! log_lock_transition {
    ($channel_id:expr, $instance_id:expr, $transition:expr) => {
        tracing::info!(
            channel_id = %$channel_id,
            instance_id = %$instance_id,
            transition = %$transition,
            "Channel lock {}",
            $transition.describe()
        );
    };
}

/// Log the outcome of a processing attempt
///
/// Successes log at info level, failures at warn level with their cause.
///
/// # Example
///
/// ```no_run
/// use hl7_relay::log_attempt_outcome;
/// use hl7_relay::domain::{AttemptId, MessageId, ProcessingStatus};
///
/// log_attempt_outcome!(MessageId::new(10), AttemptId::new(1), ProcessingStatus::Success, None::<&str>);
/// ```
#[macro_export]
macro_rules! log_attempt_outcome {
    ($message_id:expr, $attempt_id:expr, $status:expr, $cause:expr) => {
        match $cause {
            Some(cause) => tracing::warn!(
                message_id = %$message_id,
                attempt_id = %$attempt_id,
                status = %$status,
                cause = %cause,
                "Message processing failed"
            ),
            None => tracing::info!(
                message_id = %$message_id,
                attempt_id = %$attempt_id,
                status = %$status,
                "Message processed"
            ),
        }
    };
}

/// Log an error with context
///
/// # Example
///
/// ```no_run
/// use hl7_relay::log_error_with_context;
/// use hl7_relay::domain::RelayError;
///
/// let error = RelayError::Configuration("Invalid config".to_string());
/// log_error_with_context!(&error, "Failed to load configuration");
/// ```
#[macro_export]
macro_rules! log_error_with_context {
    ($error:expr, $context:expr) => {
        tracing::error!(
            error = %$error,
            context = $context,
            "Error occurred"
        );
    };
}
