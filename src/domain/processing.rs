//! Processing outcome types
//!
//! Every attempt ends in exactly one [`ProcessingStatus`]. Failures travel through the
//! pipeline as a [`ProcessingFailure`] value carrying the status and a readable cause.

use super::ids::{AttemptId, InstanceId, MessageId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Outcome status of a processing attempt
///
/// Variants are declared in pipeline-stage order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    /// Attempt started and not yet completed
    Pending,
    /// Structural or semantic conversion failure
    TransformFailure,
    /// Failure composing the outbound wrapper
    EnvelopeGenerationFailure,
    /// Network failure or non-success response from downstream
    SendFailure,
    /// Anything not classified above
    UnexpectedError,
    /// Delivered; the message leaves the backlog for good
    Success,
}

impl ProcessingStatus {
    /// Storage representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Pending => "pending",
            ProcessingStatus::TransformFailure => "transform_failure",
            ProcessingStatus::EnvelopeGenerationFailure => "envelope_generation_failure",
            ProcessingStatus::SendFailure => "send_failure",
            ProcessingStatus::UnexpectedError => "unexpected_error",
            ProcessingStatus::Success => "success",
        }
    }

    /// Whether this status records a classified failure
    pub fn is_failure(&self) -> bool {
        !matches!(self, ProcessingStatus::Pending | ProcessingStatus::Success)
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str().to_uppercase())
    }
}

impl FromStr for ProcessingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(ProcessingStatus::Pending),
            "transform_failure" => Ok(ProcessingStatus::TransformFailure),
            "envelope_generation_failure" => Ok(ProcessingStatus::EnvelopeGenerationFailure),
            "send_failure" => Ok(ProcessingStatus::SendFailure),
            "unexpected_error" => Ok(ProcessingStatus::UnexpectedError),
            "success" => Ok(ProcessingStatus::Success),
            other => Err(format!("Unknown processing status '{other}'")),
        }
    }
}

/// A classified pipeline failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessingFailure {
    /// Failure classification
    pub status: ProcessingStatus,

    /// Human readable cause
    pub cause: String,
}

impl ProcessingFailure {
    /// Transform stage failure
    pub fn transform(cause: impl Into<String>) -> Self {
        Self::new(ProcessingStatus::TransformFailure, cause)
    }

    /// Envelope stage failure
    pub fn envelope(cause: impl Into<String>) -> Self {
        Self::new(ProcessingStatus::EnvelopeGenerationFailure, cause)
    }

    /// Send stage failure
    pub fn send(cause: impl Into<String>) -> Self {
        Self::new(ProcessingStatus::SendFailure, cause)
    }

    /// Catch-all failure
    pub fn unexpected(cause: impl Into<String>) -> Self {
        Self::new(ProcessingStatus::UnexpectedError, cause)
    }

    fn new(status: ProcessingStatus, cause: impl Into<String>) -> Self {
        Self {
            status,
            cause: cause.into(),
        }
    }

    /// The cause as stored against the attempt; blank causes are recorded as absent
    pub fn formatted_cause(&self) -> Option<String> {
        normalize_error(Some(&self.cause))
    }
}

impl fmt::Display for ProcessingFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.status, self.cause)
    }
}

/// Converts an optional error text into its stored form
///
/// Blank text means there is nothing to report and is stored as `None`.
pub fn normalize_error(error: Option<&str>) -> Option<String> {
    error
        .map(str::trim_end)
        .filter(|e| !e.trim().is_empty())
        .map(str::to_string)
}

/// A recorded processing attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingAttempt {
    /// Owning message
    pub message_id: MessageId,

    /// Sequence number within the message
    pub attempt_id: AttemptId,

    /// Instance that ran the attempt
    pub instance_id: InstanceId,

    /// Start time
    pub started_at: DateTime<Utc>,

    /// Completion time; `None` while in flight or after a crash
    pub completed_at: Option<DateTime<Utc>>,

    /// Recorded status
    pub status: ProcessingStatus,

    /// Formatted cause of a failure
    pub error_message: Option<String>,
}
