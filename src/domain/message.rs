//! Inbound message domain model

use super::ids::{ChannelId, MessageId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One stored HL7v2 payload awaiting processing
///
/// Written by the listener and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Message identifier
    pub id: MessageId,

    /// Owning channel
    pub channel_id: ChannelId,

    /// MSH-10 as captured by the listener
    pub control_id: String,

    /// Sequence number assigned by the listener
    pub sequence_number: i32,

    /// MSH-7 message timestamp
    pub message_date: DateTime<Utc>,

    /// Inbound message type in `ADT^A01` form
    pub message_type: String,

    /// Raw ER7 payload
    pub payload: String,

    /// Correlation identifier sent downstream
    pub request_uuid: Uuid,
}

/// Outcome of the most recent attempt on a message, as seen by message selection
#[derive(Debug, Clone, PartialEq)]
pub struct LastAttempt {
    /// Recorded status; `Pending` while in flight or after a crash
    pub status: crate::domain::ProcessingStatus,

    /// Completion time, `None` if the attempt never finished
    pub completed_at: Option<DateTime<Utc>>,
}

/// The head of a channel backlog together with its attempt history
#[derive(Debug, Clone, PartialEq)]
pub struct PendingMessage {
    /// The message itself
    pub message: InboundMessage,

    /// Number of attempts recorded so far
    pub attempt_count: u32,

    /// Most recent attempt, if any
    pub last_attempt: Option<LastAttempt>,
}

impl PendingMessage {
    /// Wraps a message that has never been attempted
    pub fn fresh(message: InboundMessage) -> Self {
        Self {
            message,
            attempt_count: 0,
            last_attempt: None,
        }
    }
}
