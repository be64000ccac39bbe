//! Retry policy for failed messages
//!
//! A failed message stays at the head of its channel and is retried by the same
//! dispatcher. The policy decides how long the head waits before its next attempt.

use crate::config::schema::ProcessingConfig;
use crate::domain::{PendingMessage, ProcessingStatus};
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Backoff and escalation rules applied to failed head-of-line messages
///
/// # Examples
///
/// ```
/// use hl7_relay::core::state::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::new(&[0, 10, 60], 5);
/// assert_eq!(policy.backoff_after(1), Duration::ZERO);
/// assert_eq!(policy.backoff_after(2), Duration::from_secs(10));
/// assert_eq!(policy.backoff_after(9), Duration::from_secs(60));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    backoff: Vec<Duration>,
    alert_after_attempts: u32,
}

impl RetryPolicy {
    /// Create a policy from per-attempt backoff seconds and an alert threshold
    pub fn new(backoff_seconds: &[u64], alert_after_attempts: u32) -> Self {
        Self {
            backoff: backoff_seconds.iter().copied().map(Duration::from_secs).collect(),
            alert_after_attempts,
        }
    }

    /// Build the policy from the processing configuration
    pub fn from_config(config: &ProcessingConfig) -> Self {
        Self::new(
            &config.retry_backoff_seconds,
            config.operator_alert_after_attempts,
        )
    }

    /// Retry immediately, never escalate
    pub fn immediate() -> Self {
        Self::new(&[0], u32::MAX)
    }

    /// Delay before retrying a message that has failed `failed_attempts` times
    ///
    /// The last configured value repeats for every further failure.
    pub fn backoff_after(&self, failed_attempts: u32) -> Duration {
        if failed_attempts == 0 {
            return Duration::ZERO;
        }
        let index = usize::try_from(failed_attempts - 1).unwrap_or(usize::MAX);
        self.backoff
            .get(index)
            .or_else(|| self.backoff.last())
            .copied()
            .unwrap_or(Duration::ZERO)
    }

    /// Whether the message may be attempted at `now`
    ///
    /// Messages never attempted and messages whose last attempt is still open
    /// (the worker crashed mid-attempt) are always due.
    pub fn is_due(&self, pending: &PendingMessage, now: DateTime<Utc>) -> bool {
        let Some(last) = &pending.last_attempt else {
            return true;
        };
        if last.status == ProcessingStatus::Pending {
            return true;
        }
        let Some(completed_at) = last.completed_at else {
            return true;
        };

        match chrono::Duration::from_std(self.backoff_after(pending.attempt_count)) {
            Ok(delay) => completed_at + delay <= now,
            Err(_) => false,
        }
    }

    /// Whether a failure on attempt number `attempt` needs operator attention
    pub fn requires_operator(&self, attempt: u32) -> bool {
        attempt >= self.alert_after_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&ProcessingConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ChannelId, InboundMessage, LastAttempt, MessageId};
    use uuid::Uuid;

    fn pending(attempt_count: u32, last_attempt: Option<LastAttempt>) -> PendingMessage {
        PendingMessage {
            message: InboundMessage {
                id: MessageId::new(1),
                channel_id: ChannelId::new(1),
                control_id: "MSG1".to_string(),
                sequence_number: 1,
                message_date: Utc::now(),
                message_type: "ADT^A01".to_string(),
                payload: String::new(),
                request_uuid: Uuid::new_v4(),
            },
            attempt_count,
            last_attempt,
        }
    }

    #[test]
    fn test_last_backoff_repeats() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_after(0), Duration::ZERO);
        assert_eq!(policy.backoff_after(1), Duration::ZERO);
        assert_eq!(policy.backoff_after(4), Duration::from_secs(300));
        assert_eq!(policy.backoff_after(40), Duration::from_secs(300));
    }

    #[test]
    fn test_never_attempted_is_due() {
        assert!(RetryPolicy::default().is_due(&pending(0, None), Utc::now()));
    }

    #[test]
    fn test_open_attempt_is_due() {
        let last = LastAttempt {
            status: ProcessingStatus::Pending,
            completed_at: None,
        };
        let policy = RetryPolicy::new(&[3600], 5);
        assert!(policy.is_due(&pending(3, Some(last)), Utc::now()));
    }

    #[test]
    fn test_failed_attempt_waits_for_backoff() {
        let now = Utc::now();
        let last = LastAttempt {
            status: ProcessingStatus::SendFailure,
            completed_at: Some(now - chrono::Duration::seconds(5)),
        };
        let policy = RetryPolicy::new(&[0, 10], 5);
        assert!(policy.is_due(&pending(1, Some(last.clone())), now));
        assert!(!policy.is_due(&pending(2, Some(last.clone())), now));
        assert!(policy.is_due(&pending(2, Some(last)), now + chrono::Duration::seconds(6)));
    }

    #[test]
    fn test_operator_threshold() {
        let policy = RetryPolicy::new(&[0], 3);
        assert!(!policy.requires_operator(2));
        assert!(policy.requires_operator(3));
        assert!(!RetryPolicy::immediate().requires_operator(1_000));
    }
}
