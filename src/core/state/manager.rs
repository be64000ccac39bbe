//! Processing state manager
//!
//! Records the attempt lifecycle of each message and selects the next message
//! a channel should work on.

use crate::adapters::database::traits::ProcessingStorage;
use crate::core::state::retry::RetryPolicy;
use crate::domain::processing::normalize_error;
use crate::domain::{
    AttemptId, ChannelId, InstanceId, MessageId, PendingMessage, ProcessingAttempt,
    ProcessingStatus, RelayError, Result,
};
use chrono::Utc;
use std::sync::Arc;

/// Attempt bookkeeping over a processing storage backend
///
/// A message is unprocessed until one of its attempts records `SUCCESS`. Every
/// other terminal status leaves it at the head of its channel, where it is
/// picked up again once the retry policy allows.
#[derive(Clone)]
pub struct ProcessingStateManager {
    /// Processing storage backend
    storage: Arc<dyn ProcessingStorage + Send + Sync>,

    /// Backoff applied to failed head-of-line messages
    retry: RetryPolicy,
}

impl ProcessingStateManager {
    /// Create a new manager
    ///
    /// # Arguments
    ///
    /// * `storage` - Processing storage implementation
    /// * `retry` - Retry policy for failed messages
    pub fn new(storage: Arc<dyn ProcessingStorage + Send + Sync>, retry: RetryPolicy) -> Self {
        Self { storage, retry }
    }

    /// The retry policy in force
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Open a new attempt against a message
    ///
    /// # Errors
    ///
    /// Returns an error if the message does not exist or storage fails.
    pub async fn start_attempt(
        &self,
        message_id: MessageId,
        instance_id: InstanceId,
    ) -> Result<AttemptId> {
        let attempt_id = self
            .storage
            .start_message_processing(message_id, instance_id)
            .await?;

        tracing::debug!(
            message_id = %message_id,
            attempt_id = %attempt_id,
            instance_id = %instance_id,
            "Attempt started"
        );
        Ok(attempt_id)
    }

    /// Close an attempt as `SUCCESS`
    ///
    /// The message leaves the backlog permanently.
    ///
    /// # Errors
    ///
    /// Returns an error if the attempt does not exist or storage fails.
    pub async fn complete_attempt(&self, message_id: MessageId, attempt_id: AttemptId) -> Result<()> {
        self.storage
            .complete_message_processing(message_id, attempt_id)
            .await
    }

    /// Close an attempt with a failure status
    ///
    /// A blank `error` is stored as absent. Failures at or beyond the operator
    /// alert threshold are logged at error level.
    ///
    /// # Errors
    ///
    /// Returns an error if `status` is not a failure status, the attempt does
    /// not exist, or storage fails.
    pub async fn fail_attempt(
        &self,
        message_id: MessageId,
        attempt_id: AttemptId,
        status: ProcessingStatus,
        error: Option<&str>,
    ) -> Result<()> {
        if !status.is_failure() {
            return Err(RelayError::State(format!(
                "{status} is not a failure status"
            )));
        }

        let error = normalize_error(error);
        self.storage
            .update_message_processing_status(message_id, attempt_id, status, error.as_deref())
            .await?;

        let attempt = u32::try_from(attempt_id.value()).unwrap_or_default();
        if self.retry.requires_operator(attempt) {
            tracing::error!(
                message_id = %message_id,
                attempt_id = %attempt_id,
                status = %status,
                retry_in_secs = self.retry.backoff_after(attempt).as_secs(),
                "Message keeps failing and is blocking its channel"
            );
        }
        Ok(())
    }

    /// Earliest unprocessed message of a channel that is due for an attempt
    ///
    /// Returns `None` when the backlog is empty and also while the head
    /// message is backing off, so later messages never overtake it.
    ///
    /// # Errors
    ///
    /// Returns an error if storage fails.
    pub async fn next_unprocessed(
        &self,
        channel_id: ChannelId,
        instance_id: InstanceId,
    ) -> Result<Option<PendingMessage>> {
        let Some(pending) = self
            .storage
            .get_next_unprocessed_message(channel_id, instance_id)
            .await?
        else {
            return Ok(None);
        };

        if self.retry.is_due(&pending, Utc::now()) {
            Ok(Some(pending))
        } else {
            tracing::trace!(
                channel_id = %channel_id,
                message_id = %pending.message.id,
                attempts = pending.attempt_count,
                "Head message backing off"
            );
            Ok(None)
        }
    }

    /// Every attempt recorded against a message, oldest first
    ///
    /// # Errors
    ///
    /// Returns an error if storage fails.
    pub async fn attempts(&self, message_id: MessageId) -> Result<Vec<ProcessingAttempt>> {
        self.storage.list_attempts(message_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::MemoryStore;
    use crate::domain::Channel;

    const ADT: &str = "MSH|^~\\&|PAS|RX1|RELAY|RX1|20240102030405||ADT^A01|MSG1|P|2.4\r";

    async fn setup(retry: RetryPolicy) -> (Arc<MemoryStore>, ProcessingStateManager, MessageId) {
        let store = Arc::new(MemoryStore::new());
        store
            .add_channel(
                Channel::builder()
                    .id(1)
                    .name("pas")
                    .downstream_service_identifier("RQX")
                    .build()
                    .unwrap(),
            )
            .await;
        let message_id = store.enqueue_message(ChannelId::new(1), ADT).await;
        let manager = ProcessingStateManager::new(store.clone(), retry);
        (store, manager, message_id)
    }

    #[tokio::test]
    async fn test_success_status_is_not_a_failure() {
        let (_store, manager, message_id) = setup(RetryPolicy::immediate()).await;
        let attempt = manager.start_attempt(message_id, InstanceId::new(1)).await.unwrap();
        let result = manager
            .fail_attempt(message_id, attempt, ProcessingStatus::Success, None)
            .await;
        assert!(matches!(result, Err(RelayError::State(_))));
    }

    #[tokio::test]
    async fn test_backing_off_head_blocks_channel() {
        let (store, manager, message_id) = setup(RetryPolicy::new(&[3600], 5)).await;
        store.enqueue_message(ChannelId::new(1), ADT).await;

        let instance = InstanceId::new(1);
        let attempt = manager.start_attempt(message_id, instance).await.unwrap();
        manager
            .fail_attempt(message_id, attempt, ProcessingStatus::SendFailure, Some("HTTP/1.1 503"))
            .await
            .unwrap();

        assert!(manager
            .next_unprocessed(ChannelId::new(1), instance)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_blank_error_is_stored_as_absent() {
        let (_store, manager, message_id) = setup(RetryPolicy::immediate()).await;
        let attempt = manager.start_attempt(message_id, InstanceId::new(1)).await.unwrap();
        manager
            .fail_attempt(message_id, attempt, ProcessingStatus::UnexpectedError, Some("  "))
            .await
            .unwrap();

        let attempts = manager.attempts(message_id).await.unwrap();
        assert_eq!(attempts[0].status, ProcessingStatus::UnexpectedError);
        assert_eq!(attempts[0].error_message, None);
        assert!(attempts[0].completed_at.is_some());
    }
}
