//! In-memory storage backend
//!
//! Implements every storage trait over a single lock-protected state, so each
//! operation is atomic with respect to the others, mirroring the single-statement
//! guarantees of the PostgreSQL adapter. Intended for tests and local runs.

use crate::adapters::database::traits::{
    ChannelStatus, ChannelStorage, DatabaseClient, LockStorage, MappingStorage, ProcessingStorage,
};
use crate::domain::processing::normalize_error;
use crate::domain::{
    AttemptId, Channel, ChannelId, InboundMessage, InstanceId, LastAttempt, MappingNamespace,
    MessageId, PendingMessage, ProcessingAttempt, ProcessingStatus, RelayError, ResourceMapping,
    ResourceType, Result,
};
use crate::hl7::Hl7Message;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Default)]
struct MemoryState {
    instances: Vec<(InstanceId, String)>,
    channels: BTreeMap<ChannelId, Channel>,
    messages: BTreeMap<MessageId, InboundMessage>,
    attempts: HashMap<MessageId, Vec<ProcessingAttempt>>,
    locks: HashMap<ChannelId, (InstanceId, DateTime<Utc>)>,
    mappings: HashMap<(MappingNamespace, ResourceType, String), Uuid>,
}

impl MemoryState {
    fn is_processed(&self, message_id: MessageId) -> bool {
        self.attempts
            .get(&message_id)
            .is_some_and(|a| a.iter().any(|a| a.status == ProcessingStatus::Success))
    }

    fn pending(&self, message: &InboundMessage) -> PendingMessage {
        let attempts = self.attempts.get(&message.id);
        PendingMessage {
            message: message.clone(),
            attempt_count: attempts.map_or(0, |a| a.len() as u32),
            last_attempt: attempts.and_then(|a| a.last()).map(|a| LastAttempt {
                status: a.status,
                completed_at: a.completed_at,
            }),
        }
    }

    fn head(&self, channel_id: ChannelId) -> Option<&InboundMessage> {
        self.messages
            .values()
            .find(|m| m.channel_id == channel_id && !self.is_processed(m.id))
    }

    fn attempt_mut(
        &mut self,
        message_id: MessageId,
        attempt_id: AttemptId,
    ) -> Result<&mut ProcessingAttempt> {
        self.attempts
            .get_mut(&message_id)
            .and_then(|a| a.iter_mut().find(|a| a.attempt_id == attempt_id))
            .ok_or_else(|| {
                RelayError::State(format!(
                    "Attempt {attempt_id} of message {message_id} not found"
                ))
            })
    }
}

/// Storage backend held entirely in process memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a channel
    pub async fn add_channel(&self, channel: Channel) {
        self.state.write().await.channels.insert(channel.id, channel);
    }

    /// Store an inbound message as the listener would
    ///
    /// Control id, message type and timestamp are read from MSH when the payload
    /// tokenizes; a malformed payload is stored with blank header values.
    pub async fn enqueue_message(&self, channel_id: ChannelId, payload: &str) -> MessageId {
        let parsed = Hl7Message::parse(payload).ok();
        let control_id = parsed
            .as_ref()
            .and_then(Hl7Message::control_id)
            .unwrap_or_default();
        let message_type = parsed
            .as_ref()
            .and_then(Hl7Message::message_type)
            .map(|t| t.to_string())
            .unwrap_or_default();

        let mut state = self.state.write().await;
        let id = MessageId::new(state.messages.len() as i64 + 1);
        let sequence_number = state
            .messages
            .values()
            .filter(|m| m.channel_id == channel_id)
            .count() as i32
            + 1;
        state.messages.insert(
            id,
            InboundMessage {
                id,
                channel_id,
                control_id,
                sequence_number,
                message_date: Utc::now(),
                message_type,
                payload: payload.to_string(),
                request_uuid: Uuid::new_v4(),
            },
        );
        id
    }

    /// Number of stored identity mappings
    pub async fn mapping_count(&self) -> usize {
        self.state.read().await.mappings.len()
    }

    /// Current holder of a channel lock
    pub async fn lock_holder(&self, channel_id: ChannelId) -> Option<InstanceId> {
        self.state
            .read()
            .await
            .locks
            .get(&channel_id)
            .map(|(holder, _)| *holder)
    }
}

#[async_trait]
impl DatabaseClient for MemoryStore {
    async fn test_connection(&self) -> Result<()> {
        Ok(())
    }

    async fn ensure_schema(&self) -> Result<()> {
        Ok(())
    }

    fn database_name(&self) -> &str {
        "memory"
    }
}

#[async_trait]
impl ChannelStorage for MemoryStore {
    async fn register_instance(&self, name: &str) -> Result<InstanceId> {
        let mut state = self.state.write().await;
        if let Some((id, _)) = state.instances.iter().find(|(_, n)| n == name) {
            return Ok(*id);
        }
        let id = InstanceId::new(state.instances.len() as i32 + 1);
        state.instances.push((id, name.to_string()));
        Ok(id)
    }

    async fn load_channels(&self) -> Result<Vec<Channel>> {
        Ok(self.state.read().await.channels.values().cloned().collect())
    }

    async fn channel_status(&self) -> Result<Vec<ChannelStatus>> {
        let state = self.state.read().await;
        let statuses = state
            .channels
            .values()
            .map(|channel| {
                let backlog = state
                    .messages
                    .values()
                    .filter(|m| m.channel_id == channel.id && !state.is_processed(m.id))
                    .count() as u64;
                let head = state.head(channel.id);
                let head_attempt = head
                    .and_then(|m| state.attempts.get(&m.id))
                    .and_then(|a| a.last());
                let lock = state.locks.get(&channel.id);

                ChannelStatus {
                    channel_id: channel.id,
                    channel_name: channel.name.clone(),
                    is_active: channel.is_active,
                    backlog,
                    head_message_id: head.map(|m| m.id),
                    head_attempt_count: head
                        .and_then(|m| state.attempts.get(&m.id))
                        .map_or(0, |a| a.len() as u32),
                    head_last_status: head_attempt.map(|a| a.status),
                    head_last_error: head_attempt.and_then(|a| a.error_message.clone()),
                    lock_holder: lock.and_then(|(holder, _)| {
                        state
                            .instances
                            .iter()
                            .find(|(id, _)| id == holder)
                            .map(|(_, name)| name.clone())
                    }),
                    lock_heartbeat: lock.map(|(_, heartbeat)| *heartbeat),
                }
            })
            .collect();
        Ok(statuses)
    }
}

#[async_trait]
impl ProcessingStorage for MemoryStore {
    async fn get_next_unprocessed_message(
        &self,
        channel_id: ChannelId,
        _instance_id: InstanceId,
    ) -> Result<Option<PendingMessage>> {
        let state = self.state.read().await;
        Ok(state.head(channel_id).map(|m| state.pending(m)))
    }

    async fn start_message_processing(
        &self,
        message_id: MessageId,
        instance_id: InstanceId,
    ) -> Result<AttemptId> {
        let mut state = self.state.write().await;
        if !state.messages.contains_key(&message_id) {
            return Err(RelayError::State(format!("Message {message_id} not found")));
        }
        let attempts = state.attempts.entry(message_id).or_default();
        let attempt_id = AttemptId::new(attempts.len() as i32 + 1);
        attempts.push(ProcessingAttempt {
            message_id,
            attempt_id,
            instance_id,
            started_at: Utc::now(),
            completed_at: None,
            status: ProcessingStatus::Pending,
            error_message: None,
        });
        Ok(attempt_id)
    }

    async fn complete_message_processing(
        &self,
        message_id: MessageId,
        attempt_id: AttemptId,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        let attempt = state.attempt_mut(message_id, attempt_id)?;
        attempt.status = ProcessingStatus::Success;
        attempt.completed_at = Some(Utc::now());
        attempt.error_message = None;
        Ok(())
    }

    async fn update_message_processing_status(
        &self,
        message_id: MessageId,
        attempt_id: AttemptId,
        status: ProcessingStatus,
        error_message: Option<&str>,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        let attempt = state.attempt_mut(message_id, attempt_id)?;
        attempt.status = status;
        attempt.completed_at = Some(Utc::now());
        attempt.error_message = normalize_error(error_message);
        Ok(())
    }

    async fn list_attempts(&self, message_id: MessageId) -> Result<Vec<ProcessingAttempt>> {
        Ok(self
            .state
            .read()
            .await
            .attempts
            .get(&message_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl LockStorage for MemoryStore {
    async fn get_channel_lock(
        &self,
        channel_id: ChannelId,
        instance_id: InstanceId,
        break_after_seconds: u64,
    ) -> Result<bool> {
        let now = Utc::now();
        // None when the threshold reaches past the earliest representable time
        let stale_before = i64::try_from(break_after_seconds)
            .ok()
            .and_then(Duration::try_seconds)
            .and_then(|break_after| now.checked_sub_signed(break_after));
        let mut state = self.state.write().await;

        let claimable = match state.locks.get(&channel_id) {
            None => true,
            Some((holder, heartbeat)) => {
                *holder == instance_id || stale_before.is_some_and(|before| *heartbeat < before)
            }
        };
        if claimable {
            state.locks.insert(channel_id, (instance_id, now));
        }
        Ok(claimable)
    }

    async fn release_channel_lock(
        &self,
        channel_id: ChannelId,
        instance_id: InstanceId,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        if state
            .locks
            .get(&channel_id)
            .is_some_and(|(holder, _)| *holder == instance_id)
        {
            state.locks.remove(&channel_id);
        }
        Ok(())
    }
}

#[async_trait]
impl MappingStorage for MemoryStore {
    async fn find_or_create_mapping(
        &self,
        namespace: MappingNamespace,
        resource_type: ResourceType,
        canonical_key: &str,
        candidate: Uuid,
    ) -> Result<Uuid> {
        let mut state = self.state.write().await;
        Ok(*state
            .mappings
            .entry((namespace, resource_type, canonical_key.to_string()))
            .or_insert(candidate))
    }

    async fn list_scoped_mappings(&self, prefix: &str) -> Result<Vec<ResourceMapping>> {
        let extended = format!("{prefix}|");
        let state = self.state.read().await;
        let mut mappings: Vec<ResourceMapping> = state
            .mappings
            .iter()
            .filter(|((namespace, _, key), _)| {
                *namespace == MappingNamespace::Scoped
                    && (key == prefix || key.starts_with(&extended))
            })
            .map(|((_, resource_type, key), uuid)| ResourceMapping {
                resource_type: *resource_type,
                canonical_key: key.clone(),
                resource_uuid: *uuid,
            })
            .collect();
        mappings.sort_by(|a, b| {
            a.canonical_key
                .cmp(&b.canonical_key)
                .then_with(|| a.resource_type.as_str().cmp(b.resource_type.as_str()))
        });
        Ok(mappings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    fn channel() -> Channel {
        Channel::builder()
            .id(1)
            .name("pas")
            .port_number(8001)
            .downstream_service_identifier("RQX")
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_register_instance_is_idempotent() {
        let store = MemoryStore::new();
        let a = store.register_instance("worker-a").await.unwrap();
        let b = store.register_instance("worker-b").await.unwrap();
        assert_ne!(a, b);
        assert_eq!(store.register_instance("worker-a").await.unwrap(), a);
    }

    #[tokio::test]
    async fn test_huge_break_threshold_never_breaks_a_held_lock() {
        let store = MemoryStore::new();
        let channel_id = ChannelId::new(1);
        assert!(store
            .get_channel_lock(channel_id, InstanceId::new(1), 360)
            .await
            .unwrap());

        for break_after in [10_000_000_000_000, u64::MAX] {
            let taken = store
                .get_channel_lock(channel_id, InstanceId::new(2), break_after)
                .await
                .unwrap();
            assert!(!taken);
        }
        assert_eq!(store.lock_holder(channel_id).await, Some(InstanceId::new(1)));
    }

    #[tokio::test]
    async fn test_attempt_ids_are_sequential_per_message() {
        let store = MemoryStore::new();
        store.add_channel(channel()).await;
        let message = store.enqueue_message(ChannelId::new(1), "MSH|^~\\&|A").await;
        let instance = InstanceId::new(1);

        let first = store.start_message_processing(message, instance).await.unwrap();
        store
            .update_message_processing_status(message, first, ProcessingStatus::SendFailure, Some(" "))
            .await
            .unwrap();
        let second = store.start_message_processing(message, instance).await.unwrap();

        assert_eq!(first, AttemptId::new(1));
        assert_eq!(second, AttemptId::new(2));
        let attempts = store.list_attempts(message).await.unwrap();
        assert_eq!(attempts[0].error_message, None);
        assert!(attempts[0].completed_at.is_some());
        assert_eq!(attempts[1].status, ProcessingStatus::Pending);
    }

    #[tokio::test]
    async fn test_unknown_attempt_is_an_error() {
        let store = MemoryStore::new();
        let result = store
            .complete_message_processing(MessageId::new(9), AttemptId::new(1))
            .await;
        assert!(matches!(result, Err(RelayError::State(_))));
    }

    #[tokio::test]
    async fn test_scoped_listing_respects_field_boundaries() {
        let store = MemoryStore::new();
        for key in ["PatIdValue=1", "PatIdValue=1|EpIdValue=A", "PatIdValue=12"] {
            store
                .find_or_create_mapping(
                    MappingNamespace::Scoped,
                    ResourceType::EpisodeOfCare,
                    key,
                    Uuid::new_v4(),
                )
                .await
                .unwrap();
        }
        let keys: Vec<String> = store
            .list_scoped_mappings("PatIdValue=1")
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.canonical_key)
            .collect();
        assert_eq!(keys, vec!["PatIdValue=1", "PatIdValue=1|EpIdValue=A"]);
    }
}
