//! Storage abstraction traits
//!
//! This module defines the traits that storage adapters must implement
//! to back the processing engine. Each concern has its own trait so callers
//! depend only on what they use; the PostgreSQL and in-memory stores implement all of them.

use crate::domain::{
    AttemptId, Channel, ChannelId, InstanceId, MappingNamespace, MessageId, PendingMessage,
    ProcessingAttempt, ProcessingStatus, ResourceMapping, ResourceType, Result,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Backlog and lock overview for one channel
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelStatus {
    /// Channel identifier
    pub channel_id: ChannelId,

    /// Channel name
    pub channel_name: String,

    /// Whether the channel is active
    pub is_active: bool,

    /// Messages without a successful attempt
    pub backlog: u64,

    /// Oldest unprocessed message, if any
    pub head_message_id: Option<MessageId>,

    /// Attempts recorded against the head message
    pub head_attempt_count: u32,

    /// Status of the most recent attempt on the head message
    pub head_last_status: Option<ProcessingStatus>,

    /// Recorded cause of the most recent attempt on the head message
    pub head_last_error: Option<String>,

    /// Name of the instance holding the channel lock
    pub lock_holder: Option<String>,

    /// Last heartbeat of the lock holder
    pub lock_heartbeat: Option<DateTime<Utc>>,
}

/// Connection-level operations
#[async_trait]
pub trait DatabaseClient: Send + Sync {
    /// Test the database connection
    ///
    /// # Errors
    ///
    /// Returns an error if the connection test fails.
    async fn test_connection(&self) -> Result<()>;

    /// Ensure the schema exists, creating it if necessary
    ///
    /// Must be idempotent; every instance calls it at startup.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be created.
    async fn ensure_schema(&self) -> Result<()>;

    /// Get the database name
    fn database_name(&self) -> &str;
}

/// Instance registration and channel configuration
#[async_trait]
pub trait ChannelStorage: Send + Sync {
    /// Register a worker instance by name, returning its identifier
    ///
    /// Registering an existing name returns the existing identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the instance cannot be stored.
    async fn register_instance(&self, name: &str) -> Result<InstanceId>;

    /// Load all configured channels, ordered by identifier
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    async fn load_channels(&self) -> Result<Vec<Channel>>;

    /// Backlog and lock overview for every channel
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    async fn channel_status(&self) -> Result<Vec<ChannelStatus>>;
}

/// Per-message attempt bookkeeping
#[async_trait]
pub trait ProcessingStorage: Send + Sync {
    /// The earliest message of the channel with no successful attempt
    ///
    /// Returns the message together with its attempt history. Retry timing is
    /// applied by the caller, not by storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    async fn get_next_unprocessed_message(
        &self,
        channel_id: ChannelId,
        instance_id: InstanceId,
    ) -> Result<Option<PendingMessage>>;

    /// Open a new attempt on a message
    ///
    /// Attempt identifiers are sequential per message, starting at 1.
    ///
    /// # Errors
    ///
    /// Returns an error if the attempt cannot be stored.
    async fn start_message_processing(
        &self,
        message_id: MessageId,
        instance_id: InstanceId,
    ) -> Result<AttemptId>;

    /// Mark an attempt successful
    ///
    /// # Errors
    ///
    /// Returns an error if the attempt does not exist or the update fails.
    async fn complete_message_processing(
        &self,
        message_id: MessageId,
        attempt_id: AttemptId,
    ) -> Result<()>;

    /// Record a terminal status and optional formatted error against an attempt
    ///
    /// # Errors
    ///
    /// Returns an error if the attempt does not exist or the update fails.
    async fn update_message_processing_status(
        &self,
        message_id: MessageId,
        attempt_id: AttemptId,
        status: ProcessingStatus,
        error_message: Option<&str>,
    ) -> Result<()>;

    /// All attempts recorded against a message, in attempt order
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    async fn list_attempts(&self, message_id: MessageId) -> Result<Vec<ProcessingAttempt>>;
}

/// Channel lease storage
#[async_trait]
pub trait LockStorage: Send + Sync {
    /// Acquire or renew the channel lock
    ///
    /// A single atomic conditional upsert: succeeds when no row exists, when the
    /// caller already holds it, or when the holder's heartbeat is older than
    /// `break_after_seconds`. Returns whether the caller holds the lock afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error if the statement fails.
    async fn get_channel_lock(
        &self,
        channel_id: ChannelId,
        instance_id: InstanceId,
        break_after_seconds: u64,
    ) -> Result<bool>;

    /// Release the channel lock if held by the caller
    ///
    /// # Errors
    ///
    /// Returns an error if the statement fails.
    async fn release_channel_lock(&self, channel_id: ChannelId, instance_id: InstanceId)
        -> Result<()>;
}

/// Resource identity mapping storage
#[async_trait]
pub trait MappingStorage: Send + Sync {
    /// Return the UUID stored for the key, inserting `candidate` if there is none
    ///
    /// Concurrent first insertions of the same key must all observe the same UUID.
    ///
    /// # Errors
    ///
    /// Returns an error if the statement fails.
    async fn find_or_create_mapping(
        &self,
        namespace: MappingNamespace,
        resource_type: ResourceType,
        canonical_key: &str,
        candidate: Uuid,
    ) -> Result<Uuid>;

    /// Scoped mappings whose key equals `prefix` or extends it by further fields
    ///
    /// Ordered by key, then resource type.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    async fn list_scoped_mappings(&self, prefix: &str) -> Result<Vec<ResourceMapping>>;
}
