//! PostgreSQL adapter implementing the storage traits
//!
//! Every cross-instance guarantee (lock exclusion, single mapping row per key)
//! rests on a single atomic statement, never on in-process state.

use crate::adapters::database::traits::{
    ChannelStatus, ChannelStorage, DatabaseClient, LockStorage, MappingStorage, ProcessingStorage,
};
use crate::adapters::postgresql::client::PostgreSQLClient;
use crate::adapters::postgresql::models::{
    PostgreSQLAttempt, PostgreSQLChannel, PostgreSQLChannelStatus, PostgreSQLMapping,
    PostgreSQLPendingMessage,
};
use crate::domain::processing::normalize_error;
use crate::domain::{
    AttemptId, Channel, ChannelId, InstanceId, MappingNamespace, MessageId, PendingMessage,
    ProcessingAttempt, ProcessingStatus, RelayError, ResourceMapping, ResourceType, Result,
};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use uuid::Uuid;

const NEXT_UNPROCESSED_SQL: &str = r#"
    SELECT m.message_id, m.channel_id, m.message_control_id, m.message_sequence_number,
           m.message_date, m.inbound_message_type, m.inbound_payload, m.outbound_request_uuid,
           a.attempt_count, a.last_status, a.last_completed_date
    FROM message m
    CROSS JOIN LATERAL (
        SELECT count(*) AS attempt_count,
               (array_agg(p.status ORDER BY p.attempt_id DESC))[1] AS last_status,
               (array_agg(p.completed_date ORDER BY p.attempt_id DESC))[1] AS last_completed_date
        FROM message_processing_attempt p
        WHERE p.message_id = m.message_id
    ) a
    WHERE m.channel_id = $1
      AND NOT EXISTS (
          SELECT 1 FROM message_processing_attempt s
          WHERE s.message_id = m.message_id AND s.status = 'success'
      )
    ORDER BY m.message_id
    LIMIT 1
"#;

/// Next per-message attempt number; yields no row when a concurrent instance
/// took the same number first
const START_ATTEMPT_SQL: &str = r#"
    INSERT INTO message_processing_attempt
        (message_id, attempt_id, instance_id, started_date, status)
    SELECT $1::bigint, COALESCE(MAX(attempt_id), 0) + 1, $2::integer, now(), 'pending'
    FROM message_processing_attempt
    WHERE message_id = $1
    ON CONFLICT (message_id, attempt_id) DO NOTHING
    RETURNING attempt_id
"#;

const ATTEMPT_INSERT_TRIES: usize = 5;

const CHANNEL_STATUS_SQL: &str = r#"
    SELECT c.channel_id, c.channel_name, c.is_active,
           (SELECT count(*) FROM message m
            WHERE m.channel_id = c.channel_id
              AND NOT EXISTS (
                  SELECT 1 FROM message_processing_attempt s
                  WHERE s.message_id = m.message_id AND s.status = 'success'
              )) AS backlog,
           h.message_id AS head_message_id,
           h.attempt_count AS head_attempt_count,
           h.last_status AS head_last_status,
           h.last_error AS head_last_error,
           i.instance_name AS lock_holder,
           l.heartbeat_date AS lock_heartbeat
    FROM channel c
    LEFT JOIN LATERAL (
        SELECT m.message_id,
               (SELECT count(*) FROM message_processing_attempt p
                WHERE p.message_id = m.message_id) AS attempt_count,
               (SELECT p.status FROM message_processing_attempt p
                WHERE p.message_id = m.message_id
                ORDER BY p.attempt_id DESC LIMIT 1) AS last_status,
               (SELECT p.error_message FROM message_processing_attempt p
                WHERE p.message_id = m.message_id
                ORDER BY p.attempt_id DESC LIMIT 1) AS last_error
        FROM message m
        WHERE m.channel_id = c.channel_id
          AND NOT EXISTS (
              SELECT 1 FROM message_processing_attempt s
              WHERE s.message_id = m.message_id AND s.status = 'success'
          )
        ORDER BY m.message_id
        LIMIT 1
    ) h ON true
    LEFT JOIN channel_lock l ON l.channel_id = c.channel_id
    LEFT JOIN instance i ON i.instance_id = l.instance_id
    ORDER BY c.channel_id
"#;

/// PostgreSQL implementation of the storage traits
///
/// This wraps the PostgreSQLClient and implements every storage trait.
pub struct PostgreSQLAdapter {
    client: Arc<PostgreSQLClient>,
}

impl PostgreSQLAdapter {
    /// Create a new PostgreSQL adapter
    pub fn new(client: PostgreSQLClient) -> Self {
        Self {
            client: Arc::new(client),
        }
    }
}

#[async_trait]
impl DatabaseClient for PostgreSQLAdapter {
    async fn test_connection(&self) -> Result<()> {
        self.client.test_connection().await
    }

    async fn ensure_schema(&self) -> Result<()> {
        self.client.ensure_schema().await
    }

    fn database_name(&self) -> &str {
        "postgresql"
    }
}

#[async_trait]
impl ChannelStorage for PostgreSQLAdapter {
    async fn register_instance(&self, name: &str) -> Result<InstanceId> {
        let row = self
            .client
            .query_opt(
                r#"
                INSERT INTO instance (instance_name)
                VALUES ($1)
                ON CONFLICT (instance_name) DO UPDATE SET last_started_date = now()
                RETURNING instance_id
                "#,
                &[&name],
            )
            .await?
            .ok_or_else(|| RelayError::Database(format!("Instance '{name}' was not registered")))?;

        Ok(InstanceId::new(row.get("instance_id")))
    }

    async fn load_channels(&self) -> Result<Vec<Channel>> {
        let rows = self
            .client
            .query(
                r#"
                SELECT channel_id, channel_name, port_number, is_active, use_tls,
                       sending_application, sending_facility,
                       receiving_application, receiving_facility,
                       pid_field, pid_assigning_authority, pid2_field, pid2_assigning_authority,
                       downstream_service_identifier, allowed_message_types, notes
                FROM channel
                ORDER BY channel_id
                "#,
                &[],
            )
            .await?;

        rows.iter()
            .map(|row| PostgreSQLChannel::from_row(row).to_domain())
            .collect()
    }

    async fn channel_status(&self) -> Result<Vec<ChannelStatus>> {
        let rows = self.client.query(CHANNEL_STATUS_SQL, &[]).await?;

        rows.iter()
            .map(|row| PostgreSQLChannelStatus::from_row(row).to_domain())
            .collect()
    }
}

#[async_trait]
impl ProcessingStorage for PostgreSQLAdapter {
    async fn get_next_unprocessed_message(
        &self,
        channel_id: ChannelId,
        _instance_id: InstanceId,
    ) -> Result<Option<PendingMessage>> {
        let row = self
            .client
            .query_opt(NEXT_UNPROCESSED_SQL, &[&channel_id.value()])
            .await?;

        row.map(|row| PostgreSQLPendingMessage::from_row(&row).to_domain())
            .transpose()
    }

    async fn start_message_processing(
        &self,
        message_id: MessageId,
        instance_id: InstanceId,
    ) -> Result<AttemptId> {
        let inserted = retry_lost_races(ATTEMPT_INSERT_TRIES, || async {
            self.client
                .query_opt(
                    START_ATTEMPT_SQL,
                    &[&message_id.value(), &instance_id.value()],
                )
                .await
        })
        .await?;

        let row = inserted.ok_or_else(|| {
            RelayError::State(format!(
                "No attempt created for message {message_id} after {ATTEMPT_INSERT_TRIES} tries"
            ))
        })?;
        Ok(AttemptId::new(row.get("attempt_id")))
    }

    async fn complete_message_processing(
        &self,
        message_id: MessageId,
        attempt_id: AttemptId,
    ) -> Result<()> {
        let updated = self
            .client
            .execute(
                r#"
                UPDATE message_processing_attempt
                SET status = 'success', completed_date = now(), error_message = NULL
                WHERE message_id = $1 AND attempt_id = $2
                "#,
                &[&message_id.value(), &attempt_id.value()],
            )
            .await?;

        ensure_updated(updated, message_id, attempt_id)
    }

    async fn update_message_processing_status(
        &self,
        message_id: MessageId,
        attempt_id: AttemptId,
        status: ProcessingStatus,
        error_message: Option<&str>,
    ) -> Result<()> {
        let error_message = normalize_error(error_message);
        let updated = self
            .client
            .execute(
                r#"
                UPDATE message_processing_attempt
                SET status = $3, completed_date = now(), error_message = $4
                WHERE message_id = $1 AND attempt_id = $2
                "#,
                &[
                    &message_id.value(),
                    &attempt_id.value(),
                    &status.as_str(),
                    &error_message,
                ],
            )
            .await?;

        ensure_updated(updated, message_id, attempt_id)
    }

    async fn list_attempts(&self, message_id: MessageId) -> Result<Vec<ProcessingAttempt>> {
        let rows = self
            .client
            .query(
                r#"
                SELECT message_id, attempt_id, instance_id, started_date, completed_date,
                       status, error_message
                FROM message_processing_attempt
                WHERE message_id = $1
                ORDER BY attempt_id
                "#,
                &[&message_id.value()],
            )
            .await?;

        rows.iter()
            .map(|row| PostgreSQLAttempt::from_row(row).to_domain())
            .collect()
    }
}

#[async_trait]
impl LockStorage for PostgreSQLAdapter {
    async fn get_channel_lock(
        &self,
        channel_id: ChannelId,
        instance_id: InstanceId,
        break_after_seconds: u64,
    ) -> Result<bool> {
        let break_after = break_after_seconds as f64;
        let row = self
            .client
            .query_opt(
                r#"
                INSERT INTO channel_lock AS l (channel_id, instance_id, heartbeat_date)
                VALUES ($1, $2, now())
                ON CONFLICT (channel_id) DO UPDATE
                SET instance_id = EXCLUDED.instance_id,
                    heartbeat_date = EXCLUDED.heartbeat_date
                WHERE l.instance_id = EXCLUDED.instance_id
                   OR l.heartbeat_date < now() - make_interval(secs => $3)
                RETURNING l.instance_id
                "#,
                &[&channel_id.value(), &instance_id.value(), &break_after],
            )
            .await?;

        Ok(row.is_some())
    }

    async fn release_channel_lock(
        &self,
        channel_id: ChannelId,
        instance_id: InstanceId,
    ) -> Result<()> {
        self.client
            .execute(
                "DELETE FROM channel_lock WHERE channel_id = $1 AND instance_id = $2",
                &[&channel_id.value(), &instance_id.value()],
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl MappingStorage for PostgreSQLAdapter {
    async fn find_or_create_mapping(
        &self,
        namespace: MappingNamespace,
        resource_type: ResourceType,
        canonical_key: &str,
        candidate: Uuid,
    ) -> Result<Uuid> {
        let select = r#"
            SELECT resource_uuid FROM resource_mapping
            WHERE namespace = $1 AND resource_type = $2 AND canonical_key = $3
        "#;
        let params: [&(dyn tokio_postgres::types::ToSql + Sync); 3] =
            [&namespace.as_str(), &resource_type.as_str(), &canonical_key];

        if let Some(row) = self.client.query_opt(select, &params).await? {
            return Ok(row.get("resource_uuid"));
        }

        let inserted = self
            .client
            .query_opt(
                r#"
                INSERT INTO resource_mapping (namespace, resource_type, canonical_key, resource_uuid)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (namespace, resource_type, canonical_key) DO NOTHING
                RETURNING resource_uuid
                "#,
                &[
                    &namespace.as_str(),
                    &resource_type.as_str(),
                    &canonical_key,
                    &candidate,
                ],
            )
            .await?;
        if let Some(row) = inserted {
            return Ok(row.get("resource_uuid"));
        }

        // Lost the insert race; the winner's row is committed by now
        self.client
            .query_opt(select, &params)
            .await?
            .map(|row| row.get("resource_uuid"))
            .ok_or_else(|| {
                RelayError::Mapping(format!(
                    "Mapping for {resource_type} '{canonical_key}' vanished after conflict"
                ))
            })
    }

    async fn list_scoped_mappings(&self, prefix: &str) -> Result<Vec<ResourceMapping>> {
        let pattern = format!("{}|%", escape_like(prefix));
        let rows = self
            .client
            .query(
                r#"
                SELECT resource_type, canonical_key, resource_uuid
                FROM resource_mapping
                WHERE namespace = 'scoped'
                  AND (canonical_key = $1 OR canonical_key LIKE $2 ESCAPE '\')
                ORDER BY canonical_key COLLATE "C", resource_type COLLATE "C"
                "#,
                &[&prefix, &pattern],
            )
            .await?;

        rows.iter()
            .map(|row| PostgreSQLMapping::from_row(row).to_domain())
            .collect()
    }
}

/// Run `insert` until it yields a row, at most `tries` times
async fn retry_lost_races<T, F, Fut>(tries: usize, mut insert: F) -> Result<Option<T>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    for _ in 0..tries {
        if let Some(row) = insert().await? {
            return Ok(Some(row));
        }
        tracing::debug!("Attempt number taken by another instance, retrying");
    }
    Ok(None)
}

/// Escape `LIKE` wildcards so the prefix matches literally
fn escape_like(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len());
    for c in prefix.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn ensure_updated(updated: u64, message_id: MessageId, attempt_id: AttemptId) -> Result<()> {
    if updated == 0 {
        return Err(RelayError::State(format!(
            "Attempt {attempt_id} of message {message_id} not found"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_lost_attempt_race_is_retried() {
        let calls = AtomicUsize::new(0);
        let attempt = retry_lost_races(ATTEMPT_INSERT_TRIES, || async {
            // The first insert collides with another instance's attempt
            Ok(if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                None
            } else {
                Some(2)
            })
        })
        .await
        .unwrap();

        assert_eq!(attempt, Some(2));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_attempt_race_retries_are_bounded() {
        let calls = AtomicUsize::new(0);
        let attempt: Option<i32> = retry_lost_races(3, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        })
        .await
        .unwrap();

        assert_eq!(attempt, None);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_attempt_race_stops_on_database_error() {
        let calls = AtomicUsize::new(0);
        let result: Result<Option<i32>> = retry_lost_races(3, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(RelayError::Database("connection reset".to_string()))
        })
        .await;

        assert!(matches!(result, Err(RelayError::Database(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_start_attempt_tolerates_concurrent_insert() {
        assert!(START_ATTEMPT_SQL.contains("ON CONFLICT (message_id, attempt_id) DO NOTHING"));
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("PatIdValue=100234"), "PatIdValue=100234");
        assert_eq!(escape_like("a_b%c\\d"), "a\\_b\\%c\\\\d");
    }
}
