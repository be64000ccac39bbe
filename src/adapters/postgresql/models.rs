//! PostgreSQL row models
//!
//! Each model mirrors the columns a query selects and converts into the
//! corresponding domain type, rejecting values the domain cannot represent.

use crate::adapters::database::traits::ChannelStatus;
use crate::domain::{
    AttemptId, Channel, ChannelId, InboundMessage, InstanceId, LastAttempt, MessageId,
    PatientIdentifierField, PendingMessage, ProcessingAttempt, ProcessingStatus, RelayError,
    ResourceMapping, ResourceType, Result,
};
use chrono::{DateTime, Utc};
use tokio_postgres::Row;
use uuid::Uuid;

fn parse_status(value: &str) -> Result<ProcessingStatus> {
    value
        .parse()
        .map_err(|e: String| RelayError::Database(format!("Invalid stored status: {e}")))
}

fn pid_field(field: Option<i32>, assigning_authority: Option<String>) -> Result<Option<PatientIdentifierField>> {
    field
        .map(|f| {
            usize::try_from(f)
                .map(|f| PatientIdentifierField::new(f, assigning_authority))
                .map_err(|_| RelayError::Database(format!("Invalid PID field number {f}")))
        })
        .transpose()
}

/// Row of the `channel` table
#[derive(Debug, Clone)]
pub struct PostgreSQLChannel {
    pub channel_id: i32,
    pub channel_name: String,
    pub port_number: Option<i32>,
    pub is_active: bool,
    pub use_tls: bool,
    pub sending_application: Option<String>,
    pub sending_facility: Option<String>,
    pub receiving_application: Option<String>,
    pub receiving_facility: Option<String>,
    pub pid_field: Option<i32>,
    pub pid_assigning_authority: Option<String>,
    pub pid2_field: Option<i32>,
    pub pid2_assigning_authority: Option<String>,
    pub downstream_service_identifier: String,
    pub allowed_message_types: Vec<String>,
    pub notes: Option<String>,
}

impl PostgreSQLChannel {
    /// Read from a row selecting every channel column
    pub fn from_row(row: &Row) -> Self {
        Self {
            channel_id: row.get("channel_id"),
            channel_name: row.get("channel_name"),
            port_number: row.get("port_number"),
            is_active: row.get("is_active"),
            use_tls: row.get("use_tls"),
            sending_application: row.get("sending_application"),
            sending_facility: row.get("sending_facility"),
            receiving_application: row.get("receiving_application"),
            receiving_facility: row.get("receiving_facility"),
            pid_field: row.get("pid_field"),
            pid_assigning_authority: row.get("pid_assigning_authority"),
            pid2_field: row.get("pid2_field"),
            pid2_assigning_authority: row.get("pid2_assigning_authority"),
            downstream_service_identifier: row.get("downstream_service_identifier"),
            allowed_message_types: row.get("allowed_message_types"),
            notes: row.get("notes"),
        }
    }

    /// Convert to the domain channel
    pub fn to_domain(self) -> Result<Channel> {
        Ok(Channel {
            id: ChannelId::new(self.channel_id),
            name: self.channel_name,
            port_number: self.port_number,
            is_active: self.is_active,
            use_tls: self.use_tls,
            sending_application: self.sending_application,
            sending_facility: self.sending_facility,
            receiving_application: self.receiving_application,
            receiving_facility: self.receiving_facility,
            patient_identifier: pid_field(self.pid_field, self.pid_assigning_authority)?,
            secondary_patient_identifier: pid_field(self.pid2_field, self.pid2_assigning_authority)?,
            downstream_service_identifier: self.downstream_service_identifier,
            allowed_message_types: self.allowed_message_types,
            notes: self.notes,
        })
    }
}

/// A `message` row joined with its attempt summary
#[derive(Debug, Clone)]
pub struct PostgreSQLPendingMessage {
    pub message_id: i64,
    pub channel_id: i32,
    pub message_control_id: String,
    pub message_sequence_number: i32,
    pub message_date: DateTime<Utc>,
    pub inbound_message_type: String,
    pub inbound_payload: String,
    pub outbound_request_uuid: Uuid,
    pub attempt_count: i64,
    pub last_status: Option<String>,
    pub last_completed_date: Option<DateTime<Utc>>,
}

impl PostgreSQLPendingMessage {
    /// Read from a row of the next-unprocessed query
    pub fn from_row(row: &Row) -> Self {
        Self {
            message_id: row.get("message_id"),
            channel_id: row.get("channel_id"),
            message_control_id: row.get("message_control_id"),
            message_sequence_number: row.get("message_sequence_number"),
            message_date: row.get("message_date"),
            inbound_message_type: row.get("inbound_message_type"),
            inbound_payload: row.get("inbound_payload"),
            outbound_request_uuid: row.get("outbound_request_uuid"),
            attempt_count: row.get("attempt_count"),
            last_status: row.get("last_status"),
            last_completed_date: row.get("last_completed_date"),
        }
    }

    /// Convert to the domain pending message
    pub fn to_domain(self) -> Result<PendingMessage> {
        let last_attempt = self
            .last_status
            .as_deref()
            .map(parse_status)
            .transpose()?
            .map(|status| LastAttempt {
                status,
                completed_at: self.last_completed_date,
            });

        Ok(PendingMessage {
            message: InboundMessage {
                id: MessageId::new(self.message_id),
                channel_id: ChannelId::new(self.channel_id),
                control_id: self.message_control_id,
                sequence_number: self.message_sequence_number,
                message_date: self.message_date,
                message_type: self.inbound_message_type,
                payload: self.inbound_payload,
                request_uuid: self.outbound_request_uuid,
            },
            attempt_count: u32::try_from(self.attempt_count).unwrap_or(u32::MAX),
            last_attempt,
        })
    }
}

/// Row of the `message_processing_attempt` table
#[derive(Debug, Clone)]
pub struct PostgreSQLAttempt {
    pub message_id: i64,
    pub attempt_id: i32,
    pub instance_id: i32,
    pub started_date: DateTime<Utc>,
    pub completed_date: Option<DateTime<Utc>>,
    pub status: String,
    pub error_message: Option<String>,
}

impl PostgreSQLAttempt {
    /// Read from a row selecting every attempt column
    pub fn from_row(row: &Row) -> Self {
        Self {
            message_id: row.get("message_id"),
            attempt_id: row.get("attempt_id"),
            instance_id: row.get("instance_id"),
            started_date: row.get("started_date"),
            completed_date: row.get("completed_date"),
            status: row.get("status"),
            error_message: row.get("error_message"),
        }
    }

    /// Convert to the domain attempt
    pub fn to_domain(self) -> Result<ProcessingAttempt> {
        Ok(ProcessingAttempt {
            message_id: MessageId::new(self.message_id),
            attempt_id: AttemptId::new(self.attempt_id),
            instance_id: InstanceId::new(self.instance_id),
            started_at: self.started_date,
            completed_at: self.completed_date,
            status: parse_status(&self.status)?,
            error_message: self.error_message,
        })
    }
}

/// Row of the `resource_mapping` table
#[derive(Debug, Clone)]
pub struct PostgreSQLMapping {
    pub resource_type: String,
    pub canonical_key: String,
    pub resource_uuid: Uuid,
}

impl PostgreSQLMapping {
    /// Read from a row selecting type, key and UUID
    pub fn from_row(row: &Row) -> Self {
        Self {
            resource_type: row.get("resource_type"),
            canonical_key: row.get("canonical_key"),
            resource_uuid: row.get("resource_uuid"),
        }
    }

    /// Convert to the domain mapping
    pub fn to_domain(self) -> Result<ResourceMapping> {
        let resource_type: ResourceType = self
            .resource_type
            .parse()
            .map_err(|e: String| RelayError::Database(format!("Invalid stored resource type: {e}")))?;
        Ok(ResourceMapping {
            resource_type,
            canonical_key: self.canonical_key,
            resource_uuid: self.resource_uuid,
        })
    }
}

/// Row of the channel status query
#[derive(Debug, Clone)]
pub struct PostgreSQLChannelStatus {
    pub channel_id: i32,
    pub channel_name: String,
    pub is_active: bool,
    pub backlog: i64,
    pub head_message_id: Option<i64>,
    pub head_attempt_count: Option<i64>,
    pub head_last_status: Option<String>,
    pub head_last_error: Option<String>,
    pub lock_holder: Option<String>,
    pub lock_heartbeat: Option<DateTime<Utc>>,
}

impl PostgreSQLChannelStatus {
    /// Read from a row of the channel status query
    pub fn from_row(row: &Row) -> Self {
        Self {
            channel_id: row.get("channel_id"),
            channel_name: row.get("channel_name"),
            is_active: row.get("is_active"),
            backlog: row.get("backlog"),
            head_message_id: row.get("head_message_id"),
            head_attempt_count: row.get("head_attempt_count"),
            head_last_status: row.get("head_last_status"),
            head_last_error: row.get("head_last_error"),
            lock_holder: row.get("lock_holder"),
            lock_heartbeat: row.get("lock_heartbeat"),
        }
    }

    /// Convert to the domain status summary
    pub fn to_domain(self) -> Result<ChannelStatus> {
        Ok(ChannelStatus {
            channel_id: ChannelId::new(self.channel_id),
            channel_name: self.channel_name,
            is_active: self.is_active,
            backlog: u64::try_from(self.backlog).unwrap_or_default(),
            head_message_id: self.head_message_id.map(MessageId::new),
            head_attempt_count: self
                .head_attempt_count
                .map_or(0, |c| u32::try_from(c).unwrap_or(u32::MAX)),
            head_last_status: self.head_last_status.as_deref().map(parse_status).transpose()?,
            head_last_error: self.head_last_error,
            lock_holder: self.lock_holder,
            lock_heartbeat: self.lock_heartbeat,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_message_without_attempts() {
        let row = PostgreSQLPendingMessage {
            message_id: 10,
            channel_id: 2,
            message_control_id: "MSG1".to_string(),
            message_sequence_number: 1,
            message_date: Utc::now(),
            inbound_message_type: "ADT^A01".to_string(),
            inbound_payload: "MSH|^~\\&|".to_string(),
            outbound_request_uuid: Uuid::new_v4(),
            attempt_count: 0,
            last_status: None,
            last_completed_date: None,
        };
        let pending = row.to_domain().unwrap();
        assert_eq!(pending.attempt_count, 0);
        assert!(pending.last_attempt.is_none());
        assert_eq!(pending.message.id, MessageId::new(10));
    }

    #[test]
    fn test_attempt_with_unknown_status_is_rejected() {
        let row = PostgreSQLAttempt {
            message_id: 1,
            attempt_id: 1,
            instance_id: 1,
            started_date: Utc::now(),
            completed_date: None,
            status: "exploded".to_string(),
            error_message: None,
        };
        assert!(matches!(row.to_domain(), Err(RelayError::Database(_))));
    }

    #[test]
    fn test_channel_with_negative_pid_field_is_rejected() {
        let row = PostgreSQLChannel {
            channel_id: 1,
            channel_name: "pas".to_string(),
            port_number: None,
            is_active: true,
            use_tls: false,
            sending_application: None,
            sending_facility: None,
            receiving_application: None,
            receiving_facility: None,
            pid_field: Some(-3),
            pid_assigning_authority: None,
            pid2_field: None,
            pid2_assigning_authority: None,
            downstream_service_identifier: "RQX".to_string(),
            allowed_message_types: vec![],
            notes: None,
        };
        assert!(row.to_domain().is_err());
    }
}
