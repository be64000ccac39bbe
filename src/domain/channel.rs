//! Channel domain model
//!
//! A channel is one configured inbound message source: a listener port bound to
//! one sending-system profile. Channels are loaded once at startup and never
//! change while a dispatcher is running.

use super::ids::ChannelId;
use serde::{Deserialize, Serialize};

/// Which PID field carries a patient identifier, and which assigning authority to pick
///
/// PID-2 and PID-3 are both used in the wild; PID-3 may repeat, so the assigning
/// authority narrows the repetition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientIdentifierField {
    /// PID field number (usually 2 or 3)
    pub field: usize,

    /// Assigning authority to match; `None` takes the first repetition
    pub assigning_authority: Option<String>,
}

impl PatientIdentifierField {
    /// Creates a selector for a PID field
    pub fn new(field: usize, assigning_authority: Option<String>) -> Self {
        Self {
            field,
            assigning_authority,
        }
    }
}

/// Represents an inbound HL7v2 channel
///
/// # Examples
///
/// ```
/// use hl7_relay::domain::channel::Channel;
///
/// let channel = Channel::builder()
///     .id(1)
///     .name("HOMERTON-ADT")
///     .downstream_service_identifier("RQX")
///     .patient_identifier(3, Some("Homerton Case Note Number".to_string()))
///     .build()
///     .unwrap();
///
/// assert!(channel.is_active);
/// assert!(channel.allows_message_type("ADT^A01"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    /// Channel identifier
    pub id: ChannelId,

    /// Human readable channel name
    pub name: String,

    /// Listener port (informational for the engine)
    pub port_number: Option<i32>,

    /// Inactive channels are not dispatched
    pub is_active: bool,

    /// Whether the listener uses TLS
    pub use_tls: bool,

    /// Expected MSH-3
    pub sending_application: Option<String>,

    /// Expected MSH-4; enforced by the transform when set
    pub sending_facility: Option<String>,

    /// Expected MSH-5
    pub receiving_application: Option<String>,

    /// Expected MSH-6
    pub receiving_facility: Option<String>,

    /// Primary patient identifier location
    pub patient_identifier: Option<PatientIdentifierField>,

    /// Secondary patient identifier location
    pub secondary_patient_identifier: Option<PatientIdentifierField>,

    /// Organisation/service identifier placed in the outbound envelope
    pub downstream_service_identifier: String,

    /// Allowed inbound message types (`ADT^A01` form); empty allows everything
    pub allowed_message_types: Vec<String>,

    /// Free form notes
    pub notes: Option<String>,
}

impl Channel {
    /// Returns a builder for constructing a channel
    pub fn builder() -> ChannelBuilder {
        ChannelBuilder::default()
    }

    /// Whether a message type may be processed on this channel
    pub fn allows_message_type(&self, message_type: &str) -> bool {
        self.allowed_message_types.is_empty()
            || self
                .allowed_message_types
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(message_type))
    }
}

/// Builder for constructing Channel instances
#[derive(Debug, Default)]
pub struct ChannelBuilder {
    id: Option<ChannelId>,
    name: Option<String>,
    port_number: Option<i32>,
    is_active: Option<bool>,
    use_tls: bool,
    sending_application: Option<String>,
    sending_facility: Option<String>,
    receiving_application: Option<String>,
    receiving_facility: Option<String>,
    patient_identifier: Option<PatientIdentifierField>,
    secondary_patient_identifier: Option<PatientIdentifierField>,
    downstream_service_identifier: Option<String>,
    allowed_message_types: Vec<String>,
    notes: Option<String>,
}

impl ChannelBuilder {
    /// Sets the channel id
    pub fn id(mut self, id: impl Into<ChannelId>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Sets the channel name
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the listener port
    pub fn port_number(mut self, port: i32) -> Self {
        self.port_number = Some(port);
        self
    }

    /// Sets the active flag (default: active)
    pub fn active(mut self, active: bool) -> Self {
        self.is_active = Some(active);
        self
    }

    /// Sets the TLS flag
    pub fn use_tls(mut self, use_tls: bool) -> Self {
        self.use_tls = use_tls;
        self
    }

    /// Sets the expected sending application
    pub fn sending_application(mut self, value: impl Into<String>) -> Self {
        self.sending_application = Some(value.into());
        self
    }

    /// Sets the expected sending facility
    pub fn sending_facility(mut self, value: impl Into<String>) -> Self {
        self.sending_facility = Some(value.into());
        self
    }

    /// Sets the expected receiving application
    pub fn receiving_application(mut self, value: impl Into<String>) -> Self {
        self.receiving_application = Some(value.into());
        self
    }

    /// Sets the expected receiving facility
    pub fn receiving_facility(mut self, value: impl Into<String>) -> Self {
        self.receiving_facility = Some(value.into());
        self
    }

    /// Sets the primary patient identifier location
    pub fn patient_identifier(mut self, field: usize, assigning_authority: Option<String>) -> Self {
        self.patient_identifier = Some(PatientIdentifierField::new(field, assigning_authority));
        self
    }

    /// Sets the secondary patient identifier location
    pub fn secondary_patient_identifier(
        mut self,
        field: usize,
        assigning_authority: Option<String>,
    ) -> Self {
        self.secondary_patient_identifier =
            Some(PatientIdentifierField::new(field, assigning_authority));
        self
    }

    /// Sets the downstream service identifier
    pub fn downstream_service_identifier(mut self, value: impl Into<String>) -> Self {
        self.downstream_service_identifier = Some(value.into());
        self
    }

    /// Adds an allowed message type
    pub fn allow_message_type(mut self, message_type: impl Into<String>) -> Self {
        self.allowed_message_types.push(message_type.into());
        self
    }

    /// Sets the notes
    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Builds the channel
    ///
    /// # Errors
    ///
    /// Returns an error if required fields are missing or blank
    pub fn build(self) -> Result<Channel, String> {
        let name = self.name.ok_or("name is required")?;
        if name.trim().is_empty() {
            return Err("name cannot be blank".to_string());
        }

        let downstream_service_identifier = self
            .downstream_service_identifier
            .ok_or("downstream_service_identifier is required")?;

        Ok(Channel {
            id: self.id.ok_or("id is required")?,
            name,
            port_number: self.port_number,
            is_active: self.is_active.unwrap_or(true),
            use_tls: self.use_tls,
            sending_application: self.sending_application,
            sending_facility: self.sending_facility,
            receiving_application: self.receiving_application,
            receiving_facility: self.receiving_facility,
            patient_identifier: self.patient_identifier,
            secondary_patient_identifier: self.secondary_patient_identifier,
            downstream_service_identifier,
            allowed_message_types: self.allowed_message_types,
            notes: self.notes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_requires_id_and_name() {
        assert!(Channel::builder()
            .name("x")
            .downstream_service_identifier("svc")
            .build()
            .is_err());
        assert!(Channel::builder()
            .id(1)
            .downstream_service_identifier("svc")
            .build()
            .is_err());
        assert!(Channel::builder()
            .id(1)
            .name("  ")
            .downstream_service_identifier("svc")
            .build()
            .is_err());
    }

    #[test]
    fn test_message_type_allow_list() {
        let channel = Channel::builder()
            .id(1)
            .name("adt")
            .downstream_service_identifier("svc")
            .allow_message_type("ADT^A01")
            .allow_message_type("ADT^A08")
            .build()
            .unwrap();

        assert!(channel.allows_message_type("ADT^A01"));
        assert!(channel.allows_message_type("adt^a08"));
        assert!(!channel.allows_message_type("ADT^A34"));
    }
}
