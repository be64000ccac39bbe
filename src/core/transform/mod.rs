//! HL7v2 ADT to FHIR transformation
//!
//! Converts one parsed ADT message into a FHIR message bundle. Resource ids come
//! from the [`IdentityMapper`], so the same business entity always receives the
//! same id across messages, and no wall-clock value enters the output: the same
//! message transformed against the same mapper state yields byte-identical JSON.
//!
//! Resources are built in dependency order so later builders can reference
//! earlier ones through the [`ResourceContainer`]:
//!
//! 1. managing organisation (MSH-4)
//! 2. primary care organisation (PD1-3)
//! 3. site and encounter location (PV1-3)
//! 4. primary care practitioner (PD1-4)
//! 5. attending practitioner (PV1-7)
//! 6. patient (PID)
//! 7. episode of care and encounter (PV1)
//! 8. merge parameters (MRG, merge events only)
//! 9. message header
//!
//! # Example
//!
//! ```rust,no_run
//! use hl7_relay::adapters::memory::MemoryStore;
//! use hl7_relay::core::mapping::IdentityMapper;
//! use hl7_relay::core::transform::{transform, TransformProfile};
//! use hl7_relay::hl7::Hl7Message;
//! use std::sync::Arc;
//!
//! # async fn example(payload: &str) -> Result<(), Box<dyn std::error::Error>> {
//! let mapper = IdentityMapper::new(Arc::new(MemoryStore::new()));
//! let message = Hl7Message::parse(payload)?;
//! let bundle = transform(&message, &TransformProfile::default(), &mapper).await?;
//! println!("{}", bundle.to_json()?);
//! # Ok(())
//! # }
//! ```

pub mod container;
pub mod convert;
pub mod validation;

mod encounter;
mod header;
mod location;
mod organization;
mod patient;
mod practitioner;

use crate::core::mapping::{CanonicalKey, IdentityMapper, KeyError};
use crate::domain::{
    Channel, PatientIdentifierField, ProcessingFailure, RelayError, ResourceType,
};
use crate::hl7::{Hl7Error, Hl7Message, MessageType, Segment};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

pub use container::{ContainedResource, ResourceContainer, ResourceTag};

/// PID field carrying the patient identifier list
pub const DEFAULT_PATIENT_IDENTIFIER_FIELD: usize = 3;

/// Why a message could not be transformed
#[derive(Debug, Error)]
pub enum TransformError {
    /// The message content cannot be converted
    #[error("{0}")]
    Invalid(String),

    /// The identity mapper failed
    #[error(transparent)]
    Mapping(RelayError),
}

impl TransformError {
    /// Classify as a processing failure
    ///
    /// Content problems are transform failures; mapper failures are unexpected.
    pub fn into_failure(self) -> ProcessingFailure {
        match self {
            TransformError::Invalid(cause) => ProcessingFailure::transform(cause),
            TransformError::Mapping(e) => ProcessingFailure::unexpected(e.to_string()),
        }
    }
}

impl From<KeyError> for TransformError {
    fn from(err: KeyError) -> Self {
        TransformError::Invalid(err.to_string())
    }
}

impl From<Hl7Error> for TransformError {
    fn from(err: Hl7Error) -> Self {
        TransformError::Invalid(err.to_string())
    }
}

/// Per-channel settings that shape the transform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformProfile {
    /// Expected MSH-4; enforced when set
    pub sending_facility: Option<String>,

    /// Where the primary patient identifier lives
    pub patient_identifier: PatientIdentifierField,

    /// Fallback when the primary identifier is absent
    pub secondary_patient_identifier: Option<PatientIdentifierField>,
}

impl TransformProfile {
    /// Profile for messages received on a channel
    pub fn from_channel(channel: &Channel) -> Self {
        Self {
            sending_facility: channel.sending_facility.clone(),
            patient_identifier: channel
                .patient_identifier
                .clone()
                .unwrap_or_else(default_patient_identifier),
            secondary_patient_identifier: channel.secondary_patient_identifier.clone(),
        }
    }
}

impl Default for TransformProfile {
    fn default() -> Self {
        Self {
            sending_facility: None,
            patient_identifier: default_patient_identifier(),
            secondary_patient_identifier: None,
        }
    }
}

fn default_patient_identifier() -> PatientIdentifierField {
    PatientIdentifierField::new(DEFAULT_PATIENT_IDENTIFIER_FIELD, None)
}

/// Output of a successful transform
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceBundle {
    /// Bundle id, equal to the message header id
    pub id: Uuid,

    /// FHIR message bundle
    pub bundle: Value,
}

impl ResourceBundle {
    /// Serialized bundle
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.bundle)
    }

    /// Number of entries in the bundle
    pub fn entry_count(&self) -> usize {
        self.bundle["entry"].as_array().map_or(0, Vec::len)
    }
}

/// Transform a parsed ADT message into a FHIR message bundle
///
/// # Errors
///
/// Returns [`TransformError::Invalid`] when the message fails validation or a
/// value cannot be converted, and [`TransformError::Mapping`] when the
/// identity mapper fails.
pub async fn transform(
    message: &Hl7Message,
    profile: &TransformProfile,
    mapper: &IdentityMapper,
) -> Result<ResourceBundle, TransformError> {
    let message_type = validation::validate(message, profile)?;

    let mut context = TransformContext {
        message,
        message_type,
        profile,
        mapper,
        container: ResourceContainer::new(),
    };

    organization::add_managing_organisation(&mut context).await?;
    organization::add_primary_care_organisation(&mut context).await?;
    location::add_locations(&mut context).await?;
    practitioner::add_primary_care_practitioner(&mut context).await?;
    practitioner::add_attending_practitioner(&mut context).await?;
    patient::add_patient(&mut context).await?;
    encounter::add_episode_and_encounter(&mut context).await?;
    patient::add_merge_parameters(&mut context).await?;
    let header_id = header::add_message_header(&mut context).await?;

    let bundle = context.container.to_bundle(header_id);
    tracing::debug!(
        message_type = %context.message_type,
        resources = context.container.len(),
        "Message transformed"
    );

    Ok(ResourceBundle {
        id: header_id,
        bundle,
    })
}

/// State shared by the resource builders of one transform
pub(crate) struct TransformContext<'a> {
    message: &'a Hl7Message,
    message_type: MessageType,
    profile: &'a TransformProfile,
    mapper: &'a IdentityMapper,
    container: ResourceContainer,
}

impl<'a> TransformContext<'a> {
    fn segment(&self, id: &str) -> Option<&'a Segment> {
        self.message.segment(id)
    }

    /// Segment that validation guarantees to be present
    fn required_segment(&self, id: &str) -> Result<&'a Segment, TransformError> {
        self.segment(id)
            .ok_or_else(|| TransformError::Invalid(format!("{id} segment not found")))
    }

    /// MSH-4 sending facility
    fn sending_facility(&self) -> Option<String> {
        self.message.header().text(4)
    }

    async fn map_global(
        &self,
        resource_type: ResourceType,
        key: &CanonicalKey,
    ) -> Result<Uuid, TransformError> {
        self.mapper
            .map_global(resource_type, key)
            .await
            .map_err(TransformError::Mapping)
    }

    async fn map_scoped(
        &self,
        resource_type: ResourceType,
        key: &CanonicalKey,
    ) -> Result<Uuid, TransformError> {
        self.mapper
            .map_scoped(resource_type, key)
            .await
            .map_err(TransformError::Mapping)
    }

    fn add(&mut self, tag: ResourceTag, resource_type: ResourceType, uuid: Uuid, resource: Value) {
        if !self.container.add(tag, resource_type, uuid, resource) {
            tracing::warn!(tag = ?tag, "Resource tag already populated; keeping the first");
        }
    }
}
