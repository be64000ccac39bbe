//! Identity mapper
//!
//! Resolves canonical business keys to stable resource UUIDs through the
//! mapping storage. Lookups are lazy: the first request for a key creates its
//! mapping, every later request returns the same UUID.

use super::canonical::{CanonicalKey, KeyError};
use super::keys::PAT_ID_VALUE;
use crate::adapters::database::traits::MappingStorage;
use crate::domain::{MappingNamespace, RelayError, ResourceMapping, ResourceType, Result};
use std::sync::Arc;
use uuid::Uuid;

/// Persistent canonical key to UUID mapper
#[derive(Clone)]
pub struct IdentityMapper {
    /// Mapping storage backend
    storage: Arc<dyn MappingStorage + Send + Sync>,
}

impl IdentityMapper {
    /// Create a mapper over a mapping storage backend
    pub fn new(storage: Arc<dyn MappingStorage + Send + Sync>) -> Self {
        Self { storage }
    }

    /// Look up or create a mapping in the global namespace
    ///
    /// # Errors
    ///
    /// Returns an error if storage fails.
    pub async fn map_global(&self, resource_type: ResourceType, key: &CanonicalKey) -> Result<Uuid> {
        self.map(MappingNamespace::Global, resource_type, key).await
    }

    /// Look up or create a mapping in the scoped namespace
    ///
    /// The key carries its own scope through composition.
    ///
    /// # Errors
    ///
    /// Returns an error if storage fails.
    pub async fn map_scoped(&self, resource_type: ResourceType, key: &CanonicalKey) -> Result<Uuid> {
        self.map(MappingNamespace::Scoped, resource_type, key).await
    }

    /// Map an existing scoped key onto a different patient
    ///
    /// Parses `existing_key`, substitutes its patient identifier value and maps
    /// the result. The existing mapping is left untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if the key cannot be parsed, has no patient identifier
    /// value, or storage fails.
    pub async fn remap(
        &self,
        resource_type: ResourceType,
        existing_key: &str,
        new_scope_value: &str,
    ) -> Result<Uuid> {
        let key = CanonicalKey::parse(existing_key)
            .and_then(|key| key.with_replaced(PAT_ID_VALUE, new_scope_value))
            .map_err(mapping_error)?;

        self.map_scoped(resource_type, &key).await
    }

    /// Every scoped mapping whose key equals `prefix` or extends it
    ///
    /// Ordered by key, then resource type.
    ///
    /// # Errors
    ///
    /// Returns an error if storage fails.
    pub async fn list_mappings_under_scope(
        &self,
        prefix: &CanonicalKey,
    ) -> Result<Vec<ResourceMapping>> {
        self.storage.list_scoped_mappings(&prefix.to_string()).await
    }

    /// Move the resources scoped under a minor patient onto the major patient
    ///
    /// Episodes and encounters are remapped; the minor patient row itself is
    /// skipped. Returns each old mapping with the UUID it now maps to.
    ///
    /// # Errors
    ///
    /// Returns an error if a resource of any other type is scoped under the
    /// patient, or if storage fails.
    pub async fn remap_patient(
        &self,
        minor_patient: &CanonicalKey,
        major_patient_value: &str,
    ) -> Result<Vec<(ResourceMapping, Uuid)>> {
        let mappings = self.list_mappings_under_scope(minor_patient).await?;
        let mut remapped = Vec::with_capacity(mappings.len());

        for mapping in mappings {
            match mapping.resource_type {
                ResourceType::Patient => continue,
                ResourceType::EpisodeOfCare | ResourceType::Encounter => {
                    let uuid = self
                        .remap(
                            mapping.resource_type,
                            &mapping.canonical_key,
                            major_patient_value,
                        )
                        .await?;
                    tracing::debug!(
                        resource_type = %mapping.resource_type,
                        old_uuid = %mapping.resource_uuid,
                        new_uuid = %uuid,
                        "Remapped resource onto major patient"
                    );
                    remapped.push((mapping, uuid));
                }
                other => {
                    return Err(RelayError::Mapping(format!(
                        "Cannot remap {other} scoped under patient '{}'",
                        mapping.canonical_key
                    )));
                }
            }
        }

        Ok(remapped)
    }

    async fn map(
        &self,
        namespace: MappingNamespace,
        resource_type: ResourceType,
        key: &CanonicalKey,
    ) -> Result<Uuid> {
        let candidate = Uuid::new_v4();
        let canonical_key = key.to_string();
        let uuid = self
            .storage
            .find_or_create_mapping(namespace, resource_type, &canonical_key, candidate)
            .await?;

        if uuid == candidate {
            tracing::debug!(
                namespace = %namespace,
                resource_type = %resource_type,
                canonical_key = %canonical_key,
                resource_uuid = %uuid,
                "Created resource mapping"
            );
        }

        Ok(uuid)
    }
}

fn mapping_error(err: KeyError) -> RelayError {
    RelayError::Mapping(err.to_string())
}
