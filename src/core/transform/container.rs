//! Resource container
//!
//! Collects the resources built for one message. Builders reference earlier
//! resources by tag only, and the container renders the final message bundle.

use crate::domain::ResourceType;
use serde_json::{json, Value};
use uuid::Uuid;

/// Role a resource plays within the message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceTag {
    ManagingOrganisation,
    PrimaryCareOrganisation,
    SiteLocation,
    EncounterLocation,
    PrimaryCarePractitioner,
    AttendingPractitioner,
    Patient,
    EpisodeOfCare,
    Encounter,
    MergeParameters,
    MessageHeader,
}

/// A built resource; never modified once added
#[derive(Debug, Clone, PartialEq)]
pub struct ContainedResource {
    tag: ResourceTag,
    resource_type: ResourceType,
    uuid: Uuid,
    resource: Value,
}

impl ContainedResource {
    pub fn tag(&self) -> ResourceTag {
        self.tag
    }

    pub fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn resource(&self) -> &Value {
        &self.resource
    }

    /// Literal reference in `Type/uuid` form
    pub fn reference(&self) -> Value {
        json!({ "reference": format!("{}/{}", self.resource_type, self.uuid) })
    }
}

/// Resources built for one message, in insertion order
#[derive(Debug, Default)]
pub struct ResourceContainer {
    entries: Vec<ContainedResource>,
}

impl ResourceContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a resource under a tag
    ///
    /// The resource's `resourceType` and `id` are set from the arguments.
    /// Returns false, leaving the container unchanged, if the tag is taken.
    pub fn add(
        &mut self,
        tag: ResourceTag,
        resource_type: ResourceType,
        uuid: Uuid,
        mut resource: Value,
    ) -> bool {
        if self.has(tag) {
            return false;
        }
        if let Value::Object(fields) = &mut resource {
            fields.insert("resourceType".to_string(), json!(resource_type.as_str()));
            fields.insert("id".to_string(), json!(uuid.to_string()));
        }
        self.entries.push(ContainedResource {
            tag,
            resource_type,
            uuid,
            resource,
        });
        true
    }

    pub fn has(&self, tag: ResourceTag) -> bool {
        self.get(tag).is_some()
    }

    pub fn get(&self, tag: ResourceTag) -> Option<&ContainedResource> {
        self.entries.iter().find(|e| e.tag == tag)
    }

    /// Reference to a tagged resource, if present
    pub fn reference(&self, tag: ResourceTag) -> Option<Value> {
        self.get(tag).map(ContainedResource::reference)
    }

    /// References to every resource except the message header
    pub fn data_references(&self) -> Vec<Value> {
        self.entries
            .iter()
            .filter(|e| e.tag != ResourceTag::MessageHeader)
            .map(ContainedResource::reference)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in bundle order: resource type rank, then insertion order
    pub fn ordered(&self) -> Vec<&ContainedResource> {
        let mut ordered: Vec<&ContainedResource> = self.entries.iter().collect();
        ordered.sort_by_key(|e| e.resource_type.bundle_rank());
        ordered
    }

    /// Render a FHIR message bundle with the given id
    pub fn to_bundle(&self, bundle_id: Uuid) -> Value {
        let entries: Vec<Value> = self
            .ordered()
            .into_iter()
            .map(|e| {
                json!({
                    "fullUrl": format!("urn:uuid:{}", e.uuid),
                    "resource": e.resource,
                })
            })
            .collect();

        json!({
            "resourceType": "Bundle",
            "id": bundle_id.to_string(),
            "type": "message",
            "entry": entries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundle_orders_by_type_then_insertion() {
        let mut container = ResourceContainer::new();
        let patient = Uuid::new_v4();
        let org_a = Uuid::new_v4();
        let org_b = Uuid::new_v4();
        let header = Uuid::new_v4();

        container.add(ResourceTag::Patient, ResourceType::Patient, patient, json!({}));
        container.add(ResourceTag::ManagingOrganisation, ResourceType::Organization, org_a, json!({}));
        container.add(ResourceTag::PrimaryCareOrganisation, ResourceType::Organization, org_b, json!({}));
        container.add(ResourceTag::MessageHeader, ResourceType::MessageHeader, header, json!({}));

        let bundle = container.to_bundle(header);
        let ids: Vec<&str> = bundle["entry"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["resource"]["id"].as_str().unwrap())
            .collect();
        let expected = [header, org_a, org_b, patient].map(|u| u.to_string());
        assert_eq!(ids, expected.iter().map(String::as_str).collect::<Vec<_>>());
        assert_eq!(bundle["type"], "message");
    }

    #[test]
    fn test_tag_can_only_be_added_once() {
        let mut container = ResourceContainer::new();
        let first = Uuid::new_v4();
        assert!(container.add(ResourceTag::Patient, ResourceType::Patient, first, json!({})));
        assert!(!container.add(ResourceTag::Patient, ResourceType::Patient, Uuid::new_v4(), json!({})));
        assert_eq!(container.get(ResourceTag::Patient).unwrap().uuid(), first);
        assert_eq!(
            container.reference(ResourceTag::Patient).unwrap()["reference"],
            format!("Patient/{first}")
        );
    }
}
