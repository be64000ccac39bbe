//! FHIR resource types produced by the transform

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Resource types the transform can emit and the identity mapper can key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceType {
    MessageHeader,
    Organization,
    Location,
    Practitioner,
    Patient,
    EpisodeOfCare,
    Encounter,
    Parameters,
}

impl ResourceType {
    /// FHIR resource type name
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::MessageHeader => "MessageHeader",
            ResourceType::Organization => "Organization",
            ResourceType::Location => "Location",
            ResourceType::Practitioner => "Practitioner",
            ResourceType::Patient => "Patient",
            ResourceType::EpisodeOfCare => "EpisodeOfCare",
            ResourceType::Encounter => "Encounter",
            ResourceType::Parameters => "Parameters",
        }
    }

    /// Position of this type within an output bundle
    ///
    /// A FHIR message bundle must start with its MessageHeader.
    pub fn bundle_rank(&self) -> u8 {
        match self {
            ResourceType::MessageHeader => 0,
            ResourceType::Organization => 1,
            ResourceType::Location => 2,
            ResourceType::Practitioner => 3,
            ResourceType::Patient => 4,
            ResourceType::EpisodeOfCare => 5,
            ResourceType::Encounter => 6,
            ResourceType::Parameters => 7,
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MessageHeader" => Ok(ResourceType::MessageHeader),
            "Organization" => Ok(ResourceType::Organization),
            "Location" => Ok(ResourceType::Location),
            "Practitioner" => Ok(ResourceType::Practitioner),
            "Patient" => Ok(ResourceType::Patient),
            "EpisodeOfCare" => Ok(ResourceType::EpisodeOfCare),
            "Encounter" => Ok(ResourceType::Encounter),
            "Parameters" => Ok(ResourceType::Parameters),
            other => Err(format!("Unknown resource type '{other}'")),
        }
    }
}
