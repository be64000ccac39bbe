//! Resource identity mapping records

use super::resource::ResourceType;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Namespace a canonical key is resolved in
///
/// Global keys identify something independently of any message context (an
/// organisation by ODS code). Scoped keys carry their scope inside the key itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingNamespace {
    Global,
    Scoped,
}

impl MappingNamespace {
    /// Storage representation
    pub fn as_str(&self) -> &'static str {
        match self {
            MappingNamespace::Global => "global",
            MappingNamespace::Scoped => "scoped",
        }
    }
}

impl fmt::Display for MappingNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MappingNamespace {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "global" => Ok(MappingNamespace::Global),
            "scoped" => Ok(MappingNamespace::Scoped),
            other => Err(format!("Unknown mapping namespace '{other}'")),
        }
    }
}

/// A persisted canonical key to UUID assignment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceMapping {
    pub resource_type: ResourceType,
    pub canonical_key: String,
    pub resource_uuid: Uuid,
}
