//! Typed views over composite HL7v2 data types
//!
//! Only the components the transform reads are exposed. Every accessor returns
//! `None` for an absent component rather than an empty string.

use super::message::FieldValue;

/// CX: extended composite identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cx {
    /// CX-1 identifier value
    pub id: String,
    /// CX-4 assigning authority (namespace id)
    pub assigning_authority: Option<String>,
    /// CX-5 identifier type code
    pub type_code: Option<String>,
}

impl Cx {
    /// Reads a CX value; `None` when CX-1 is empty
    pub fn from_value(value: &FieldValue<'_>) -> Option<Self> {
        Some(Self {
            id: value.component(1)?,
            assigning_authority: value.component(4),
            type_code: value.component(5),
        })
    }
}

/// XPN: extended person name
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Xpn {
    pub family: Option<String>,
    pub given: Option<String>,
    pub middle: Option<String>,
    pub suffix: Option<String>,
    pub prefix: Option<String>,
}

impl Xpn {
    /// Reads an XPN value
    pub fn from_value(value: &FieldValue<'_>) -> Self {
        Self {
            family: value.component(1),
            given: value.component(2),
            middle: value.component(3),
            suffix: value.component(4),
            prefix: value.component(5),
        }
    }

    /// True when no name part is populated
    pub fn is_empty(&self) -> bool {
        self.family.is_none()
            && self.given.is_none()
            && self.middle.is_none()
            && self.suffix.is_none()
            && self.prefix.is_none()
    }
}

/// XCN: extended composite id number and name for persons
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Xcn {
    /// XCN-1 identifier (GMC, GDP or consultant code)
    pub id: Option<String>,
    pub family: Option<String>,
    pub given: Option<String>,
    /// XCN-6 prefix, e.g. `DR`
    pub prefix: Option<String>,
    /// XCN-9 assigning authority
    pub assigning_authority: Option<String>,
}

impl Xcn {
    /// Reads an XCN value; `None` when neither id nor family name is present
    pub fn from_value(value: &FieldValue<'_>) -> Option<Self> {
        let xcn = Self {
            id: value.component(1),
            family: value.component(2),
            given: value.component(3),
            prefix: value.component(6),
            assigning_authority: value.component(9),
        };
        (xcn.id.is_some() || xcn.family.is_some()).then_some(xcn)
    }
}

/// XON: extended composite name and id for organizations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Xon {
    /// XON-1 organization name
    pub name: Option<String>,
    /// XON-3 id number, falling back to XON-10 organization identifier
    pub id: Option<String>,
}

impl Xon {
    /// Reads an XON value
    pub fn from_value(value: &FieldValue<'_>) -> Self {
        Self {
            name: value.component(1),
            id: value.component(3).or_else(|| value.component(10)),
        }
    }
}

/// PL: person location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pl {
    pub point_of_care: Option<String>,
    pub room: Option<String>,
    pub bed: Option<String>,
    /// PL-4 facility (namespace id)
    pub facility: Option<String>,
    /// PL-7 building
    pub building: Option<String>,
}

impl Pl {
    /// Reads a PL value
    pub fn from_value(value: &FieldValue<'_>) -> Self {
        Self {
            point_of_care: value.component(1),
            room: value.component(2),
            bed: value.component(3),
            facility: value.component(4),
            building: value.component(7),
        }
    }

    /// Location names from the outermost to the innermost level
    pub fn hierarchy(&self) -> Vec<&str> {
        [&self.building, &self.point_of_care, &self.room, &self.bed]
            .into_iter()
            .filter_map(|part| part.as_deref())
            .collect()
    }
}
