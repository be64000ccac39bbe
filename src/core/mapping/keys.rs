//! Canonical key catalogue
//!
//! One constructor per identifiable resource. Namespaces are fixed per
//! constructor and documented on each function.

use super::canonical::{CanonicalKey, KeyError};
use chrono::NaiveDateTime;

pub const ODS_CODE: &str = "OdsCode";
pub const NAME: &str = "Name";
pub const ODS_SITE_CODE: &str = "OdsSiteCode";
pub const PARENT_ODS_CODE: &str = "ParentOdsCode";
pub const LOC_NAME_HIERARCHY: &str = "LocNameHierarchy";
pub const SURNAME: &str = "Surname";
pub const FORENAME: &str = "Forename";
pub const PRAC_ID_VALUE: &str = "PracIdValue";
pub const PRAC_ID_ASS_AUTH: &str = "PracIdAssAuth";
pub const PAT_ID_TYPE_CODE: &str = "PatIdTypeCode";
pub const PAT_ID_ASS_AUTH: &str = "PIdAssAuth";
pub const PAT_ID_VALUE: &str = "PatIdValue";
pub const EP_ID_TYPE_CODE: &str = "EpIdTypeCode";
pub const EP_ID_ASS_AUTH: &str = "EpIdAssAuth";
pub const EP_ID_VALUE: &str = "EpIdValue";
pub const ENCOUNTER_DATE_TIME: &str = "EncounterDateTime";
pub const MESSAGE_CONTROL_ID: &str = "MessageControlId";
pub const PARAMETERS_TYPE: &str = "ParametersType";

/// Separator between location names in a location hierarchy value
pub const HIERARCHY_SEPARATOR: &str = "/";

/// Organisation identified by ODS code (global)
pub fn organization(ods_code: &str) -> Result<CanonicalKey, KeyError> {
    CanonicalKey::builder().required(ODS_CODE, ods_code).build()
}

/// Organisation known only by name, optionally under an ODS code (scoped)
pub fn named_organization(ods_code: Option<&str>, name: &str) -> Result<CanonicalKey, KeyError> {
    CanonicalKey::builder()
        .optional(ODS_CODE, ods_code)
        .required(NAME, name)
        .build()
}

/// Site level location (global)
pub fn site_location(ods_site_code: &str) -> Result<CanonicalKey, KeyError> {
    CanonicalKey::builder()
        .required(ODS_SITE_CODE, ods_site_code)
        .build()
}

/// Location within a site, named from the outermost level inwards (scoped)
pub fn location(parent_ods_code: &str, hierarchy: &[&str]) -> Result<CanonicalKey, KeyError> {
    CanonicalKey::builder()
        .required(PARENT_ODS_CODE, parent_ods_code)
        .required(LOC_NAME_HIERARCHY, hierarchy.join(HIERARCHY_SEPARATOR))
        .build()
}

/// Practitioner identity fields
#[derive(Debug, Clone, Copy, Default)]
pub struct PractitionerIdentity<'a> {
    pub surname: &'a str,
    pub forename: Option<&'a str>,
    pub id_value: Option<&'a str>,
    pub id_assigning_authority: Option<&'a str>,
    pub ods_code: Option<&'a str>,
}

/// Practitioner (scoped)
pub fn practitioner(identity: &PractitionerIdentity<'_>) -> Result<CanonicalKey, KeyError> {
    CanonicalKey::builder()
        .required(SURNAME, identity.surname)
        .optional(FORENAME, identity.forename)
        .optional(PRAC_ID_VALUE, identity.id_value)
        .optional(PRAC_ID_ASS_AUTH, identity.id_assigning_authority)
        .optional(ODS_CODE, identity.ods_code)
        .build()
}

/// Patient (scoped)
///
/// The identifier must be qualified by a type code or an assigning authority.
pub fn patient(
    type_code: Option<&str>,
    assigning_authority: Option<&str>,
    value: &str,
) -> Result<CanonicalKey, KeyError> {
    let qualified = [type_code, assigning_authority]
        .iter()
        .any(|v| v.is_some_and(|v| !v.trim().is_empty()));
    if !qualified {
        return Err(KeyError::Invalid(
            "Patient identifier needs a type code or an assigning authority".to_string(),
        ));
    }
    CanonicalKey::builder()
        .optional(PAT_ID_TYPE_CODE, type_code)
        .optional(PAT_ID_ASS_AUTH, assigning_authority)
        .required(PAT_ID_VALUE, value)
        .build()
}

/// Episode of care, scoped under its patient
pub fn episode_of_care(
    patient: &CanonicalKey,
    type_code: Option<&str>,
    assigning_authority: Option<&str>,
    value: &str,
) -> Result<CanonicalKey, KeyError> {
    patient
        .extend()
        .optional(EP_ID_TYPE_CODE, type_code)
        .optional(EP_ID_ASS_AUTH, assigning_authority)
        .required(EP_ID_VALUE, value)
        .build()
}

/// Encounter, scoped under its episode of care
pub fn encounter(episode: &CanonicalKey, admitted: NaiveDateTime) -> Result<CanonicalKey, KeyError> {
    episode
        .extend()
        .required(
            ENCOUNTER_DATE_TIME,
            admitted.format("%Y-%m-%dT%H:%M:%S").to_string(),
        )
        .build()
}

/// Message header (scoped)
pub fn message_header(control_id: &str) -> Result<CanonicalKey, KeyError> {
    CanonicalKey::builder()
        .required(MESSAGE_CONTROL_ID, control_id)
        .build()
}

/// Parameters resource attached to a message (scoped)
pub fn parameters(control_id: &str, parameters_type: &str) -> Result<CanonicalKey, KeyError> {
    CanonicalKey::builder()
        .required(MESSAGE_CONTROL_ID, control_id)
        .required(PARAMETERS_TYPE, parameters_type)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_patient_requires_qualifier() {
        assert!(matches!(patient(None, None, "123"), Err(KeyError::Invalid(_))));
        assert_eq!(
            patient(Some("NHS"), None, "9434765919").unwrap().to_string(),
            "PatIdTypeCode=NHS|PatIdValue=9434765919"
        );
    }

    #[test]
    fn test_scopes_compose() {
        let patient = patient(None, Some("RQX"), "111").unwrap();
        let episode = episode_of_care(&patient, Some("VISITID"), None, "V1").unwrap();
        let admitted = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap();
        let encounter = encounter(&episode, admitted).unwrap();
        assert_eq!(
            encounter.to_string(),
            "PIdAssAuth=RQX|PatIdValue=111|EpIdTypeCode=VISITID|EpIdValue=V1|EncounterDateTime=2024-01-01T09:30:00"
        );
        assert!(patient.is_prefix_of(&encounter));
    }

    #[test]
    fn test_location_hierarchy_value() {
        let key = location("RQX", &["MAIN", "WARD1", "BED3"]).unwrap();
        assert_eq!(key.to_string(), "ParentOdsCode=RQX|LocNameHierarchy=MAIN/WARD1/BED3");
        assert!(location("RQX", &[]).is_err());
    }

    #[test]
    fn test_practitioner_without_surname_fails() {
        let err = practitioner(&PractitionerIdentity {
            surname: "",
            id_value: Some("G1234567"),
            ..Default::default()
        })
        .unwrap_err();
        assert_eq!(err, KeyError::MissingField(SURNAME.to_string()));
    }
}
