use super::convert::insert_opt;
use super::{ResourceTag, TransformContext, TransformError};
use crate::core::mapping::keys;
use crate::domain::ResourceType;
use crate::hl7::Xon;
use serde_json::{json, Map, Value};

/// Identifier system for ODS organisation codes
pub const ODS_ORGANISATION_SYSTEM: &str = "http://fhir.nhs.net/Id/ods-organization-code";

/// The organisation that sent the message, identified by MSH-4
pub(super) async fn add_managing_organisation(
    context: &mut TransformContext<'_>,
) -> Result<(), TransformError> {
    let ods_code = context
        .sending_facility()
        .ok_or_else(|| TransformError::Invalid("Sending facility is blank".to_string()))?;
    let name = context.message.header().value(4).and_then(|hd| hd.component(2));

    let uuid = context
        .map_global(ResourceType::Organization, &keys::organization(&ods_code)?)
        .await?;
    context.add(
        ResourceTag::ManagingOrganisation,
        ResourceType::Organization,
        uuid,
        organisation(Some(&ods_code), name.as_deref()),
    );
    Ok(())
}

/// The patient's registered GP practice from PD1-3
pub(super) async fn add_primary_care_organisation(
    context: &mut TransformContext<'_>,
) -> Result<(), TransformError> {
    let Some(pd1) = context.segment("PD1") else {
        return Ok(());
    };

    let facilities = pd1.repetitions(3);
    if facilities.len() > 1 {
        return Err(TransformError::Invalid(
            "More than one patient primary care facility".to_string(),
        ));
    }
    let Some(facility) = facilities.first().map(Xon::from_value) else {
        return Ok(());
    };

    let ods_code = match (&facility.id, &facility.name) {
        (Some(id), _) => id.clone(),
        (None, Some(name)) => {
            return Err(TransformError::Invalid(format!(
                "Primary care facility {name} has no ODS code"
            )))
        }
        (None, None) => return Ok(()),
    };

    let uuid = context
        .map_global(ResourceType::Organization, &keys::organization(&ods_code)?)
        .await?;
    let mut resource = organisation(Some(&ods_code), facility.name.as_deref());
    if let Value::Object(fields) = &mut resource {
        fields.insert(
            "type".to_string(),
            json!({ "coding": [{ "code": "PR", "display": "General Practice" }] }),
        );
    }
    context.add(
        ResourceTag::PrimaryCareOrganisation,
        ResourceType::Organization,
        uuid,
        resource,
    );
    Ok(())
}

fn organisation(ods_code: Option<&str>, name: Option<&str>) -> Value {
    let mut fields = Map::new();
    insert_opt(
        &mut fields,
        "identifier",
        ods_code.map(|code| json!([{ "system": ODS_ORGANISATION_SYSTEM, "value": code }])),
    );
    insert_opt(&mut fields, "name", name.map(|n| json!(n)));
    Value::Object(fields)
}
