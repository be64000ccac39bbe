use super::convert::insert_opt;
use super::{ResourceTag, TransformContext, TransformError};
use crate::core::mapping::keys;
use crate::domain::ResourceType;
use crate::hl7::Pl;
use serde_json::{json, Map, Value};

/// Identifier system for ODS site codes
pub const ODS_SITE_SYSTEM: &str = "http://fhir.nhs.net/Id/ods-site-code";

/// Site and ward level locations from PV1-3
///
/// PL-4 names the site, which is mapped globally. The remaining PL parts name
/// the place within the site, mapped under the site (or the sending facility
/// when the site is absent) and linked to the site through `partOf`.
pub(super) async fn add_locations(context: &mut TransformContext<'_>) -> Result<(), TransformError> {
    let Some(assigned) = context
        .segment("PV1")
        .and_then(|pv1| pv1.value(3))
        .map(|value| Pl::from_value(&value))
    else {
        return Ok(());
    };

    let managing = context.container.reference(ResourceTag::ManagingOrganisation);

    if let Some(site_code) = assigned.facility.as_deref() {
        let uuid = context
            .map_global(ResourceType::Location, &keys::site_location(site_code)?)
            .await?;
        let mut fields = Map::new();
        fields.insert(
            "identifier".to_string(),
            json!([{ "system": ODS_SITE_SYSTEM, "value": site_code }]),
        );
        fields.insert("name".to_string(), json!(site_code));
        fields.insert("mode".to_string(), json!("instance"));
        fields.insert("physicalType".to_string(), physical_type("si", "Site"));
        insert_opt(&mut fields, "managingOrganization", managing.clone());
        context.add(
            ResourceTag::SiteLocation,
            ResourceType::Location,
            uuid,
            Value::Object(fields),
        );
    }

    let hierarchy = assigned.hierarchy();
    let Some(innermost) = hierarchy.last().copied() else {
        return Ok(());
    };
    let parent_code = match assigned.facility.clone().or_else(|| context.sending_facility()) {
        Some(code) => code,
        None => return Ok(()),
    };

    let uuid = context
        .map_scoped(ResourceType::Location, &keys::location(&parent_code, &hierarchy)?)
        .await?;
    let mut fields = Map::new();
    fields.insert("name".to_string(), json!(innermost));
    fields.insert(
        "description".to_string(),
        json!(hierarchy.join(keys::HIERARCHY_SEPARATOR)),
    );
    fields.insert("mode".to_string(), json!("instance"));
    fields.insert("physicalType".to_string(), physical_type_for(&assigned));
    insert_opt(&mut fields, "managingOrganization", managing);
    insert_opt(
        &mut fields,
        "partOf",
        context.container.reference(ResourceTag::SiteLocation),
    );
    context.add(
        ResourceTag::EncounterLocation,
        ResourceType::Location,
        uuid,
        Value::Object(fields),
    );
    Ok(())
}

fn physical_type_for(location: &Pl) -> Value {
    if location.bed.is_some() {
        physical_type("bd", "Bed")
    } else if location.room.is_some() {
        physical_type("ro", "Room")
    } else if location.point_of_care.is_some() {
        physical_type("wa", "Ward")
    } else {
        physical_type("bu", "Building")
    }
}

fn physical_type(code: &str, display: &str) -> Value {
    json!({
        "coding": [{
            "system": "http://hl7.org/fhir/location-physical-type",
            "code": code,
            "display": display,
        }]
    })
}
