use super::convert::{self, human_name, identifier, insert_opt};
use super::{ResourceTag, TransformContext, TransformError};
use crate::core::mapping::{keys, CanonicalKey};
use crate::domain::{PatientIdentifierField, ResourceType};
use crate::hl7::{Cx, FieldValue, Segment, Xpn};
use serde_json::{json, Map, Value};

/// Parameters type recorded for patient merges
pub const MERGE_PARAMETERS_TYPE: &str = "PatientMerge";

/// Patient identifier selected by the channel profile
pub(super) fn patient_identifier(context: &TransformContext<'_>) -> Result<Cx, TransformError> {
    let pid = context.required_segment("PID")?;
    let primary = &context.profile.patient_identifier;

    select_identifier(&pid.repetitions(primary.field), primary.assigning_authority.as_deref())
        .or_else(|| {
            context.profile.secondary_patient_identifier.as_ref().and_then(|secondary| {
                select_identifier(
                    &pid.repetitions(secondary.field),
                    secondary.assigning_authority.as_deref(),
                )
            })
        })
        .ok_or_else(|| {
            TransformError::Invalid(format!(
                "Patient identifier not found in PID-{}{}",
                primary.field,
                describe_authority(primary)
            ))
        })
}

/// Canonical key of the message's patient
pub(super) fn patient_key(context: &TransformContext<'_>) -> Result<CanonicalKey, TransformError> {
    let cx = patient_identifier(context)?;
    key_for(&cx)
}

fn key_for(cx: &Cx) -> Result<CanonicalKey, TransformError> {
    Ok(keys::patient(
        cx.type_code.as_deref(),
        cx.assigning_authority.as_deref(),
        &cx.id,
    )?)
}

fn select_identifier(values: &[FieldValue<'_>], assigning_authority: Option<&str>) -> Option<Cx> {
    values
        .iter()
        .filter_map(Cx::from_value)
        .find(|cx| match assigning_authority {
            Some(expected) => cx
                .assigning_authority
                .as_deref()
                .is_some_and(|actual| actual.eq_ignore_ascii_case(expected)),
            None => true,
        })
}

fn describe_authority(field: &PatientIdentifierField) -> String {
    field
        .assigning_authority
        .as_deref()
        .map(|authority| format!(" with assigning authority {authority}"))
        .unwrap_or_default()
}

/// The subject of the message from PID
pub(super) async fn add_patient(context: &mut TransformContext<'_>) -> Result<(), TransformError> {
    let key = patient_key(context)?;
    let uuid = context.map_scoped(ResourceType::Patient, &key).await?;

    let pid = context.required_segment("PID")?;
    let mut fields = Map::new();

    let identifiers = identifiers(pid);
    if !identifiers.is_empty() {
        fields.insert("identifier".to_string(), Value::Array(identifiers));
    }

    let names: Vec<Value> = pid
        .repetitions(5)
        .iter()
        .enumerate()
        .filter_map(|(index, value)| {
            human_name(&Xpn::from_value(value), if index == 0 { "official" } else { "usual" })
        })
        .collect();
    if !names.is_empty() {
        fields.insert("name".to_string(), Value::Array(names));
    }

    if let Some(birth) = pid.text(7) {
        fields.insert(
            "birthDate".to_string(),
            json!(convert::date(&birth).map_err(TransformError::Invalid)?),
        );
    }
    if let Some(sex) = pid.text(8) {
        fields.insert(
            "gender".to_string(),
            json!(convert::sex(&sex).map_err(TransformError::Invalid)?),
        );
    }

    match (pid.text(29), pid.text(30)) {
        (Some(death), _) => {
            fields.insert(
                "deceasedDateTime".to_string(),
                json!(convert::date_time(&death).map_err(TransformError::Invalid)?),
            );
        }
        (None, Some(indicator)) if indicator.eq_ignore_ascii_case("Y") => {
            fields.insert("deceasedBoolean".to_string(), json!(true));
        }
        _ => {}
    }

    let addresses: Vec<Value> = pid.repetitions(11).iter().filter_map(address).collect();
    if !addresses.is_empty() {
        fields.insert("address".to_string(), Value::Array(addresses));
    }

    let telecom: Vec<Value> = [(13, "home"), (14, "work")]
        .into_iter()
        .flat_map(|(field, usage)| {
            pid.repetitions(field)
                .into_iter()
                .filter_map(move |value| {
                    value
                        .component(1)
                        .map(|number| json!({ "system": "phone", "value": number, "use": usage }))
                })
        })
        .collect();
    if !telecom.is_empty() {
        fields.insert("telecom".to_string(), Value::Array(telecom));
    }

    let care_providers: Vec<Value> = [
        ResourceTag::PrimaryCareOrganisation,
        ResourceTag::PrimaryCarePractitioner,
    ]
    .into_iter()
    .filter_map(|tag| context.container.reference(tag))
    .collect();
    if !care_providers.is_empty() {
        fields.insert("careProvider".to_string(), Value::Array(care_providers));
    }
    insert_opt(
        &mut fields,
        "managingOrganization",
        context.container.reference(ResourceTag::ManagingOrganisation),
    );

    context.add(ResourceTag::Patient, ResourceType::Patient, uuid, Value::Object(fields));
    Ok(())
}

/// Identifiers from PID-2 and PID-3, one per identifier system
fn identifiers(pid: &Segment) -> Vec<Value> {
    let mut seen_systems: Vec<Option<Value>> = Vec::new();
    let mut identifiers = Vec::new();

    for cx in [2, 3]
        .into_iter()
        .flat_map(|field| pid.repetitions(field))
        .filter_map(|value| Cx::from_value(&value))
    {
        let converted = identifier(&cx);
        let system = converted.get("system").cloned();
        if seen_systems.contains(&system) {
            tracing::warn!(
                system = ?system,
                "More than one patient identifier with the same system; keeping the first"
            );
            continue;
        }
        seen_systems.push(system);
        identifiers.push(converted);
    }
    identifiers
}

fn address(value: &FieldValue<'_>) -> Option<Value> {
    let lines: Vec<String> = [1, 2].into_iter().filter_map(|i| value.component(i)).collect();
    let mut fields = Map::new();
    if !lines.is_empty() {
        fields.insert("line".to_string(), json!(lines));
    }
    insert_opt(&mut fields, "city", value.component(3).map(Value::String));
    insert_opt(&mut fields, "district", value.component(4).map(Value::String));
    insert_opt(&mut fields, "postalCode", value.component(5).map(Value::String));
    insert_opt(&mut fields, "country", value.component(6).map(Value::String));
    if fields.is_empty() {
        return None;
    }
    fields.insert("use".to_string(), json!("home"));
    Some(Value::Object(fields))
}

/// Parameters describing a patient merge, for A34, A35 and A44 events
///
/// Episodes and encounters mapped under the minor (MRG) patient are remapped
/// onto the major (PID) patient, and each old and new id is listed.
pub(super) async fn add_merge_parameters(
    context: &mut TransformContext<'_>,
) -> Result<(), TransformError> {
    if !context.message_type.is_merge() {
        return Ok(());
    }

    let major = patient_identifier(context)?;
    let mrg = context.required_segment("MRG")?;
    let authority = context.profile.patient_identifier.assigning_authority.as_deref();
    let minor = select_identifier(&mrg.repetitions(1), authority)
        .or_else(|| select_identifier(&mrg.repetitions(1), None))
        .ok_or_else(|| {
            TransformError::Invalid("Prior patient identifier not found in MRG-1".to_string())
        })?;

    let minor_key = key_for(&minor)?;
    let minor_uuid = context.map_scoped(ResourceType::Patient, &minor_key).await?;
    let remapped = context
        .mapper
        .remap_patient(&minor_key, &major.id)
        .await
        .map_err(TransformError::Mapping)?;

    let control_id = context.message.control_id().unwrap_or_default();
    let key = keys::parameters(&control_id, MERGE_PARAMETERS_TYPE)?;
    let uuid = context.map_scoped(ResourceType::Parameters, &key).await?;

    let mut parameters = vec![
        json!({ "name": "MinorPatientIdentifier", "valueString": minor.id }),
        json!({ "name": "MajorPatientIdentifier", "valueString": major.id }),
        json!({
            "name": "MinorPatient",
            "valueReference": { "reference": format!("Patient/{minor_uuid}") }
        }),
    ];
    if let Some(patient) = context.container.reference(ResourceTag::Patient) {
        parameters.push(json!({ "name": "MajorPatient", "valueReference": patient }));
    }
    for (old, new_uuid) in &remapped {
        parameters.push(json!({
            "name": "RemappedResource",
            "part": [
                {
                    "name": "OldResource",
                    "valueReference": {
                        "reference": format!("{}/{}", old.resource_type, old.resource_uuid)
                    }
                },
                {
                    "name": "NewResource",
                    "valueReference": {
                        "reference": format!("{}/{}", old.resource_type, new_uuid)
                    }
                },
            ]
        }));
    }

    tracing::info!(
        minor_patient = %minor_uuid,
        remapped = remapped.len(),
        "Patient merge remapped resources"
    );
    context.add(
        ResourceTag::MergeParameters,
        ResourceType::Parameters,
        uuid,
        json!({ "parameter": parameters }),
    );
    Ok(())
}
