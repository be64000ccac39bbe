use super::convert::{self, insert_opt, Hl7Timestamp};
use super::patient::patient_key;
use super::{ResourceTag, TransformContext, TransformError};
use crate::core::mapping::keys;
use crate::domain::ResourceType;
use crate::hl7::Cx;
use serde_json::{json, Map, Value};

/// Discharge event
const DISCHARGE_TRIGGER: &str = "A03";

/// Episode of care keyed by visit number (PV1-19) and encounter keyed by admit time (PV1-44)
///
/// Without a visit number neither is built. Without an admit time only the
/// episode is built.
pub(super) async fn add_episode_and_encounter(
    context: &mut TransformContext<'_>,
) -> Result<(), TransformError> {
    let Some(pv1) = context.segment("PV1") else {
        return Ok(());
    };

    let class = pv1
        .text(2)
        .map(|value| convert::patient_class_coding(&value))
        .transpose()
        .map_err(TransformError::Invalid)?;
    let admitted = pv1
        .text(44)
        .map(|value| Hl7Timestamp::parse(&value))
        .transpose()
        .map_err(TransformError::Invalid)?;
    let discharged = pv1
        .text(45)
        .map(|value| convert::date_time(&value))
        .transpose()
        .map_err(TransformError::Invalid)?;

    let Some(visit) = pv1.value(19).and_then(|value| Cx::from_value(&value)) else {
        return Ok(());
    };

    let patient = patient_key(context)?;
    let episode_key = keys::episode_of_care(
        &patient,
        visit.type_code.as_deref(),
        visit.assigning_authority.as_deref(),
        &visit.id,
    )?;
    let episode_uuid = context
        .map_scoped(ResourceType::EpisodeOfCare, &episode_key)
        .await?;

    let finished = context.message_type.trigger == DISCHARGE_TRIGGER;
    let mut period = Map::new();
    insert_opt(
        &mut period,
        "start",
        admitted.as_ref().map(|a| json!(a.to_fhir_date_time())),
    );
    insert_opt(&mut period, "end", discharged.clone().map(Value::String));

    let mut episode = Map::new();
    episode.insert(
        "identifier".to_string(),
        json!([convert::identifier(&visit)]),
    );
    episode.insert(
        "status".to_string(),
        json!(if finished { "finished" } else { "active" }),
    );
    insert_opt(
        &mut episode,
        "patient",
        context.container.reference(ResourceTag::Patient),
    );
    insert_opt(
        &mut episode,
        "managingOrganization",
        context.container.reference(ResourceTag::ManagingOrganisation),
    );
    insert_opt(
        &mut episode,
        "careManager",
        context.container.reference(ResourceTag::AttendingPractitioner),
    );
    if !period.is_empty() {
        episode.insert("period".to_string(), Value::Object(period.clone()));
    }
    context.add(
        ResourceTag::EpisodeOfCare,
        ResourceType::EpisodeOfCare,
        episode_uuid,
        Value::Object(episode),
    );

    let Some(admitted) = admitted else {
        return Ok(());
    };

    let encounter_key = keys::encounter(&episode_key, admitted.local)?;
    let encounter_uuid = context
        .map_scoped(ResourceType::Encounter, &encounter_key)
        .await?;

    let mut encounter = Map::new();
    encounter.insert(
        "status".to_string(),
        json!(if finished || discharged.is_some() {
            "finished"
        } else {
            "in-progress"
        }),
    );
    insert_opt(&mut encounter, "class", class);
    insert_opt(
        &mut encounter,
        "patient",
        context.container.reference(ResourceTag::Patient),
    );
    encounter.insert(
        "episodeOfCare".to_string(),
        json!([{ "reference": format!("EpisodeOfCare/{episode_uuid}") }]),
    );
    insert_opt(
        &mut encounter,
        "participant",
        context
            .container
            .reference(ResourceTag::AttendingPractitioner)
            .map(|doctor| json!([{ "type": [{ "text": "attending" }], "individual": doctor }])),
    );
    encounter.insert("period".to_string(), Value::Object(period));
    insert_opt(
        &mut encounter,
        "location",
        context
            .container
            .reference(ResourceTag::EncounterLocation)
            .map(|location| json!([{ "location": location }])),
    );
    insert_opt(
        &mut encounter,
        "serviceProvider",
        context.container.reference(ResourceTag::ManagingOrganisation),
    );
    context.add(
        ResourceTag::Encounter,
        ResourceType::Encounter,
        encounter_uuid,
        Value::Object(encounter),
    );
    Ok(())
}
