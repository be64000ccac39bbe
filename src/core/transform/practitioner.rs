use super::convert::{insert_opt, practitioner_name};
use super::{ResourceTag, TransformContext, TransformError};
use crate::core::mapping::keys::{self, PractitionerIdentity};
use crate::domain::ResourceType;
use crate::hl7::{Xcn, Xon};
use serde_json::{json, Map, Value};

/// The patient's registered GP from PD1-4
///
/// Keyed under the practice ODS code when the practice is known.
pub(super) async fn add_primary_care_practitioner(
    context: &mut TransformContext<'_>,
) -> Result<(), TransformError> {
    let Some(doctor) = context
        .segment("PD1")
        .and_then(|pd1| pd1.value(4))
        .and_then(|value| Xcn::from_value(&value))
    else {
        return Ok(());
    };
    let practice_code = context
        .segment("PD1")
        .and_then(|pd1| pd1.value(3))
        .and_then(|value| Xon::from_value(&value).id);

    add_practitioner(
        context,
        ResourceTag::PrimaryCarePractitioner,
        ResourceTag::PrimaryCareOrganisation,
        &doctor,
        practice_code.as_deref(),
    )
    .await
}

/// The attending doctor from PV1-7, keyed under the sending facility
pub(super) async fn add_attending_practitioner(
    context: &mut TransformContext<'_>,
) -> Result<(), TransformError> {
    let Some(doctor) = context
        .segment("PV1")
        .and_then(|pv1| pv1.value(7))
        .and_then(|value| Xcn::from_value(&value))
    else {
        return Ok(());
    };
    let ods_code = context.sending_facility();

    add_practitioner(
        context,
        ResourceTag::AttendingPractitioner,
        ResourceTag::ManagingOrganisation,
        &doctor,
        ods_code.as_deref(),
    )
    .await
}

async fn add_practitioner(
    context: &mut TransformContext<'_>,
    tag: ResourceTag,
    organisation: ResourceTag,
    doctor: &Xcn,
    ods_code: Option<&str>,
) -> Result<(), TransformError> {
    let identity = PractitionerIdentity {
        surname: doctor.family.as_deref().unwrap_or_default(),
        forename: doctor.given.as_deref(),
        id_value: doctor.id.as_deref(),
        id_assigning_authority: doctor.assigning_authority.as_deref(),
        ods_code,
    };
    let uuid = context
        .map_scoped(ResourceType::Practitioner, &keys::practitioner(&identity)?)
        .await?;

    let mut fields = Map::new();
    fields.insert("name".to_string(), practitioner_name(doctor));
    insert_opt(
        &mut fields,
        "identifier",
        doctor.id.as_deref().map(|id| {
            let mut identifier = Map::new();
            identifier.insert("value".to_string(), json!(id));
            insert_opt(
                &mut identifier,
                "assigner",
                doctor
                    .assigning_authority
                    .as_deref()
                    .map(|authority| json!({ "display": authority })),
            );
            json!([Value::Object(identifier)])
        }),
    );
    insert_opt(
        &mut fields,
        "practitionerRole",
        context
            .container
            .reference(organisation)
            .map(|org| json!([{ "managingOrganization": org }])),
    );
    context.add(tag, ResourceType::Practitioner, uuid, Value::Object(fields));
    Ok(())
}
