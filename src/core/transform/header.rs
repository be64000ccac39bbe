use super::convert::{self, insert_opt};
use super::{ResourceTag, TransformContext, TransformError};
use crate::core::mapping::keys;
use crate::domain::ResourceType;
use serde_json::{json, Map, Value};
use uuid::Uuid;

/// HL7 table 0003 event types
pub const EVENT_SYSTEM: &str = "http://hl7.org/fhir/v2/0003";

/// Extension carrying MSH-10
pub const CONTROL_ID_EXTENSION: &str = "urn:hl7relay:extension:message-control-id";

/// Header describing the message, referencing every other resource
///
/// Built last so `data` covers the whole bundle. Its id is also the bundle id.
pub(super) async fn add_message_header(
    context: &mut TransformContext<'_>,
) -> Result<Uuid, TransformError> {
    let msh = context.message.header();
    let control_id = context.message.control_id().unwrap_or_default();
    let uuid = context
        .map_scoped(ResourceType::MessageHeader, &keys::message_header(&control_id)?)
        .await?;

    let mut fields = Map::new();
    insert_opt(
        &mut fields,
        "timestamp",
        msh.text(7)
            .map(|value| convert::date_time(&value).map(Value::String))
            .transpose()
            .map_err(TransformError::Invalid)?,
    );
    fields.insert(
        "event".to_string(),
        json!({
            "system": EVENT_SYSTEM,
            "code": context.message_type.trigger,
            "display": context.message_type.to_string(),
        }),
    );
    fields.insert(
        "source".to_string(),
        endpoint(msh.text(3), context.sending_facility()),
    );
    fields.insert(
        "destination".to_string(),
        json!([endpoint(msh.text(5), msh.text(6))]),
    );
    insert_opt(
        &mut fields,
        "responsible",
        context.container.reference(ResourceTag::ManagingOrganisation),
    );
    fields.insert(
        "extension".to_string(),
        json!([{ "url": CONTROL_ID_EXTENSION, "valueString": control_id }]),
    );
    fields.insert(
        "data".to_string(),
        Value::Array(context.container.data_references()),
    );

    context.add(
        ResourceTag::MessageHeader,
        ResourceType::MessageHeader,
        uuid,
        Value::Object(fields),
    );
    Ok(uuid)
}

fn endpoint(application: Option<String>, facility: Option<String>) -> Value {
    let mut fields = Map::new();
    let parts: Vec<&str> = [application.as_deref(), facility.as_deref()]
        .into_iter()
        .flatten()
        .collect();
    fields.insert(
        "endpoint".to_string(),
        json!(format!("urn:hl7v2:{}", parts.join(":"))),
    );
    insert_opt(&mut fields, "name", application.map(Value::String));
    Value::Object(fields)
}
