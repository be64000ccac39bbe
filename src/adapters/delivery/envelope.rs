//! Downstream message envelope
//!
//! The transformed resource bundle is not posted as-is. It is wrapped in a
//! FHIR message bundle whose header identifies the request, the source
//! software and the sending service, and whose second entry is a `Binary`
//! holding the base64 encoded resource bundle.

use crate::core::transform::ResourceBundle;
use crate::domain::{RelayError, Result};
use base64::{engine::general_purpose, Engine as _};
use serde_json::{json, Value};
use uuid::Uuid;

/// Event code of an envelope carrying a resource bundle
pub const ENVELOPE_EVENT_CODE: &str = "Create";

/// System of the sending service identifier
pub const SERVICE_IDENTIFIER_SYSTEM: &str = "urn:hl7relay:service-identifier";

/// Content type of the wrapped bundle
pub const PAYLOAD_CONTENT_TYPE: &str = "application/json+fhir";

/// Who is sending and with what software
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvelopeSource {
    /// Source software name
    pub software_name: String,

    /// Source software version
    pub software_version: String,

    /// Downstream identifier of the sending service
    pub service_identifier: String,
}

/// Envelope ready to send
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Request UUID of the inbound message, repeated on every retry
    pub request_uuid: Uuid,

    /// Serialized envelope body
    pub body: String,
}

/// Wrap a resource bundle for delivery
///
/// # Errors
///
/// Returns [`RelayError::Envelope`] if the service identifier is blank or the
/// bundle cannot be serialized.
pub fn build_envelope(
    bundle: &ResourceBundle,
    request_uuid: Uuid,
    source: &EnvelopeSource,
) -> Result<Envelope> {
    if source.service_identifier.trim().is_empty() {
        return Err(RelayError::Envelope(
            "Downstream service identifier is blank".to_string(),
        ));
    }

    let payload = bundle
        .to_json()
        .map_err(|e| RelayError::Envelope(format!("Failed to serialize bundle: {e}")))?;
    let binary_id = bundle.id;

    let envelope = json!({
        "resourceType": "Bundle",
        "type": "message",
        "entry": [
            {
                "resource": {
                    "resourceType": "MessageHeader",
                    "id": request_uuid.to_string(),
                    "event": { "code": ENVELOPE_EVENT_CODE },
                    "source": {
                        "name": source.software_name,
                        "software": source.software_name,
                        "version": source.software_version,
                    },
                    "sender": {
                        "identifier": {
                            "system": SERVICE_IDENTIFIER_SYSTEM,
                            "value": source.service_identifier,
                        }
                    },
                    "data": [{ "reference": format!("Binary/{binary_id}") }],
                }
            },
            {
                "resource": {
                    "resourceType": "Binary",
                    "id": binary_id.to_string(),
                    "contentType": PAYLOAD_CONTENT_TYPE,
                    "content": general_purpose::STANDARD.encode(payload.as_bytes()),
                }
            }
        ]
    });

    let body = serde_json::to_string(&envelope)
        .map_err(|e| RelayError::Envelope(format!("Failed to serialize envelope: {e}")))?;

    Ok(Envelope { request_uuid, body })
}

/// Decode the resource bundle carried by an envelope body
///
/// # Errors
///
/// Returns [`RelayError::Envelope`] if the body has no decodable `Binary` entry.
pub fn unwrap_envelope(body: &str) -> Result<Value> {
    let envelope: Value = serde_json::from_str(body)?;
    let content = envelope["entry"]
        .as_array()
        .and_then(|entries| {
            entries
                .iter()
                .find(|entry| entry["resource"]["resourceType"] == "Binary")
        })
        .and_then(|entry| entry["resource"]["content"].as_str())
        .ok_or_else(|| RelayError::Envelope("Envelope has no Binary entry".to_string()))?;

    let decoded = general_purpose::STANDARD
        .decode(content)
        .map_err(|e| RelayError::Envelope(format!("Invalid base64 payload: {e}")))?;
    Ok(serde_json::from_slice(&decoded)?)
}
