//! Structural validation run before any resource is built

use super::{TransformError, TransformProfile};
use crate::hl7::{Hl7Message, MessageType};

/// Message structure accepted by the transform
pub const SUPPORTED_STRUCTURE: &str = "ADT";

/// Check the message type, sending facility and segment counts
///
/// Returns the message type on success.
///
/// # Errors
///
/// Returns [`TransformError::Invalid`] describing the first problem found.
pub fn validate(
    message: &Hl7Message,
    profile: &TransformProfile,
) -> Result<MessageType, TransformError> {
    let message_type = message
        .message_type()
        .ok_or_else(|| TransformError::Invalid("MSH-9 message type is blank".to_string()))?;

    if !message_type.code.eq_ignore_ascii_case(SUPPORTED_STRUCTURE) {
        return Err(TransformError::Invalid(format!(
            "Message structure {} is not supported",
            message_type.code
        )));
    }

    validate_sending_facility(message, profile)?;
    validate_segment_counts(message, &message_type)?;
    Ok(message_type)
}

fn validate_sending_facility(
    message: &Hl7Message,
    profile: &TransformProfile,
) -> Result<(), TransformError> {
    let Some(expected) = profile.sending_facility.as_deref() else {
        return Ok(());
    };

    let actual = message.header().text(4).unwrap_or_default();
    if actual.eq_ignore_ascii_case(expected.trim()) {
        Ok(())
    } else {
        Err(TransformError::Invalid(format!(
            "Sending facility of {actual} not recognised"
        )))
    }
}

fn validate_segment_counts(
    message: &Hl7Message,
    message_type: &MessageType,
) -> Result<(), TransformError> {
    exactly_one(message, "MSH")?;
    exactly_one(message, "EVN")?;
    exactly_one(message, "PID")?;

    if message_type.is_merge() {
        count_between(message, "PD1", 0, 0)?;
        exactly_one(message, "MRG")?;
    } else {
        count_between(message, "PD1", 0, 1)?;
    }

    count_between(message, "PV1", 0, 1)?;
    count_between(message, "PV2", 0, message.count("PV1"))
}

fn exactly_one(message: &Hl7Message, segment: &str) -> Result<(), TransformError> {
    count_between(message, segment, 1, 1)
}

fn count_between(
    message: &Hl7Message,
    segment: &str,
    min: usize,
    max: usize,
) -> Result<(), TransformError> {
    let count = message.count(segment);
    if count < min {
        return Err(TransformError::Invalid(format!(
            "{segment} segment exists less than {min} time(s)"
        )));
    }
    if count > max {
        return Err(TransformError::Invalid(format!(
            "{segment} segment exists more than {max} time(s)"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    const MSH: &str = "MSH|^~\\&|PAS|RQX|RELAY|RQX|20240102030405||ADT^A01|MSG1|P|2.4";

    fn message(segments: &[&str]) -> Hl7Message {
        let mut text = vec![MSH];
        text.extend_from_slice(segments);
        Hl7Message::parse(&text.join("\r")).unwrap()
    }

    fn error(result: Result<MessageType, TransformError>) -> String {
        match result {
            Err(TransformError::Invalid(cause)) => cause,
            other => panic!("expected invalid message, got {other:?}"),
        }
    }

    #[test]
    fn test_minimal_message_passes() {
        let msg = message(&["EVN|A01", "PID|||123^^^RQX^MRN"]);
        let message_type = validate(&msg, &TransformProfile::default()).unwrap();
        assert_eq!(message_type.to_string(), "ADT^A01");
    }

    #[test_case(&["PID|||1"], "EVN segment exists less than 1 time(s)")]
    #[test_case(&["EVN|A01"], "PID segment exists less than 1 time(s)")]
    #[test_case(&["EVN|A01", "PID|||1", "PID|||2"], "PID segment exists more than 1 time(s)")]
    #[test_case(&["EVN|A01", "PID|||1", "PD1", "PD1"], "PD1 segment exists more than 1 time(s)")]
    #[test_case(&["EVN|A01", "PID|||1", "PV1|1|I", "PV1|2|I"], "PV1 segment exists more than 1 time(s)")]
    #[test_case(&["EVN|A01", "PID|||1", "PV2|1"], "PV2 segment exists more than 0 time(s)")]
    fn test_segment_count_errors(segments: &[&str], expected: &str) {
        assert_eq!(error(validate(&message(segments), &TransformProfile::default())), expected);
    }

    #[test]
    fn test_merge_requires_mrg_and_forbids_pd1() {
        let msh = MSH.replace("ADT^A01", "ADT^A34");
        let without_mrg = Hl7Message::parse(&format!("{msh}\rEVN|A34\rPID|||1")).unwrap();
        assert_eq!(
            error(validate(&without_mrg, &TransformProfile::default())),
            "MRG segment exists less than 1 time(s)"
        );

        let with_pd1 =
            Hl7Message::parse(&format!("{msh}\rEVN|A34\rPID|||1\rPD1\rMRG|2")).unwrap();
        assert_eq!(
            error(validate(&with_pd1, &TransformProfile::default())),
            "PD1 segment exists more than 0 time(s)"
        );
    }

    #[test]
    fn test_non_adt_is_rejected() {
        let msg = Hl7Message::parse(&MSH.replace("ADT^A01", "ORU^R01")).unwrap();
        assert_eq!(
            error(validate(&msg, &TransformProfile::default())),
            "Message structure ORU is not supported"
        );
    }

    #[test]
    fn test_sending_facility_must_match_channel() {
        let msg = message(&["EVN|A01", "PID|||1"]);
        let profile = TransformProfile {
            sending_facility: Some("RQX".to_string()),
            ..TransformProfile::default()
        };
        assert!(validate(&msg, &profile).is_ok());

        let profile = TransformProfile {
            sending_facility: Some("RAL".to_string()),
            ..TransformProfile::default()
        };
        assert_eq!(
            error(validate(&msg, &profile)),
            "Sending facility of RQX not recognised"
        );
    }
}
