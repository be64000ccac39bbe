//! End-to-end processing of one message
//!
//! Runs the pipeline stages in order and classifies the first failure:
//!
//! 1. message type allowed on the channel, parse and transform (`TRANSFORM_FAILURE`,
//!    or `UNEXPECTED_ERROR` when the identity mapper fails)
//! 2. envelope (`ENVELOPE_GENERATION_FAILURE`)
//! 3. credentials and send (`SEND_FAILURE`)

use crate::adapters::delivery::{build_envelope, EnvelopeSender, EnvelopeSource};
use crate::config::DownstreamConfig;
use crate::core::mapping::IdentityMapper;
use crate::core::transform::{transform, TransformProfile};
use crate::domain::{Channel, InboundMessage, ProcessingFailure};
use crate::hl7::Hl7Message;
use std::sync::Arc;

/// Shared, read-only message pipeline
///
/// One processor serves every channel dispatcher of the process.
pub struct MessageProcessor {
    mapper: IdentityMapper,
    sender: Arc<dyn EnvelopeSender>,
    software_name: String,
    software_version: String,
}

impl MessageProcessor {
    /// Create a processor using the source software settings of `downstream`
    pub fn new(
        mapper: IdentityMapper,
        sender: Arc<dyn EnvelopeSender>,
        downstream: &DownstreamConfig,
    ) -> Self {
        Self::with_source(
            mapper,
            sender,
            downstream.software_name.clone(),
            downstream.software_version.clone(),
        )
    }

    /// Create a processor with explicit source software details
    pub fn with_source(
        mapper: IdentityMapper,
        sender: Arc<dyn EnvelopeSender>,
        software_name: impl Into<String>,
        software_version: impl Into<String>,
    ) -> Self {
        Self {
            mapper,
            sender,
            software_name: software_name.into(),
            software_version: software_version.into(),
        }
    }

    /// The identity mapper used by transforms
    pub fn mapper(&self) -> &IdentityMapper {
        &self.mapper
    }

    /// Transform, wrap and deliver one message
    ///
    /// # Errors
    ///
    /// Returns the classified failure of the first stage that fails.
    pub async fn process(
        &self,
        channel: &Channel,
        message: &InboundMessage,
    ) -> Result<(), ProcessingFailure> {
        if !channel.allows_message_type(&message.message_type) {
            return Err(ProcessingFailure::transform(format!(
                "Message type {} is not allowed on channel {}",
                message.message_type, channel.name
            )));
        }

        let parsed = Hl7Message::parse(&message.payload)
            .map_err(|e| ProcessingFailure::transform(e.to_string()))?;
        let profile = TransformProfile::from_channel(channel);
        let bundle = transform(&parsed, &profile, &self.mapper)
            .await
            .map_err(|e| e.into_failure())?;

        let source = EnvelopeSource {
            software_name: self.software_name.clone(),
            software_version: self.software_version.clone(),
            service_identifier: channel.downstream_service_identifier.clone(),
        };
        let envelope = build_envelope(&bundle, message.request_uuid, &source)
            .map_err(|e| ProcessingFailure::envelope(e.to_string()))?;

        let response = self
            .sender
            .send(&envelope)
            .await
            .map_err(|e| ProcessingFailure::send(e.to_string()))?;

        tracing::debug!(
            message_id = %message.id,
            request_uuid = %message.request_uuid,
            resources = bundle.entry_count(),
            response = %response.lines().next().unwrap_or_default(),
            "Message delivered"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::delivery::Envelope;
    use crate::adapters::memory::MemoryStore;
    use crate::domain::{ChannelId, DeliveryError, MessageId, ProcessingStatus};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Mutex;
    use uuid::Uuid;

    const ADT_A01: &str = "MSH|^~\\&|PAS|RQX|EDS|EDS|20240105101500||ADT^A01|MSG0001|P|2.3\r\
EVN|A01|20240105101500\r\
PID|1||100234^^^RQX^MR||SMITH^JOHN||19700101|M\r\
PV1|1|I|WARD1^BAY2^BED3^RQX||||C123^JONES^ANNA||||||||||||V998^^^RQX^VN|||||||||||||||||||||||||20240105101500";

    #[derive(Default)]
    struct RecordingSender {
        sent: Mutex<Vec<Envelope>>,
        reject: bool,
    }

    #[async_trait]
    impl EnvelopeSender for RecordingSender {
        async fn send(&self, envelope: &Envelope) -> std::result::Result<String, DeliveryError> {
            if self.reject {
                return Err(DeliveryError::Rejected {
                    status_line: "HTTP/1.1 500 Internal Server Error".to_string(),
                    body: "boom".to_string(),
                });
            }
            self.sent.lock().unwrap().push(envelope.clone());
            Ok("HTTP/1.1 200 OK\r\n".to_string())
        }
    }

    fn channel() -> Channel {
        Channel::builder()
            .id(1)
            .name("pas")
            .downstream_service_identifier("RQX")
            .allow_message_type("ADT^A01")
            .build()
            .unwrap()
    }

    fn message(payload: &str, message_type: &str) -> InboundMessage {
        InboundMessage {
            id: MessageId::new(1),
            channel_id: ChannelId::new(1),
            control_id: "MSG0001".to_string(),
            sequence_number: 1,
            message_date: Utc::now(),
            message_type: message_type.to_string(),
            payload: payload.to_string(),
            request_uuid: Uuid::new_v4(),
        }
    }

    fn processor(sender: Arc<RecordingSender>) -> MessageProcessor {
        let mapper = IdentityMapper::new(Arc::new(MemoryStore::new()));
        MessageProcessor::with_source(mapper, sender, "hl7-relay", "0.4.0")
    }

    #[tokio::test]
    async fn test_delivers_envelope_with_request_uuid() {
        let sender = Arc::new(RecordingSender::default());
        let message = message(ADT_A01, "ADT^A01");

        processor(sender.clone())
            .process(&channel(), &message)
            .await
            .unwrap();

        let sent = sender.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].request_uuid, message.request_uuid);
    }

    #[tokio::test]
    async fn test_disallowed_type_is_transform_failure() {
        let sender = Arc::new(RecordingSender::default());
        let failure = processor(sender.clone())
            .process(&channel(), &message(ADT_A01, "ADT^A08"))
            .await
            .unwrap_err();

        assert_eq!(failure.status, ProcessingStatus::TransformFailure);
        assert!(failure.cause.contains("ADT^A08"));
        assert!(sender.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unparseable_payload_is_transform_failure() {
        let sender = Arc::new(RecordingSender::default());
        let failure = processor(sender)
            .process(&channel(), &message("not hl7", "ADT^A01"))
            .await
            .unwrap_err();
        assert_eq!(failure.status, ProcessingStatus::TransformFailure);
    }

    #[tokio::test]
    async fn test_rejection_is_send_failure_with_status_line() {
        let sender = Arc::new(RecordingSender {
            reject: true,
            ..Default::default()
        });
        let failure = processor(sender)
            .process(&channel(), &message(ADT_A01, "ADT^A01"))
            .await
            .unwrap_err();

        assert_eq!(failure.status, ProcessingStatus::SendFailure);
        assert_eq!(failure.cause, "HTTP/1.1 500 Internal Server Error\r\nboom");
    }
}
