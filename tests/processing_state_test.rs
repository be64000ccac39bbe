//! Integration tests for attempt bookkeeping and message selection

use hl7_relay::adapters::memory::MemoryStore;
use hl7_relay::core::state::{ProcessingStateManager, RetryPolicy};
use hl7_relay::domain::{AttemptId, Channel, ChannelId, InstanceId, MessageId, ProcessingStatus};
use std::sync::Arc;
use test_case::test_case;

const ADT_1: &str = "MSH|^~\\&|PAS|RQX|EDS|EDS|20240105101500||ADT^A01|MSG0001|P|2.3\r";
const ADT_2: &str = "MSH|^~\\&|PAS|RQX|EDS|EDS|20240105101600||ADT^A08|MSG0002|P|2.3\r";

const CHANNEL: ChannelId = ChannelId::new(1);
const INSTANCE: InstanceId = InstanceId::new(1);

async fn setup(retry: RetryPolicy) -> (Arc<MemoryStore>, ProcessingStateManager) {
    let store = Arc::new(MemoryStore::new());
    store
        .add_channel(
            Channel::builder()
                .id(1)
                .name("pas")
                .downstream_service_identifier("RQX")
                .build()
                .unwrap(),
        )
        .await;
    let manager = ProcessingStateManager::new(store.clone(), retry);
    (store, manager)
}

async fn head(manager: &ProcessingStateManager) -> Option<MessageId> {
    manager
        .next_unprocessed(CHANNEL, INSTANCE)
        .await
        .unwrap()
        .map(|pending| pending.message.id)
}

#[tokio::test]
async fn test_backlog_is_served_in_arrival_order() {
    let (store, manager) = setup(RetryPolicy::immediate()).await;
    let first = store.enqueue_message(CHANNEL, ADT_1).await;
    let second = store.enqueue_message(CHANNEL, ADT_2).await;

    assert_eq!(head(&manager).await, Some(first));

    let attempt = manager.start_attempt(first, INSTANCE).await.unwrap();
    manager.complete_attempt(first, attempt).await.unwrap();
    assert_eq!(head(&manager).await, Some(second));

    let attempt = manager.start_attempt(second, INSTANCE).await.unwrap();
    manager.complete_attempt(second, attempt).await.unwrap();
    assert_eq!(head(&manager).await, None);
}

#[tokio::test]
async fn test_attempt_ids_are_sequential_per_message() {
    let (store, manager) = setup(RetryPolicy::immediate()).await;
    let first = store.enqueue_message(CHANNEL, ADT_1).await;
    let second = store.enqueue_message(CHANNEL, ADT_2).await;

    let a1 = manager.start_attempt(first, INSTANCE).await.unwrap();
    manager
        .fail_attempt(first, a1, ProcessingStatus::SendFailure, Some("refused"))
        .await
        .unwrap();
    let a2 = manager.start_attempt(first, INSTANCE).await.unwrap();
    let b1 = manager.start_attempt(second, INSTANCE).await.unwrap();

    assert_eq!(a1, AttemptId::new(1));
    assert_eq!(a2, AttemptId::new(2));
    assert_eq!(b1, AttemptId::new(1));
}

#[test_case(ProcessingStatus::TransformFailure; "transform failure")]
#[test_case(ProcessingStatus::EnvelopeGenerationFailure; "envelope failure")]
#[test_case(ProcessingStatus::SendFailure; "send failure")]
#[test_case(ProcessingStatus::UnexpectedError; "unexpected error")]
#[tokio::test]
async fn test_failed_message_stays_at_head(status: ProcessingStatus) {
    let (store, manager) = setup(RetryPolicy::immediate()).await;
    let first = store.enqueue_message(CHANNEL, ADT_1).await;
    store.enqueue_message(CHANNEL, ADT_2).await;

    let attempt = manager.start_attempt(first, INSTANCE).await.unwrap();
    manager
        .fail_attempt(first, attempt, status, Some("cause"))
        .await
        .unwrap();

    let pending = manager
        .next_unprocessed(CHANNEL, INSTANCE)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(pending.message.id, first);
    assert_eq!(pending.attempt_count, 1);
    assert_eq!(pending.last_attempt.unwrap().status, status);
}

#[tokio::test]
async fn test_open_attempt_is_retried_without_delay() {
    let (store, manager) = setup(RetryPolicy::new(&[3600], 5)).await;
    let first = store.enqueue_message(CHANNEL, ADT_1).await;

    // A worker that crashed leaves its attempt open
    manager.start_attempt(first, INSTANCE).await.unwrap();

    let pending = manager
        .next_unprocessed(CHANNEL, INSTANCE)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(pending.message.id, first);
    assert_eq!(
        pending.last_attempt.unwrap().status,
        ProcessingStatus::Pending
    );
}

#[tokio::test]
async fn test_backing_off_head_blocks_later_messages() {
    let (store, manager) = setup(RetryPolicy::new(&[3600], 5)).await;
    let first = store.enqueue_message(CHANNEL, ADT_1).await;
    store.enqueue_message(CHANNEL, ADT_2).await;

    let attempt = manager.start_attempt(first, INSTANCE).await.unwrap();
    manager
        .fail_attempt(first, attempt, ProcessingStatus::SendFailure, Some("503"))
        .await
        .unwrap();

    assert_eq!(head(&manager).await, None);
}

#[tokio::test]
async fn test_success_is_final() {
    let (store, manager) = setup(RetryPolicy::immediate()).await;
    let first = store.enqueue_message(CHANNEL, ADT_1).await;

    let failed = manager.start_attempt(first, INSTANCE).await.unwrap();
    manager
        .fail_attempt(
            first,
            failed,
            ProcessingStatus::SendFailure,
            Some("HTTP/1.1 503 Service Unavailable\r\n"),
        )
        .await
        .unwrap();
    let succeeded = manager.start_attempt(first, INSTANCE).await.unwrap();
    manager.complete_attempt(first, succeeded).await.unwrap();

    assert_eq!(head(&manager).await, None);

    let attempts = manager.attempts(first).await.unwrap();
    assert_eq!(attempts.len(), 2);
    assert_eq!(attempts[0].status, ProcessingStatus::SendFailure);
    assert_eq!(attempts[1].status, ProcessingStatus::Success);
    assert!(attempts[1].error_message.is_none());
    assert!(attempts.iter().all(|a| a.completed_at.is_some()));
}

#[tokio::test]
async fn test_channels_do_not_share_backlog() {
    let (store, manager) = setup(RetryPolicy::immediate()).await;
    store
        .add_channel(
            Channel::builder()
                .id(2)
                .name("ed")
                .downstream_service_identifier("RQX")
                .build()
                .unwrap(),
        )
        .await;
    let other = store.enqueue_message(ChannelId::new(2), ADT_1).await;

    assert_eq!(head(&manager).await, None);
    let pending = manager
        .next_unprocessed(ChannelId::new(2), INSTANCE)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(pending.message.id, other);
}

#[tokio::test]
async fn test_unknown_message_cannot_be_attempted() {
    let (_store, manager) = setup(RetryPolicy::immediate()).await;
    assert!(manager
        .start_attempt(MessageId::new(99), INSTANCE)
        .await
        .is_err());
}
