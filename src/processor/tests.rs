//! Tests for the task processor.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::broadcast;

use crate::error::{Error, LeaseError, QueueError, StoreError, TransformError, ValidationError};
use crate::queue::{LeaseExtender, NotificationPublisher};
use crate::sink::ResultSink;
use crate::store::{DocumentStore, ObjectStore};
use crate::transform::TextTransformer;
use crate::types::{
    DeliveryToken, DocumentId, Event, InboundTask, OutboundNotification, ReceivedMessage,
    TaskOutcome,
};

use super::{Collaborators, ProcessorSettings, TaskProcessor};

// -----------------------------------------------------------------------
// Recording fakes
// -----------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
enum Call {
    Transform(String),
    Extend(Duration),
    Insert { original: String, processed: String },
    PutObject { document_id: String },
    Publish(OutboundNotification),
}

type CallLog = Arc<Mutex<Vec<Call>>>;

fn record(log: &CallLog, call: Call) {
    log.lock().unwrap().push(call);
}

/// Uppercases chunks; fails on the call with index `fail_on` when set
struct UppercaseTransformer {
    log: CallLog,
    fail_on: Option<usize>,
}

#[async_trait::async_trait]
impl TextTransformer for UppercaseTransformer {
    async fn transform(&self, chunk: &str) -> Result<String, TransformError> {
        let call_index = self
            .log
            .lock()
            .unwrap()
            .iter()
            .filter(|c| matches!(c, Call::Transform(_)))
            .count();
        record(&self.log, Call::Transform(chunk.to_string()));
        if self.fail_on == Some(call_index) {
            return Err(TransformError::Http {
                status: 500,
                body: "upstream exploded".to_string(),
            });
        }
        Ok(chunk.to_uppercase())
    }
}

struct RecordingLease {
    log: CallLog,
    fail: bool,
}

#[async_trait::async_trait]
impl LeaseExtender for RecordingLease {
    async fn extend(&self, _token: &DeliveryToken, duration: Duration) -> Result<(), LeaseError> {
        record(&self.log, Call::Extend(duration));
        if self.fail {
            return Err(LeaseError::Rejected("receipt handle expired".to_string()));
        }
        Ok(())
    }
}

struct RecordingDocuments {
    log: CallLog,
    fail: bool,
}

#[async_trait::async_trait]
impl DocumentStore for RecordingDocuments {
    async fn insert(&self, original: &str, processed: &str) -> Result<DocumentId, StoreError> {
        record(
            &self.log,
            Call::Insert {
                original: original.to_string(),
                processed: processed.to_string(),
            },
        );
        if self.fail {
            return Err(StoreError::DocumentWrite("disk full".to_string()));
        }
        Ok(DocumentId::from("doc-1".to_string()))
    }
}

struct RecordingObjects {
    log: CallLog,
    fail: bool,
}

#[async_trait::async_trait]
impl ObjectStore for RecordingObjects {
    async fn put_record(
        &self,
        _original: &str,
        _processed: &str,
        document_id: &DocumentId,
    ) -> Result<String, StoreError> {
        record(
            &self.log,
            Call::PutObject {
                document_id: document_id.to_string(),
            },
        );
        if self.fail {
            return Err(StoreError::ObjectWrite {
                key: "k".to_string(),
                reason: "access denied".to_string(),
            });
        }
        Ok(format!("processed_texts/{document_id}.json"))
    }
}

struct RecordingPublisher {
    log: CallLog,
    fail: bool,
}

#[async_trait::async_trait]
impl NotificationPublisher for RecordingPublisher {
    async fn publish(&self, notification: &OutboundNotification) -> Result<(), QueueError> {
        record(&self.log, Call::Publish(notification.clone()));
        if self.fail {
            return Err(QueueError::Publish("output queue throttled".to_string()));
        }
        Ok(())
    }
}

#[derive(Default)]
struct Harness {
    fail_transform_on: Option<usize>,
    fail_lease: bool,
    fail_documents: bool,
    fail_objects: bool,
    fail_publish: bool,
    settings: Option<ProcessorSettings>,
}

impl Harness {
    fn build(self) -> (TaskProcessor, CallLog) {
        let log: CallLog = Arc::new(Mutex::new(Vec::new()));
        let sink = ResultSink::new(
            Arc::new(RecordingDocuments {
                log: log.clone(),
                fail: self.fail_documents,
            }),
            Arc::new(RecordingObjects {
                log: log.clone(),
                fail: self.fail_objects,
            }),
            Arc::new(RecordingPublisher {
                log: log.clone(),
                fail: self.fail_publish,
            }),
        );
        let collaborators = Collaborators {
            transformer: Arc::new(UppercaseTransformer {
                log: log.clone(),
                fail_on: self.fail_transform_on,
            }),
            lease: Arc::new(RecordingLease {
                log: log.clone(),
                fail: self.fail_lease,
            }),
            sink,
        };
        let settings = self.settings.unwrap_or_else(fast_settings);
        (TaskProcessor::new(settings, collaborators), log)
    }
}

fn fast_settings() -> ProcessorSettings {
    ProcessorSettings {
        max_chunk_len: 500,
        lease_extension: Duration::from_secs(60),
        inter_chunk_delay: Duration::ZERO,
    }
}

fn message(body: &str) -> ReceivedMessage {
    ReceivedMessage {
        message_id: Some("msg-1".to_string()),
        body: body.to_string(),
        token: Some(DeliveryToken::new("receipt-1")),
    }
}

fn task(text: &str) -> InboundTask {
    let body = serde_json::json!({ "text": text }).to_string();
    InboundTask::from_message(&message(&body)).unwrap()
}

fn calls(log: &CallLog) -> Vec<Call> {
    log.lock().unwrap().clone()
}

fn count(log: &CallLog, pred: impl Fn(&Call) -> bool) -> usize {
    calls(log).iter().filter(|c| pred(c)).count()
}

fn sink_calls(log: &CallLog) -> usize {
    count(log, |c| {
        matches!(
            c,
            Call::Insert { .. } | Call::PutObject { .. } | Call::Publish(_)
        )
    })
}

// -----------------------------------------------------------------------
// Happy path
// -----------------------------------------------------------------------

#[tokio::test]
async fn long_text_is_split_transformed_and_joined_in_order() {
    let (processor, log) = Harness::default().build();
    let text = format!("{}{}{}", "a".repeat(500), "b".repeat(500), "c".repeat(200));

    let receipt = processor.process(task(&text)).await.unwrap();

    assert_eq!(receipt.chunk_count, 3);
    assert_eq!(receipt.document_id.as_str(), "doc-1");
    assert_eq!(receipt.object_key, "processed_texts/doc-1.json");

    let expected = format!("{} {} {}", "A".repeat(500), "B".repeat(500), "C".repeat(200));
    let log = calls(&log);
    assert_eq!(
        log[..7],
        [
            Call::Transform("a".repeat(500)),
            Call::Extend(Duration::from_secs(60)),
            Call::Transform("b".repeat(500)),
            Call::Extend(Duration::from_secs(60)),
            Call::Transform("c".repeat(200)),
            Call::Insert {
                original: text.clone(),
                processed: expected.clone(),
            },
            Call::PutObject {
                document_id: "doc-1".to_string(),
            },
        ]
    );
    match &log[7..] {
        [Call::Publish(notification)] => {
            assert_eq!(notification.document_id.as_str(), "doc-1");
            assert_eq!(notification.processed_text, expected);
        }
        other => panic!("expected a single publish last, got {other:?}"),
    }
}

#[tokio::test]
async fn single_chunk_text_never_extends_the_lease() {
    let (processor, log) = Harness::default().build();

    let receipt = processor.process(task("0123456789")).await.unwrap();

    assert_eq!(receipt.chunk_count, 1);
    assert_eq!(count(&log, |c| matches!(c, Call::Extend(_))), 0);
    assert_eq!(count(&log, |c| matches!(c, Call::Transform(_))), 1);
    assert_eq!(sink_calls(&log), 3);
}

#[tokio::test]
async fn text_exactly_at_limit_is_one_chunk() {
    let (processor, log) = Harness::default().build();

    processor.process(task(&"x".repeat(500))).await.unwrap();

    assert_eq!(count(&log, |c| matches!(c, Call::Transform(_))), 1);
    assert_eq!(count(&log, |c| matches!(c, Call::Extend(_))), 0);
}

#[tokio::test]
async fn lease_is_extended_after_every_chunk_but_the_last() {
    let (processor, log) = Harness {
        settings: Some(ProcessorSettings {
            max_chunk_len: 2,
            ..fast_settings()
        }),
        ..Harness::default()
    }
    .build();

    processor.process(task("abcdefghi")).await.unwrap();

    assert_eq!(count(&log, |c| matches!(c, Call::Transform(_))), 5);
    assert_eq!(count(&log, |c| matches!(c, Call::Extend(_))), 4);
    assert!(matches!(
        calls(&log)
            .iter()
            .rev()
            .find(|c| matches!(c, Call::Transform(_) | Call::Extend(_))),
        Some(Call::Transform(last)) if last == "i"
    ));
}

// -----------------------------------------------------------------------
// Skips
// -----------------------------------------------------------------------

#[tokio::test]
async fn empty_text_is_skipped_without_collaborator_calls() {
    let (processor, log) = Harness::default().build();

    let outcome = processor
        .process_message(&message(r#"{"text":""}"#))
        .await
        .unwrap();

    assert_eq!(
        outcome,
        TaskOutcome::Skipped {
            reason: ValidationError::EmptyText
        }
    );
    assert!(calls(&log).is_empty());
}

#[tokio::test]
async fn missing_or_malformed_text_is_skipped() {
    let (processor, log) = Harness::default().build();

    for body in [r#"{"body":"hi"}"#, r#"{"text":42}"#, "not json", r#"["text"]"#] {
        let outcome = processor.process_message(&message(body)).await.unwrap();
        assert!(
            matches!(outcome, TaskOutcome::Skipped { .. }),
            "body {body:?} should be skipped, got {outcome:?}"
        );
    }
    assert!(calls(&log).is_empty());
}

#[tokio::test]
async fn valid_message_completes() {
    let (processor, _log) = Harness::default().build();

    let outcome = processor
        .process_message(&message(r#"{"text":"hello"}"#))
        .await
        .unwrap();

    match outcome {
        TaskOutcome::Completed(receipt) => assert_eq!(receipt.chunk_count, 1),
        other => panic!("expected completion, got {other:?}"),
    }
}

#[tokio::test]
async fn empty_text_emits_skip_event_and_no_failure() {
    let (tx, mut rx) = broadcast::channel(16);
    let (processor, _log) = Harness::default().build();
    let processor = processor.with_events(tx);

    processor
        .process_message(&message(r#"{"text":""}"#))
        .await
        .unwrap();

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    assert_eq!(
        events,
        vec![Event::TaskSkipped {
            message_id: Some("msg-1".to_string()),
            reason: ValidationError::EmptyText.to_string(),
        }]
    );
}

#[test]
fn empty_text_never_becomes_a_task() {
    let err = InboundTask::from_message(&message(r#"{"text":""}"#)).unwrap_err();
    assert_eq!(err, ValidationError::EmptyText);
}

// -----------------------------------------------------------------------
// Failures
// -----------------------------------------------------------------------

#[tokio::test]
async fn chunk_failure_aborts_before_any_commit() {
    let (processor, log) = Harness {
        fail_transform_on: Some(1),
        ..Harness::default()
    }
    .build();
    let text = "z".repeat(1200);

    let err = processor.process(task(&text)).await.unwrap_err();

    match &err {
        Error::ChunkFailed { index, total, .. } => {
            assert_eq!(*index, 1);
            assert_eq!(*total, 3);
        }
        other => panic!("expected ChunkFailed, got {other:?}"),
    }
    assert_eq!(err.to_string().split(':').next(), Some("chunk 2 of 3 failed"));
    assert_eq!(count(&log, |c| matches!(c, Call::Transform(_))), 2);
    assert_eq!(sink_calls(&log), 0);
    // chunk 1 was attempted exactly once
    assert_eq!(calls(&log)[0], Call::Transform("z".repeat(500)));
}

#[tokio::test]
async fn lease_failure_does_not_abort_the_task() {
    let (processor, log) = Harness {
        fail_lease: true,
        ..Harness::default()
    }
    .build();

    let receipt = processor.process(task(&"q".repeat(1200))).await.unwrap();

    assert_eq!(receipt.chunk_count, 3);
    assert_eq!(count(&log, |c| matches!(c, Call::Extend(_))), 2);
    assert_eq!(sink_calls(&log), 3);
}

#[tokio::test]
async fn document_write_failure_stops_the_commit_chain() {
    let (processor, log) = Harness {
        fail_documents: true,
        ..Harness::default()
    }
    .build();

    let err = processor.process(task("hello")).await.unwrap_err();

    assert!(matches!(err, Error::Store(StoreError::DocumentWrite(_))));
    assert_eq!(count(&log, |c| matches!(c, Call::Insert { .. })), 1);
    assert_eq!(count(&log, |c| matches!(c, Call::PutObject { .. })), 0);
    assert_eq!(count(&log, |c| matches!(c, Call::Publish(_))), 0);
}

#[tokio::test]
async fn object_write_failure_leaves_document_and_skips_notification() {
    let (processor, log) = Harness {
        fail_objects: true,
        ..Harness::default()
    }
    .build();

    let err = processor.process(task("hello")).await.unwrap_err();

    assert_eq!(err.error_code(), "object_write_failed");
    assert_eq!(count(&log, |c| matches!(c, Call::Insert { .. })), 1);
    assert_eq!(count(&log, |c| matches!(c, Call::Publish(_))), 0);
}

#[tokio::test]
async fn notification_failure_aborts_after_both_stores() {
    let (tx, mut rx) = broadcast::channel(16);
    let (processor, log) = Harness {
        fail_publish: true,
        ..Harness::default()
    }
    .build();
    let processor = processor.with_events(tx);

    let err = processor.process(task("hello")).await.unwrap_err();

    assert!(matches!(err, Error::Queue(QueueError::Publish(_))));
    assert_eq!(err.error_code(), "queue_publish_failed");
    assert!(err.is_fatal());
    assert_eq!(count(&log, |c| matches!(c, Call::Insert { .. })), 1);
    assert_eq!(count(&log, |c| matches!(c, Call::PutObject { .. })), 1);
    assert_eq!(count(&log, |c| matches!(c, Call::Publish(_))), 1);

    let mut last = None;
    while let Ok(event) = rx.try_recv() {
        last = Some(event);
    }
    match last {
        Some(Event::TaskFailed { code, .. }) => assert_eq!(code, "queue_publish_failed"),
        other => panic!("expected TaskFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn zero_chunk_length_is_rejected() {
    let (processor, log) = Harness {
        settings: Some(ProcessorSettings {
            max_chunk_len: 0,
            ..fast_settings()
        }),
        ..Harness::default()
    }
    .build();

    let err = processor.process(task("hello")).await.unwrap_err();

    assert!(matches!(err, Error::InvalidArgument(_)));
    assert!(calls(&log).is_empty());
}

// -----------------------------------------------------------------------
// Pacing and events
// -----------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn delay_runs_between_chunks_only() {
    let (processor, _log) = Harness {
        settings: Some(ProcessorSettings {
            inter_chunk_delay: Duration::from_secs(1),
            ..fast_settings()
        }),
        ..Harness::default()
    }
    .build();

    let started = tokio::time::Instant::now();
    processor.process(task(&"d".repeat(1200))).await.unwrap();
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_secs(2), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_secs(3), "elapsed {elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn single_chunk_has_no_delay() {
    let (processor, _log) = Harness {
        settings: Some(ProcessorSettings {
            inter_chunk_delay: Duration::from_secs(1),
            ..fast_settings()
        }),
        ..Harness::default()
    }
    .build();

    let started = tokio::time::Instant::now();
    processor.process(task("short")).await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn events_trace_the_task_lifecycle() {
    let (tx, mut rx) = broadcast::channel(64);
    let (processor, _log) = Harness {
        fail_lease: true,
        ..Harness::default()
    }
    .build();
    let processor = processor.with_events(tx);

    processor.process(task(&"e".repeat(600))).await.unwrap();

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    let id = Some("msg-1".to_string());
    assert_eq!(
        events[0],
        Event::TaskStarted {
            message_id: id.clone(),
            total_chunks: 2
        }
    );
    assert!(matches!(events[1], Event::ChunkTransformed { index: 0, .. }));
    assert!(matches!(events[2], Event::LeaseExtensionFailed { .. }));
    assert!(matches!(events[3], Event::ChunkTransformed { index: 1, .. }));
    assert!(matches!(events[4], Event::TaskCompleted { .. }));
    assert_eq!(events.len(), 5);
}

#[tokio::test]
async fn failed_task_emits_error_code() {
    let (tx, mut rx) = broadcast::channel(16);
    let (processor, _log) = Harness {
        fail_transform_on: Some(0),
        ..Harness::default()
    }
    .build();
    let processor = processor.with_events(tx);

    processor.process(task("boom")).await.unwrap_err();

    let mut last = None;
    while let Ok(event) = rx.try_recv() {
        last = Some(event);
    }
    match last {
        Some(Event::TaskFailed { code, .. }) => assert_eq!(code, "chunk_failed"),
        other => panic!("expected TaskFailed, got {other:?}"),
    }
}

#[test]
fn settings_follow_configuration() {
    let mut config = crate::config::Config::default();
    config.processing.max_chunk_len = 42;
    config.queue.visibility_extension = Duration::from_secs(90);
    config.processing.inter_chunk_delay = Duration::from_millis(250);

    let settings = ProcessorSettings::from(&config);

    assert_eq!(
        settings,
        ProcessorSettings {
            max_chunk_len: 42,
            lease_extension: Duration::from_secs(90),
            inter_chunk_delay: Duration::from_millis(250),
        }
    );
}
