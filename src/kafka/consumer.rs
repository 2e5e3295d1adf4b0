// Segment-reassembling consumer
//
// A Consumer belongs to one consumer group. Topics are registered together
// with their handler (symbolically through the TopicRouter, or by concrete
// name), then `subscribe` drives the read loop until cancelled:
//
//   RecordStream ──► Segment::from_record ──► ReassemblyBuffer ──► handler
//        │                    │                      │                 │
//        │               malformed          overflow / mismatch    handler error
//        │                    └──────────────────────┴─────────────────┘
//        │                                   │
//        ▼                                   ▼
//   fatal error → returned          error channel (bounded, try_send)
//
// With `reader_tasks` > 1 one subscription opens several group members. They
// share the reassembly buffer behind a mutex; the lock is held only for the
// insert, never while a handler runs. Handlers are awaited inside the read
// loop, so a record's offset is marked only after its handler returned, and
// shutdown never interrupts a running handler.
//
// The error channel never blocks the read loop: when it is full the newest
// error is dropped, counted and logged.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::broker::{ConsumedRecord, RecordStream, RecordSubscriber, SubscriptionSpec};
use super::error::{ConsumerError, HandlerError, KafkaError, Result};
use super::reassembly::{InsertOutcome, ReassembledMessage, ReassemblyBuffer};
use super::router::TopicRouter;
use super::segment::Segment;
use crate::config::KafkaConfig;

/// Receives reassembled payloads of one topic
///
/// Decoding is up to the handler; the transport only moves bytes.
/// Implemented for async closures taking the message by value.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: &ReassembledMessage) -> std::result::Result<(), HandlerError>;
}

#[async_trait]
impl<F, Fut> MessageHandler for F
where
    F: Fn(ReassembledMessage) -> Fut + Send + Sync,
    Fut: Future<Output = std::result::Result<(), HandlerError>> + Send + 'static,
{
    async fn handle(&self, message: &ReassembledMessage) -> std::result::Result<(), HandlerError> {
        (self)(message.clone()).await
    }
}

#[derive(Default)]
struct HandlerRegistry {
    /// Subscribed topics in registration order
    topics: Vec<String>,
    handlers: HashMap<String, Arc<dyn MessageHandler>>,
}

/// Snapshot of consumer activity since creation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    /// Records read from the broker
    pub records: u64,
    /// Payloads fully reassembled
    pub completed: u64,
    /// Segments dropped because the buffer was full
    pub overflows: u64,
    /// Entries restarted after a segment count mismatch
    pub mismatches: u64,
    /// Records that were not valid segments
    pub malformed: u64,
    /// Handler invocations that failed
    pub handler_errors: u64,
    /// Errors lost because the error channel was full or closed
    pub dropped_errors: u64,
    /// Payloads currently incomplete
    pub pending: usize,
}

#[derive(Default)]
struct Counters {
    records: AtomicU64,
    completed: AtomicU64,
    overflows: AtomicU64,
    mismatches: AtomicU64,
    malformed: AtomicU64,
    handler_errors: AtomicU64,
    dropped_errors: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

pub struct Consumer {
    config: Arc<KafkaConfig>,
    group_id: String,
    router: TopicRouter,
    subscriber: Arc<dyn RecordSubscriber>,
    registry: RwLock<HandlerRegistry>,
    buffer: Mutex<ReassemblyBuffer>,
    errors_tx: mpsc::Sender<ConsumerError>,
    errors_rx: Mutex<Option<mpsc::Receiver<ConsumerError>>>,
    counters: Counters,
}

impl Consumer {
    /// Create a consumer for `group_id`
    ///
    /// Fails with `InvalidConfig` for an empty group id.
    pub fn new(
        subscriber: Arc<dyn RecordSubscriber>,
        config: Arc<KafkaConfig>,
        group_id: impl Into<String>,
    ) -> Result<Self> {
        let group_id = group_id.into();
        if group_id.is_empty() {
            return Err(KafkaError::InvalidConfig(
                "consumer group id must not be empty".to_string(),
            ));
        }

        let (errors_tx, errors_rx) = mpsc::channel(config.error_channel_capacity.max(1));
        Ok(Self {
            router: TopicRouter::from_config(&config),
            buffer: Mutex::new(ReassemblyBuffer::new(config.max_message_number)),
            config,
            group_id,
            subscriber,
            registry: RwLock::new(HandlerRegistry::default()),
            errors_tx,
            errors_rx: Mutex::new(Some(errors_rx)),
            counters: Counters::default(),
        })
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    pub fn config(&self) -> &KafkaConfig {
        &self.config
    }

    /// Register the handler for a symbolic event group
    ///
    /// Resolves the group to its topic, subscribes to it (once) and installs
    /// or replaces its handler. Returns the concrete topic name. An unknown
    /// group fails with `UnknownEventGroup` and changes nothing.
    pub fn add_topic_and_handler<H>(&self, group_name: &str, handler: H) -> Result<String>
    where
        H: MessageHandler + 'static,
    {
        let topic = self.router.resolve(group_name)?;
        self.add_topic_handler(&topic, Arc::new(handler));
        Ok(topic)
    }

    /// Register a handler for a concrete topic name
    ///
    /// Topics added while `subscribe` runs are picked up by the next
    /// subscription; handler replacements apply immediately.
    pub fn add_topic_handler(&self, topic: &str, handler: Arc<dyn MessageHandler>) {
        let mut registry = self.registry.write();
        if !registry.topics.iter().any(|t| t == topic) {
            registry.topics.push(topic.to_string());
        }
        registry.handlers.insert(topic.to_string(), handler);
        debug!(group = %self.group_id, topic, "Registered handler");
    }

    /// Subscribed topics in registration order
    pub fn topics(&self) -> Vec<String> {
        self.registry.read().topics.clone()
    }

    /// Take the receiving end of the error channel
    ///
    /// Returns `None` after the first call. Until it is taken, reported errors
    /// accumulate up to the channel capacity.
    pub fn take_errors(&self) -> Option<mpsc::Receiver<ConsumerError>> {
        self.errors_rx.lock().take()
    }

    pub fn stats(&self) -> ConsumerStats {
        let c = &self.counters;
        ConsumerStats {
            records: c.records.load(Ordering::Relaxed),
            completed: c.completed.load(Ordering::Relaxed),
            overflows: c.overflows.load(Ordering::Relaxed),
            mismatches: c.mismatches.load(Ordering::Relaxed),
            malformed: c.malformed.load(Ordering::Relaxed),
            handler_errors: c.handler_errors.load(Ordering::Relaxed),
            dropped_errors: c.dropped_errors.load(Ordering::Relaxed),
            pending: self.buffer.lock().len(),
        }
    }

    /// Consume every registered topic until `cancel` fires
    ///
    /// Returns `Ok(())` after cancellation and the first fatal broker error
    /// otherwise. Either way every group member is closed before returning.
    /// Incomplete payloads stay in the buffer.
    pub async fn subscribe(&self, cancel: CancellationToken) -> Result<()> {
        let topics = self.topics();
        if topics.is_empty() {
            return Err(KafkaError::InvalidConfig(
                "no topics registered before subscribe".to_string(),
            ));
        }

        let spec = SubscriptionSpec {
            group_id: self.group_id.clone(),
            topics,
            initial_offset: self.config.initial_offset,
        };

        let mut streams = Vec::with_capacity(self.config.reader_tasks);
        for _ in 0..self.config.reader_tasks {
            match self.subscriber.subscribe(&spec).await {
                Ok(stream) => streams.push(stream),
                Err(err) => {
                    error!(group = %self.group_id, error = %err, "Subscription failed");
                    for mut stream in streams {
                        stream.close().await;
                    }
                    return Err(err);
                }
            }
        }

        info!(
            group = %self.group_id,
            topics = ?spec.topics,
            readers = streams.len(),
            "Consumer started"
        );

        // Cancelled by the caller or by the first reader that fails
        let stop = cancel.child_token();
        let results = join_all(
            streams
                .into_iter()
                .enumerate()
                .map(|(reader, stream)| self.read_loop(reader, stream, stop.clone())),
        )
        .await;

        let result = results.into_iter().find(|r| r.is_err()).unwrap_or(Ok(()));
        info!(group = %self.group_id, ok = result.is_ok(), "Consumer stopped");
        result
    }

    async fn read_loop(
        &self,
        reader: usize,
        mut stream: Box<dyn RecordStream>,
        stop: CancellationToken,
    ) -> Result<()> {
        let result = loop {
            let next = tokio::select! {
                biased;
                _ = stop.cancelled() => break Ok(()),
                next = stream.next_record() => next,
            };

            let record = match next {
                Ok(record) => record,
                Err(err) => {
                    error!(group = %self.group_id, reader, error = %err, "Read loop failed");
                    stop.cancel();
                    break Err(err);
                }
            };

            self.process(&record).await;

            if let Err(err) = stream.mark_processed(&record).await {
                if err.is_fatal() {
                    error!(group = %self.group_id, reader, error = %err, "Offset store failed");
                    stop.cancel();
                    break Err(err);
                }
                warn!(
                    group = %self.group_id,
                    topic = %record.topic,
                    partition = record.partition,
                    offset = record.offset,
                    error = %err,
                    "Could not mark record processed"
                );
            }
        };

        stream.close().await;
        result
    }

    /// Run one record through reassembly and, on completion, its handler
    async fn process(&self, record: &ConsumedRecord) {
        bump(&self.counters.records);

        let segment = match Segment::from_record(record) {
            Ok(segment) => segment,
            Err(reason) => {
                bump(&self.counters.malformed);
                self.report(ConsumerError::MalformedSegment {
                    topic: record.topic.clone(),
                    partition: record.partition,
                    offset: record.offset,
                    reason: reason.to_string(),
                });
                return;
            }
        };

        debug!(
            topic = %segment.topic,
            partition = record.partition,
            offset = record.offset,
            index = segment.index,
            total = segment.total,
            "Received segment"
        );

        let topic = segment.topic.clone();
        let key = segment.key.clone();
        let outcome = self.buffer.lock().insert(segment);

        let completed = match outcome {
            InsertOutcome::Pending { .. } => None,
            InsertOutcome::Complete(message) => Some(message),
            InsertOutcome::Overflow => {
                bump(&self.counters.overflows);
                self.report(ConsumerError::BufferOverflow {
                    topic,
                    key: String::from_utf8_lossy(&key).into_owned(),
                });
                None
            }
            InsertOutcome::Restarted {
                expected,
                declared,
                completed,
            } => {
                bump(&self.counters.mismatches);
                self.report(ConsumerError::ProtocolMismatch {
                    topic,
                    key: String::from_utf8_lossy(&key).into_owned(),
                    expected,
                    declared,
                });
                completed
            }
        };

        if let Some(message) = completed {
            self.dispatch(message).await;
        }
    }

    async fn dispatch(&self, message: ReassembledMessage) {
        bump(&self.counters.completed);

        let handler = self.registry.read().handlers.get(&message.topic).cloned();
        let Some(handler) = handler else {
            warn!(topic = %message.topic, key = %message.key_str(), "No handler for topic, payload dropped");
            return;
        };

        debug!(
            topic = %message.topic,
            key = %message.key_str(),
            bytes = message.payload.len(),
            segments = message.segments,
            "Payload reassembled"
        );

        if let Err(source) = handler.handle(&message).await {
            bump(&self.counters.handler_errors);
            self.report(ConsumerError::Handler {
                topic: message.topic.clone(),
                source,
            });
        }
    }

    /// Publish a non-fatal error without ever waiting for channel capacity
    fn report(&self, err: ConsumerError) {
        warn!(group = %self.group_id, topic = err.topic(), error = %err, "Consumer error");

        match self.errors_tx.try_send(err) {
            Ok(()) => {}
            Err(TrySendError::Full(err)) => {
                bump(&self.counters.dropped_errors);
                warn!(group = %self.group_id, error = %err, "Error channel full, dropping error");
            }
            Err(TrySendError::Closed(err)) => {
                bump(&self.counters.dropped_errors);
                debug!(group = %self.group_id, error = %err, "Error channel closed, dropping error");
            }
        }
    }

    /// Release the consumer
    ///
    /// Consumes the value, so it can only happen once. Streams are already
    /// closed when `subscribe` returns; this closes the error channel.
    pub fn close(self) {
        if let Some(mut errors) = self.errors_rx.lock().take() {
            errors.close();
        }
        info!(
            group = %self.group_id,
            pending = self.buffer.lock().len(),
            "Consumer closed"
        );
    }
}
