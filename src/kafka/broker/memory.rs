//! In-process broker
//!
//! Models the parts of Kafka the transport depends on:
//!
//! - topics split into append-only partitions
//! - key-hash placement (murmur2), random placement for absent keys
//! - consumer groups with committed offsets per topic-partition
//! - partition ownership: inside one group a partition is read by one member
//!   at a time, so each message reaches exactly one member of each group
//! - `Oldest`/`Newest` start positions for partitions without commits
//!
//! Topics are auto-created on first produce, like a broker running with
//! `auto.create.topics.enable=true`. Streams are woken through a
//! `tokio::sync::watch` version counter bumped on every change.
//!
//! Fault hooks (`fail_next_sends`, `disconnect`) let tests exercise partial
//! publishes and fatal session loss.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, info};

use super::{
    BrokerAdmin, ConsumedRecord, DeliveredRecord, OutgoingRecord, RecordSender, RecordStream,
    RecordSubscriber, SubscriptionSpec, TopicMetadata, TopicSpec,
};
use crate::config::InitialOffset;
use crate::kafka::constants::{DEFAULT_MAX_MESSAGE_BYTES, DEFAULT_PARTITIONS};
use crate::kafka::error::{KafkaError, Result};
use crate::kafka::partitioner::compute_partition;

type TopicPartition = (String, i32);

#[derive(Default)]
struct GroupState {
    /// Next offset to read per topic-partition
    committed: HashMap<TopicPartition, i64>,
    /// Member currently reading each topic-partition
    owners: HashMap<TopicPartition, u64>,
}

#[derive(Default)]
struct BrokerState {
    topics: HashMap<String, Vec<Vec<ConsumedRecord>>>,
    groups: HashMap<String, GroupState>,
}

struct Shared {
    state: Mutex<BrokerState>,
    changes: watch::Sender<u64>,
    max_message_bytes: usize,
    auto_create_partitions: i32,
    connected: AtomicBool,
    failing_sends: AtomicUsize,
    next_member: AtomicU64,
}

impl Shared {
    fn notify(&self) {
        self.changes.send_modify(|version| *version = version.wrapping_add(1));
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(KafkaError::Connection(
                "in-memory broker is disconnected".to_string(),
            ))
        }
    }

    fn release_member(&self, group_id: &str, member: u64) {
        let mut state = self.state.lock();
        if let Some(group) = state.groups.get_mut(group_id) {
            group.owners.retain(|_, owner| *owner != member);
        }
        drop(state);
        self.notify();
    }
}

/// Broker held entirely in process memory
///
/// Cloning yields another handle to the same cluster.
#[derive(Clone)]
pub struct InMemoryBroker {
    shared: Arc<Shared>,
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_MAX_MESSAGE_BYTES, DEFAULT_PARTITIONS)
    }

    /// Broker with a message size limit and auto-created topic width
    pub fn with_limits(max_message_bytes: usize, auto_create_partitions: i32) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(BrokerState::default()),
                changes,
                max_message_bytes,
                auto_create_partitions: auto_create_partitions.max(1),
                connected: AtomicBool::new(true),
                failing_sends: AtomicUsize::new(0),
                next_member: AtomicU64::new(1),
            }),
        }
    }

    /// Make the next `n` sends fail with a broker error
    pub fn fail_next_sends(&self, n: usize) {
        self.shared.failing_sends.store(n, Ordering::SeqCst);
    }

    /// Drop the session: every operation and open stream fails fatally
    pub fn disconnect(&self) {
        self.shared.connected.store(false, Ordering::SeqCst);
        self.shared.notify();
    }

    /// Restore a session dropped by `disconnect`
    pub fn reconnect(&self) {
        self.shared.connected.store(true, Ordering::SeqCst);
        self.shared.notify();
    }

    /// Records stored in one partition
    pub fn partition_records(&self, topic: &str, partition: i32) -> Vec<ConsumedRecord> {
        let state = self.shared.state.lock();
        state
            .topics
            .get(topic)
            .and_then(|partitions| partitions.get(partition as usize))
            .cloned()
            .unwrap_or_default()
    }

    /// Total records stored in a topic
    pub fn message_count(&self, topic: &str) -> usize {
        let state = self.shared.state.lock();
        state
            .topics
            .get(topic)
            .map(|partitions| partitions.iter().map(Vec::len).sum())
            .unwrap_or(0)
    }

    /// Next offset a group will read from a partition, if it committed one
    pub fn committed_offset(&self, group_id: &str, topic: &str, partition: i32) -> Option<i64> {
        let state = self.shared.state.lock();
        state
            .groups
            .get(group_id)
            .and_then(|g| g.committed.get(&(topic.to_string(), partition)))
            .copied()
    }
}

#[async_trait]
impl BrokerAdmin for InMemoryBroker {
    async fn create_topic(&self, spec: &TopicSpec) -> Result<()> {
        self.shared.ensure_connected()?;
        if spec.partitions < 1 || spec.replication < 1 {
            return Err(KafkaError::InvalidConfig(format!(
                "topic {} needs at least one partition and replica",
                spec.name
            )));
        }

        let mut state = self.shared.state.lock();
        if state.topics.contains_key(&spec.name) {
            return Err(KafkaError::TopicAlreadyExists(spec.name.clone()));
        }
        state
            .topics
            .insert(spec.name.clone(), vec![Vec::new(); spec.partitions as usize]);
        drop(state);

        info!(topic = %spec.name, partitions = spec.partitions, "Created topic");
        self.shared.notify();
        Ok(())
    }

    async fn delete_topic(&self, name: &str) -> Result<()> {
        self.shared.ensure_connected()?;
        let mut state = self.shared.state.lock();
        if state.topics.remove(name).is_none() {
            return Err(KafkaError::TopicNotFound(name.to_string()));
        }
        for group in state.groups.values_mut() {
            group.committed.retain(|(topic, _), _| topic != name);
            group.owners.retain(|(topic, _), _| topic != name);
        }
        drop(state);

        info!(topic = %name, "Deleted topic");
        self.shared.notify();
        Ok(())
    }

    async fn list_topics(&self) -> Result<HashMap<String, TopicMetadata>> {
        self.shared.ensure_connected()?;
        let state = self.shared.state.lock();
        Ok(state
            .topics
            .iter()
            .map(|(name, partitions)| {
                (
                    name.clone(),
                    TopicMetadata {
                        name: name.clone(),
                        partitions: partitions.len() as i32,
                    },
                )
            })
            .collect())
    }
}

#[async_trait]
impl RecordSender for InMemoryBroker {
    async fn send(&self, record: OutgoingRecord) -> Result<DeliveredRecord> {
        self.shared.ensure_connected()?;

        let injected = self
            .shared
            .failing_sends
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(KafkaError::Broker(format!(
                "injected send failure on {}",
                record.topic
            )));
        }

        let size = record.value.len()
            + record.key.as_ref().map_or(0, |k| k.len())
            + record
                .headers
                .iter()
                .map(|header| header.key.len() + header.value.len())
                .sum::<usize>();
        if size > self.shared.max_message_bytes {
            return Err(KafkaError::MessageTooLarge {
                size,
                limit: self.shared.max_message_bytes,
            });
        }

        let mut state = self.shared.state.lock();
        let partitions = state
            .topics
            .entry(record.topic.clone())
            .or_insert_with(|| vec![Vec::new(); self.shared.auto_create_partitions as usize]);

        let partition = compute_partition(record.key.as_deref(), partitions.len() as i32);
        let log = &mut partitions[partition as usize];
        let offset = log.len() as i64;
        log.push(ConsumedRecord::from_outgoing(record, partition, offset));
        drop(state);

        self.shared.notify();
        Ok(DeliveredRecord { partition, offset })
    }
}

#[async_trait]
impl RecordSubscriber for InMemoryBroker {
    async fn subscribe(&self, spec: &SubscriptionSpec) -> Result<Box<dyn RecordStream>> {
        self.shared.ensure_connected()?;
        let member = self.shared.next_member.fetch_add(1, Ordering::SeqCst);

        let mut state = self.shared.state.lock();
        let BrokerState { topics, groups } = &mut *state;
        let group = groups.entry(spec.group_id.clone()).or_default();

        // A new group starting at Newest skips everything already stored
        if spec.initial_offset == InitialOffset::Newest {
            for topic in &spec.topics {
                if let Some(partitions) = topics.get(topic) {
                    for (p, log) in partitions.iter().enumerate() {
                        group
                            .committed
                            .entry((topic.clone(), p as i32))
                            .or_insert(log.len() as i64);
                    }
                }
            }
        }
        drop(state);

        debug!(group = %spec.group_id, member, topics = ?spec.topics, "Member joined group");
        Ok(Box::new(MemoryStream {
            shared: Arc::clone(&self.shared),
            changes: self.shared.changes.subscribe(),
            spec: spec.clone(),
            member,
            positions: HashMap::new(),
            next_start: 0,
            closed: false,
        }))
    }
}

/// One group member reading from the in-memory broker
struct MemoryStream {
    shared: Arc<Shared>,
    changes: watch::Receiver<u64>,
    spec: SubscriptionSpec,
    member: u64,
    /// Read positions not yet committed
    positions: HashMap<TopicPartition, i64>,
    /// Rotates the first partition polled so no partition starves
    next_start: usize,
    closed: bool,
}

impl MemoryStream {
    fn poll_once(&mut self) -> Option<ConsumedRecord> {
        let mut state = self.shared.state.lock();
        let BrokerState { topics, groups } = &mut *state;
        let group = groups.entry(self.spec.group_id.clone()).or_default();

        let candidates: Vec<TopicPartition> = self
            .spec
            .topics
            .iter()
            .filter_map(|t| topics.get(t).map(|parts| (t, parts.len())))
            .flat_map(|(t, n)| (0..n as i32).map(move |p| (t.clone(), p)))
            .collect();
        if candidates.is_empty() {
            return None;
        }

        let start = self.next_start % candidates.len();
        for i in 0..candidates.len() {
            let tp = &candidates[(start + i) % candidates.len()];
            match group.owners.get(tp) {
                Some(owner) if *owner != self.member => continue,
                _ => {}
            }

            let position = self
                .positions
                .get(tp)
                .or_else(|| group.committed.get(tp))
                .copied()
                .unwrap_or(0);
            let log = &topics[&tp.0][tp.1 as usize];
            if let Some(record) = log.get(position as usize) {
                group.owners.insert(tp.clone(), self.member);
                self.positions.insert(tp.clone(), position + 1);
                self.next_start = start + i + 1;
                return Some(record.clone());
            }
        }
        None
    }
}

#[async_trait]
impl RecordStream for MemoryStream {
    async fn next_record(&mut self) -> Result<ConsumedRecord> {
        loop {
            if self.closed {
                return Err(KafkaError::Connection("stream is closed".to_string()));
            }
            self.shared.ensure_connected()?;

            // Mark the current version seen before polling so a concurrent
            // produce always wakes the wait below.
            self.changes.borrow_and_update();
            if let Some(record) = self.poll_once() {
                return Ok(record);
            }

            if self.changes.changed().await.is_err() {
                return Err(KafkaError::Connection("in-memory broker dropped".to_string()));
            }
        }
    }

    async fn mark_processed(&mut self, record: &ConsumedRecord) -> Result<()> {
        let mut state = self.shared.state.lock();
        let group = state.groups.entry(self.spec.group_id.clone()).or_default();
        let next = record.offset + 1;
        let committed = group
            .committed
            .entry((record.topic.clone(), record.partition))
            .or_insert(next);
        if *committed < next {
            *committed = next;
        }
        Ok(())
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.shared.release_member(&self.spec.group_id, self.member);
            debug!(group = %self.spec.group_id, member = self.member, "Member left group");
        }
    }
}

impl Drop for MemoryStream {
    fn drop(&mut self) {
        if !self.closed {
            self.closed = true;
            self.shared.release_member(&self.spec.group_id, self.member);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn record(topic: &str, key: Option<&'static [u8]>, value: &'static [u8]) -> OutgoingRecord {
        OutgoingRecord {
            topic: topic.to_string(),
            key: key.map(Bytes::from_static),
            value: Bytes::from_static(value),
            headers: Vec::new(),
        }
    }

    fn spec(group: &str, topic: &str, initial_offset: InitialOffset) -> SubscriptionSpec {
        SubscriptionSpec {
            group_id: group.to_string(),
            topics: vec![topic.to_string()],
            initial_offset,
        }
    }

    #[tokio::test]
    async fn test_create_twice_fails() {
        let broker = InMemoryBroker::new();
        broker.create_topic(&TopicSpec::new("t", 1, 1)).await.unwrap();
        let err = broker.create_topic(&TopicSpec::new("t", 1, 1)).await.unwrap_err();
        assert!(matches!(err, KafkaError::TopicAlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_delete_missing_topic_fails() {
        let broker = InMemoryBroker::new();
        let err = broker.delete_topic("missing").await.unwrap_err();
        assert!(matches!(err, KafkaError::TopicNotFound(_)));
    }

    #[tokio::test]
    async fn test_same_key_same_partition() {
        let broker = InMemoryBroker::new();
        broker.create_topic(&TopicSpec::new("t", 4, 1)).await.unwrap();

        let first = broker.send(record("t", Some(b"k"), b"a")).await.unwrap();
        let second = broker.send(record("t", Some(b"k"), b"b")).await.unwrap();
        assert_eq!(first.partition, second.partition);
        assert_eq!(second.offset, first.offset + 1);
    }

    #[tokio::test]
    async fn test_send_auto_creates_topic() {
        let broker = InMemoryBroker::new();
        broker.send(record("auto", None, b"a")).await.unwrap();
        let topics = broker.list_topics().await.unwrap();
        assert_eq!(topics["auto"].partitions, DEFAULT_PARTITIONS);
    }

    #[tokio::test]
    async fn test_message_size_limit() {
        let broker = InMemoryBroker::with_limits(2, 1);
        let err = broker.send(record("t", None, b"abc")).await.unwrap_err();
        assert!(matches!(err, KafkaError::MessageTooLarge { size: 3, limit: 2 }));
    }

    #[tokio::test]
    async fn test_groups_get_independent_copies() {
        let broker = InMemoryBroker::new();
        broker.send(record("t", None, b"a")).await.unwrap();

        let mut g1 = broker.subscribe(&spec("g1", "t", InitialOffset::Oldest)).await.unwrap();
        let mut g2 = broker.subscribe(&spec("g2", "t", InitialOffset::Oldest)).await.unwrap();

        assert_eq!(g1.next_record().await.unwrap().value.as_ref(), b"a");
        assert_eq!(g2.next_record().await.unwrap().value.as_ref(), b"a");
    }

    #[tokio::test]
    async fn test_newest_skips_existing_records() {
        let broker = InMemoryBroker::new();
        broker.send(record("t", None, b"old")).await.unwrap();

        let mut stream = broker.subscribe(&spec("g", "t", InitialOffset::Newest)).await.unwrap();
        broker.send(record("t", None, b"new")).await.unwrap();

        assert_eq!(stream.next_record().await.unwrap().value.as_ref(), b"new");
    }

    #[tokio::test]
    async fn test_uncommitted_records_redelivered_after_close() {
        let broker = InMemoryBroker::new();
        broker.send(record("t", None, b"a")).await.unwrap();
        broker.send(record("t", None, b"b")).await.unwrap();

        let mut first = broker.subscribe(&spec("g", "t", InitialOffset::Oldest)).await.unwrap();
        let a = first.next_record().await.unwrap();
        first.mark_processed(&a).await.unwrap();
        let _b = first.next_record().await.unwrap();
        first.close().await;

        assert_eq!(broker.committed_offset("g", "t", 0), Some(1));

        let mut second = broker.subscribe(&spec("g", "t", InitialOffset::Oldest)).await.unwrap();
        assert_eq!(second.next_record().await.unwrap().value.as_ref(), b"b");
    }

    #[tokio::test]
    async fn test_partition_owned_by_one_member() {
        let broker = InMemoryBroker::new();
        broker.send(record("t", None, b"a")).await.unwrap();
        broker.send(record("t", None, b"b")).await.unwrap();

        let mut m1 = broker.subscribe(&spec("g", "t", InitialOffset::Oldest)).await.unwrap();
        let mut m2 = broker.subscribe(&spec("g", "t", InitialOffset::Oldest)).await.unwrap();

        assert_eq!(m1.next_record().await.unwrap().value.as_ref(), b"a");
        let blocked =
            tokio::time::timeout(std::time::Duration::from_millis(50), m2.next_record()).await;
        assert!(blocked.is_err(), "second member must not read an owned partition");
        assert_eq!(m1.next_record().await.unwrap().value.as_ref(), b"b");
    }

    #[tokio::test]
    async fn test_disconnect_fails_open_streams() {
        let broker = InMemoryBroker::new();
        let mut stream = broker.subscribe(&spec("g", "t", InitialOffset::Oldest)).await.unwrap();

        let waiter = tokio::spawn(async move { stream.next_record().await });
        tokio::task::yield_now().await;
        broker.disconnect();

        let result = waiter.await.unwrap();
        assert!(matches!(result, Err(KafkaError::Connection(_))));
    }

    #[tokio::test]
    async fn test_reconnect_restores_session() {
        let broker = InMemoryBroker::new();
        broker.disconnect();
        assert!(matches!(
            broker.send(record("t", None, b"a")).await,
            Err(KafkaError::Connection(_))
        ));

        broker.reconnect();
        broker.send(record("t", None, b"a")).await.unwrap();
        let mut stream = broker.subscribe(&spec("g", "t", InitialOffset::Oldest)).await.unwrap();
        assert_eq!(stream.next_record().await.unwrap().value.as_ref(), b"a");
    }

    #[tokio::test]
    async fn test_injected_send_failures() {
        let broker = InMemoryBroker::new();
        broker.fail_next_sends(1);
        assert!(broker.send(record("t", None, b"a")).await.is_err());
        assert!(broker.send(record("t", None, b"a")).await.is_ok());
        assert_eq!(broker.message_count("t"), 1);
    }
}
