// Broker abstraction layer for chain_kafka
//
// The transport never calls a client library directly. It talks to the
// traits below, which separate broker I/O from the segmentation protocol:
// 1. Testability - the reassembly engine runs against InMemoryBroker
// 2. Clean separation of concerns - protocol logic doesn't know about librdkafka
// 3. Session ownership - each subscription owns exactly one RecordStream
//
// Implementations:
// - RdKafkaBroker: librdkafka (AdminClient, FutureProducer, StreamConsumer)
// - InMemoryBroker: partitioned logs and group offsets held in process memory

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use super::error::Result;
use crate::config::InitialOffset;

pub mod memory;
pub mod rdkafka_broker;

pub use memory::InMemoryBroker;
pub use rdkafka_broker::RdKafkaBroker;

/// A message header (name and raw value)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordHeader {
    pub key: String,
    pub value: Vec<u8>,
}

impl RecordHeader {
    pub fn new(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// A message to be produced
#[derive(Debug, Clone)]
pub struct OutgoingRecord {
    /// Target topic
    pub topic: String,
    /// Partitioning key (None = broker chooses the partition)
    pub key: Option<Bytes>,
    /// Message value
    pub value: Bytes,
    /// Message headers
    pub headers: Vec<RecordHeader>,
}

/// Where a produced message landed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveredRecord {
    pub partition: i32,
    pub offset: i64,
}

/// A message read from a subscription
#[derive(Debug, Clone)]
pub struct ConsumedRecord {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Bytes>,
    pub value: Bytes,
    pub headers: Vec<RecordHeader>,
}

impl ConsumedRecord {
    /// Value of the first header with the given name
    pub fn header(&self, name: &str) -> Option<&[u8]> {
        self.headers
            .iter()
            .find(|h| h.key == name)
            .map(|h| h.value.as_slice())
    }

    /// The record a broker would deliver for `record` at the given position
    pub fn from_outgoing(record: OutgoingRecord, partition: i32, offset: i64) -> Self {
        Self {
            topic: record.topic,
            partition,
            offset,
            key: record.key,
            value: record.value,
            headers: record.headers,
        }
    }
}

/// Parameters for creating a topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSpec {
    pub name: String,
    pub partitions: i32,
    pub replication: i32,
}

impl TopicSpec {
    pub fn new(name: impl Into<String>, partitions: i32, replication: i32) -> Self {
        Self {
            name: name.into(),
            partitions,
            replication,
        }
    }
}

/// Metadata about an existing topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicMetadata {
    pub name: String,
    pub partitions: i32,
}

/// What a subscription reads and on whose behalf
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionSpec {
    /// Consumer group id
    pub group_id: String,
    /// Concrete topics to read
    pub topics: Vec<String>,
    /// Start position for partitions without a committed offset
    pub initial_offset: InitialOffset,
}

/// Topic lifecycle operations
#[async_trait]
pub trait BrokerAdmin: Send + Sync {
    /// Create a topic; fails with `TopicAlreadyExists` if present
    async fn create_topic(&self, spec: &TopicSpec) -> Result<()>;

    /// Delete a topic; fails with `TopicNotFound` if absent
    async fn delete_topic(&self, name: &str) -> Result<()>;

    /// Topics currently known to the cluster
    async fn list_topics(&self) -> Result<HashMap<String, TopicMetadata>>;
}

/// Message production
#[async_trait]
pub trait RecordSender: Send + Sync {
    /// Send one message and wait for its delivery report
    async fn send(&self, record: OutgoingRecord) -> Result<DeliveredRecord>;

    /// Wait for in-flight messages to be delivered
    async fn flush(&self, _timeout: Duration) -> Result<()> {
        Ok(())
    }
}

/// Consumer-group subscriptions
#[async_trait]
pub trait RecordSubscriber: Send + Sync {
    /// Join `spec.group_id` and start reading `spec.topics`
    ///
    /// Every call opens a new group member.
    async fn subscribe(&self, spec: &SubscriptionSpec) -> Result<Box<dyn RecordStream>>;
}

/// One group member's stream of records
#[async_trait]
pub trait RecordStream: Send {
    /// Wait for the next record
    ///
    /// Only errors that make the session unusable are returned; transient
    /// conditions are handled inside the implementation. Must be
    /// cancellation safe: dropping the future loses no record.
    async fn next_record(&mut self) -> Result<ConsumedRecord>;

    /// Record that `record` was fully processed and may be committed
    async fn mark_processed(&mut self, record: &ConsumedRecord) -> Result<()>;

    /// Leave the group and release the session
    async fn close(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_lookup_returns_first_match() {
        let record = ConsumedRecord {
            topic: "t".to_string(),
            partition: 0,
            offset: 0,
            key: None,
            value: Bytes::new(),
            headers: vec![
                RecordHeader::new("a", vec![1u8]),
                RecordHeader::new("a", vec![2u8]),
            ],
        };
        assert_eq!(record.header("a"), Some(&[1u8][..]));
        assert_eq!(record.header("b"), None);
    }
}
