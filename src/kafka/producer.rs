//! Segmenting producer
//!
//! `publish` splits a payload into segments and sends them in index order,
//! each as its own broker message keyed by a fresh correlation key. The key
//! is what makes the broker place every segment of one payload on the same
//! partition, in order.
//!
//! A failed segment aborts the publish. Segments sent before it stay on the
//! topic; consumers hold them as an incomplete entry that never finishes.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use super::broker::{DeliveredRecord, OutgoingRecord, RecordSender};
use super::error::{KafkaError, Result};
use super::segment::{self, Segment};
use crate::config::KafkaConfig;

/// Where a published payload ended up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReceipt {
    /// Correlation key of the payload
    pub key: String,
    /// Number of segments sent
    pub segments: u64,
    /// Partition of the last segment
    pub partition: i32,
    /// Offset of the last segment
    pub last_offset: i64,
}

/// Publishes payloads as segment sequences
///
/// Cheap to clone; clones share the broker connection.
#[derive(Clone)]
pub struct Producer {
    sender: Arc<dyn RecordSender>,
    config: Arc<KafkaConfig>,
}

impl Producer {
    pub fn new(sender: Arc<dyn RecordSender>, config: Arc<KafkaConfig>) -> Self {
        Self { sender, config }
    }

    pub fn config(&self) -> &KafkaConfig {
        &self.config
    }

    /// Fresh correlation key: 128-bit random UUID as 32 hex characters
    pub fn new_correlation_key() -> String {
        Uuid::new_v4().simple().to_string()
    }

    /// Publish `payload` on `topic` under a fresh correlation key
    pub async fn publish(&self, topic: &str, payload: &[u8]) -> Result<PublishReceipt> {
        self.publish_with_key(topic, &Self::new_correlation_key(), payload)
            .await
    }

    /// Publish `payload` under a caller-chosen key
    ///
    /// The key must not collide with another incomplete payload on the same
    /// topic. An empty key leaves partition placement to the broker, so
    /// multi-segment payloads may then arrive on different partitions.
    pub async fn publish_with_key(
        &self,
        topic: &str,
        key: &str,
        payload: &[u8],
    ) -> Result<PublishReceipt> {
        let payload = Bytes::copy_from_slice(payload);
        let parts = segment::split(&payload, self.config.segment_size_bytes);
        let total = parts.len() as u64;
        let key_bytes = Bytes::copy_from_slice(key.as_bytes());

        debug!(topic, key, total, bytes = payload.len(), "Publishing payload");

        let mut last = DeliveredRecord {
            partition: 0,
            offset: -1,
        };
        for (index, part) in parts.into_iter().enumerate() {
            let record = Segment::new(
                topic,
                key_bytes.clone(),
                index as u64,
                total,
                payload.slice_ref(part),
            )
            .into_record();

            last = self.sender.send(record).await.map_err(|err| {
                warn!(topic, key, index, total, error = %err, "Segment publish failed");
                KafkaError::Publish {
                    topic: topic.to_string(),
                    index: index as u64,
                    total,
                    source: Box::new(err),
                }
            })?;
        }

        Ok(PublishReceipt {
            key: key.to_string(),
            segments: total,
            partition: last.partition,
            last_offset: last.offset,
        })
    }

    /// Serialize `value` as JSON and publish it
    pub async fn publish_json<T: Serialize + ?Sized>(
        &self,
        topic: &str,
        value: &T,
    ) -> Result<PublishReceipt> {
        let payload = serde_json::to_vec(value)?;
        self.publish(topic, &payload).await
    }

    /// Build a single segment message without sending it
    ///
    /// Lets callers emit raw segments, for example to replay or to probe
    /// consumer behavior with deliberately incomplete payloads.
    pub fn make_record(
        topic: &str,
        key: &str,
        data: impl Into<Bytes>,
        index: u64,
        total: u64,
    ) -> OutgoingRecord {
        Segment::new(topic, Bytes::copy_from_slice(key.as_bytes()), index, total, data)
            .into_record()
    }

    /// Send one pre-built message
    pub async fn send_record(&self, record: OutgoingRecord) -> Result<DeliveredRecord> {
        self.sender.send(record).await
    }

    /// Wait until in-flight segments are delivered
    pub async fn flush(&self, timeout: Duration) -> Result<()> {
        self.sender.flush(timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kafka::broker::InMemoryBroker;
    use crate::kafka::constants::{HEADER_SEGMENT_IDX, HEADER_TOTAL_SEGMENTS};
    use crate::testing::mock_config;

    fn producer(broker: &InMemoryBroker, segment_size: usize) -> Producer {
        let config = mock_config().with_segment_size_bytes(segment_size);
        Producer::new(Arc::new(broker.clone()), Arc::new(config))
    }

    #[test]
    fn test_correlation_keys_are_distinct_hex() {
        let a = Producer::new_correlation_key();
        let b = Producer::new_correlation_key();
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_publish_sends_segments_in_order() {
        let broker = InMemoryBroker::new();
        let receipt = producer(&broker, 3)
            .publish("t", b"abcdefgh")
            .await
            .unwrap();

        assert_eq!(receipt.segments, 3);
        assert_eq!(receipt.last_offset, 2);

        let records = broker.partition_records("t", 0);
        assert_eq!(records.len(), 3);
        for (i, record) in records.iter().enumerate() {
            assert_eq!(record.key.as_deref(), Some(receipt.key.as_bytes()));
            assert_eq!(
                record.header(HEADER_SEGMENT_IDX),
                Some(&(i as u64).to_be_bytes()[..])
            );
            assert_eq!(
                record.header(HEADER_TOTAL_SEGMENTS),
                Some(&3u64.to_be_bytes()[..])
            );
        }
        let joined: Vec<u8> = records.iter().flat_map(|r| r.value.to_vec()).collect();
        assert_eq!(joined, b"abcdefgh");
    }

    #[tokio::test]
    async fn test_publish_empty_payload_sends_one_segment() {
        let broker = InMemoryBroker::new();
        let receipt = producer(&broker, 3).publish("t", b"").await.unwrap();
        assert_eq!(receipt.segments, 1);
        assert_eq!(broker.message_count("t"), 1);
    }

    #[tokio::test]
    async fn test_failed_segment_keeps_earlier_segments() {
        let broker = InMemoryBroker::new();
        let producer = producer(&broker, 2);
        producer.publish("t", b"warmup").await.unwrap();
        let before = broker.message_count("t");

        let sender = FailAfter::new(broker.clone(), 2);
        let failing = Producer::new(Arc::new(sender), Arc::new(producer.config().clone()));

        let err = failing.publish("t", b"abcdefgh").await.unwrap_err();
        match err {
            KafkaError::Publish { index, total, .. } => {
                assert_eq!(index, 2);
                assert_eq!(total, 4);
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(broker.message_count("t"), before + 2);
    }

    #[tokio::test]
    async fn test_publish_json() {
        let broker = InMemoryBroker::new();
        producer(&broker, 1024)
            .publish_json("t", &serde_json::json!({"block": 7}))
            .await
            .unwrap();
        let records = broker.partition_records("t", 0);
        let value: serde_json::Value = serde_json::from_slice(&records[0].value).unwrap();
        assert_eq!(value["block"], 7);
    }

    #[test]
    fn test_make_record() {
        let record = Producer::make_record("t", "k", Bytes::from_static(b"x"), 0, 2);
        assert_eq!(record.topic, "t");
        assert_eq!(record.key.as_deref(), Some(&b"k"[..]));
        assert_eq!(record.headers.len(), 2);
    }

    /// Sender that fails every send after the first `n`
    struct FailAfter {
        inner: InMemoryBroker,
        remaining: std::sync::atomic::AtomicUsize,
    }

    impl FailAfter {
        fn new(inner: InMemoryBroker, n: usize) -> Self {
            Self {
                inner,
                remaining: std::sync::atomic::AtomicUsize::new(n),
            }
        }
    }

    #[async_trait::async_trait]
    impl RecordSender for FailAfter {
        async fn send(&self, record: OutgoingRecord) -> Result<DeliveredRecord> {
            use std::sync::atomic::Ordering;
            let allowed = self
                .remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if allowed {
                self.inner.send(record).await
            } else {
                Err(KafkaError::Broker("send refused".to_string()))
            }
        }
    }
}
