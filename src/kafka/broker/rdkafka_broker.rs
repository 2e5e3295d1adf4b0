//! librdkafka-backed broker
//!
//! Wraps rdkafka's clients behind the broker traits:
//!
//! - `AdminClient` for topic lifecycle
//! - `FutureProducer` for segment delivery (one shared instance, safe for
//!   concurrent sends)
//! - one `StreamConsumer` per subscription, i.e. per group member
//!
//! ## Offsets
//!
//! Consumers run with `enable.auto.offset.store=false`: an offset is stored
//! only after the transport processed the record, and the periodic
//! auto-commit then commits stored offsets. A crash therefore re-delivers
//! unprocessed records instead of losing them.
//!
//! ## Errors
//!
//! librdkafka retries connectivity internally. Partition EOF and transient
//! consume errors are logged and skipped; fatal client errors and "all
//! brokers down" end the stream with `KafkaError::Connection`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::error::{KafkaError as RdKafkaError, RDKafkaErrorCode};
use rdkafka::message::{Header, Headers, Message, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use tracing::{debug, error, info, warn};

use super::{
    BrokerAdmin, ConsumedRecord, DeliveredRecord, OutgoingRecord, RecordHeader, RecordSender,
    RecordStream, RecordSubscriber, SubscriptionSpec, TopicMetadata, TopicSpec,
};
use crate::config::KafkaConfig;
use crate::kafka::error::{KafkaError, Result};

/// Broker session backed by librdkafka
pub struct RdKafkaBroker {
    config: Arc<KafkaConfig>,
    admin: AdminClient<DefaultClientContext>,
    producer: FutureProducer,
}

impl RdKafkaBroker {
    /// Connect to the configured cluster
    ///
    /// Fetches cluster metadata once so an unreachable cluster is reported
    /// here instead of on the first publish.
    ///
    /// # Errors
    ///
    /// Returns `KafkaError::Connection` if the clients cannot be created or
    /// no broker answers within the admin timeout.
    pub fn connect(config: Arc<KafkaConfig>) -> Result<Self> {
        let admin: AdminClient<DefaultClientContext> = base_client_config(&config)
            .create()
            .map_err(|e| KafkaError::Connection(format!("Failed to create admin client: {}", e)))?;

        let producer = Self::create_producer(&config)?;

        producer
            .client()
            .fetch_metadata(None, config.admin_timeout)
            .map_err(|e| {
                KafkaError::Connection(format!(
                    "No broker reachable at {}: {}",
                    config.bootstrap_servers(),
                    e
                ))
            })?;

        info!(brokers = %config.bootstrap_servers(), "Connected to Kafka");
        Ok(Self {
            config,
            admin,
            producer,
        })
    }

    fn create_producer(config: &KafkaConfig) -> Result<FutureProducer> {
        let mut client_config = base_client_config(config);

        client_config.set("acks", config.required_acks.to_string());
        client_config.set("message.max.bytes", config.max_message_bytes.to_string());
        client_config.set(
            "message.timeout.ms",
            config.delivery_timeout.as_millis().to_string(),
        );
        // Same key → same partition, matching the Java client's murmur2 placement
        client_config.set("partitioner", "murmur2_random");

        client_config
            .create()
            .map_err(|e| KafkaError::Connection(format!("Failed to create producer: {}", e)))
    }

    fn admin_options(&self) -> AdminOptions {
        AdminOptions::new().operation_timeout(Some(Timeout::After(self.config.admin_timeout)))
    }
}

/// Settings shared by every client of one session
fn base_client_config(config: &KafkaConfig) -> ClientConfig {
    let mut client_config = ClientConfig::new();
    client_config
        .set("bootstrap.servers", config.bootstrap_servers())
        .set("client.id", &config.client_id);
    client_config
}

/// Map librdkafka errors that mean the session is gone
fn classify(err: RdKafkaError) -> KafkaError {
    match err.rdkafka_error_code() {
        Some(RDKafkaErrorCode::AllBrokersDown) | Some(RDKafkaErrorCode::Fatal) => {
            KafkaError::Connection(err.to_string())
        }
        Some(RDKafkaErrorCode::MessageSizeTooLarge) => KafkaError::Broker(err.to_string()),
        _ => KafkaError::from(err),
    }
}

#[async_trait]
impl BrokerAdmin for RdKafkaBroker {
    async fn create_topic(&self, spec: &TopicSpec) -> Result<()> {
        let max_message_bytes = self.config.max_message_bytes.to_string();
        let new_topic = NewTopic::new(
            &spec.name,
            spec.partitions,
            TopicReplication::Fixed(spec.replication),
        )
        .set("max.message.bytes", &max_message_bytes);

        let results = self
            .admin
            .create_topics(&[new_topic], &self.admin_options())
            .await
            .map_err(classify)?;

        for result in results {
            match result {
                Ok(name) => info!(topic = %name, partitions = spec.partitions, "Created topic"),
                Err((name, RDKafkaErrorCode::TopicAlreadyExists)) => {
                    return Err(KafkaError::TopicAlreadyExists(name))
                }
                Err((name, code)) => {
                    return Err(KafkaError::Broker(format!(
                        "Failed to create topic {}: {}",
                        name, code
                    )))
                }
            }
        }
        Ok(())
    }

    async fn delete_topic(&self, name: &str) -> Result<()> {
        let results = self
            .admin
            .delete_topics(&[name], &self.admin_options())
            .await
            .map_err(classify)?;

        for result in results {
            match result {
                Ok(name) => info!(topic = %name, "Deleted topic"),
                Err((name, RDKafkaErrorCode::UnknownTopicOrPartition))
                | Err((name, RDKafkaErrorCode::UnknownTopic)) => {
                    return Err(KafkaError::TopicNotFound(name))
                }
                Err((name, code)) => {
                    return Err(KafkaError::Broker(format!(
                        "Failed to delete topic {}: {}",
                        name, code
                    )))
                }
            }
        }
        Ok(())
    }

    async fn list_topics(&self) -> Result<HashMap<String, TopicMetadata>> {
        // fetch_metadata blocks on the network
        let producer = self.producer.clone();
        let timeout = self.config.admin_timeout;
        let metadata = tokio::task::spawn_blocking(move || {
            producer.client().fetch_metadata(None, timeout)
        })
        .await
        .map_err(|e| KafkaError::Broker(format!("Metadata task failed: {}", e)))?
        .map_err(classify)?;

        Ok(metadata
            .topics()
            .iter()
            .filter(|t| t.error().is_none())
            .map(|t| {
                (
                    t.name().to_string(),
                    TopicMetadata {
                        name: t.name().to_string(),
                        partitions: t.partitions().len() as i32,
                    },
                )
            })
            .collect())
    }
}

#[async_trait]
impl RecordSender for RdKafkaBroker {
    async fn send(&self, record: OutgoingRecord) -> Result<DeliveredRecord> {
        let headers = record
            .headers
            .iter()
            .fold(OwnedHeaders::new(), |headers, h| {
                headers.insert(Header {
                    key: &h.key,
                    value: Some(h.value.as_slice()),
                })
            });

        let mut future_record: FutureRecord<'_, [u8], [u8]> = FutureRecord::to(&record.topic)
            .payload(record.value.as_ref())
            .headers(headers);
        if let Some(key) = record.key.as_deref() {
            future_record = future_record.key(key);
        }

        let (partition, offset) = self
            .producer
            .send(future_record, Timeout::After(self.config.delivery_timeout))
            .await
            .map_err(|(err, _)| classify(err))?;

        debug!(topic = %record.topic, partition, offset, "Delivered record");
        Ok(DeliveredRecord { partition, offset })
    }

    async fn flush(&self, timeout: Duration) -> Result<()> {
        let producer = self.producer.clone();
        tokio::task::spawn_blocking(move || producer.flush(Timeout::After(timeout)))
            .await
            .map_err(|e| KafkaError::Broker(format!("Flush task failed: {}", e)))?
            .map_err(classify)
    }
}

#[async_trait]
impl RecordSubscriber for RdKafkaBroker {
    async fn subscribe(&self, spec: &SubscriptionSpec) -> Result<Box<dyn RecordStream>> {
        let consumer: StreamConsumer = base_client_config(&self.config)
            .set("group.id", &spec.group_id)
            .set("auto.offset.reset", spec.initial_offset.as_offset_reset())
            .set("enable.auto.commit", "true")
            .set("enable.auto.offset.store", "false")
            .set("enable.partition.eof", "false")
            .create()
            .map_err(|e| KafkaError::Connection(format!("Failed to create consumer: {}", e)))?;

        let topics: Vec<&str> = spec.topics.iter().map(String::as_str).collect();
        consumer.subscribe(&topics).map_err(classify)?;

        info!(group = %spec.group_id, topics = ?spec.topics, "Subscribed");
        Ok(Box::new(RdKafkaStream {
            consumer,
            group_id: spec.group_id.clone(),
        }))
    }
}

/// A group member backed by a `StreamConsumer`
struct RdKafkaStream {
    consumer: StreamConsumer,
    group_id: String,
}

#[async_trait]
impl RecordStream for RdKafkaStream {
    async fn next_record(&mut self) -> Result<ConsumedRecord> {
        loop {
            match self.consumer.recv().await {
                Ok(message) => {
                    let headers = message
                        .headers()
                        .map(|headers| {
                            headers
                                .iter()
                                .map(|h| {
                                    RecordHeader::new(h.key, h.value.unwrap_or_default().to_vec())
                                })
                                .collect()
                        })
                        .unwrap_or_default();

                    return Ok(ConsumedRecord {
                        topic: message.topic().to_string(),
                        partition: message.partition(),
                        offset: message.offset(),
                        key: message.key().map(Bytes::copy_from_slice),
                        value: message
                            .payload()
                            .map(Bytes::copy_from_slice)
                            .unwrap_or_default(),
                        headers,
                    });
                }
                Err(RdKafkaError::PartitionEOF(partition)) => {
                    debug!(group = %self.group_id, partition, "Reached end of partition");
                }
                Err(RdKafkaError::MessageConsumptionFatal(code)) => {
                    error!(group = %self.group_id, %code, "Fatal consumer error");
                    return Err(KafkaError::Connection(code.to_string()));
                }
                Err(err) => match classify(err) {
                    KafkaError::Connection(msg) => {
                        error!(group = %self.group_id, error = %msg, "Lost broker session");
                        return Err(KafkaError::Connection(msg));
                    }
                    other => warn!(group = %self.group_id, error = %other, "Transient consumer error"),
                },
            }
        }
    }

    async fn mark_processed(&mut self, record: &ConsumedRecord) -> Result<()> {
        // The stored offset is the next one to read
        self.consumer
            .store_offset(&record.topic, record.partition, record.offset + 1)
            .map_err(classify)
    }

    async fn close(&mut self) {
        self.consumer.unsubscribe();
        info!(group = %self.group_id, "Left consumer group");
    }
}
