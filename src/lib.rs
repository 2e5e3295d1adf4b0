//! chain_kafka: large-payload transport over Kafka
//!
//! Publishes arbitrarily large payloads (blocks, traces, receipts) as
//! sequences of size-bounded segments and reassembles them on the consumer
//! side, per consumer group.
//!
//! ```no_run
//! use chain_kafka::{Kafka, KafkaConfig, ReassembledMessage, HandlerError};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> chain_kafka::Result<()> {
//! let kafka = Kafka::connect(KafkaConfig::from_env()?)?;
//! kafka.setup_event_topics().await?;
//!
//! let consumer = kafka.consumer("indexer")?;
//! consumer.add_topic_and_handler("blockgroup", |msg: ReassembledMessage| async move {
//!     println!("block payload of {} bytes", msg.payload.len());
//!     Ok::<(), HandlerError>(())
//! })?;
//!
//! kafka.publish_event("blockgroup", &vec![0u8; 5_000_000]).await?;
//! consumer.subscribe(CancellationToken::new()).await?;
//! # Ok(())
//! # }
//! ```
//!
//! The library emits `tracing` events and never installs a subscriber.

// Module declarations
pub mod config; // Configuration (defaults, environment, validation)
pub mod kafka; // Segmentation transport (producer, consumer, admin, brokers)

// Test utilities (only compiled in test builds)
#[cfg(test)]
pub mod testing;

pub use config::{InitialOffset, KafkaConfig};
pub use kafka::{
    BrokerAdmin, ConsumedRecord, Consumer, ConsumerError, ConsumerStats, EventGroup,
    HandlerError, InMemoryBroker, Kafka, KafkaError, MessageHandler, OutgoingRecord, Producer,
    PublishReceipt, RdKafkaBroker, ReassembledMessage, RecordSender, RecordStream,
    RecordSubscriber, Result, TopicAdmin, TopicMetadata, TopicRouter, TopicSpec,
};
