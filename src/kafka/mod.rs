// Kafka transport module
//
// This module contains all broker-facing code:
// - Segmentation of large payloads into broker-sized messages
// - Reassembly of segments back into payloads on the consumer side
// - Topic administration and event-group routing
// - The broker seam (librdkafka and in-memory implementations)
//
// Architecture Overview:
// =====================
//
//   Producer.publish(topic, payload)
//        │  split into N segments, one correlation key
//        ▼
//   RecordSender ──► broker ──► RecordStream (one per group member)
//                                     │
//                                     ▼
//                      Consumer read loop → ReassemblyBuffer
//                                     │            │
//                           complete payload   non-fatal errors
//                                     ▼            ▼
//                           MessageHandler    error channel
//
// The correlation key is the record key of every segment. Key-hash
// partitioning puts all segments of one payload on one partition, which
// keeps them in publish order for the consumer.

pub mod admin;
pub mod broker;
pub mod client;
pub mod constants;
pub mod consumer;
pub mod error;
pub mod partitioner;
pub mod producer;
pub mod reassembly;
pub mod router;
pub mod segment;

// Re-export commonly used types for convenience
pub use admin::TopicAdmin;
pub use broker::{
    BrokerAdmin, ConsumedRecord, InMemoryBroker, OutgoingRecord, RdKafkaBroker, RecordSender,
    RecordStream, RecordSubscriber, TopicMetadata, TopicSpec,
};
pub use client::Kafka;
pub use consumer::{Consumer, ConsumerStats, MessageHandler};
pub use error::{ConsumerError, HandlerError, KafkaError, Result};
pub use producer::{Producer, PublishReceipt};
pub use reassembly::{InsertOutcome, ReassembledMessage, ReassemblyBuffer};
pub use router::{EventGroup, TopicRouter};
pub use segment::{Segment, SegmentError};
