//! Transport constants
//!
//! Centralizes the wire-level header names, configuration defaults and
//! validation bounds used by the segmentation transport.
//!
//! # Terminology
//! - **Segment**: one broker message carrying a slice of a larger payload
//! - **Correlation key**: the broker message key shared by every segment of one payload

// ===== Segment Headers =====
// Every segment carries both headers as 8-byte big-endian unsigned integers

/// Header holding the number of segments the payload was split into
pub const HEADER_TOTAL_SEGMENTS: &str = "totalSegments";

/// Header holding the 0-based index of this segment
pub const HEADER_SEGMENT_IDX: &str = "segmentIdx";

/// Width of each segment header value in bytes
pub const SEGMENT_HEADER_LEN: usize = 8;

// ===== Configuration Defaults =====

/// Default bootstrap broker
pub const DEFAULT_BROKER: &str = "localhost:9092";

/// Default partition count for newly created topics
pub const DEFAULT_PARTITIONS: i32 = 1;

/// Default replication factor for newly created topics
pub const DEFAULT_REPLICAS: i32 = 1;

/// Default maximum size of one broker message (bytes)
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 1_000_000;

/// Room reserved in each broker message for the key, headers and record framing
pub const SEGMENT_OVERHEAD_BYTES: usize = 1024;

/// Default maximum size of one segment value (bytes)
pub const DEFAULT_SEGMENT_SIZE_BYTES: usize = DEFAULT_MAX_MESSAGE_BYTES - SEGMENT_OVERHEAD_BYTES;

/// Default producer acknowledgement level (leader only)
pub const DEFAULT_REQUIRED_ACKS: i32 = 1;

/// Default capacity of the reassembly buffer (incomplete messages)
pub const DEFAULT_MAX_MESSAGE_NUMBER: usize = 100;

/// Default topic environment component
pub const DEFAULT_TOPIC_ENVIRONMENT: &str = "local";

/// Default topic resource component
pub const DEFAULT_TOPIC_RESOURCE: &str = "en-0";

/// Default capacity of the consumer error channel
pub const DEFAULT_ERROR_CHANNEL_CAPACITY: usize = 100;

/// Default number of group members opened by one subscription
pub const DEFAULT_READER_TASKS: usize = 1;

/// Default client identifier reported to the broker
pub const DEFAULT_CLIENT_ID: &str = "chain-kafka";

/// Default delivery timeout for produced segments (milliseconds)
pub const DEFAULT_DELIVERY_TIMEOUT_MS: u64 = 30_000;

/// Default timeout for admin and metadata operations (milliseconds)
pub const DEFAULT_ADMIN_TIMEOUT_MS: u64 = 10_000;

// ===== Validation Bounds =====

/// Upper bound for reader tasks of a single subscription
pub const MAX_READER_TASKS: usize = 64;

/// Acknowledgement levels accepted by the broker (-1 = all in-sync replicas)
pub const VALID_REQUIRED_ACKS: [i32; 3] = [-1, 0, 1];

// ===== Environment Variables =====

pub const ENV_BROKERS: &str = "CHAIN_KAFKA_BROKERS";
pub const ENV_PARTITIONS: &str = "CHAIN_KAFKA_PARTITIONS";
pub const ENV_REPLICAS: &str = "CHAIN_KAFKA_REPLICAS";
pub const ENV_SEGMENT_SIZE_BYTES: &str = "CHAIN_KAFKA_SEGMENT_SIZE_BYTES";
pub const ENV_MAX_MESSAGE_BYTES: &str = "CHAIN_KAFKA_MAX_MESSAGE_BYTES";
pub const ENV_REQUIRED_ACKS: &str = "CHAIN_KAFKA_REQUIRED_ACKS";
pub const ENV_MAX_MESSAGE_NUMBER: &str = "CHAIN_KAFKA_MAX_MESSAGE_NUMBER";
pub const ENV_TOPIC_ENVIRONMENT: &str = "CHAIN_KAFKA_TOPIC_ENVIRONMENT";
pub const ENV_TOPIC_RESOURCE: &str = "CHAIN_KAFKA_TOPIC_RESOURCE";
pub const ENV_INITIAL_OFFSET: &str = "CHAIN_KAFKA_INITIAL_OFFSET";
