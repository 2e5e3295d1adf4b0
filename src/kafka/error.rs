//! Transport error types
//!
//! Two families of errors exist:
//!
//! - [`KafkaError`] is returned directly to callers. It covers broker
//!   connectivity, topic administration, validation and publish failures.
//! - [`ConsumerError`] is never returned from a call. The consumer read loop
//!   reports it on the error channel and keeps consuming.

use std::fmt;
use thiserror::Error;

/// Errors returned by admin, producer and subscription operations
#[derive(Error, Debug)]
pub enum KafkaError {
    /// Broker session could not be established or was lost
    #[error("Broker connection error: {0}")]
    Connection(String),

    /// Topic creation rejected because the topic exists
    #[error("Topic already exists: {0}")]
    TopicAlreadyExists(String),

    /// Topic does not exist
    #[error("Topic not found: {0}")]
    TopicNotFound(String),

    /// Event-group name is not one of the known groups
    #[error("Unknown event group: {0}")]
    UnknownEventGroup(String),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// One segment of a payload could not be published
    #[error("Failed to publish segment {index}/{total} to {topic}: {source}")]
    Publish {
        topic: String,
        index: u64,
        total: u64,
        #[source]
        source: Box<KafkaError>,
    },

    /// Broker rejected a message larger than its limit
    #[error("Message of {size} bytes exceeds the {limit} byte limit")]
    MessageTooLarge { size: usize, limit: usize },

    /// Payload could not be serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Any other error reported by the broker client
    #[error("Broker error: {0}")]
    Broker(String),
}

impl KafkaError {
    /// Whether this error means the broker session is unusable
    pub fn is_fatal(&self) -> bool {
        match self {
            KafkaError::Connection(_) => true,
            KafkaError::Publish { source, .. } => source.is_fatal(),
            KafkaError::TopicAlreadyExists(_)
            | KafkaError::TopicNotFound(_)
            | KafkaError::UnknownEventGroup(_)
            | KafkaError::InvalidConfig(_)
            | KafkaError::MessageTooLarge { .. }
            | KafkaError::Serialization(_)
            | KafkaError::Broker(_) => false,
        }
    }
}

/// Result type alias for transport operations
pub type Result<T> = std::result::Result<T, KafkaError>;

// Lets broker code use `?` on librdkafka results
impl From<rdkafka::error::KafkaError> for KafkaError {
    fn from(err: rdkafka::error::KafkaError) -> Self {
        KafkaError::Broker(err.to_string())
    }
}

/// Error returned by a message handler
#[derive(Debug)]
pub struct HandlerError(Box<dyn std::error::Error + Send + Sync>);

impl HandlerError {
    /// Create a handler error from a message
    pub fn new(message: impl Into<String>) -> Self {
        let message: String = message.into();
        HandlerError(message.into())
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl std::error::Error for HandlerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

impl From<Box<dyn std::error::Error + Send + Sync>> for HandlerError {
    fn from(err: Box<dyn std::error::Error + Send + Sync>) -> Self {
        HandlerError(err)
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        HandlerError(Box::new(err))
    }
}

/// Non-fatal errors reported on the consumer error channel
#[derive(Error, Debug)]
pub enum ConsumerError {
    /// Reassembly buffer is full; the segment was dropped
    #[error("Reassembly buffer overflow on {topic} (key {key}): segment dropped")]
    BufferOverflow { topic: String, key: String },

    /// A segment declared a different total than earlier segments of its key
    #[error(
        "Segment count mismatch on {topic} (key {key}): expected {expected}, got {declared}; restarting assembly"
    )]
    ProtocolMismatch {
        topic: String,
        key: String,
        expected: u64,
        declared: u64,
    },

    /// A record could not be decoded as a segment
    #[error("Malformed segment at {topic}[{partition}]@{offset}: {reason}")]
    MalformedSegment {
        topic: String,
        partition: i32,
        offset: i64,
        reason: String,
    },

    /// A registered handler failed on a reassembled payload
    #[error("Handler for {topic} failed: {source}")]
    Handler {
        topic: String,
        #[source]
        source: HandlerError,
    },
}

impl ConsumerError {
    /// Topic the error was observed on
    pub fn topic(&self) -> &str {
        match self {
            ConsumerError::BufferOverflow { topic, .. }
            | ConsumerError::ProtocolMismatch { topic, .. }
            | ConsumerError::MalformedSegment { topic, .. }
            | ConsumerError::Handler { topic, .. } => topic,
        }
    }
}
