// Configuration module for chain_kafka
//
// KafkaConfig is built once (defaults, environment, builder methods), validated,
// and then shared read-only: every component stores an Arc<KafkaConfig> and only
// hands out &KafkaConfig, so nothing can change the settings of a running
// producer or consumer.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::kafka::constants::{
    DEFAULT_ADMIN_TIMEOUT_MS, DEFAULT_BROKER, DEFAULT_CLIENT_ID, DEFAULT_DELIVERY_TIMEOUT_MS,
    DEFAULT_ERROR_CHANNEL_CAPACITY, DEFAULT_MAX_MESSAGE_BYTES, DEFAULT_MAX_MESSAGE_NUMBER,
    DEFAULT_PARTITIONS, DEFAULT_READER_TASKS, DEFAULT_REPLICAS, DEFAULT_REQUIRED_ACKS,
    DEFAULT_SEGMENT_SIZE_BYTES, DEFAULT_TOPIC_ENVIRONMENT, DEFAULT_TOPIC_RESOURCE, ENV_BROKERS,
    ENV_INITIAL_OFFSET, ENV_MAX_MESSAGE_BYTES, ENV_MAX_MESSAGE_NUMBER, ENV_PARTITIONS,
    ENV_REPLICAS, ENV_REQUIRED_ACKS, ENV_SEGMENT_SIZE_BYTES, ENV_TOPIC_ENVIRONMENT,
    SEGMENT_OVERHEAD_BYTES,
    ENV_TOPIC_RESOURCE, MAX_READER_TASKS, VALID_REQUIRED_ACKS,
};
use crate::kafka::error::{KafkaError, Result};

/// Where a consumer group starts reading when it has no committed offset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InitialOffset {
    /// Start from the earliest retained message
    #[default]
    Oldest,
    /// Start from messages produced after subscribing
    Newest,
}

impl InitialOffset {
    /// Parse from a config string ("oldest"/"earliest" or "newest"/"latest")
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "oldest" | "earliest" => Some(InitialOffset::Oldest),
            "newest" | "latest" => Some(InitialOffset::Newest),
            _ => None,
        }
    }

    /// Value for librdkafka's `auto.offset.reset`
    pub fn as_offset_reset(&self) -> &'static str {
        match self {
            InitialOffset::Oldest => "earliest",
            InitialOffset::Newest => "latest",
        }
    }
}

/// Connection and tuning parameters shared by admin, producer and consumer
#[derive(Debug, Clone)]
pub struct KafkaConfig {
    /// Bootstrap brokers ("host:port")
    pub brokers: Vec<String>,
    /// Maximum value bytes per segment
    pub segment_size_bytes: usize,
    /// Partition count for newly created topics
    pub partitions: i32,
    /// Replication factor for newly created topics
    pub replicas: i32,
    /// Maximum size of one broker message
    pub max_message_bytes: usize,
    /// Producer acknowledgement level (-1, 0 or 1)
    pub required_acks: i32,
    /// Capacity of the reassembly buffer
    pub max_message_number: usize,
    /// Topic name environment component (e.g. "prod")
    pub topic_environment: String,
    /// Topic name resource component (e.g. "en-0")
    pub topic_resource: String,
    /// Offset policy for groups without committed offsets
    pub initial_offset: InitialOffset,
    /// Capacity of the consumer error channel
    pub error_channel_capacity: usize,
    /// Group members opened by one subscription
    pub reader_tasks: usize,
    /// Client identifier reported to the broker
    pub client_id: String,
    /// How long a produced segment may wait for delivery
    pub delivery_timeout: Duration,
    /// Timeout for admin and metadata requests
    pub admin_timeout: Duration,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            brokers: vec![DEFAULT_BROKER.to_string()],
            segment_size_bytes: DEFAULT_SEGMENT_SIZE_BYTES,
            partitions: DEFAULT_PARTITIONS,
            replicas: DEFAULT_REPLICAS,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
            required_acks: DEFAULT_REQUIRED_ACKS,
            max_message_number: DEFAULT_MAX_MESSAGE_NUMBER,
            topic_environment: DEFAULT_TOPIC_ENVIRONMENT.to_string(),
            topic_resource: DEFAULT_TOPIC_RESOURCE.to_string(),
            initial_offset: InitialOffset::default(),
            error_channel_capacity: DEFAULT_ERROR_CHANNEL_CAPACITY,
            reader_tasks: DEFAULT_READER_TASKS,
            client_id: DEFAULT_CLIENT_ID.to_string(),
            delivery_timeout: Duration::from_millis(DEFAULT_DELIVERY_TIMEOUT_MS),
            admin_timeout: Duration::from_millis(DEFAULT_ADMIN_TIMEOUT_MS),
        }
    }
}

impl KafkaConfig {
    /// Load the configuration from `CHAIN_KAFKA_*` environment variables
    ///
    /// Unset variables keep their defaults. The result is validated.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(brokers) = lookup(ENV_BROKERS) {
            config.brokers = brokers
                .split(',')
                .map(str::trim)
                .filter(|b| !b.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(v) = lookup(ENV_PARTITIONS) {
            config.partitions = parse_var(ENV_PARTITIONS, &v)?;
        }
        if let Some(v) = lookup(ENV_REPLICAS) {
            config.replicas = parse_var(ENV_REPLICAS, &v)?;
        }
        if let Some(v) = lookup(ENV_SEGMENT_SIZE_BYTES) {
            config.segment_size_bytes = parse_var(ENV_SEGMENT_SIZE_BYTES, &v)?;
        }
        if let Some(v) = lookup(ENV_MAX_MESSAGE_BYTES) {
            config.max_message_bytes = parse_var(ENV_MAX_MESSAGE_BYTES, &v)?;
        }
        if let Some(v) = lookup(ENV_REQUIRED_ACKS) {
            config.required_acks = parse_var(ENV_REQUIRED_ACKS, &v)?;
        }
        if let Some(v) = lookup(ENV_MAX_MESSAGE_NUMBER) {
            config.max_message_number = parse_var(ENV_MAX_MESSAGE_NUMBER, &v)?;
        }
        if let Some(v) = lookup(ENV_TOPIC_ENVIRONMENT) {
            config.topic_environment = v;
        }
        if let Some(v) = lookup(ENV_TOPIC_RESOURCE) {
            config.topic_resource = v;
        }
        if let Some(v) = lookup(ENV_INITIAL_OFFSET) {
            config.initial_offset = InitialOffset::parse(&v).ok_or_else(|| {
                KafkaError::InvalidConfig(format!("{} must be oldest or newest, got {:?}", ENV_INITIAL_OFFSET, v))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn with_brokers<I, S>(mut self, brokers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.brokers = brokers.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_segment_size_bytes(mut self, bytes: usize) -> Self {
        self.segment_size_bytes = bytes;
        self
    }

    pub fn with_partitions(mut self, partitions: i32) -> Self {
        self.partitions = partitions;
        self
    }

    pub fn with_replicas(mut self, replicas: i32) -> Self {
        self.replicas = replicas;
        self
    }

    pub fn with_max_message_bytes(mut self, bytes: usize) -> Self {
        self.max_message_bytes = bytes;
        self
    }

    pub fn with_required_acks(mut self, acks: i32) -> Self {
        self.required_acks = acks;
        self
    }

    pub fn with_max_message_number(mut self, n: usize) -> Self {
        self.max_message_number = n;
        self
    }

    pub fn with_topic_naming(
        mut self,
        environment: impl Into<String>,
        resource: impl Into<String>,
    ) -> Self {
        self.topic_environment = environment.into();
        self.topic_resource = resource.into();
        self
    }

    pub fn with_initial_offset(mut self, offset: InitialOffset) -> Self {
        self.initial_offset = offset;
        self
    }

    pub fn with_error_channel_capacity(mut self, capacity: usize) -> Self {
        self.error_channel_capacity = capacity;
        self
    }

    pub fn with_reader_tasks(mut self, tasks: usize) -> Self {
        self.reader_tasks = tasks;
        self
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    pub fn with_delivery_timeout(mut self, timeout: Duration) -> Self {
        self.delivery_timeout = timeout;
        self
    }

    /// Comma-separated broker list as librdkafka expects it
    pub fn bootstrap_servers(&self) -> String {
        self.brokers.join(",")
    }

    /// Check every value against its allowed range
    pub fn validate(&self) -> Result<()> {
        if self.brokers.is_empty() {
            return Err(KafkaError::InvalidConfig(
                "at least one broker is required".to_string(),
            ));
        }
        let segment_limit = self
            .max_message_bytes
            .saturating_sub(SEGMENT_OVERHEAD_BYTES);
        if self.segment_size_bytes == 0 || self.segment_size_bytes > segment_limit {
            return Err(KafkaError::InvalidConfig(format!(
                "segment_size_bytes must be between 1 and max_message_bytes - {} ({}), got {}",
                SEGMENT_OVERHEAD_BYTES, segment_limit, self.segment_size_bytes
            )));
        }
        if self.partitions < 1 {
            return Err(KafkaError::InvalidConfig(format!(
                "partitions must be at least 1, got {}",
                self.partitions
            )));
        }
        if self.replicas < 1 {
            return Err(KafkaError::InvalidConfig(format!(
                "replicas must be at least 1, got {}",
                self.replicas
            )));
        }
        if !VALID_REQUIRED_ACKS.contains(&self.required_acks) {
            return Err(KafkaError::InvalidConfig(format!(
                "required_acks must be one of {:?}, got {}",
                VALID_REQUIRED_ACKS, self.required_acks
            )));
        }
        if self.max_message_number == 0 {
            return Err(KafkaError::InvalidConfig(
                "max_message_number must be at least 1".to_string(),
            ));
        }
        if self.error_channel_capacity == 0 {
            return Err(KafkaError::InvalidConfig(
                "error_channel_capacity must be at least 1".to_string(),
            ));
        }
        if self.reader_tasks == 0 || self.reader_tasks > MAX_READER_TASKS {
            return Err(KafkaError::InvalidConfig(format!(
                "reader_tasks must be between 1 and {}, got {}",
                MAX_READER_TASKS, self.reader_tasks
            )));
        }
        if self.topic_environment.is_empty() || self.topic_resource.is_empty() {
            return Err(KafkaError::InvalidConfig(
                "topic environment and resource must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_var<T: FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| KafkaError::InvalidConfig(format!("{} has an invalid value: {:?}", name, value)))
}
