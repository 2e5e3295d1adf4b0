//! Common utilities shared across E2E test modules
//!
//! Broker address, transport configuration and the test result type.

use std::env;
use std::time::Duration;

use chain_kafka::KafkaConfig;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::StreamConsumer;

/// Test result type alias for cleaner function signatures
pub type TestResult = Result<(), Box<dyn std::error::Error>>;

/// Get bootstrap servers from KAFKA_BOOTSTRAP_SERVERS or use default
pub fn get_bootstrap_servers() -> String {
    env::var("KAFKA_BOOTSTRAP_SERVERS").unwrap_or_else(|_| "localhost:9092".to_string())
}

/// Transport config pointed at the test broker
///
/// Topic naming uses `environment` so event-group topics never collide
/// between tests.
pub fn transport_config(environment: &str) -> KafkaConfig {
    KafkaConfig::default()
        .with_brokers(get_bootstrap_servers().split(',').map(str::to_string))
        .with_client_id("chain-kafka-e2e")
        .with_topic_naming(environment, "en-0")
        .with_delivery_timeout(Duration::from_secs(10))
}

/// Plain rdkafka consumer for inspecting raw segment messages
pub fn create_raw_consumer(group_id: &str) -> Result<StreamConsumer, Box<dyn std::error::Error>> {
    let consumer: StreamConsumer = ClientConfig::new()
        .set("bootstrap.servers", get_bootstrap_servers())
        .set("group.id", group_id)
        .set("auto.offset.reset", "earliest")
        .set("enable.auto.commit", "false")
        .create()?;

    Ok(consumer)
}

/// Default test timeout duration
pub const TEST_TIMEOUT: Duration = Duration::from_secs(30);

/// How long a negative test waits to be sure nothing arrives
pub const QUIET_PERIOD: Duration = Duration::from_secs(3);
