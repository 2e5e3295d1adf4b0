//! Test environment setup and teardown
//!
//! Provides TestContext for test isolation with best-effort cleanup.

use std::sync::Arc;

use chain_kafka::{Kafka, KafkaConfig, TopicAdmin};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::common::{transport_config, TestResult};

/// Test context providing isolation and cleanup
///
/// Each test should create its own TestContext which:
/// - Generates unique topic/group names to prevent collisions
/// - Uses a unique topic environment so event-group topics are private
/// - Tracks created topics and deletes them in `cleanup` or on drop
pub struct TestContext {
    /// Unique identifier for this test run
    pub test_id: String,
    /// Session against the live broker
    pub kafka: Kafka,
    admin: TopicAdmin,
    topics_created: Arc<Mutex<Vec<String>>>,
}

impl TestContext {
    /// Connect with the default test configuration
    pub async fn new() -> Result<Self, Box<dyn std::error::Error>> {
        Self::with_config(|config| config).await
    }

    /// Connect after adjusting the default test configuration
    pub async fn with_config<F>(adjust: F) -> Result<Self, Box<dyn std::error::Error>>
    where
        F: FnOnce(KafkaConfig) -> KafkaConfig,
    {
        let test_id = Uuid::new_v4().simple().to_string()[..8].to_string();
        let config = adjust(transport_config(&format!("e2e-{}", test_id)));

        // Connecting fetches metadata synchronously
        let kafka = tokio::task::spawn_blocking(move || Kafka::connect(config)).await??;
        let admin = kafka.admin().clone();

        Ok(Self {
            test_id,
            kafka,
            admin,
            topics_created: Arc::new(Mutex::new(Vec::new())),
        })
    }

    /// Generate a unique topic name for this test
    ///
    /// The name is tracked for cleanup.
    pub fn unique_topic(&self, base: &str) -> String {
        let uuid_str = Uuid::new_v4().simple().to_string();
        let name = format!("{}-{}-{}", base, self.test_id, &uuid_str[..8]);
        self.track_topic(&name);
        name
    }

    /// Generate a unique consumer group ID for this test
    pub fn unique_group(&self, base: &str) -> String {
        let uuid_str = Uuid::new_v4().simple().to_string();
        format!("{}-{}-{}", base, self.test_id, &uuid_str[..8])
    }

    /// Remember a topic created outside `unique_topic`
    pub fn track_topic(&self, name: &str) {
        self.topics_created.lock().push(name.to_string());
    }

    /// Delete every tracked topic
    pub async fn cleanup(&self) -> TestResult {
        let topics: Vec<String> = self.topics_created.lock().drain(..).collect();
        for topic in topics {
            let _ = self.admin.delete_topic(&topic).await;
        }
        Ok(())
    }
}

impl Drop for TestContext {
    fn drop(&mut self) {
        // Best-effort: skipped if the runtime is shutting down
        let topics: Vec<String> = self.topics_created.lock().drain(..).collect();
        if topics.is_empty() {
            return;
        }
        let admin = self.admin.clone();
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                for topic in topics {
                    let _ = admin.delete_topic(&topic).await;
                }
            });
        }
    }
}
