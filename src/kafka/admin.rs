//! Topic administration
//!
//! Thin layer over [`BrokerAdmin`] that applies the configured partition and
//! replication defaults and provides the idempotent `setup_topic`.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use super::broker::{BrokerAdmin, TopicMetadata, TopicSpec};
use super::error::{KafkaError, Result};
use crate::config::KafkaConfig;

#[derive(Clone)]
pub struct TopicAdmin {
    admin: Arc<dyn BrokerAdmin>,
    config: Arc<KafkaConfig>,
}

impl TopicAdmin {
    pub fn new(admin: Arc<dyn BrokerAdmin>, config: Arc<KafkaConfig>) -> Self {
        Self { admin, config }
    }

    /// Create `name` with the configured partitions and replicas
    ///
    /// Fails with `TopicAlreadyExists` if the topic is present.
    pub async fn create_topic(&self, name: &str) -> Result<()> {
        self.create_topic_with(TopicSpec::new(
            name,
            self.config.partitions,
            self.config.replicas,
        ))
        .await
    }

    /// Create a topic with explicit partition and replication counts
    pub async fn create_topic_with(&self, spec: TopicSpec) -> Result<()> {
        if spec.partitions < 1 || spec.replication < 1 {
            return Err(KafkaError::InvalidConfig(format!(
                "topic {} needs at least one partition and replica, got {}/{}",
                spec.name, spec.partitions, spec.replication
            )));
        }
        self.admin.create_topic(&spec).await
    }

    /// Create `name` unless it already exists
    pub async fn setup_topic(&self, name: &str) -> Result<()> {
        match self.create_topic(name).await {
            Err(KafkaError::TopicAlreadyExists(_)) => {
                debug!(topic = name, "Topic already exists");
                Ok(())
            }
            other => other,
        }
    }

    /// Delete `name`; fails with `TopicNotFound` if absent
    pub async fn delete_topic(&self, name: &str) -> Result<()> {
        self.admin.delete_topic(name).await
    }

    /// Topics known to the cluster, by name
    pub async fn list_topics(&self) -> Result<HashMap<String, TopicMetadata>> {
        self.admin.list_topics().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kafka::broker::InMemoryBroker;
    use crate::testing::mock_config;

    fn admin() -> TopicAdmin {
        TopicAdmin::new(
            Arc::new(InMemoryBroker::new()),
            Arc::new(mock_config().with_partitions(3)),
        )
    }

    #[tokio::test]
    async fn test_create_uses_configured_partitions() {
        let admin = admin();
        admin.create_topic("blocks").await.unwrap();
        let topics = admin.list_topics().await.unwrap();
        assert_eq!(topics["blocks"].partitions, 3);
    }

    #[tokio::test]
    async fn test_create_twice_fails_but_setup_does_not() {
        let admin = admin();
        admin.create_topic("blocks").await.unwrap();
        assert!(matches!(
            admin.create_topic("blocks").await,
            Err(KafkaError::TopicAlreadyExists(_))
        ));

        admin.setup_topic("blocks").await.unwrap();
        admin.setup_topic("traces").await.unwrap();
        admin.setup_topic("traces").await.unwrap();
        assert_eq!(admin.list_topics().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_delete_topic() {
        let admin = admin();
        admin.create_topic("blocks").await.unwrap();
        admin.delete_topic("blocks").await.unwrap();
        assert!(matches!(
            admin.delete_topic("blocks").await,
            Err(KafkaError::TopicNotFound(_))
        ));
        assert!(admin.list_topics().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejects_zero_partitions() {
        let err = admin()
            .create_topic_with(TopicSpec::new("t", 0, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, KafkaError::InvalidConfig(_)));
    }
}
