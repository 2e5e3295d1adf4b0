//! Broker session facade
//!
//! `Kafka` owns one broker session and hands out the admin, producer and
//! consumers that share it. The configuration is validated once here and
//! frozen behind an `Arc` for every component.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use super::admin::TopicAdmin;
use super::broker::{
    BrokerAdmin, RdKafkaBroker, RecordSender, RecordSubscriber, TopicMetadata,
};
use super::consumer::Consumer;
use super::error::Result;
use super::producer::{Producer, PublishReceipt};
use super::router::{EventGroup, TopicRouter};
use crate::config::KafkaConfig;

pub struct Kafka {
    config: Arc<KafkaConfig>,
    admin: TopicAdmin,
    producer: Producer,
    subscriber: Arc<dyn RecordSubscriber>,
    router: TopicRouter,
}

impl Kafka {
    /// Connect to the cluster named in `config` through librdkafka
    ///
    /// # Errors
    ///
    /// `InvalidConfig` for an invalid configuration, `Connection` if no
    /// broker is reachable.
    pub fn connect(config: KafkaConfig) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let broker = Arc::new(RdKafkaBroker::connect(Arc::clone(&config))?);
        Ok(Self::assemble(config, broker))
    }

    /// Use an already connected broker, e.g. `InMemoryBroker`
    pub fn with_broker<B>(config: KafkaConfig, broker: Arc<B>) -> Result<Self>
    where
        B: BrokerAdmin + RecordSender + RecordSubscriber + 'static,
    {
        config.validate()?;
        Ok(Self::assemble(Arc::new(config), broker))
    }

    fn assemble<B>(config: Arc<KafkaConfig>, broker: Arc<B>) -> Self
    where
        B: BrokerAdmin + RecordSender + RecordSubscriber + 'static,
    {
        Self {
            admin: TopicAdmin::new(broker.clone(), Arc::clone(&config)),
            producer: Producer::new(broker.clone(), Arc::clone(&config)),
            subscriber: broker,
            router: TopicRouter::from_config(&config),
            config,
        }
    }

    pub fn config(&self) -> &KafkaConfig {
        &self.config
    }

    pub fn admin(&self) -> &TopicAdmin {
        &self.admin
    }

    pub fn producer(&self) -> &Producer {
        &self.producer
    }

    pub fn router(&self) -> &TopicRouter {
        &self.router
    }

    /// New consumer in group `group_id` sharing this session's settings
    pub fn consumer(&self, group_id: &str) -> Result<Consumer> {
        Consumer::new(
            Arc::clone(&self.subscriber),
            Arc::clone(&self.config),
            group_id,
        )
    }

    pub async fn create_topic(&self, name: &str) -> Result<()> {
        self.admin.create_topic(name).await
    }

    pub async fn setup_topic(&self, name: &str) -> Result<()> {
        self.admin.setup_topic(name).await
    }

    pub async fn delete_topic(&self, name: &str) -> Result<()> {
        self.admin.delete_topic(name).await
    }

    pub async fn list_topics(&self) -> Result<HashMap<String, TopicMetadata>> {
        self.admin.list_topics().await
    }

    pub async fn publish(&self, topic: &str, payload: &[u8]) -> Result<PublishReceipt> {
        self.producer.publish(topic, payload).await
    }

    /// Publish on the topic of a symbolic event group
    pub async fn publish_event(&self, group_name: &str, payload: &[u8]) -> Result<PublishReceipt> {
        let topic = self.router.resolve(group_name)?;
        self.producer.publish(&topic, payload).await
    }

    /// Idempotently create the topic of every event group
    ///
    /// Returns the topic names in `EventGroup::ALL` order.
    pub async fn setup_event_topics(&self) -> Result<Vec<String>> {
        let mut topics = Vec::with_capacity(EventGroup::ALL.len());
        for group in EventGroup::ALL {
            let topic = self.router.topic_name(group);
            self.admin.setup_topic(&topic).await?;
            topics.push(topic);
        }
        Ok(topics)
    }

    /// Flush pending deliveries and release the session
    pub async fn close(self) -> Result<()> {
        self.producer.flush(self.config.delivery_timeout).await?;
        info!(brokers = %self.config.bootstrap_servers(), "Kafka session closed");
        Ok(())
    }
}
