// Test helpers for chain_kafka integration tests
//
// Every integration test runs against InMemoryBroker. This module provides
// configs, a recording handler and a way to run `Consumer::subscribe` in the
// background and stop it again.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chain_kafka::{
    Consumer, ConsumerError, HandlerError, InMemoryBroker, Kafka, KafkaConfig, MessageHandler,
    ReassembledMessage, Result,
};
use parking_lot::Mutex;
use rand::Rng;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const WAIT: Duration = Duration::from_secs(5);

pub fn test_config() -> KafkaConfig {
    KafkaConfig::default()
        .with_brokers(["memory:0"])
        .with_client_id("chain-kafka-it")
}

/// Session on a fresh in-memory broker
pub fn session(config: KafkaConfig) -> (Kafka, Arc<InMemoryBroker>) {
    let broker = Arc::new(InMemoryBroker::new());
    let kafka = Kafka::with_broker(config, broker.clone()).expect("valid config");
    (kafka, broker)
}

pub fn random_payload(len: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..len).map(|_| rng.gen()).collect()
}

/// Handler recording every payload in arrival order
#[derive(Clone, Default)]
pub struct Recorder {
    payloads: Arc<Mutex<Vec<Vec<u8>>>>,
    notify: Arc<Notify>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn payloads(&self) -> Vec<Vec<u8>> {
        self.payloads.lock().clone()
    }

    /// Wait for at least `n` payloads, returning whatever arrived by `WAIT`
    pub async fn wait_for(&self, n: usize) -> Vec<Vec<u8>> {
        let deadline = tokio::time::Instant::now() + WAIT;
        loop {
            let notified = self.notify.notified();
            let payloads = self.payloads();
            if payloads.len() >= n {
                return payloads;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.payloads();
            }
        }
    }
}

#[async_trait]
impl MessageHandler for Recorder {
    async fn handle(&self, message: &ReassembledMessage) -> std::result::Result<(), HandlerError> {
        self.payloads.lock().push(message.payload.to_vec());
        self.notify.notify_waiters();
        Ok(())
    }
}

/// A consumer running `subscribe` on a background task
pub struct Running {
    pub consumer: Arc<Consumer>,
    pub token: CancellationToken,
    pub task: JoinHandle<Result<()>>,
}

impl Running {
    pub fn start(consumer: Consumer) -> Self {
        let consumer = Arc::new(consumer);
        let token = CancellationToken::new();
        let task = tokio::spawn({
            let consumer = consumer.clone();
            let token = token.clone();
            async move { consumer.subscribe(token).await }
        });
        Self {
            consumer,
            token,
            task,
        }
    }

    /// Cancel and wait for `subscribe` to return
    pub async fn stop(self) -> Result<()> {
        self.token.cancel();
        tokio::time::timeout(WAIT, self.task)
            .await
            .expect("subscribe did not stop")
            .expect("subscribe task panicked")
    }
}

/// Next error from the channel, or `None` after `WAIT`
pub async fn next_error(errors: &mut mpsc::Receiver<ConsumerError>) -> Option<ConsumerError> {
    tokio::time::timeout(WAIT, errors.recv()).await.ok().flatten()
}
