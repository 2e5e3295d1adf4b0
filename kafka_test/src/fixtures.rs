//! Test fixtures and data builders
//!
//! Payload builders, a recording handler and a background subscription.

use std::sync::Arc;

use async_trait::async_trait;
use chain_kafka::{
    Consumer, HandlerError, MessageHandler, ReassembledMessage, Result as KafkaResult,
};
use parking_lot::Mutex;
use rand::Rng;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::common::TEST_TIMEOUT;

/// Random payload of `len` bytes
pub fn random_payload(len: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..len).map(|_| rng.gen()).collect()
}

/// `count` payloads whose sizes grow by `step` bytes, starting at `first`
pub fn payload_series(count: usize, first: usize, step: usize) -> Vec<Vec<u8>> {
    (0..count).map(|i| random_payload(first + i * step)).collect()
}

/// Handler recording every payload it receives, in arrival order
#[derive(Clone, Default)]
pub struct Recorder {
    messages: Arc<Mutex<Vec<ReassembledMessage>>>,
    notify: Arc<Notify>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<ReassembledMessage> {
        self.messages.lock().clone()
    }

    pub fn payloads(&self) -> Vec<Vec<u8>> {
        self.messages().iter().map(|m| m.payload.to_vec()).collect()
    }

    /// Wait until `n` payloads arrived, or return what arrived by the timeout
    pub async fn wait_for(&self, n: usize) -> Vec<Vec<u8>> {
        let deadline = tokio::time::Instant::now() + TEST_TIMEOUT;
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
    async fn handle(&self, message: &ReassembledMessage) -> Result<(), HandlerError> {
        self.messages.lock().push(message.clone());
        self.notify.notify_waiters();
        Ok(())
    }
}

/// A consumer subscribed on a background task
pub struct Subscription {
    pub consumer: Arc<Consumer>,
    token: CancellationToken,
    task: JoinHandle<KafkaResult<()>>,
}

impl Subscription {
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

    /// Cancel and wait for the subscription to shut down
    pub async fn stop(self) -> Result<(), Box<dyn std::error::Error>> {
        self.token.cancel();
        tokio::time::timeout(TEST_TIMEOUT, self.task).await???;
        Ok(())
    }
}
