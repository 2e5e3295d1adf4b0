//! Mock configuration and handlers for unit tests

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::config::KafkaConfig;
use crate::kafka::error::HandlerError;
use crate::kafka::reassembly::ReassembledMessage;
use crate::kafka::MessageHandler;

/// Returns a valid config with short timeouts and default topic naming
pub fn mock_config() -> KafkaConfig {
    KafkaConfig::default()
        .with_brokers(["memory:0"])
        .with_client_id("chain-kafka-test")
        .with_delivery_timeout(Duration::from_secs(1))
}

/// Handler that records every payload it receives
///
/// Clones share the same record. Set `fail` to make every call return an error
/// after recording the message.
#[derive(Clone, Default)]
pub struct CollectingHandler {
    received: Arc<Mutex<Vec<ReassembledMessage>>>,
    notify: Arc<Notify>,
    fail: bool,
}

impl CollectingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn received(&self) -> Vec<ReassembledMessage> {
        self.received.lock().clone()
    }

    /// Wait until at least `n` messages arrived or `timeout` passed
    pub async fn wait_for(&self, n: usize, timeout: Duration) -> Vec<ReassembledMessage> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.notify.notified();
            let received = self.received();
            if received.len() >= n {
                return received;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.received();
            }
        }
    }
}

#[async_trait]
impl MessageHandler for CollectingHandler {
    async fn handle(&self, message: &ReassembledMessage) -> Result<(), HandlerError> {
        self.received.lock().push(message.clone());
        self.notify.notify_waiters();
        if self.fail {
            return Err(HandlerError::new(format!(
                "rejected payload {}",
                message.key_str()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn message() -> ReassembledMessage {
        ReassembledMessage {
            topic: "t".to_string(),
            key: Bytes::from_static(b"k"),
            payload: Bytes::from_static(b"p"),
            segments: 1,
        }
    }

    #[test]
    fn test_mock_config_is_valid() {
        let config = mock_config();
        assert!(config.validate().is_ok());
        assert_eq!(config.bootstrap_servers(), "memory:0");
    }

    #[tokio::test]
    async fn test_collecting_handler_records_and_fails() {
        let handler = CollectingHandler::failing();
        assert!(handler.handle(&message()).await.is_err());
        assert_eq!(handler.wait_for(1, Duration::from_millis(10)).await.len(), 1);
    }
}
