//! Reassembly buffer limits
//!
//! Raw segments are written with `Producer::make_record` so payloads can
//! be left incomplete on purpose.

use chain_kafka::{ConsumerError, Producer};

use crate::assertions::ensure;
use crate::common::{TestResult, TEST_TIMEOUT};
use crate::fixtures::{Recorder, Subscription};
use crate::setup::TestContext;

/// Test a second incomplete key is dropped when the buffer holds one
///
/// This test:
/// 1. Writes the first of two segments for keys "m1" and "m2"
/// 2. Consumes with a buffer capacity of 1
/// 3. Verifies an overflow error naming "m2" and one pending payload
pub async fn test_buffer_overflow() -> TestResult {
    let ctx = TestContext::with_config(|c| c.with_max_message_number(1)).await?;
    let topic = ctx.unique_topic("overflow");
    ctx.kafka.create_topic(&topic).await?;

    let producer = ctx.kafka.producer();
    for key in ["m1", "m2"] {
        producer
            .send_record(Producer::make_record(&topic, key, &b"half"[..], 0, 2))
            .await?;
    }

    let consumer = ctx.kafka.consumer(&ctx.unique_group("overflow"))?;
    consumer.add_topic_handler(&topic, std::sync::Arc::new(Recorder::new()));
    let mut errors = consumer.take_errors().ok_or("error channel already taken")?;
    let subscription = Subscription::start(consumer);

    let error = tokio::time::timeout(TEST_TIMEOUT, errors.recv())
        .await?
        .ok_or("error channel closed")?;
    let key = match &error {
        ConsumerError::BufferOverflow { key, .. } => key.clone(),
        other => return Err(format!("unexpected consumer error: {}", other).into()),
    };
    ensure(key == "m2", "Overflow reported for the wrong key", "m2", key)?;

    let stats = subscription.consumer.stats();
    ensure(
        stats.overflows == 1 && stats.pending == 1,
        "Buffer state after overflow",
        "1 overflow, 1 pending",
        format!("{} overflows, {} pending", stats.overflows, stats.pending),
    )?;
    subscription.stop().await?;

    println!("    Overflow reported for m2, m1 still pending");
    ctx.cleanup().await
}

/// Test cancellation returns cleanly while a payload is incomplete
pub async fn test_cancel_with_pending_segments() -> TestResult {
    let ctx = TestContext::new().await?;
    let topic = ctx.unique_topic("cancel");
    ctx.kafka.create_topic(&topic).await?;

    ctx.kafka
        .producer()
        .send_record(Producer::make_record(&topic, "partial", &b"one of three"[..], 0, 3))
        .await?;

    let consumer = ctx.kafka.consumer(&ctx.unique_group("cancel"))?;
    let recorder = Recorder::new();
    consumer.add_topic_handler(&topic, std::sync::Arc::new(recorder.clone()));
    let subscription = Subscription::start(consumer);

    let deadline = tokio::time::Instant::now() + TEST_TIMEOUT;
    while subscription.consumer.stats().pending == 0 {
        if tokio::time::Instant::now() > deadline {
            return Err("segment never reached the buffer".into());
        }
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }

    let consumer = subscription.consumer.clone();
    subscription.stop().await?;

    ensure(
        recorder.payloads().is_empty() && consumer.stats().pending == 1,
        "Incomplete payload delivered or dropped",
        "nothing delivered, 1 pending",
        format!(
            "{} delivered, {} pending",
            recorder.payloads().len(),
            consumer.stats().pending
        ),
    )?;

    println!("    Subscription cancelled with 1 payload pending");
    ctx.cleanup().await
}
