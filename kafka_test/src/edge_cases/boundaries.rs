//! Boundary tests

use chain_kafka::KafkaError;

use crate::assertions::ensure;
use crate::common::TestResult;
use crate::fixtures::{Recorder, Subscription};
use crate::setup::TestContext;

/// Test an unknown event group fails registration and publish
pub async fn test_unknown_event_group() -> TestResult {
    let ctx = TestContext::new().await?;

    let consumer = ctx.kafka.consumer(&ctx.unique_group("unknown"))?;
    let registered = consumer.add_topic_and_handler("not-available-event", Recorder::new());
    ensure(
        matches!(registered, Err(KafkaError::UnknownEventGroup(_))),
        "Registration accepted an unknown group",
        "UnknownEventGroup",
        format!("{:?}", registered),
    )?;
    ensure(
        consumer.topics().is_empty(),
        "Failed registration subscribed a topic",
        "no topics",
        format!("{:?}", consumer.topics()),
    )?;

    let published = ctx.kafka.publish_event("not-available-event", b"x").await;
    ensure(
        matches!(published, Err(KafkaError::UnknownEventGroup(_))),
        "Publish accepted an unknown group",
        "UnknownEventGroup",
        format!("{:?}", published.map(|r| r.key)),
    )?;

    println!("    Unknown event group rejected");
    ctx.cleanup().await
}

/// Test an empty payload is delivered as one empty segment
pub async fn test_empty_payload() -> TestResult {
    let ctx = TestContext::new().await?;
    for topic in ctx.kafka.setup_event_topics().await? {
        ctx.track_topic(&topic);
    }

    let receipt = ctx.kafka.publish_event("blockgroup", b"").await?;
    ensure(
        receipt.segments == 1,
        "Empty payload segment count",
        "1",
        receipt.segments.to_string(),
    )?;

    let consumer = ctx.kafka.consumer(&ctx.unique_group("empty"))?;
    let recorder = Recorder::new();
    consumer.add_topic_and_handler("blockgroup", recorder.clone())?;
    let subscription = Subscription::start(consumer);
    let received = recorder.wait_for(1).await;
    subscription.stop().await?;

    ensure(
        received == vec![Vec::<u8>::new()],
        "Empty payload not delivered",
        "one empty payload",
        format!("{} payloads", received.len()),
    )?;

    println!("    Empty payload delivered as one segment");
    ctx.cleanup().await
}
