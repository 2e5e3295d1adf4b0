//! Admin E2E tests
//!
//! Tests for topic lifecycle through the transport:
//! - create_topic / TopicAlreadyExists
//! - setup_topic idempotency
//! - delete_topic / TopicNotFound
//! - setup_event_topics

use std::time::Duration;

use chain_kafka::{KafkaError, TopicSpec};

use crate::assertions::ensure;
use crate::common::TestResult;
use crate::setup::TestContext;

/// Metadata is eventually consistent with the controller
async fn wait_for_topic(ctx: &TestContext, topic: &str, present: bool) -> Result<bool, KafkaError> {
    for _ in 0..20 {
        if ctx.kafka.list_topics().await?.contains_key(topic) == present {
            return Ok(true);
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
    Ok(false)
}

/// Test creating a new topic with explicit partitions
pub async fn test_create_topic() -> TestResult {
    let ctx = TestContext::new().await?;
    let topic = ctx.unique_topic("admin-create");

    ctx.kafka
        .admin()
        .create_topic_with(TopicSpec::new(&topic, 3, 1))
        .await?;

    ensure(
        wait_for_topic(&ctx, &topic, true).await?,
        "Topic not listed after creation",
        format!("'{}' in metadata", topic),
        "missing",
    )?;
    let partitions = ctx.kafka.list_topics().await?[&topic].partitions;
    ensure(partitions == 3, "Wrong partition count", "3", partitions.to_string())?;

    println!("    Created topic '{}' with 3 partitions", topic);
    ctx.cleanup().await
}

/// Test creating a topic that already exists
pub async fn test_create_topic_already_exists() -> TestResult {
    let ctx = TestContext::new().await?;
    let topic = ctx.unique_topic("admin-exists");

    ctx.kafka.create_topic(&topic).await?;
    let second = ctx.kafka.create_topic(&topic).await;
    ensure(
        matches!(second, Err(KafkaError::TopicAlreadyExists(_))),
        "Second create should fail",
        "TopicAlreadyExists",
        format!("{:?}", second),
    )?;

    println!("    Second create rejected as expected");
    ctx.cleanup().await
}

/// Test that setup_topic never fails for an existing topic
pub async fn test_setup_topic_idempotent() -> TestResult {
    let ctx = TestContext::new().await?;
    let topic = ctx.unique_topic("admin-setup");

    ctx.kafka.setup_topic(&topic).await?;
    ctx.kafka.setup_topic(&topic).await?;

    println!("    setup_topic succeeded twice");
    ctx.cleanup().await
}

/// Test deleting a topic and deleting it again
pub async fn test_delete_topic() -> TestResult {
    let ctx = TestContext::new().await?;
    let topic = ctx.unique_group("admin-delete");

    ctx.kafka.create_topic(&topic).await?;
    wait_for_topic(&ctx, &topic, true).await?;
    ctx.kafka.delete_topic(&topic).await?;

    ensure(
        wait_for_topic(&ctx, &topic, false).await?,
        "Topic still listed after deletion",
        "absent",
        "present",
    )?;

    let again = ctx.kafka.delete_topic(&topic).await;
    ensure(
        matches!(again, Err(KafkaError::TopicNotFound(_))),
        "Deleting a missing topic should fail",
        "TopicNotFound",
        format!("{:?}", again),
    )?;

    println!("    Deleted '{}'", topic);
    Ok(())
}

/// Test creating the topic of every event group
pub async fn test_setup_event_topics() -> TestResult {
    let ctx = TestContext::new().await?;

    let topics = ctx.kafka.setup_event_topics().await?;
    for topic in &topics {
        ctx.track_topic(topic);
    }
    ctx.kafka.setup_event_topics().await?;

    ensure(
        topics.iter().all(|t| t.starts_with(&format!("e2e-{}.en-0.", ctx.test_id))),
        "Event topics not named by the router",
        "e2e-<id>.en-0.<group>",
        format!("{:?}", topics),
    )?;

    println!("    Event topics: {:?}", topics);
    ctx.cleanup().await
}
