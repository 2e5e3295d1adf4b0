//! Reassembly tests
//!
//! Each test publishes through the transport and consumes through
//! `Consumer::subscribe`, registering handlers by event group.

use serde::{Deserialize, Serialize};

use crate::assertions::{assert_payloads_in_order, assert_same_payloads, ensure};
use crate::common::TestResult;
use crate::fixtures::{payload_series, random_payload, Recorder, Subscription};
use crate::setup::TestContext;

/// Publish `payloads` to the block group and collect them with one consumer
async fn round_trip(ctx: &TestContext, payloads: &[Vec<u8>]) -> Result<Vec<Vec<u8>>, Box<dyn std::error::Error>> {
    let topics = ctx.kafka.setup_event_topics().await?;
    for topic in &topics {
        ctx.track_topic(topic);
    }

    for payload in payloads {
        ctx.kafka.publish_event("blockgroup", payload).await?;
    }

    let consumer = ctx.kafka.consumer(&ctx.unique_group("reassembly"))?;
    let recorder = Recorder::new();
    consumer.add_topic_and_handler("blockgroup", recorder.clone())?;
    let subscription = Subscription::start(consumer);

    let received = recorder.wait_for(payloads.len()).await;
    subscription.stop().await?;
    Ok(received)
}

/// Test K payloads on one partition arrive complete and in publish order
pub async fn test_single_partition_order() -> TestResult {
    let ctx = TestContext::with_config(|c| c.with_segment_size_bytes(100)).await?;
    let payloads = payload_series(10, 0, 150);

    let received = round_trip(&ctx, &payloads).await?;
    assert_payloads_in_order(&payloads, &received)?;

    println!("    {} payloads reassembled in order", received.len());
    ctx.cleanup().await
}

/// Test K payloads on a two-partition topic arrive as a set
pub async fn test_multi_partition_reassembly() -> TestResult {
    let ctx = TestContext::with_config(|c| c.with_partitions(2).with_segment_size_bytes(100)).await?;
    let payloads = payload_series(20, 50, 60);

    let received = round_trip(&ctx, &payloads).await?;
    assert_same_payloads(&payloads, &received)?;

    println!("    {} payloads reassembled across 2 partitions", received.len());
    ctx.cleanup().await
}

/// Test several group members in one process share the buffer correctly
pub async fn test_parallel_readers() -> TestResult {
    let ctx = TestContext::with_config(|c| {
        c.with_partitions(4)
            .with_segment_size_bytes(64)
            .with_reader_tasks(4)
    })
    .await?;
    let payloads = payload_series(40, 100, 17);

    let received = round_trip(&ctx, &payloads).await?;
    assert_same_payloads(&payloads, &received)?;

    println!("    {} payloads reassembled by 4 readers", received.len());
    ctx.cleanup().await
}

/// Test a payload five times the broker message limit with default segment size
pub async fn test_large_payload() -> TestResult {
    let ctx = TestContext::new().await?;
    let payloads = vec![random_payload(5_000_000)];

    let received = round_trip(&ctx, &payloads).await?;
    ensure(
        received.len() == 1,
        "Large payload not delivered",
        "1 payload",
        format!("{} payloads", received.len()),
    )?;
    assert_payloads_in_order(&payloads, &received)?;

    println!("    5 MB payload reassembled with default segment size");
    ctx.cleanup().await
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Block {
    number: u64,
    hash: String,
    transactions: Vec<String>,
}

/// Test a JSON block spanning many segments decodes to the same value
pub async fn test_json_payload() -> TestResult {
    let ctx = TestContext::with_config(|c| c.with_segment_size_bytes(256)).await?;
    let topics = ctx.kafka.setup_event_topics().await?;
    for topic in &topics {
        ctx.track_topic(topic);
    }
    let topic = ctx.kafka.router().resolve("blockgroup")?;

    let block = Block {
        number: 19_000_000,
        hash: format!("0x{}", "ab".repeat(32)),
        transactions: (0..50).map(|i| format!("0x{:064x}", i)).collect(),
    };
    let receipt = ctx.kafka.producer().publish_json(&topic, &block).await?;

    let consumer = ctx.kafka.consumer(&ctx.unique_group("json"))?;
    let recorder = Recorder::new();
    consumer.add_topic_and_handler("blockgroup", recorder.clone())?;
    let subscription = Subscription::start(consumer);
    recorder.wait_for(1).await;
    subscription.stop().await?;

    let messages = recorder.messages();
    let message = messages.first().ok_or("JSON block not delivered")?;
    let decoded: Block = message.decode_json()?;
    ensure(
        decoded == block && message.key_str() == receipt.key,
        "Decoded block differs",
        format!("block {} under key {}", block.number, receipt.key),
        format!("block {} under key {}", decoded.number, message.key_str()),
    )?;

    println!("    JSON block reassembled from {} segments", receipt.segments);
    ctx.cleanup().await
}
