//! Segment publishing tests
//!
//! Reads what the producer wrote with a plain rdkafka consumer, so the
//! checks do not depend on the transport's own decoding.

use std::collections::BTreeMap;

use chain_kafka::kafka::constants::{HEADER_SEGMENT_IDX, HEADER_TOTAL_SEGMENTS};
use rdkafka::consumer::Consumer;
use rdkafka::message::{Headers, Message};

use crate::assertions::ensure;
use crate::common::{create_raw_consumer, TestResult, TEST_TIMEOUT};
use crate::fixtures::random_payload;
use crate::setup::TestContext;

fn header_u64(message: &impl Message, name: &str) -> Option<u64> {
    let headers = message.headers()?;
    let header = headers.iter().find(|h| h.key == name)?;
    let bytes: [u8; 8] = header.value?.try_into().ok()?;
    Some(u64::from_be_bytes(bytes))
}

/// Test that segments carry the key and 8-byte big-endian headers
///
/// This test:
/// 1. Publishes a 1000-byte payload with 300-byte segments
/// 2. Reads the four raw messages back with a plain consumer
/// 3. Verifies key, header values and segment bytes
pub async fn test_segment_wire_format() -> TestResult {
    let ctx = TestContext::with_config(|c| c.with_segment_size_bytes(300)).await?;
    let topic = ctx.unique_topic("wire-format");
    ctx.kafka.create_topic(&topic).await?;

    let payload = random_payload(1000);
    let receipt = ctx.kafka.publish(&topic, &payload).await?;
    ensure(receipt.segments == 4, "Wrong segment count", "4", receipt.segments.to_string())?;

    let consumer = create_raw_consumer(&ctx.unique_group("wire-format"))?;
    consumer.subscribe(&[topic.as_str()])?;

    let mut segments = BTreeMap::new();
    while segments.len() < 4 {
        let message = tokio::time::timeout(TEST_TIMEOUT, consumer.recv()).await??;

        let key = message.key().map(|k| String::from_utf8_lossy(k).into_owned());
        ensure(
            key.as_deref() == Some(receipt.key.as_str()),
            "Segment key differs from correlation key",
            receipt.key.clone(),
            format!("{:?}", key),
        )?;

        let total = header_u64(&message, HEADER_TOTAL_SEGMENTS);
        let index = header_u64(&message, HEADER_SEGMENT_IDX);
        ensure(
            total == Some(4),
            "Bad totalSegments header",
            "4",
            format!("{:?}", total),
        )?;
        let index = index.ok_or("missing segmentIdx header")?;
        segments.insert(index, message.payload().unwrap_or_default().to_vec());
    }

    let joined: Vec<u8> = segments.into_values().flatten().collect();
    ensure(
        joined == payload,
        "Concatenated segments differ from payload",
        "original 1000 bytes",
        format!("{} bytes", joined.len()),
    )?;

    println!("    4 segments with key {} and correct headers", receipt.key);
    ctx.cleanup().await
}

/// Test that all segments of one payload land on one partition
pub async fn test_publish_receipt() -> TestResult {
    let ctx = TestContext::with_config(|c| c.with_partitions(3).with_segment_size_bytes(64)).await?;
    let topic = ctx.unique_topic("receipt");
    ctx.kafka.create_topic(&topic).await?;

    let first = ctx.kafka.publish(&topic, &random_payload(640)).await?;
    let second = ctx.kafka.publish(&topic, &random_payload(640)).await?;
    ensure(first.segments == 10, "Wrong segment count", "10", first.segments.to_string())?;
    ensure(first.key != second.key, "Correlation keys repeat", "distinct", "equal")?;

    let consumer = create_raw_consumer(&ctx.unique_group("receipt"))?;
    consumer.subscribe(&[topic.as_str()])?;

    let mut partitions: BTreeMap<String, std::collections::BTreeSet<i32>> = BTreeMap::new();
    for _ in 0..20 {
        let message = tokio::time::timeout(TEST_TIMEOUT, consumer.recv()).await??;
        let key = message
            .key()
            .map(|k| String::from_utf8_lossy(k).into_owned())
            .unwrap_or_default();
        partitions.entry(key).or_default().insert(message.partition());
    }

    for (key, seen) in &partitions {
        ensure(
            seen.len() == 1,
            "Segments of one payload spread over partitions",
            format!("one partition for {}", key),
            format!("{:?}", seen),
        )?;
    }
    ensure(
        partitions[&first.key].contains(&first.partition),
        "Receipt partition differs from delivery",
        first.partition.to_string(),
        format!("{:?}", partitions[&first.key]),
    )?;

    println!("    Both payloads stayed on a single partition each");
    ctx.cleanup().await
}
