//! Consumer group tests

use std::time::Duration;

use crate::assertions::{assert_payloads_in_order, ensure};
use crate::common::{TestResult, QUIET_PERIOD};
use crate::fixtures::{payload_series, Recorder, Subscription};
use crate::setup::TestContext;

/// Test two groups on the same topic each observe all payloads
pub async fn test_independent_groups() -> TestResult {
    let ctx = TestContext::with_config(|c| c.with_segment_size_bytes(50)).await?;
    for topic in ctx.kafka.setup_event_topics().await? {
        ctx.track_topic(&topic);
    }

    let payloads = payload_series(8, 10, 40);
    for payload in &payloads {
        ctx.kafka.publish_event("tracegroup", payload).await?;
    }

    let mut subscriptions = Vec::new();
    let mut recorders = Vec::new();
    for base in ["indexer", "archiver"] {
        let consumer = ctx.kafka.consumer(&ctx.unique_group(base))?;
        let recorder = Recorder::new();
        consumer.add_topic_and_handler("tracegroup", recorder.clone())?;
        subscriptions.push(Subscription::start(consumer));
        recorders.push(recorder);
    }

    for recorder in &recorders {
        let received = recorder.wait_for(payloads.len()).await;
        assert_payloads_in_order(&payloads, &received)?;
    }
    for subscription in subscriptions {
        subscription.stop().await?;
    }

    println!("    Both groups received all {} payloads", payloads.len());
    ctx.cleanup().await
}

/// Test a restarted group member continues after processed payloads
pub async fn test_group_resumes_after_commit() -> TestResult {
    let ctx = TestContext::new().await?;
    for topic in ctx.kafka.setup_event_topics().await? {
        ctx.track_topic(&topic);
    }
    let group = ctx.unique_group("resume");

    ctx.kafka.publish_event("blockgroup", b"first").await?;

    let consumer = ctx.kafka.consumer(&group)?;
    let recorder = Recorder::new();
    consumer.add_topic_and_handler("blockgroup", recorder.clone())?;
    let subscription = Subscription::start(consumer);
    recorder.wait_for(1).await;
    // Let the auto-commit interval pass so the stored offset reaches the broker
    tokio::time::sleep(Duration::from_secs(6)).await;
    subscription.stop().await?;

    ctx.kafka.publish_event("blockgroup", b"second").await?;

    let consumer = ctx.kafka.consumer(&group)?;
    let recorder = Recorder::new();
    consumer.add_topic_and_handler("blockgroup", recorder.clone())?;
    let subscription = Subscription::start(consumer);
    let received = recorder.wait_for(1).await;
    tokio::time::sleep(QUIET_PERIOD).await;
    let received_late = recorder.payloads();
    subscription.stop().await?;

    ensure(
        received == vec![b"second".to_vec()] && received_late.len() == 1,
        "Restarted group re-read processed payloads",
        "only \"second\"",
        format!("{} payloads", received_late.len()),
    )?;

    println!("    Restarted member resumed after the committed offset");
    ctx.cleanup().await
}
