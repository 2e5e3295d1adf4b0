// Integration tests for publish → broker → reassembly → handler
//
// Tests end-to-end behavior against InMemoryBroker, including:
// - Ordered delivery on one partition, set delivery across partitions
// - Fan-out to independent consumer groups
// - Reassembly buffer overflow and incomplete payloads
// - Topic administration and event-group registration
// - Cancellation and fatal broker errors

mod helpers;

use std::collections::BTreeSet;
use std::time::Duration;

use chain_kafka::{
    ConsumerError, HandlerError, InitialOffset, KafkaError, Producer, ReassembledMessage,
    RecordSender,
};
use helpers::{next_error, random_payload, session, test_config, Recorder, Running};

const BLOCKS: &str = "local.en-0.blockgroup";
const TRACES: &str = "local.en-0.tracegroup";

#[tokio::test]
async fn test_single_partition_preserves_publish_order() {
    let (kafka, _broker) = session(test_config().with_segment_size_bytes(3));
    kafka.create_topic(BLOCKS).await.unwrap();

    let payloads: Vec<Vec<u8>> = (0..10).map(|i| random_payload(i * 7)).collect();
    for payload in &payloads {
        kafka.publish_event("blockgroup", payload).await.unwrap();
    }

    let consumer = kafka.consumer("indexer").unwrap();
    let recorder = Recorder::new();
    consumer
        .add_topic_and_handler("blockgroup", recorder.clone())
        .unwrap();
    let running = Running::start(consumer);

    let received = recorder.wait_for(payloads.len()).await;
    assert_eq!(received, payloads);

    let consumer = running.consumer.clone();
    running.stop().await.unwrap();
    let stats = consumer.stats();
    assert_eq!(stats.completed, 10);
    assert_eq!(stats.pending, 0);
    assert_eq!(stats.overflows, 0);
}

#[tokio::test]
async fn test_default_config_carries_payloads_above_message_limit() {
    let config = test_config();
    let limit = config.max_message_bytes;
    let (kafka, broker) = session(config);
    kafka.create_topic(BLOCKS).await.unwrap();

    let payload = random_payload(5_000_000);
    let receipt = kafka.publish_event("blockgroup", &payload).await.unwrap();
    assert!(receipt.segments > 5_000_000 / limit as u64);
    for record in broker.partition_records(BLOCKS, 0) {
        let size = record.value.len() + record.key.as_ref().map_or(0, |k| k.len());
        assert!(size < limit, "segment of {} bytes over the {} byte limit", size, limit);
    }

    let consumer = kafka.consumer("indexer").unwrap();
    let recorder = Recorder::new();
    consumer
        .add_topic_and_handler("blockgroup", recorder.clone())
        .unwrap();
    let running = Running::start(consumer);

    let received = recorder.wait_for(1).await;
    running.stop().await.unwrap();
    assert_eq!(received.len(), 1);
    assert!(received[0] == payload, "reassembled payload differs");
}

#[tokio::test]
async fn test_two_partitions_deliver_every_payload() {
    let (kafka, broker) = session(
        test_config()
            .with_partitions(2)
            .with_segment_size_bytes(16),
    );
    kafka.create_topic(BLOCKS).await.unwrap();

    let payloads: BTreeSet<Vec<u8>> = (0..20).map(|i| random_payload(10 + i * 5)).collect();
    for payload in &payloads {
        kafka.publish(BLOCKS, payload).await.unwrap();
    }
    assert!(broker.message_count(BLOCKS) > payloads.len());

    let consumer = kafka.consumer("indexer").unwrap();
    let recorder = Recorder::new();
    consumer
        .add_topic_and_handler("blockgroup", recorder.clone())
        .unwrap();
    let running = Running::start(consumer);

    let received: BTreeSet<Vec<u8>> = recorder.wait_for(payloads.len()).await.into_iter().collect();
    assert_eq!(received, payloads);
    running.stop().await.unwrap();
}

#[tokio::test]
async fn test_parallel_readers_share_one_buffer() {
    let (kafka, _broker) = session(
        test_config()
            .with_partitions(4)
            .with_segment_size_bytes(8)
            .with_reader_tasks(3),
    );
    kafka.create_topic(BLOCKS).await.unwrap();

    let consumer = kafka.consumer("indexer").unwrap();
    let recorder = Recorder::new();
    consumer
        .add_topic_and_handler("blockgroup", recorder.clone())
        .unwrap();
    let running = Running::start(consumer);

    let payloads: BTreeSet<Vec<u8>> = (0..30).map(|i| random_payload(40 + i)).collect();
    for payload in &payloads {
        kafka.publish(BLOCKS, payload).await.unwrap();
    }

    let received: BTreeSet<Vec<u8>> = recorder.wait_for(payloads.len()).await.into_iter().collect();
    assert_eq!(received, payloads);

    let consumer = running.consumer.clone();
    running.stop().await.unwrap();
    assert_eq!(consumer.stats().pending, 0);
}

#[tokio::test]
async fn test_each_group_receives_every_payload() {
    let (kafka, _broker) = session(test_config().with_segment_size_bytes(5));
    kafka.setup_event_topics().await.unwrap();

    let mut runs = Vec::new();
    let mut recorders = Vec::new();
    for group in ["indexer", "archiver"] {
        let consumer = kafka.consumer(group).unwrap();
        let recorder = Recorder::new();
        consumer
            .add_topic_and_handler("tracegroup", recorder.clone())
            .unwrap();
        runs.push(Running::start(consumer));
        recorders.push(recorder);
    }

    let payloads: Vec<Vec<u8>> = (0..8).map(|i| random_payload(3 + i * 4)).collect();
    for payload in &payloads {
        kafka.publish(TRACES, payload).await.unwrap();
    }

    for recorder in &recorders {
        assert_eq!(recorder.wait_for(payloads.len()).await, payloads);
    }
    for run in runs {
        run.stop().await.unwrap();
    }
}

#[tokio::test]
async fn test_overflow_reported_with_capacity_one() {
    let (kafka, _broker) = session(test_config().with_max_message_number(1));
    kafka.create_topic(BLOCKS).await.unwrap();

    // Three payloads that each declare two segments but only send the first
    for key in ["m1", "m2", "m3"] {
        let record = Producer::make_record(BLOCKS, key, random_payload(4), 0, 2);
        kafka.producer().send_record(record).await.unwrap();
    }

    let consumer = kafka.consumer("indexer").unwrap();
    consumer
        .add_topic_and_handler("blockgroup", Recorder::new())
        .unwrap();
    let mut errors = consumer.take_errors().unwrap();
    let running = Running::start(consumer);

    match next_error(&mut errors).await {
        Some(ConsumerError::BufferOverflow { topic, key }) => {
            assert_eq!(topic, BLOCKS);
            assert_eq!(key, "m2");
        }
        other => panic!("expected overflow, got {:?}", other),
    }

    let consumer = running.consumer.clone();
    running.stop().await.unwrap();
    let stats = consumer.stats();
    assert_eq!(stats.overflows, 2);
    assert_eq!(stats.pending, 1);
}

#[tokio::test]
async fn test_partial_publish_stays_pending() {
    let (kafka, broker) = session(test_config().with_segment_size_bytes(4));

    broker.fail_next_sends(1);
    let err = kafka.publish(BLOCKS, b"never delivered").await.unwrap_err();
    match err {
        KafkaError::Publish { topic, index, total, .. } => {
            assert_eq!(topic, BLOCKS);
            assert_eq!((index, total), (0, 4));
        }
        other => panic!("unexpected error {:?}", other),
    }

    // First half of a payload that never gets its second segment
    let partial = Producer::make_record(BLOCKS, "partial", random_payload(4), 0, 2);
    broker.send(partial).await.unwrap();
    kafka.publish(BLOCKS, b"complete").await.unwrap();

    let consumer = kafka.consumer("indexer").unwrap();
    let recorder = Recorder::new();
    consumer
        .add_topic_and_handler("blockgroup", recorder.clone())
        .unwrap();
    let running = Running::start(consumer);

    assert_eq!(recorder.wait_for(1).await, vec![b"complete".to_vec()]);

    let consumer = running.consumer.clone();
    running.stop().await.unwrap();
    assert_eq!(consumer.stats().pending, 1);
}

#[tokio::test]
async fn test_create_twice_and_setup_twice() {
    let (kafka, _broker) = session(test_config());

    kafka.create_topic(BLOCKS).await.unwrap();
    assert!(matches!(
        kafka.create_topic(BLOCKS).await,
        Err(KafkaError::TopicAlreadyExists(_))
    ));

    kafka.setup_topic(TRACES).await.unwrap();
    kafka.setup_topic(TRACES).await.unwrap();

    let topics = kafka.list_topics().await.unwrap();
    assert!(topics.contains_key(BLOCKS));
    assert!(topics.contains_key(TRACES));

    kafka.delete_topic(TRACES).await.unwrap();
    assert!(matches!(
        kafka.delete_topic(TRACES).await,
        Err(KafkaError::TopicNotFound(_))
    ));
}

#[tokio::test]
async fn test_unknown_event_group_rejected() {
    let (kafka, _broker) = session(test_config());
    let consumer = kafka.consumer("indexer").unwrap();

    let err = consumer
        .add_topic_and_handler("not-available-event", Recorder::new())
        .unwrap_err();
    assert!(matches!(err, KafkaError::UnknownEventGroup(_)));
    assert!(consumer.topics().is_empty());
}

#[tokio::test]
async fn test_cancellation_leaves_pending_incomplete() {
    let (kafka, _broker) = session(test_config());
    let partial = Producer::make_record(BLOCKS, "half", random_payload(4), 0, 2);
    kafka.producer().send_record(partial).await.unwrap();

    let consumer = kafka.consumer("indexer").unwrap();
    consumer
        .add_topic_and_handler("blockgroup", Recorder::new())
        .unwrap();
    let running = Running::start(consumer);

    let deadline = tokio::time::Instant::now() + helpers::WAIT;
    while running.consumer.stats().records < 1 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let consumer = running.consumer.clone();
    running.stop().await.unwrap();
    assert_eq!(consumer.stats().pending, 1);
}

#[tokio::test]
async fn test_broker_loss_ends_subscribe_with_error() {
    let (kafka, broker) = session(test_config());
    let consumer = kafka.consumer("indexer").unwrap();
    consumer
        .add_topic_and_handler("blockgroup", Recorder::new())
        .unwrap();
    let running = Running::start(consumer);

    tokio::time::sleep(Duration::from_millis(20)).await;
    broker.disconnect();

    let result = tokio::time::timeout(helpers::WAIT, running.task)
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(result, Err(KafkaError::Connection(_))));
}

#[tokio::test]
async fn test_group_resumes_after_committed_offset() {
    let (kafka, _broker) = session(test_config());

    kafka.publish_event("blockgroup", b"first").await.unwrap();

    let first = kafka.consumer("indexer").unwrap();
    let recorder = Recorder::new();
    first
        .add_topic_and_handler("blockgroup", recorder.clone())
        .unwrap();
    let running = Running::start(first);
    assert_eq!(recorder.wait_for(1).await.len(), 1);
    running.stop().await.unwrap();

    kafka.publish_event("blockgroup", b"second").await.unwrap();

    let second = kafka.consumer("indexer").unwrap();
    let recorder = Recorder::new();
    second
        .add_topic_and_handler("blockgroup", recorder.clone())
        .unwrap();
    let running = Running::start(second);
    assert_eq!(recorder.wait_for(1).await, vec![b"second".to_vec()]);
    running.stop().await.unwrap();
}

#[tokio::test]
async fn test_newest_group_skips_existing_payloads() {
    let (kafka, _broker) = session(test_config().with_initial_offset(InitialOffset::Newest));
    kafka.publish_event("blockgroup", b"old").await.unwrap();

    let consumer = kafka.consumer("late").unwrap();
    let recorder = Recorder::new();
    consumer
        .add_topic_and_handler("blockgroup", recorder.clone())
        .unwrap();
    let running = Running::start(consumer);

    tokio::time::sleep(Duration::from_millis(20)).await;
    kafka.publish_event("blockgroup", b"new").await.unwrap();

    assert_eq!(recorder.wait_for(1).await, vec![b"new".to_vec()]);
    running.stop().await.unwrap();
}

#[tokio::test]
async fn test_json_payload_round_trip() {
    #[derive(serde::Serialize, serde::Deserialize, Debug, PartialEq)]
    struct Block {
        number: u64,
        hash: String,
    }

    let (kafka, _broker) = session(test_config().with_segment_size_bytes(8));
    let block = Block {
        number: 17_000_000,
        hash: "0xabc123".to_string(),
    };
    kafka
        .producer()
        .publish_json(BLOCKS, &block)
        .await
        .unwrap();

    let consumer = kafka.consumer("indexer").unwrap();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    consumer
        .add_topic_and_handler("blockgroup", move |message: ReassembledMessage| {
            let tx = tx.clone();
            async move {
                let decoded: Block = message.decode_json()?;
                let _ = tx.send(decoded);
                Ok::<(), HandlerError>(())
            }
        })
        .unwrap();
    let running = Running::start(consumer);

    let decoded = tokio::time::timeout(helpers::WAIT, rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(decoded, block);
    running.stop().await.unwrap();
}
