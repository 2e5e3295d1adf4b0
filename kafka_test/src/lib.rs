//! chain_kafka E2E Test Suite
//!
//! End-to-end tests for the segmentation transport against a live broker:
//! - Test isolation via unique topics, groups and topic environments
//! - Best-effort topic cleanup via RAII
//! - Assertions returning errors so one failure does not stop the suite
//! - Fixtures for payloads, recording handlers and subscriptions
//!
//! ## Test Categories
//!
//! - **admin**: Topic creation, idempotent setup, deletion
//! - **producer**: Segment wire format and publish receipts
//! - **consumer**: Reassembly order, partitions, parallel readers, large and JSON payloads
//! - **consumer_group**: Independent groups and resume after commit
//! - **edge_cases**: Buffer overflow, unknown groups, empty payloads, cancellation
//!
//! ## Usage
//!
//! ```bash
//! # Run all tests against localhost:9092
//! cargo run --release -p kafka_test
//!
//! # Against another broker, with transport logs
//! KAFKA_BOOTSTRAP_SERVERS=broker:9092 RUST_LOG=chain_kafka=debug cargo run --release -p kafka_test
//! ```

// Infrastructure modules
pub mod assertions;
pub mod common;
pub mod fixtures;
pub mod setup;

// Test modules
pub mod admin;
pub mod consumer;
pub mod consumer_group;
pub mod edge_cases;
pub mod producer;

// Re-export infrastructure
pub use assertions::*;
pub use fixtures::*;
pub use setup::TestContext;

// Re-export test functions for convenience
pub use admin::{
    test_create_topic, test_create_topic_already_exists, test_delete_topic,
    test_setup_event_topics, test_setup_topic_idempotent,
};
pub use consumer::{
    test_json_payload, test_large_payload, test_multi_partition_reassembly, test_parallel_readers,
    test_single_partition_order,
};
pub use consumer_group::{test_group_resumes_after_commit, test_independent_groups};
pub use edge_cases::{
    test_buffer_overflow, test_cancel_with_pending_segments, test_empty_payload,
    test_unknown_event_group,
};
pub use producer::{test_publish_receipt, test_segment_wire_format};
