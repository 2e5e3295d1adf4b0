//! Consumer E2E tests
//!
//! Tests for reassembly against a live broker including:
//! - Ordered delivery on a single partition
//! - Set delivery across partitions and parallel readers
//! - Payloads far above the broker message limit
//! - JSON payloads decoded by the handler

mod reassembly;

pub use reassembly::{
    test_json_payload, test_large_payload, test_multi_partition_reassembly, test_parallel_readers,
    test_single_partition_order,
};
