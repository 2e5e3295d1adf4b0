//! Producer E2E tests
//!
//! Tests for segmented publishing including:
//! - Segment wire format as seen by a plain Kafka client
//! - Publish receipts and key-based co-location

mod segments;

pub use segments::{test_publish_receipt, test_segment_wire_format};
