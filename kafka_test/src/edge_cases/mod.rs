//! Edge case E2E tests
//!
//! Tests for boundary conditions:
//! - Reassembly buffer overflow reported on the error channel
//! - Unknown event groups rejected at registration and publish
//! - Empty payloads
//! - Cancellation with incomplete payloads pending

mod boundaries;
mod overflow;

pub use boundaries::{test_empty_payload, test_unknown_event_group};
pub use overflow::{test_buffer_overflow, test_cancel_with_pending_segments};
