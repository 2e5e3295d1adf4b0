//! Consumer group E2E tests
//!
//! Tests for group semantics of the transport:
//! - Independent groups each receive every payload
//! - A group resumes after its committed offset

mod groups;

pub use groups::{test_group_resumes_after_commit, test_independent_groups};
