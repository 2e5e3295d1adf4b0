//! chain_kafka E2E Test Suite Orchestrator
//!
//! This orchestrator runs all E2E tests in the correct order:
//! 1. Admin tests (topics must be creatable first)
//! 2. Producer tests (segments must reach the broker intact)
//! 3. Consumer tests (reassembly depends on both)
//! 4. Consumer group tests (offset commits and fan-out)
//! 5. Edge case tests (buffer limits, registration, cancellation)
//!
//! ## Usage
//!
//! ```bash
//! # Run all tests
//! cargo run --release -p kafka_test
//!
//! # With a custom broker
//! KAFKA_BOOTSTRAP_SERVERS="localhost:29092" cargo run --release -p kafka_test
//! ```
//!
//! ## Exit Codes
//!
//! - 0: All tests passed
//! - 1: One or more tests failed

use kafka_test::{
    // Admin tests
    test_create_topic,
    test_create_topic_already_exists,
    test_delete_topic,
    test_setup_event_topics,
    test_setup_topic_idempotent,
    // Producer tests
    test_publish_receipt,
    test_segment_wire_format,
    // Consumer tests
    test_json_payload,
    test_large_payload,
    test_multi_partition_reassembly,
    test_parallel_readers,
    test_single_partition_order,
    // Consumer group tests
    test_group_resumes_after_commit,
    test_independent_groups,
    // Edge case tests
    test_buffer_overflow,
    test_cancel_with_pending_segments,
    test_empty_payload,
    test_unknown_event_group,
};
use tracing_subscriber::EnvFilter;

/// Test suite result tracking
struct TestSuiteResults {
    passed: usize,
    failed: usize,
    results: Vec<(&'static str, &'static str, bool)>, // (category, name, passed)
}

impl TestSuiteResults {
    fn new() -> Self {
        Self {
            passed: 0,
            failed: 0,
            results: Vec::new(),
        }
    }

    fn record(&mut self, category: &'static str, name: &'static str, passed: bool) {
        if passed {
            self.passed += 1;
        } else {
            self.failed += 1;
        }
        self.results.push((category, name, passed));
    }

    fn print_summary(&self) {
        println!("\n{}", "=".repeat(60));
        println!("TEST SUITE SUMMARY");
        println!("{}\n", "=".repeat(60));

        let mut current_category = "";
        for (category, name, passed) in &self.results {
            if *category != current_category {
                if !current_category.is_empty() {
                    println!();
                }
                println!("{}:", category);
                current_category = category;
            }
            let status = if *passed { "✅ PASSED" } else { "❌ FAILED" };
            println!("  {} - {}", name, status);
        }

        println!("\n{}", "-".repeat(60));
        println!(
            "Total: {} passed, {} failed, {} total",
            self.passed,
            self.failed,
            self.passed + self.failed
        );

        if self.failed == 0 {
            println!("\n✅ ALL TESTS PASSED");
        } else {
            println!("\n❌ SOME TESTS FAILED");
        }
    }
}

/// Run a single test and record the result
macro_rules! run_test {
    ($results:expr, $category:expr, $name:expr, $test_fn:expr) => {{
        let result = $test_fn.await;
        let passed = result.is_ok();
        if let Err(e) = &result {
            println!("❌ Test failed: {}", e);
        }
        $results.record($category, $name, passed);
        passed
    }};
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("╔════════════════════════════════════════════════════════════╗");
    println!("║           chain_kafka E2E Test Suite                       ║");
    println!("╚════════════════════════════════════════════════════════════╝\n");

    let mut results = TestSuiteResults::new();

    // ==================== ADMIN TESTS ====================
    println!("┌────────────────────────────────────────────────────────────┐");
    println!("│ ADMIN TESTS                                                │");
    println!("└────────────────────────────────────────────────────────────┘\n");

    run_test!(results, "Admin", "Create Topic", test_create_topic());
    run_test!(results, "Admin", "Create Existing Topic", test_create_topic_already_exists());
    run_test!(results, "Admin", "Setup Idempotent", test_setup_topic_idempotent());
    run_test!(results, "Admin", "Delete Topic", test_delete_topic());
    run_test!(results, "Admin", "Event Group Topics", test_setup_event_topics());

    // ==================== PRODUCER TESTS ====================
    println!("┌────────────────────────────────────────────────────────────┐");
    println!("│ PRODUCER TESTS                                             │");
    println!("└────────────────────────────────────────────────────────────┘\n");

    run_test!(results, "Producer", "Segment Wire Format", test_segment_wire_format());
    run_test!(results, "Producer", "Publish Receipt", test_publish_receipt());

    // ==================== CONSUMER TESTS ====================
    println!("┌────────────────────────────────────────────────────────────┐");
    println!("│ CONSUMER TESTS                                             │");
    println!("└────────────────────────────────────────────────────────────┘\n");

    run_test!(results, "Consumer", "Single Partition Order", test_single_partition_order());
    run_test!(results, "Consumer", "Multi-Partition", test_multi_partition_reassembly());
    run_test!(results, "Consumer", "Parallel Readers", test_parallel_readers());
    run_test!(results, "Consumer", "Large Payload (5 MB)", test_large_payload());
    run_test!(results, "Consumer", "JSON Payload", test_json_payload());

    // ==================== CONSUMER GROUP TESTS ====================
    println!("┌────────────────────────────────────────────────────────────┐");
    println!("│ CONSUMER GROUP TESTS                                       │");
    println!("└────────────────────────────────────────────────────────────┘\n");

    run_test!(results, "Consumer Group", "Independent Groups", test_independent_groups());
    run_test!(results, "Consumer Group", "Resume After Commit", test_group_resumes_after_commit());

    // ==================== EDGE CASE TESTS ====================
    println!("┌────────────────────────────────────────────────────────────┐");
    println!("│ EDGE CASE TESTS                                            │");
    println!("└────────────────────────────────────────────────────────────┘\n");

    run_test!(results, "Edge Cases", "Buffer Overflow", test_buffer_overflow());
    run_test!(results, "Edge Cases", "Cancel With Pending", test_cancel_with_pending_segments());
    run_test!(results, "Edge Cases", "Unknown Event Group", test_unknown_event_group());
    run_test!(results, "Edge Cases", "Empty Payload", test_empty_payload());

    // ==================== SUMMARY ====================
    results.print_summary();

    // Exit with appropriate code
    if results.failed > 0 {
        std::process::exit(1);
    }

    Ok(())
}
