//! Custom test assertions
//!
//! Assertions return errors instead of panicking so one failing scenario
//! does not abort the whole suite.

use std::collections::BTreeSet;
use std::fmt;

/// Custom assertion error with detailed information
#[derive(Debug)]
pub struct AssertionError {
    pub message: String,
    pub expected: String,
    pub actual: String,
}

impl fmt::Display for AssertionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\n  Expected: {}\n  Actual: {}",
            self.message, self.expected, self.actual
        )
    }
}

impl std::error::Error for AssertionError {}

impl AssertionError {
    pub fn new(
        message: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self {
            message: message.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}

fn describe(payloads: &[Vec<u8>]) -> String {
    let sizes: Vec<usize> = payloads.iter().map(Vec::len).collect();
    format!("{} payloads, sizes {:?}", payloads.len(), sizes)
}

/// Assert payloads arrived exactly, in order
pub fn assert_payloads_in_order(
    expected: &[Vec<u8>],
    actual: &[Vec<u8>],
) -> Result<(), Box<dyn std::error::Error>> {
    if expected == actual {
        return Ok(());
    }
    Err(Box::new(AssertionError::new(
        "Payloads differ or arrived out of order",
        describe(expected),
        describe(actual),
    )))
}

/// Assert the same payloads arrived, in any order
pub fn assert_same_payloads(
    expected: &[Vec<u8>],
    actual: &[Vec<u8>],
) -> Result<(), Box<dyn std::error::Error>> {
    let expected_set: BTreeSet<&Vec<u8>> = expected.iter().collect();
    let actual_set: BTreeSet<&Vec<u8>> = actual.iter().collect();
    if expected.len() == actual.len() && expected_set == actual_set {
        return Ok(());
    }
    Err(Box::new(AssertionError::new(
        "Payload sets differ",
        describe(expected),
        describe(actual),
    )))
}

/// Assert a condition, with a description of what was expected
pub fn ensure(
    condition: bool,
    message: &str,
    expected: impl Into<String>,
    actual: impl Into<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    if condition {
        Ok(())
    } else {
        Err(Box::new(AssertionError::new(message, expected, actual)))
    }
}
