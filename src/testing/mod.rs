//! Testing utilities for chain_kafka
//!
//! Only compiled for unit tests. Broker behavior comes from
//! `InMemoryBroker`; this module adds configs, handlers and record builders.
//!
//! # Organization
//! - `mocks.rs` - Mock config and a collecting message handler
//! - `helpers.rs` - Builders for payloads and raw segment records

#![cfg(test)]

pub mod helpers;
pub mod mocks;

pub use helpers::{consumed_segment, random_payload};
pub use mocks::{mock_config, CollectingHandler};
