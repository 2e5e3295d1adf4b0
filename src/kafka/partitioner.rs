//! Kafka-compatible partitioner
//!
//! Chooses the partition of a produced message for brokers that do not do it
//! themselves (the in-memory broker). Keyed messages must land on the same
//! partition every time: that is what keeps all segments of one payload on
//! one partition, in order.
//!
//! Uses the `murmur2` crate with `KAFKA_SEED`, matching Apache Kafka's
//! default partitioner for keyed records.

use murmur2::{murmur2, KAFKA_SEED};
use rand::Rng;

/// Compute the target partition for a record.
///
/// # Arguments
/// * `key` - Optional message key (if non-empty, used for hash-based routing)
/// * `partition_count` - Number of partitions for the topic (must be > 0)
///
/// # Behavior
/// - Non-empty key: murmur2 hash, sign bit masked, modulo partition count
/// - Absent or empty key: random partition
pub fn compute_partition(key: Option<&[u8]>, partition_count: i32) -> i32 {
    debug_assert!(partition_count > 0, "partition_count must be positive");

    match key {
        Some(k) if !k.is_empty() => {
            let hash = murmur2(k, KAFKA_SEED);
            // Utils.toPositive(Utils.murmur2(key)) % numPartitions
            ((hash & 0x7fffffff) as i32) % partition_count
        }
        _ => rand::thread_rng().gen_range(0..partition_count),
    }
}
