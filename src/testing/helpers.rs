//! Test helper functions for building payloads and records

use bytes::Bytes;
use rand::Rng;

use crate::kafka::broker::ConsumedRecord;
use crate::kafka::segment::Segment;

/// Random payload of `len` bytes
pub fn random_payload(len: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..len).map(|_| rng.gen()).collect()
}

/// A consumed record carrying one segment, as the broker would deliver it
pub fn consumed_segment(
    topic: &str,
    key: &str,
    index: u64,
    total: u64,
    data: &[u8],
    offset: i64,
) -> ConsumedRecord {
    let record = Segment::new(
        topic,
        Bytes::copy_from_slice(key.as_bytes()),
        index,
        total,
        Bytes::copy_from_slice(data),
    )
    .into_record();
    ConsumedRecord::from_outgoing(record, 0, offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_payload_length() {
        assert_eq!(random_payload(0).len(), 0);
        assert_eq!(random_payload(1000).len(), 1000);
    }

    #[test]
    fn test_consumed_segment_decodes() {
        let record = consumed_segment("t", "k", 1, 3, b"abc", 42);
        assert_eq!(record.offset, 42);
        let segment = Segment::from_record(&record).unwrap();
        assert_eq!((segment.index, segment.total), (1, 3));
        assert_eq!(segment.data.as_ref(), b"abc");
    }
}
