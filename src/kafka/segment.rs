//! Payload segmentation
//!
//! A payload larger than the broker's message limit is split into ordered
//! segments. Every segment travels as its own broker message whose value is
//! the segment bytes and whose headers carry the segment index and the total
//! segment count as 8-byte big-endian unsigned integers.
//!
//! ```text
//! key     = correlation key (shared by all segments of one payload)
//! value   = payload[index * size .. min((index + 1) * size, len)]
//! headers = totalSegments: u64 BE, segmentIdx: u64 BE
//! ```

use bytes::Bytes;
use thiserror::Error;

use super::broker::{ConsumedRecord, OutgoingRecord, RecordHeader};
use super::constants::{HEADER_SEGMENT_IDX, HEADER_TOTAL_SEGMENTS, SEGMENT_HEADER_LEN};

/// Number of segments a payload of `len` bytes is split into
///
/// Always at least one, so an empty payload still produces a message.
pub fn segment_count(len: usize, segment_size: usize) -> u64 {
    let size = segment_size.max(1);
    len.div_ceil(size).max(1) as u64
}

/// Split a payload into ordered segments of at most `segment_size` bytes
///
/// An empty payload yields exactly one empty segment. Only the last segment
/// may be shorter than `segment_size`.
pub fn split(payload: &[u8], segment_size: usize) -> Vec<&[u8]> {
    debug_assert!(segment_size > 0, "segment_size must be positive");

    if payload.is_empty() {
        return vec![payload];
    }
    payload.chunks(segment_size.max(1)).collect()
}

/// Encode a segment header value
pub fn encode_header(value: u64) -> [u8; SEGMENT_HEADER_LEN] {
    value.to_be_bytes()
}

/// Decode a segment header value
pub fn decode_header(name: &'static str, raw: &[u8]) -> Result<u64, SegmentError> {
    let bytes: [u8; SEGMENT_HEADER_LEN] =
        raw.try_into()
            .map_err(|_| SegmentError::InvalidHeaderLength {
                header: name,
                len: raw.len(),
            })?;
    Ok(u64::from_be_bytes(bytes))
}

/// Reasons a consumed record is not a valid segment
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SegmentError {
    #[error("missing header {0}")]
    MissingHeader(&'static str),

    #[error("header {header} is {len} bytes, expected 8")]
    InvalidHeaderLength { header: &'static str, len: usize },

    #[error("totalSegments is zero")]
    ZeroTotal,

    #[error("segment index {index} out of range for {total} segments")]
    IndexOutOfRange { index: u64, total: u64 },
}

/// One chunk of a larger payload together with its position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Concrete topic the segment is published on
    pub topic: String,
    /// Correlation key shared by every segment of the payload
    pub key: Bytes,
    /// 0-based position of this segment
    pub index: u64,
    /// Number of segments of the payload
    pub total: u64,
    /// Segment bytes
    pub data: Bytes,
}

impl Segment {
    pub fn new(
        topic: impl Into<String>,
        key: impl Into<Bytes>,
        index: u64,
        total: u64,
        data: impl Into<Bytes>,
    ) -> Self {
        Self {
            topic: topic.into(),
            key: key.into(),
            index,
            total,
            data: data.into(),
        }
    }

    /// Decode a consumed broker record
    pub fn from_record(record: &ConsumedRecord) -> Result<Self, SegmentError> {
        let total = decode_header(
            HEADER_TOTAL_SEGMENTS,
            record
                .header(HEADER_TOTAL_SEGMENTS)
                .ok_or(SegmentError::MissingHeader(HEADER_TOTAL_SEGMENTS))?,
        )?;
        let index = decode_header(
            HEADER_SEGMENT_IDX,
            record
                .header(HEADER_SEGMENT_IDX)
                .ok_or(SegmentError::MissingHeader(HEADER_SEGMENT_IDX))?,
        )?;

        if total == 0 {
            return Err(SegmentError::ZeroTotal);
        }
        if index >= total {
            return Err(SegmentError::IndexOutOfRange { index, total });
        }

        Ok(Self {
            topic: record.topic.clone(),
            key: record.key.clone().unwrap_or_default(),
            index,
            total,
            data: record.value.clone(),
        })
    }

    /// Build the broker message carrying this segment
    ///
    /// An empty key is sent as no key, leaving placement to the broker.
    pub fn into_record(self) -> OutgoingRecord {
        OutgoingRecord {
            topic: self.topic,
            key: if self.key.is_empty() {
                None
            } else {
                Some(self.key)
            },
            value: self.data,
            headers: vec![
                RecordHeader::new(HEADER_TOTAL_SEGMENTS, encode_header(self.total).to_vec()),
                RecordHeader::new(HEADER_SEGMENT_IDX, encode_header(self.index).to_vec()),
            ],
        }
    }
}
