//! Segment reassembly
//!
//! Tracks partially received payloads per `(topic, key)` until every segment
//! index has been seen. Per key the state machine is:
//!
//! ```text
//! ABSENT --first segment--> PENDING --more segments--> PENDING
//!                              |
//!                              +--all indices seen--> COMPLETE (entry removed)
//! ```
//!
//! The buffer is bounded. When it is full, a segment that would open a new
//! entry is dropped and reported as an overflow; that payload can never
//! complete. Entries are only ever removed on completion or reset.
//!
//! The buffer itself is not synchronized. A consumer with several readers
//! keeps it behind one mutex.

use std::collections::{BTreeMap, HashMap};

use bytes::{Bytes, BytesMut};
use serde::de::DeserializeOwned;

use super::segment::Segment;

/// A fully reconstructed payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReassembledMessage {
    /// Topic the segments arrived on
    pub topic: String,
    /// Correlation key shared by the segments
    pub key: Bytes,
    /// Segment bytes concatenated in index order
    pub payload: Bytes,
    /// Number of segments the payload was carried in
    pub segments: u64,
}

impl ReassembledMessage {
    /// Correlation key as text, for logs and error reports
    pub fn key_str(&self) -> String {
        String::from_utf8_lossy(&self.key).into_owned()
    }

    /// Decode the payload as a JSON document
    pub fn decode_json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.payload)
    }
}

/// Result of feeding one segment into the buffer
#[derive(Debug, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Still waiting for more segments
    Pending { received: u64, total: u64 },
    /// The segment completed its payload; the entry was removed
    Complete(ReassembledMessage),
    /// The buffer is full and the segment would open a new entry; dropped
    Overflow,
    /// The segment declared a different total than its entry
    ///
    /// The old entry was discarded and tracking restarted from this segment.
    /// `completed` is set when the segment alone completes a payload.
    Restarted {
        expected: u64,
        declared: u64,
        completed: Option<ReassembledMessage>,
    },
}

#[derive(Debug)]
struct PendingAssembly {
    total: u64,
    slots: BTreeMap<u64, Bytes>,
}

impl PendingAssembly {
    fn new(total: u64) -> Self {
        Self {
            total,
            slots: BTreeMap::new(),
        }
    }

    fn received(&self) -> u64 {
        self.slots.len() as u64
    }

    fn is_complete(&self) -> bool {
        self.received() == self.total
    }

    /// Concatenate slots in index order
    fn assemble(self) -> Bytes {
        let len = self.slots.values().map(Bytes::len).sum();
        let mut payload = BytesMut::with_capacity(len);
        for data in self.slots.into_values() {
            payload.extend_from_slice(&data);
        }
        payload.freeze()
    }
}

type AssemblyKey = (String, Bytes);

/// Bounded map of in-progress payloads
#[derive(Debug)]
pub struct ReassemblyBuffer {
    capacity: usize,
    entries: HashMap<AssemblyKey, PendingAssembly>,
}

impl ReassemblyBuffer {
    /// Create a buffer holding at most `capacity` incomplete payloads
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::new(),
        }
    }

    /// Feed one validated segment
    ///
    /// Segments must satisfy `index < total`, which `Segment::from_record`
    /// guarantees. A duplicate index overwrites the stored bytes without
    /// counting twice.
    pub fn insert(&mut self, segment: Segment) -> InsertOutcome {
        let Segment {
            topic,
            key,
            index,
            total,
            data,
        } = segment;
        let entry_key = (topic, key);

        let existing_total = self.entries.get(&entry_key).map(|pending| pending.total);
        let restarted_from = match existing_total {
            Some(expected) if expected != total => {
                self.entries.remove(&entry_key);
                Some(expected)
            }
            Some(_) => {
                if let Some(pending) = self.entries.get_mut(&entry_key) {
                    pending.slots.insert(index, data);
                }
                return self.complete_or_pending(entry_key);
            }
            None if self.entries.len() >= self.capacity => return InsertOutcome::Overflow,
            None => None,
        };

        let mut pending = PendingAssembly::new(total);
        pending.slots.insert(index, data);
        self.entries.insert(entry_key.clone(), pending);

        let outcome = self.complete_or_pending(entry_key);
        match restarted_from {
            Some(expected) => InsertOutcome::Restarted {
                expected,
                declared: total,
                completed: match outcome {
                    InsertOutcome::Complete(message) => Some(message),
                    _ => None,
                },
            },
            None => outcome,
        }
    }

    fn complete_or_pending(&mut self, entry_key: AssemblyKey) -> InsertOutcome {
        let (received, total, complete) = match self.entries.get(&entry_key) {
            Some(pending) => (pending.received(), pending.total, pending.is_complete()),
            None => return InsertOutcome::Pending { received: 0, total: 0 },
        };
        if !complete {
            return InsertOutcome::Pending { received, total };
        }

        match self.entries.remove(&entry_key) {
            Some(pending) => {
                let (topic, key) = entry_key;
                InsertOutcome::Complete(ReassembledMessage {
                    topic,
                    key,
                    segments: pending.total,
                    payload: pending.assemble(),
                })
            }
            None => InsertOutcome::Pending { received, total },
        }
    }

    /// Number of incomplete payloads
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether an entry for `(topic, key)` is pending
    pub fn contains(&self, topic: &str, key: &[u8]) -> bool {
        let entry_key = (topic.to_string(), Bytes::copy_from_slice(key));
        self.entries.contains_key(&entry_key)
    }
}
