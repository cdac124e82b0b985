//! Time-ordered unique record keys.
//!
//! A key is the record timestamp (nanoseconds since the Unix epoch) plus a
//! tie-breaking sequence number. Written keys always carry a sequence of at
//! least 1, drawn from a process-wide counter, so two writes at the same
//! instant never share a key. `TimeKey::lower_bound(t)` uses sequence 0 and
//! therefore sorts before every written key at `t`, which makes
//! `[lower_bound(from), lower_bound(to))` select exactly the records stamped
//! in `[from, to)`.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use time::OffsetDateTime;

pub const TIME_KEY_LEN: usize = 24;

static SEQUENCE: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeKey {
    unix_nanos: i128,
    sequence: u64,
}

impl TimeKey {
    /// Allocate a fresh key for a record stamped `t`.
    pub fn generate(t: OffsetDateTime) -> Self {
        Self {
            unix_nanos: t.unix_timestamp_nanos(),
            sequence: SEQUENCE.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Smallest key at instant `t`.
    pub fn lower_bound(t: OffsetDateTime) -> Self {
        Self {
            unix_nanos: t.unix_timestamp_nanos(),
            sequence: 0,
        }
    }

    pub fn from_parts(unix_nanos: i128, sequence: u64) -> Self {
        Self {
            unix_nanos,
            sequence,
        }
    }

    pub fn unix_nanos(&self) -> i128 {
        self.unix_nanos
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn to_bytes(&self) -> [u8; TIME_KEY_LEN] {
        let mut buf = [0u8; TIME_KEY_LEN];
        buf[0..16].copy_from_slice(&self.unix_nanos.to_le_bytes());
        buf[16..24].copy_from_slice(&self.sequence.to_le_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8; TIME_KEY_LEN]) -> Self {
        let mut nanos = [0u8; 16];
        nanos.copy_from_slice(&buf[0..16]);
        let mut seq = [0u8; 8];
        seq.copy_from_slice(&buf[16..24]);
        Self {
            unix_nanos: i128::from_le_bytes(nanos),
            sequence: u64::from_le_bytes(seq),
        }
    }
}

impl fmt::Display for TimeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.unix_nanos, self.sequence)
    }
}
