//! Backing store seam.
//!
//! The store is modelled as two column-family tables:
//!
//! - data: `(partition_key, time_key) -> payload`, scanned by time-key range
//!   within one partition;
//! - registrations: `id -> (sensor, property, feature, rollover)`.
//!
//! Two implementations ship with the crate: [`MemoryStore`] for tests and
//! embedding, and [`DirStore`], a durable directory layout.

mod dir;
mod memory;

pub use dir::DirStore;
pub use memory::MemoryStore;

use crate::error::Result;
use crate::partition::PartitionKey;
use crate::registration::RegistrationRow;
use crate::time_key::TimeKey;

pub trait BackingStore: Send + Sync {
    /// Provision tables. Must be idempotent.
    fn ensure_schema(&self) -> Result<()>;

    /// Upsert a registration row keyed by its id.
    fn insert_registration(&self, row: &RegistrationRow) -> Result<()>;

    /// Every persisted registration row.
    fn registration_rows(&self) -> Result<Vec<RegistrationRow>>;

    /// Persist one observation record. An existing record under the same
    /// key must never be silently overwritten.
    fn insert(&self, partition: &PartitionKey, key: TimeKey, payload: &[u8]) -> Result<()>;

    /// Payloads in `partition` with `from <= key < to`, in key order.
    fn scan(&self, partition: &PartitionKey, from: TimeKey, to: TimeKey) -> Result<Vec<Vec<u8>>>;

    /// Release resources. Later calls fail with `Error::Closed`.
    fn close(&self) -> Result<()>;
}
