//! Time-partitioned storage for sensor observations.
//!
//! Observations are keyed by a (sensor, property, feature) triple. Each
//! triple is registered once with a [`Rollover`] granularity; writes land in
//! the partition of their time bucket and range queries walk every bucket
//! overlapping the requested window.

pub mod catalog;
pub mod codec;
pub mod config;
pub mod error;
pub mod partition;
pub mod query;
pub mod registration;
pub mod rollover;
pub mod storage;
pub mod store;
pub mod time_key;

pub use catalog::{CatalogSnapshot, RegistrationCatalog};
pub use codec::{
    JsonCodec, ObservationExtractor, PayloadCodec, SensorObservation, SsnExtractor, Statement,
    TemporalEntity,
};
pub use config::StoreConfig;
pub use error::{Error, Result};
pub use partition::{PartitionKey, PartitionKeyResolver, PartitionSpan};
pub use query::{ObservationQuery, ResultSet};
pub use registration::{registration_id, Registration, RegistrationRow};
pub use rollover::{Rollover, Timezone};
pub use storage::{BackingStore, DirStore, MemoryStore};
pub use store::ObservationStore;
pub use time_key::TimeKey;
