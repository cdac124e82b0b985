use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};

use log::debug;

use crate::error::{Error, Result};
use crate::partition::PartitionKey;
use crate::registration::RegistrationRow;
use crate::storage::BackingStore;
use crate::time_key::TimeKey;

/// In-process backing store.
///
/// Duplicate time keys within a partition are rejected with
/// `Error::DuplicateTimeKey`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    registrations: RwLock<BTreeMap<String, RegistrationRow>>,
    partitions: RwLock<HashMap<String, BTreeMap<TimeKey, Vec<u8>>>>,
    closed: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn partition_count(&self) -> usize {
        self.partitions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn record_count(&self) -> usize {
        self.partitions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(BTreeMap::len)
            .sum()
    }

    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }
        Ok(())
    }
}

impl BackingStore for MemoryStore {
    fn ensure_schema(&self) -> Result<()> {
        self.check_open()
    }

    fn insert_registration(&self, row: &RegistrationRow) -> Result<()> {
        self.check_open()?;
        self.registrations
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(row.id.clone(), row.clone());
        Ok(())
    }

    fn registration_rows(&self) -> Result<Vec<RegistrationRow>> {
        self.check_open()?;
        Ok(self
            .registrations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect())
    }

    fn insert(&self, partition: &PartitionKey, key: TimeKey, payload: &[u8]) -> Result<()> {
        self.check_open()?;
        let mut partitions = self
            .partitions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let records = partitions.entry(partition.as_str().to_string()).or_default();
        if records.contains_key(&key) {
            return Err(Error::DuplicateTimeKey {
                partition: partition.to_string(),
                key: key.to_string(),
            });
        }
        records.insert(key, payload.to_vec());
        debug!("insert [partition = {partition}; key = {key}; bytes = {}]", payload.len());
        Ok(())
    }

    fn scan(&self, partition: &PartitionKey, from: TimeKey, to: TimeKey) -> Result<Vec<Vec<u8>>> {
        self.check_open()?;
        if from >= to {
            return Ok(Vec::new());
        }
        let partitions = self
            .partitions
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(partitions
            .get(partition.as_str())
            .map(|records| records.range(from..to).map(|(_, v)| v.clone()).collect())
            .unwrap_or_default())
    }

    fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
