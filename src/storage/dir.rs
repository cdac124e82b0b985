//! Directory-backed store.
//!
//! Layout under the root:
//!
//! ```text
//! registrations.json            registration rows (JSON array)
//! data/<partition key>/records.log
//! ```
//!
//! `records.log` is append-only. Each frame is
//! `[u32 body_len][u32 crc32(body)][body]` with
//! `body = [i128 unix_nanos][u64 sequence][payload]`, all little-endian.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

use log::{debug, warn};

use crate::config::StoreConfig;
use crate::error::{Error, Result};
use crate::partition::PartitionKey;
use crate::registration::RegistrationRow;
use crate::storage::BackingStore;
use crate::time_key::{TimeKey, TIME_KEY_LEN};

const REGISTRATIONS_FILE: &str = "registrations.json";
const DATA_DIR: &str = "data";
const RECORDS_FILE: &str = "records.log";
const FRAME_HEADER_LEN: usize = 8;

pub struct DirStore {
    root: PathBuf,
    sync_writes: bool,
    registrations_lock: Mutex<()>,
    /// Logs whose tail has been checked since open.
    append_lock: Mutex<HashSet<PathBuf>>,
    closed: AtomicBool,
}

impl DirStore {
    /// Open (or create) a store rooted at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_config(path, &StoreConfig::default())
    }

    pub fn open_with_config(path: impl AsRef<Path>, config: &StoreConfig) -> Result<Self> {
        let root = path.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            sync_writes: config.sync_writes,
            registrations_lock: Mutex::new(()),
            append_lock: Mutex::new(HashSet::new()),
            closed: AtomicBool::new(false),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Partition keys with a data directory, sorted.
    pub fn partition_keys(&self) -> Result<Vec<PartitionKey>> {
        self.check_open()?;
        let data_dir = self.root.join(DATA_DIR);
        let entries = match fs::read_dir(&data_dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            match PartitionKey::parse(&name) {
                Ok((id, bucket)) => keys.push(PartitionKey::new(&id, bucket.assume_utc())),
                Err(err) => warn!("Skipping unexpected data directory [name = {name}]: {err}"),
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn registrations_path(&self) -> PathBuf {
        self.root.join(REGISTRATIONS_FILE)
    }

    fn records_path(&self, partition: &PartitionKey) -> PathBuf {
        self.root
            .join(DATA_DIR)
            .join(partition.as_str())
            .join(RECORDS_FILE)
    }

    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }
        Ok(())
    }

    fn read_rows(&self) -> Result<Vec<RegistrationRow>> {
        let json = match fs::read_to_string(self.registrations_path()) {
            Ok(json) => json,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        Ok(serde_json::from_str(&json)?)
    }

    fn write_rows(&self, rows: &[RegistrationRow]) -> Result<()> {
        let path = self.registrations_path();
        let tmp = path.with_extension("json.tmp");
        let data = serde_json::to_vec_pretty(rows)?;
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp)?;
        file.write_all(&data)?;
        file.sync_all()?;
        fs::rename(tmp, path)?;
        Ok(())
    }
}

impl BackingStore for DirStore {
    fn ensure_schema(&self) -> Result<()> {
        self.check_open()?;
        fs::create_dir_all(self.root.join(DATA_DIR))?;
        let _guard = self
            .registrations_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !self.registrations_path().exists() {
            self.write_rows(&[])?;
        }
        Ok(())
    }

    fn insert_registration(&self, row: &RegistrationRow) -> Result<()> {
        self.check_open()?;
        let _guard = self
            .registrations_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut rows = self.read_rows()?;
        match rows.iter_mut().find(|existing| existing.id == row.id) {
            Some(existing) => *existing = row.clone(),
            None => rows.push(row.clone()),
        }
        self.write_rows(&rows)
    }

    fn registration_rows(&self) -> Result<Vec<RegistrationRow>> {
        self.check_open()?;
        let _guard = self
            .registrations_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        self.read_rows()
    }

    fn insert(&self, partition: &PartitionKey, key: TimeKey, payload: &[u8]) -> Result<()> {
        self.check_open()?;
        let path = self.records_path(partition);

        let mut body = Vec::with_capacity(TIME_KEY_LEN + payload.len());
        body.extend_from_slice(&key.to_bytes());
        body.extend_from_slice(payload);
        let body_len = u32::try_from(body.len())
            .map_err(|_| Error::Corrupt(format!("record too large: {} bytes", body.len())))?;

        let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + body.len());
        frame.extend_from_slice(&body_len.to_le_bytes());
        frame.extend_from_slice(&crc32fast::hash(&body).to_le_bytes());
        frame.extend_from_slice(&body);

        let mut checked = self
            .append_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !checked.contains(&path) {
            repair_tail(&path)?;
            checked.insert(path.clone());
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        file.write_all(&frame)?;
        if self.sync_writes {
            file.sync_data()?;
        }
        debug!("append [partition = {partition}; key = {key}; bytes = {}]", payload.len());
        Ok(())
    }

    fn scan(&self, partition: &PartitionKey, from: TimeKey, to: TimeKey) -> Result<Vec<Vec<u8>>> {
        self.check_open()?;
        if from >= to {
            return Ok(Vec::new());
        }
        let mut records: Vec<(TimeKey, Vec<u8>)> = read_records(&self.records_path(partition))?
            .into_iter()
            .filter(|(key, _)| *key >= from && *key < to)
            .collect();
        records.sort_by_key(|(key, _)| *key);
        Ok(records.into_iter().map(|(_, payload)| payload).collect())
    }

    fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

/// Read every intact frame of a records file. A truncated or checksum
/// failing frame ends the read.
fn read_records(path: &Path) -> Result<Vec<(TimeKey, Vec<u8>)>> {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err.into()),
    };
    Ok(decode_frames(path, &data).0)
}

/// Cut a torn or corrupt tail off a records file so that later appends
/// follow the last intact frame.
fn repair_tail(path: &Path) -> Result<()> {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(err.into()),
    };
    let (_, valid_len) = decode_frames(path, &data);
    if valid_len < data.len() {
        warn!(
            "Truncating records tail [path = {}; valid = {valid_len}; dropped = {}]",
            path.display(),
            data.len() - valid_len
        );
        let file = OpenOptions::new().write(true).open(path)?;
        file.set_len(valid_len as u64)?;
        file.sync_all()?;
    }
    Ok(())
}

/// Decoded records plus the byte length of the intact prefix.
fn decode_frames(path: &Path, data: &[u8]) -> (Vec<(TimeKey, Vec<u8>)>, usize) {
    let mut records = Vec::new();
    let mut offset = 0usize;
    while offset < data.len() {
        if offset + FRAME_HEADER_LEN > data.len() {
            warn!("Torn record header ignored [path = {}; offset = {offset}]", path.display());
            break;
        }
        let body_len = le_u32(&data[offset..offset + 4]) as usize;
        let crc = le_u32(&data[offset + 4..offset + 8]);
        let body_start = offset + FRAME_HEADER_LEN;
        let body_end = body_start.saturating_add(body_len);
        if body_len < TIME_KEY_LEN || body_end > data.len() {
            warn!("Torn record frame ignored [path = {}; offset = {offset}]", path.display());
            break;
        }
        let body = &data[body_start..body_end];
        if crc32fast::hash(body) != crc {
            warn!("Record checksum mismatch [path = {}; offset = {offset}]", path.display());
            break;
        }
        let mut key_bytes = [0u8; TIME_KEY_LEN];
        key_bytes.copy_from_slice(&body[..TIME_KEY_LEN]);
        records.push((TimeKey::from_bytes(&key_bytes), body[TIME_KEY_LEN..].to_vec()));
        offset = body_end;
    }
    (records, offset)
}

fn le_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[..4]);
    u32::from_le_bytes(buf)
}
