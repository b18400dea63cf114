//! Durable provider backed by a directory on disk.
//!
//! Layout:
//!
//! ```text
//! <path>/
//!   MANIFEST          magic + format version
//!   LOCK              exclusive process lock
//!   events.log        one append-only log shared by every entity
//!   snapshots/
//!     <sha256>.snap   latest snapshot per entity, atomically replaced
//! ```

use super::log::EventLog;
use super::memory::DEFAULT_SNAPSHOT_INTERVAL;
use super::provider::{EventSink, Provider, ProviderState};
use crate::error::{Result, StoreError};
use crate::model::GraphEvent;
use fs2::FileExt;
use lru::LruCache;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Magic bytes for the store manifest.
const STORE_MAGIC: &[u8; 4] = b"FLW\0";

/// Current store format version.
const STORE_VERSION: u8 = 1;

/// Magic bytes for snapshot files.
const SNAPSHOT_MAGIC: &[u8; 4] = b"SNP\0";

const EVENT_LOG_FILE: &str = "events.log";
const SNAPSHOT_DIR: &str = "snapshots";

/// Configuration for opening a [`FileProvider`].
#[derive(Clone, Debug)]
pub struct ProviderConfig {
    /// Path to the store directory.
    pub path: PathBuf,
    /// Events between snapshot requests.
    pub snapshot_interval: u64,
    /// Fsync the event log every N appends.
    pub sync_interval: u64,
    /// Number of snapshots kept in memory.
    pub snapshot_cache_size: usize,
    /// Create the store if it doesn't exist.
    pub create_if_missing: bool,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./flowstore"),
            snapshot_interval: DEFAULT_SNAPSHOT_INTERVAL,
            sync_interval: 100,
            snapshot_cache_size: 256,
            create_if_missing: true,
        }
    }
}

/// Provider persisting events and snapshots under one directory.
///
/// Only one process may have a store open; a second open fails with
/// [`StoreError::Locked`].
#[derive(Clone)]
pub struct FileProvider {
    state: Arc<FileProviderState>,
}

impl FileProvider {
    /// Open an existing store or create a new one.
    pub fn open_or_create(config: ProviderConfig) -> Result<Self> {
        if config.path.join("MANIFEST").exists() {
            Self::open(config)
        } else if config.create_if_missing {
            Self::create(config)
        } else {
            Err(StoreError::NotInitialized)
        }
    }

    /// Create a new store at the configured path.
    pub fn create(config: ProviderConfig) -> Result<Self> {
        let path = &config.path;
        fs::create_dir_all(path)?;
        fs::create_dir_all(path.join(SNAPSHOT_DIR))?;

        let lock_file = acquire_lock(path)?;
        write_manifest(path)?;

        info!(path = %path.display(), "created store");
        Self::init(config, lock_file)
    }

    /// Open an existing store.
    pub fn open(config: ProviderConfig) -> Result<Self> {
        let path = &config.path;
        if !path.join("MANIFEST").exists() {
            return Err(StoreError::NotInitialized);
        }

        let lock_file = acquire_lock(path)?;
        verify_manifest(path)?;
        fs::create_dir_all(path.join(SNAPSHOT_DIR))?;

        Self::init(config, lock_file)
    }

    fn init(config: ProviderConfig, lock_file: File) -> Result<Self> {
        let log = EventLog::open(config.path.join(EVENT_LOG_FILE), config.sync_interval)?;
        let cache_size =
            NonZeroUsize::new(config.snapshot_cache_size).unwrap_or(NonZeroUsize::MIN);

        debug!(path = %config.path.display(), "store opened");
        Ok(Self {
            state: Arc::new(FileProviderState {
                snapshot_interval: config.snapshot_interval.max(1),
                config,
                log,
                snapshot_cache: Mutex::new(LruCache::new(cache_size)),
                _lock_file: lock_file,
            }),
        })
    }

    /// Get the store path.
    pub fn path(&self) -> &Path {
        &self.state.config.path
    }

    /// Number of events stored for `name`.
    pub fn event_count(&self, name: &str) -> u64 {
        self.state.log.len(name)
    }

    /// Force sync the event log to disk.
    pub fn sync(&self) -> Result<()> {
        self.state.log.sync()
    }
}

impl Provider for FileProvider {
    fn state(&self) -> Arc<dyn ProviderState> {
        self.state.clone()
    }
}

struct FileProviderState {
    config: ProviderConfig,
    snapshot_interval: u64,
    log: EventLog,
    snapshot_cache: Mutex<LruCache<String, (Vec<u8>, u64)>>,
    _lock_file: File,
}

impl FileProviderState {
    fn snapshot_path(&self, name: &str) -> PathBuf {
        self.config
            .path
            .join(SNAPSHOT_DIR)
            .join(snapshot_file_name(name))
    }

    fn read_snapshot_file(&self, name: &str) -> Result<Option<(Vec<u8>, u64)>> {
        let path = self.snapshot_path(name);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        decode_snapshot(&bytes).map(Some)
    }
}

impl ProviderState for FileProviderState {
    fn restart(&self) -> Result<()> {
        // Appends and reads share one file handle, so a flush is all it takes
        // for later reads to see every write.
        self.log.sync()
    }

    fn get_snapshot(&self, name: &str) -> Result<Option<(Vec<u8>, u64)>> {
        if let Some(cached) = self.snapshot_cache.lock().get(name) {
            return Ok(Some(cached.clone()));
        }

        let snapshot = self.read_snapshot_file(name)?;
        if let Some(ref found) = snapshot {
            self.snapshot_cache
                .lock()
                .put(name.to_string(), found.clone());
        }
        Ok(snapshot)
    }

    fn get_events(&self, name: &str, from_index: u64, deliver: &mut EventSink<'_>) -> Result<()> {
        for (index, offset) in self.log.offsets_from(name, from_index) {
            let entry = self.log.read_at(offset)?;
            if entry.name != name || entry.index != index {
                return Err(StoreError::Corruption(format!(
                    "offset {} holds {}#{}, expected {}#{}",
                    offset, entry.name, entry.index, name, index
                )));
            }
            let event: GraphEvent = rmp_serde::from_slice(&entry.payload)?;
            deliver(index, event)?;
        }
        Ok(())
    }

    fn persist_event(&self, name: &str, index: u64, event: &GraphEvent) -> Result<()> {
        let payload = rmp_serde::to_vec_named(event)?;
        self.log.append(name, index, &payload)
    }

    fn persist_snapshot(&self, name: &str, index: u64, snapshot: &[u8]) -> Result<()> {
        let path = self.snapshot_path(name);
        let tmp_path = path.with_extension("snap.tmp");

        let encoded = encode_snapshot(index, snapshot)?;
        {
            let mut file = File::create(&tmp_path)?;
            file.write_all(&encoded)?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &path)?;

        self.snapshot_cache
            .lock()
            .put(name.to_string(), (snapshot.to_vec(), index));
        debug!(entity = name, index, bytes = snapshot.len(), "snapshot written");
        Ok(())
    }

    fn snapshot_interval(&self) -> u64 {
        self.snapshot_interval
    }
}

fn write_manifest(path: &Path) -> Result<()> {
    let mut file = File::create(path.join("MANIFEST"))?;
    file.write_all(STORE_MAGIC)?;
    file.write_all(&[STORE_VERSION])?;
    file.sync_all()?;
    Ok(())
}

fn verify_manifest(path: &Path) -> Result<()> {
    let mut file = File::open(path.join("MANIFEST"))?;

    let mut magic = [0u8; 4];
    file.read_exact(&mut magic)?;
    if &magic != STORE_MAGIC {
        return Err(StoreError::InvalidFormat("Invalid store magic".into()));
    }

    let mut version = [0u8; 1];
    file.read_exact(&mut version)?;
    if version[0] != STORE_VERSION {
        return Err(StoreError::InvalidFormat(format!(
            "Unsupported store version: {}",
            version[0]
        )));
    }

    Ok(())
}

fn acquire_lock(path: &Path) -> Result<File> {
    let lock_file = File::create(path.join("LOCK"))?;
    lock_file
        .try_lock_exclusive()
        .map_err(|_| StoreError::Locked)?;
    Ok(lock_file)
}

/// Snapshot file layout: magic, version, index (u64), length (u32), data,
/// crc32 of index + data.
fn encode_snapshot(index: u64, data: &[u8]) -> Result<Vec<u8>> {
    let len = snapshot_len(data.len())?;
    let mut buf = Vec::with_capacity(4 + 1 + 8 + 4 + data.len() + 4);
    buf.extend_from_slice(SNAPSHOT_MAGIC);
    buf.push(STORE_VERSION);
    buf.extend_from_slice(&index.to_le_bytes());
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(data);
    buf.extend_from_slice(&snapshot_checksum(index, data).to_le_bytes());
    Ok(buf)
}

fn snapshot_len(len: usize) -> Result<u32> {
    u32::try_from(len)
        .map_err(|_| StoreError::Serialization(format!("snapshot too large: {} bytes", len)))
}

fn decode_snapshot(bytes: &[u8]) -> Result<(Vec<u8>, u64)> {
    const HEADER: usize = 4 + 1 + 8 + 4;
    if bytes.len() < HEADER + 4 {
        return Err(StoreError::Corruption("snapshot file too short".into()));
    }
    if &bytes[0..4] != SNAPSHOT_MAGIC {
        return Err(StoreError::InvalidFormat("Invalid snapshot magic".into()));
    }
    if bytes[4] != STORE_VERSION {
        return Err(StoreError::InvalidFormat(format!(
            "Unsupported snapshot version: {}",
            bytes[4]
        )));
    }

    let mut index_bytes = [0u8; 8];
    index_bytes.copy_from_slice(&bytes[5..13]);
    let index = u64::from_le_bytes(index_bytes);

    let mut len_bytes = [0u8; 4];
    len_bytes.copy_from_slice(&bytes[13..17]);
    let len = u32::from_le_bytes(len_bytes) as usize;

    if bytes.len() != HEADER + len + 4 {
        return Err(StoreError::Corruption(format!(
            "snapshot length mismatch: header says {}, file holds {}",
            len,
            bytes.len().saturating_sub(HEADER + 4)
        )));
    }
    let data = &bytes[HEADER..HEADER + len];

    let mut crc_bytes = [0u8; 4];
    crc_bytes.copy_from_slice(&bytes[HEADER + len..]);
    let stored = u32::from_le_bytes(crc_bytes);
    let computed = snapshot_checksum(index, data);
    if stored != computed {
        return Err(StoreError::ChecksumMismatch {
            expected: stored,
            got: computed,
        });
    }

    Ok((data.to_vec(), index))
}

/// Entity names are arbitrary strings, so files are keyed by their digest.
fn snapshot_file_name(name: &str) -> String {
    format!("{}.snap", hex::encode(Sha256::digest(name.as_bytes())))
}

fn snapshot_checksum(index: u64, data: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&index.to_le_bytes());
    hasher.update(data);
    hasher.finalize()
}
