//! Append-only event log shared by all entities of a file provider.

use crate::error::{Result, StoreError};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use tracing::warn;

/// Magic bytes for log entries.
const ENTRY_MAGIC: &[u8; 4] = b"EVT\0";

/// Current log format version.
const LOG_VERSION: u8 = 1;

/// Bytes before the entity name: magic, version, name length.
const HEADER_LEN: u64 = 4 + 1 + 2;

/// Fixed bytes after the name: index, payload length, crc32.
const TRAILER_LEN: u64 = 8 + 4 + 4;

/// A decoded log entry.
#[derive(Debug)]
pub(crate) struct LogEntry {
    pub name: String,
    pub index: u64,
    pub payload: Vec<u8>,
}

struct LogFile {
    file: File,
    /// Current file size (for appending).
    size: u64,
    /// Number of writes since last sync.
    writes_since_sync: u64,
}

/// Append-only log of `(entity, index, payload)` entries.
///
/// Entry layout: magic, version, name length (u16), name, index (u64),
/// payload length (u32), payload, crc32 of name + index + payload.
pub(crate) struct EventLog {
    file: Mutex<LogFile>,
    /// Entry offsets per entity; position is the event index.
    offsets: RwLock<HashMap<String, Vec<u64>>>,
    /// Sync every N writes.
    sync_interval: u64,
}

impl EventLog {
    /// Open or create the log, rebuilding the offset index.
    ///
    /// A partially written entry at the very end (a crash mid-append) is cut
    /// off. Any other damage fails the open.
    pub fn open(path: impl AsRef<Path>, sync_interval: u64) -> Result<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path.as_ref())?;

        let (offsets, size) = Self::scan(&mut file)?;

        Ok(Self {
            file: Mutex::new(LogFile {
                file,
                size,
                writes_since_sync: 0,
            }),
            offsets: RwLock::new(offsets),
            sync_interval: sync_interval.max(1),
        })
    }

    /// Append an entry. `index` must be the next index for `name`.
    pub fn append(&self, name: &str, index: u64, payload: &[u8]) -> Result<()> {
        let mut offsets = self.offsets.write();
        let entity_offsets = offsets.entry(name.to_string()).or_default();
        let expected = entity_offsets.len() as u64;
        if index != expected {
            return Err(StoreError::EventOutOfOrder {
                entity: name.to_string(),
                expected,
                got: index,
            });
        }

        let entry = encode_entry(name, index, payload)?;

        let mut log = self.file.lock();
        let offset = log.size;
        log.file.seek(SeekFrom::Start(offset))?;
        log.file.write_all(&entry)?;

        // Indexed before syncing: the entry is in the file even if the sync fails.
        log.size = offset + entry.len() as u64;
        entity_offsets.push(offset);

        log.writes_since_sync += 1;
        if log.writes_since_sync >= self.sync_interval {
            log.file.sync_all()?;
            log.writes_since_sync = 0;
        }

        Ok(())
    }

    /// Offsets of `name`'s entries with index >= `from_index`.
    pub fn offsets_from(&self, name: &str, from_index: u64) -> Vec<(u64, u64)> {
        self.offsets
            .read()
            .get(name)
            .map(|offsets| {
                offsets
                    .iter()
                    .enumerate()
                    .skip(from_index as usize)
                    .map(|(index, offset)| (index as u64, *offset))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of entries for `name`.
    pub fn len(&self, name: &str) -> u64 {
        self.offsets
            .read()
            .get(name)
            .map_or(0, |offsets| offsets.len() as u64)
    }

    /// Read the entry at `offset`.
    pub fn read_at(&self, offset: u64) -> Result<LogEntry> {
        let mut log = self.file.lock();
        let remaining = log.size.saturating_sub(offset);
        log.file.seek(SeekFrom::Start(offset))?;
        read_entry(&mut log.file, remaining)
    }

    /// Force sync all pending writes to disk.
    pub fn sync(&self) -> Result<()> {
        let mut log = self.file.lock();
        log.file.sync_all()?;
        log.writes_since_sync = 0;
        Ok(())
    }

    fn scan(file: &mut File) -> Result<(HashMap<String, Vec<u64>>, u64)> {
        let file_size = file.metadata()?.len();
        let mut offsets: HashMap<String, Vec<u64>> = HashMap::new();
        let mut offset = 0u64;

        file.seek(SeekFrom::Start(0))?;
        let mut reader = io::BufReader::new(&mut *file);

        while offset < file_size {
            let entry = match read_entry(&mut reader, file_size - offset) {
                Ok(entry) => entry,
                Err(StoreError::Io(e)) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e),
            };

            let entity_offsets = offsets.entry(entry.name.clone()).or_default();
            if entry.index != entity_offsets.len() as u64 {
                return Err(StoreError::Corruption(format!(
                    "entry for {} at offset {} has index {}, expected {}",
                    entry.name,
                    offset,
                    entry.index,
                    entity_offsets.len()
                )));
            }
            entity_offsets.push(offset);
            offset += encoded_len(&entry);
        }

        drop(reader);
        if offset < file_size {
            // Only the last write may be incomplete. A short entry with a
            // valid entry after it means a damaged length field, not a crash.
            if let Some(later) = find_entry_after(file, offset)? {
                return Err(StoreError::Corruption(format!(
                    "entry at offset {} runs past the end of the log, \
                     but a valid entry follows at offset {}",
                    offset, later
                )));
            }
            warn!(offset, file_size, "truncating partially written log entry");
            file.set_len(offset)?;
        }

        Ok((offsets, offset))
    }
}

/// Offset of the first decodable entry starting after `offset`, if any.
fn find_entry_after(file: &mut File, offset: u64) -> Result<Option<u64>> {
    let start = offset + 1;
    file.seek(SeekFrom::Start(start))?;
    let mut rest = Vec::new();
    file.read_to_end(&mut rest)?;

    let found = rest
        .windows(ENTRY_MAGIC.len())
        .enumerate()
        .filter(|(_, window)| window[..] == ENTRY_MAGIC[..])
        .map(|(pos, _)| pos)
        .find(|&pos| {
            let mut candidate = &rest[pos..];
            read_entry(&mut candidate, (rest.len() - pos) as u64).is_ok()
        });

    Ok(found.map(|pos| start + pos as u64))
}

fn encoded_len(entry: &LogEntry) -> u64 {
    HEADER_LEN + entry.name.len() as u64 + TRAILER_LEN + entry.payload.len() as u64
}

fn checksum(name: &[u8], index: u64, payload: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(name);
    hasher.update(&index.to_le_bytes());
    hasher.update(payload);
    hasher.finalize()
}

fn encode_entry(name: &str, index: u64, payload: &[u8]) -> Result<Vec<u8>> {
    let name_bytes = name.as_bytes();
    let name_len = u16::try_from(name_bytes.len())
        .map_err(|_| StoreError::Serialization(format!("entity name too long: {}", name)))?;
    let payload_len = u32::try_from(payload.len())
        .map_err(|_| StoreError::Serialization(format!("event too large for {}", name)))?;

    let mut buf = Vec::with_capacity(4 + 1 + 2 + name_bytes.len() + 8 + 4 + payload.len() + 4);
    buf.extend_from_slice(ENTRY_MAGIC);
    buf.push(LOG_VERSION);
    buf.extend_from_slice(&name_len.to_le_bytes());
    buf.extend_from_slice(name_bytes);
    buf.extend_from_slice(&index.to_le_bytes());
    buf.extend_from_slice(&payload_len.to_le_bytes());
    buf.extend_from_slice(payload);
    buf.extend_from_slice(&checksum(name_bytes, index, payload).to_le_bytes());
    Ok(buf)
}

/// Error for a length field that points past the end of the log.
fn past_end(field: &str, len: u64, remaining: u64) -> StoreError {
    StoreError::Io(io::Error::new(
        io::ErrorKind::UnexpectedEof,
        format!("{} of {} bytes exceeds the {} bytes left in the log", field, len, remaining),
    ))
}

/// Read one entry from `reader`, which has `remaining` bytes left.
///
/// Declared lengths are checked against `remaining` before anything is
/// allocated; an entry that cannot fit fails with `UnexpectedEof`.
fn read_entry(reader: &mut impl Read, remaining: u64) -> Result<LogEntry> {
    // Magic
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if &magic != ENTRY_MAGIC {
        return Err(StoreError::InvalidFormat("Invalid log entry magic".into()));
    }

    // Version
    let mut version = [0u8; 1];
    reader.read_exact(&mut version)?;
    if version[0] != LOG_VERSION {
        return Err(StoreError::InvalidFormat(format!(
            "Unsupported log version: {}",
            version[0]
        )));
    }

    // Entity name
    let mut name_len_bytes = [0u8; 2];
    reader.read_exact(&mut name_len_bytes)?;
    let name_len = u16::from_le_bytes(name_len_bytes) as u64;
    if HEADER_LEN + name_len + TRAILER_LEN > remaining {
        return Err(past_end("entity name", name_len, remaining));
    }
    let mut name_bytes = vec![0u8; name_len as usize];
    reader.read_exact(&mut name_bytes)?;

    // Index
    let mut index_bytes = [0u8; 8];
    reader.read_exact(&mut index_bytes)?;
    let index = u64::from_le_bytes(index_bytes);

    // Payload
    let mut payload_len_bytes = [0u8; 4];
    reader.read_exact(&mut payload_len_bytes)?;
    let payload_len = u32::from_le_bytes(payload_len_bytes) as u64;
    if HEADER_LEN + name_len + TRAILER_LEN + payload_len > remaining {
        return Err(past_end("payload", payload_len, remaining));
    }
    let mut payload = vec![0u8; payload_len as usize];
    reader.read_exact(&mut payload)?;

    // Checksum
    let mut checksum_bytes = [0u8; 4];
    reader.read_exact(&mut checksum_bytes)?;
    let stored = u32::from_le_bytes(checksum_bytes);
    let computed = checksum(&name_bytes, index, &payload);
    if stored != computed {
        return Err(StoreError::ChecksumMismatch {
            expected: stored,
            got: computed,
        });
    }

    let name = String::from_utf8(name_bytes)
        .map_err(|e| StoreError::Corruption(format!("entity name is not utf-8: {}", e)))?;

    Ok(LogEntry {
        name,
        index,
        payload,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_append_and_read() {
        let dir = TempDir::new().unwrap();
        let log = EventLog::open(dir.path().join("events.log"), 1).unwrap();

        log.append("g1", 0, b"hello").unwrap();
        log.append("g2", 0, b"other").unwrap();
        log.append("g1", 1, b"world").unwrap();

        let offsets = log.offsets_from("g1", 0);
        assert_eq!(offsets.len(), 2);
        assert_eq!(offsets[0].0, 0);
        assert_eq!(offsets[1].0, 1);

        let entry = log.read_at(offsets[1].1).unwrap();
        assert_eq!(entry.name, "g1");
        assert_eq!(entry.index, 1);
        assert_eq!(entry.payload, b"world");

        assert_eq!(log.offsets_from("g1", 1).len(), 1);
        assert!(log.offsets_from("g1", 5).is_empty());
        assert!(log.offsets_from("missing", 0).is_empty());
    }

    #[test]
    fn test_rejects_out_of_order() {
        let dir = TempDir::new().unwrap();
        let log = EventLog::open(dir.path().join("events.log"), 1).unwrap();

        log.append("g1", 0, b"a").unwrap();
        assert!(matches!(
            log.append("g1", 3, b"b"),
            Err(StoreError::EventOutOfOrder { expected: 1, got: 3, .. })
        ));
        assert_eq!(log.len("g1"), 1);
    }

    #[test]
    fn test_persistence() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("events.log");

        {
            let log = EventLog::open(&path, 100).unwrap();
            for i in 0..5 {
                log.append("g1", i, format!("event {}", i).as_bytes()).unwrap();
            }
            log.sync().unwrap();
        }

        let log = EventLog::open(&path, 100).unwrap();
        assert_eq!(log.len("g1"), 5);
        log.append("g1", 5, b"event 5").unwrap();
        let entry = log.read_at(log.offsets_from("g1", 5)[0].1).unwrap();
        assert_eq!(entry.payload, b"event 5");
    }

    #[test]
    fn test_torn_tail_is_truncated() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("events.log");

        {
            let log = EventLog::open(&path, 1).unwrap();
            log.append("g1", 0, b"complete").unwrap();
            log.append("g1", 1, b"will be torn").unwrap();
        }

        let full = std::fs::metadata(&path).unwrap().len();
        let file = OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(full - 3).unwrap();
        drop(file);

        let log = EventLog::open(&path, 1).unwrap();
        assert_eq!(log.len("g1"), 1);
        log.append("g1", 1, b"rewritten").unwrap();
        assert_eq!(log.len("g1"), 2);
    }

    #[test]
    fn test_checksum_mismatch_fails_open() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("events.log");

        {
            let log = EventLog::open(&path, 1).unwrap();
            log.append("g1", 0, b"payload").unwrap();
        }

        let mut bytes = std::fs::read(&path).unwrap();
        // Flip a payload byte: magic(4) + version(1) + len(2) + "g1"(2) + index(8) + len(4)
        bytes[21] ^= 0xff;
        std::fs::write(&path, &bytes).unwrap();

        assert!(matches!(
            EventLog::open(&path, 1),
            Err(StoreError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_corrupt_length_in_middle_entry_fails_open() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("events.log");

        {
            let log = EventLog::open(&path, 1).unwrap();
            log.append("g1", 0, b"first").unwrap();
            log.append("g1", 1, b"second").unwrap();
            log.append("g2", 0, b"other").unwrap();
        }

        let mut bytes = std::fs::read(&path).unwrap();
        let before = bytes.len() as u64;
        // High byte of the first entry's payload length.
        bytes[20] = 0x7f;
        std::fs::write(&path, &bytes).unwrap();

        assert!(matches!(
            EventLog::open(&path, 1),
            Err(StoreError::Corruption(_))
        ));
        assert_eq!(std::fs::metadata(&path).unwrap().len(), before);
    }

    #[test]
    fn test_torn_tail_with_magic_in_payload_is_truncated() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("events.log");

        {
            let log = EventLog::open(&path, 1).unwrap();
            log.append("g1", 0, b"complete").unwrap();
            log.append("g1", 1, b"contains EVT\0 inside").unwrap();
        }

        let full = std::fs::metadata(&path).unwrap().len();
        let file = OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(full - 2).unwrap();
        drop(file);

        let log = EventLog::open(&path, 1).unwrap();
        assert_eq!(log.len("g1"), 1);
    }

    #[test]
    fn test_index_matches_file_after_each_append() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("events.log");
        let log = EventLog::open(&path, 3).unwrap();

        for i in 0..7 {
            log.append("g1", i, b"a").unwrap();
            log.append("g2", i, b"bb").unwrap();

            // Every written entry is indexed, synced or not.
            assert_eq!(log.len("g1"), i + 1);
            let size = std::fs::metadata(&path).unwrap().len();
            let last = log.offsets_from("g2", i)[0].1;
            assert_eq!(last + encoded_len(&log.read_at(last).unwrap()), size);
        }
        drop(log);

        let log = EventLog::open(&path, 3).unwrap();
        assert_eq!(log.len("g1"), 7);
        assert_eq!(log.len("g2"), 7);
        assert!(matches!(
            log.append("g1", 6, b"dup"),
            Err(StoreError::EventOutOfOrder { expected: 7, got: 6, .. })
        ));
    }
}
