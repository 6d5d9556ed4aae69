// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Chain Tail Persistence
//!
//! The tail is the only mutable chain state: the next sequence number,
//! the last event hash and the last timestamp. It is persisted after every
//! admission so a restarted ledger continues the same chain instead of
//! starting a second one from genesis.
//!
//! # File Format
//! ```text
//! [Header: 16 bytes][Record][Record]...
//! ```
//! Header: magic `NLTL`, version u32 (1), reserved u64 (0).
//! Record: len u32 LE, crc32 u32 LE, bincode(ChainTail).
//!
//! The last record that passes its CRC wins. A torn final record (crash
//! mid-write) is cut off when the file is reopened, so later records are
//! never appended behind unreadable bytes. Once `compact_after` records accumulate the file
//! is rewritten with a single record through a temp file and rename.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use chrono::{DateTime, Utc};
use neural_ledger_core::{EventHash, LedgerEvent, GENESIS_HASH};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

const MAGIC: &[u8; 4] = b"NLTL";
const VERSION: u32 = 1;
const HEADER_LEN: usize = 16;
const DEFAULT_COMPACT_AFTER: u64 = 4096;

#[derive(Error, Debug)]
pub enum TailStoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid header")]
    InvalidHeader,

    #[error("Tail store lock poisoned")]
    Poisoned,
}

pub type Result<T> = std::result::Result<T, TailStoreError>;

/// Position the next event links onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainTail {
    pub next_sequence: u64,
    pub last_hash: EventHash,
    pub last_timestamp: Option<DateTime<Utc>>,
}

impl ChainTail {
    pub fn genesis() -> Self {
        Self {
            next_sequence: 0,
            last_hash: GENESIS_HASH,
            last_timestamp: None,
        }
    }

    /// Tail after `event` has been admitted.
    pub fn advance(&self, event: &LedgerEvent) -> Self {
        Self {
            next_sequence: event.sequence + 1,
            last_hash: event.event_hash,
            last_timestamp: Some(event.timestamp),
        }
    }
}

/// Durable home of the chain tail. Called from blocking threads.
pub trait TailStore: Send + Sync + 'static {
    /// `None` on first-ever start.
    fn load(&self) -> Result<Option<ChainTail>>;

    fn persist(&self, tail: &ChainTail) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryTailStore {
    tail: Mutex<Option<ChainTail>>,
}

impl MemoryTailStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TailStore for MemoryTailStore {
    fn load(&self) -> Result<Option<ChainTail>> {
        Ok(*self.tail.lock().map_err(|_| TailStoreError::Poisoned)?)
    }

    fn persist(&self, tail: &ChainTail) -> Result<()> {
        *self.tail.lock().map_err(|_| TailStoreError::Poisoned)? = Some(*tail);
        Ok(())
    }
}

struct TailFile {
    file: File,
    records: u64,
}

pub struct FileTailStore {
    path: PathBuf,
    compact_after: u64,
    inner: Mutex<TailFile>,
}

impl FileTailStore {
    /// Open or create a tail file, validating the header of an existing one.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::with_compaction(path, DEFAULT_COMPACT_AFTER)
    }

    pub fn with_compaction(path: impl AsRef<Path>, compact_after: u64) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let existed = path.exists() && std::fs::metadata(&path)?.len() > 0;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(&path)?;

        let records = if existed {
            let scanned = scan(&mut file)?;
            let len = file.metadata()?.len();
            if scanned.valid_end < len {
                tracing::warn!(
                    "Truncating tail file {:?} from {} to {} bytes",
                    path,
                    len,
                    scanned.valid_end
                );
                file.set_len(scanned.valid_end)?;
                file.sync_all()?;
            }
            scanned.records
        } else {
            file.write_all(&header_bytes()?)?;
            file.sync_all()?;
            0
        };

        Ok(Self {
            path,
            compact_after: compact_after.max(1),
            inner: Mutex::new(TailFile { file, records }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn compact(&self, inner: &mut TailFile, tail: &ChainTail) -> Result<()> {
        let tmp = self.path.with_extension("tmp");
        {
            let mut out = File::create(&tmp)?;
            out.write_all(&header_bytes()?)?;
            out.write_all(&encode_record(tail)?)?;
            out.sync_all()?;
        }
        std::fs::rename(&tmp, &self.path)?;
        inner.file = OpenOptions::new().append(true).read(true).open(&self.path)?;
        inner.records = 1;
        tracing::debug!("Compacted tail file {:?}", self.path);
        Ok(())
    }
}

impl TailStore for FileTailStore {
    fn load(&self) -> Result<Option<ChainTail>> {
        let mut file = File::open(&self.path)?;
        Ok(scan(&mut file)?.tail)
    }

    fn persist(&self, tail: &ChainTail) -> Result<()> {
        let mut inner = self.inner.lock().map_err(|_| TailStoreError::Poisoned)?;
        if inner.records >= self.compact_after {
            return self.compact(&mut inner, tail);
        }

        let record = encode_record(tail)?;
        inner.file.write_all(&record)?;
        inner.file.sync_all()?;
        inner.records += 1;
        Ok(())
    }
}

fn header_bytes() -> Result<Vec<u8>> {
    let mut bytes = Vec::with_capacity(HEADER_LEN);
    bytes.write_all(MAGIC)?;
    bytes.write_u32::<LittleEndian>(VERSION)?;
    bytes.write_u64::<LittleEndian>(0)?;
    Ok(bytes)
}

fn encode_record(tail: &ChainTail) -> Result<Vec<u8>> {
    let body = bincode::serde::encode_to_vec(tail, bincode::config::standard())
        .map_err(|e| TailStoreError::Serialization(e.to_string()))?;
    let mut record = Vec::with_capacity(8 + body.len());
    record.write_u32::<LittleEndian>(body.len() as u32)?;
    record.write_u32::<LittleEndian>(crc32fast::hash(&body))?;
    record.write_all(&body)?;
    Ok(record)
}

struct Scan {
    tail: Option<ChainTail>,
    records: u64,
    /// Byte offset just past the last valid record.
    valid_end: u64,
}

/// Read the whole file up to the first record that fails to validate.
fn scan(file: &mut File) -> Result<Scan> {
    use std::io::{Seek, SeekFrom};

    file.seek(SeekFrom::Start(0))?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)?;
    if buf.len() < HEADER_LEN || &buf[0..4] != MAGIC {
        return Err(TailStoreError::InvalidHeader);
    }
    let mut cursor = Cursor::new(&buf[4..HEADER_LEN]);
    if cursor.read_u32::<LittleEndian>()? != VERSION {
        return Err(TailStoreError::InvalidHeader);
    }

    let mut offset = HEADER_LEN;
    let mut last = None;
    let mut count = 0;
    while offset + 8 <= buf.len() {
        let mut cursor = Cursor::new(&buf[offset..offset + 8]);
        let len = cursor.read_u32::<LittleEndian>()? as usize;
        let crc = cursor.read_u32::<LittleEndian>()?;
        let start = offset + 8;
        let end = start + len;
        if end > buf.len() {
            tracing::warn!("Ignoring torn tail record at offset {}", offset);
            break;
        }
        let body = &buf[start..end];
        if crc32fast::hash(body) != crc {
            tracing::warn!("Ignoring corrupt tail record at offset {}", offset);
            break;
        }
        match bincode::serde::decode_from_slice::<ChainTail, _>(body, bincode::config::standard()) {
            Ok((tail, _)) => {
                last = Some(tail);
                count += 1;
            }
            Err(e) => {
                tracing::warn!("Undecodable tail record at offset {}: {}", offset, e);
                break;
            }
        }
        offset = end;
    }
    Ok(Scan {
        tail: last,
        records: count,
        valid_end: offset as u64,
    })
}
