//! Append-only commit log.
//!
//! Every schema change and row mutation is appended here before it is applied
//! in memory. On open the log is read front to back and its entries replayed;
//! the first entry that cannot be read marks the end of the log, and
//! everything from it onwards is truncated away.
//!
//! # Entry Format
//!
//! ```text
//! +----------+------------------------------------------------+
//! | 0-3      | entry_length (4 bytes, includes header+crc)    |
//! | 4        | entry_type (1 byte)                            |
//! | 5-N      | payload (variable, depends on type)            |
//! | N-N+3    | CRC32 checksum (4 bytes)                       |
//! +----------+------------------------------------------------+
//! ```
//!
//! Strings and byte strings inside a payload are written as a 4-byte length
//! followed by the bytes.

// entry lengths are bounded by MAX_ENTRY_SIZE before narrowing
#![allow(clippy::cast_possible_truncation)]

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::schema::{ColumnKind, ColumnSchema, TableSchema};
use crate::types::ColumnType;

/// `entry_length` (4) + `entry_type` (1)
const ENTRY_HEADER_SIZE: usize = 5;

const CHECKSUM_SIZE: usize = 4;

/// Largest entry the log accepts: 256MB.
pub const MAX_ENTRY_SIZE: usize = 256 * 1024 * 1024;

/// Commit log entry types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EntryType {
    CreateKeyspace = 0x01,
    DropKeyspace = 0x02,
    CreateTable = 0x03,
    DropTable = 0x04,
    Upsert = 0x05,
    Delete = 0x06,
}

impl TryFrom<u8> for EntryType {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(Self::CreateKeyspace),
            0x02 => Ok(Self::DropKeyspace),
            0x03 => Ok(Self::CreateTable),
            0x04 => Ok(Self::DropTable),
            0x05 => Ok(Self::Upsert),
            0x06 => Ok(Self::Delete),
            _ => Err(value),
        }
    }
}

/// A single logged mutation.
#[derive(Debug, PartialEq, Eq)]
pub enum CommitLogEntry {
    CreateKeyspace {
        name: String,
    },
    DropKeyspace {
        name: String,
    },
    CreateTable {
        schema: TableSchema,
    },
    DropTable {
        keyspace: String,
        table: String,
    },
    /// Replace a whole row. `record` is a serialized row record.
    Upsert {
        keyspace: String,
        table: String,
        key: Vec<u8>,
        record: Vec<u8>,
    },
    Delete {
        keyspace: String,
        table: String,
        key: Vec<u8>,
    },
}

impl CommitLogEntry {
    #[must_use]
    pub const fn entry_type(&self) -> EntryType {
        match self {
            Self::CreateKeyspace { .. } => EntryType::CreateKeyspace,
            Self::DropKeyspace { .. } => EntryType::DropKeyspace,
            Self::CreateTable { .. } => EntryType::CreateTable,
            Self::DropTable { .. } => EntryType::DropTable,
            Self::Upsert { .. } => EntryType::Upsert,
            Self::Delete { .. } => EntryType::Delete,
        }
    }

    fn payload(&self) -> Vec<u8> {
        let mut w = PayloadWriter::default();
        match self {
            Self::CreateKeyspace { name } | Self::DropKeyspace { name } => w.put_str(name),
            Self::CreateTable { schema } => {
                w.put_str(&schema.keyspace);
                w.put_str(&schema.name);
                w.put_u32(schema.columns.len() as u32);
                for column in &schema.columns {
                    w.put_str(&column.name);
                    w.put_u8(column.column_type as u8);
                    w.put_u8(u8::from(column.kind == ColumnKind::PartitionKey));
                }
            }
            Self::DropTable { keyspace, table } => {
                w.put_str(keyspace);
                w.put_str(table);
            }
            Self::Upsert {
                keyspace,
                table,
                key,
                record,
            } => {
                w.put_str(keyspace);
                w.put_str(table);
                w.put_bytes(key);
                w.put_bytes(record);
            }
            Self::Delete {
                keyspace,
                table,
                key,
            } => {
                w.put_str(keyspace);
                w.put_str(table);
                w.put_bytes(key);
            }
        }
        w.bytes
    }

    fn from_payload(entry_type: EntryType, bytes: &[u8]) -> Result<Self, CommitLogError> {
        let mut r = PayloadReader { bytes, offset: 0 };
        let entry = match entry_type {
            EntryType::CreateKeyspace => Self::CreateKeyspace {
                name: r.read_string()?,
            },
            EntryType::DropKeyspace => Self::DropKeyspace {
                name: r.read_string()?,
            },
            EntryType::CreateTable => {
                let keyspace = r.read_string()?;
                let name = r.read_string()?;
                let count = r.read_u32()? as usize;
                let mut columns = Vec::new();
                for _ in 0..count {
                    let column_name = r.read_string()?;
                    let column_type = ColumnType::try_from(r.read_u8()?).map_err(|t| {
                        CommitLogError::CorruptEntry(format!("unknown column type 0x{t:02x}"))
                    })?;
                    let kind = if r.read_u8()? == 1 {
                        ColumnKind::PartitionKey
                    } else {
                        ColumnKind::Regular
                    };
                    columns.push(ColumnSchema {
                        name: column_name,
                        column_type,
                        kind,
                    });
                }
                Self::CreateTable {
                    schema: TableSchema {
                        keyspace,
                        name,
                        columns,
                    },
                }
            }
            EntryType::DropTable => Self::DropTable {
                keyspace: r.read_string()?,
                table: r.read_string()?,
            },
            EntryType::Upsert => Self::Upsert {
                keyspace: r.read_string()?,
                table: r.read_string()?,
                key: r.read_bytes()?,
                record: r.read_bytes()?,
            },
            EntryType::Delete => Self::Delete {
                keyspace: r.read_string()?,
                table: r.read_string()?,
                key: r.read_bytes()?,
            },
        };
        if r.offset != bytes.len() {
            return Err(CommitLogError::CorruptEntry(
                "trailing bytes after payload".to_string(),
            ));
        }
        Ok(entry)
    }

    /// Serialize this entry, header and checksum included.
    ///
    /// # Errors
    ///
    /// Fails if the entry is larger than `MAX_ENTRY_SIZE`.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CommitLogError> {
        let payload = self.payload();
        let total_len = ENTRY_HEADER_SIZE + payload.len() + CHECKSUM_SIZE;
        if total_len > MAX_ENTRY_SIZE {
            return Err(CommitLogError::EntryTooLarge(total_len));
        }

        let mut bytes = Vec::with_capacity(total_len);
        bytes.extend_from_slice(&(total_len as u32).to_le_bytes());
        bytes.push(self.entry_type() as u8);
        bytes.extend_from_slice(&payload);

        // Checksum covers everything before it
        let checksum = crc32fast::hash(&bytes);
        bytes.extend_from_slice(&checksum.to_le_bytes());
        Ok(bytes)
    }

    /// Deserialize one entry from the front of `bytes`.
    ///
    /// Returns the entry and the number of bytes consumed.
    ///
    /// # Errors
    ///
    /// Fails if the entry is incomplete, its checksum does not match, or its
    /// payload cannot be read.
    pub fn from_bytes(bytes: &[u8]) -> Result<(Self, usize), CommitLogError> {
        if bytes.len() < ENTRY_HEADER_SIZE + CHECKSUM_SIZE {
            return Err(CommitLogError::Incomplete);
        }
        let entry_len = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
        if entry_len < ENTRY_HEADER_SIZE + CHECKSUM_SIZE || entry_len > MAX_ENTRY_SIZE {
            return Err(CommitLogError::CorruptEntry(format!(
                "invalid entry length {entry_len}"
            )));
        }
        if entry_len > bytes.len() {
            return Err(CommitLogError::Incomplete);
        }

        let stored = u32::from_le_bytes([
            bytes[entry_len - 4],
            bytes[entry_len - 3],
            bytes[entry_len - 2],
            bytes[entry_len - 1],
        ]);
        let computed = crc32fast::hash(&bytes[..entry_len - CHECKSUM_SIZE]);
        if stored != computed {
            return Err(CommitLogError::ChecksumMismatch {
                expected: stored,
                actual: computed,
            });
        }

        let entry_type = EntryType::try_from(bytes[4]).map_err(CommitLogError::InvalidEntryType)?;
        let payload = &bytes[ENTRY_HEADER_SIZE..entry_len - CHECKSUM_SIZE];
        Ok((Self::from_payload(entry_type, payload)?, entry_len))
    }
}

#[derive(Default)]
struct PayloadWriter {
    bytes: Vec<u8>,
}

impl PayloadWriter {
    fn put_u8(&mut self, value: u8) {
        self.bytes.push(value);
    }

    fn put_u32(&mut self, value: u32) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    fn put_bytes(&mut self, value: &[u8]) {
        self.put_u32(value.len() as u32);
        self.bytes.extend_from_slice(value);
    }

    fn put_str(&mut self, value: &str) {
        self.put_bytes(value.as_bytes());
    }
}

struct PayloadReader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl PayloadReader<'_> {
    fn take(&mut self, n: usize) -> Result<&[u8], CommitLogError> {
        let end = self
            .offset
            .checked_add(n)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| CommitLogError::CorruptEntry("payload too short".to_string()))?;
        let slice = &self.bytes[self.offset..end];
        self.offset = end;
        Ok(slice)
    }

    fn read_u8(&mut self) -> Result<u8, CommitLogError> {
        Ok(self.take(1)?[0])
    }

    fn read_u32(&mut self) -> Result<u32, CommitLogError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn read_bytes(&mut self) -> Result<Vec<u8>, CommitLogError> {
        let len = self.read_u32()? as usize;
        Ok(self.take(len)?.to_vec())
    }

    fn read_string(&mut self) -> Result<String, CommitLogError> {
        String::from_utf8(self.read_bytes()?)
            .map_err(|_| CommitLogError::CorruptEntry("name is not valid UTF-8".to_string()))
    }
}

/// Outcome of reading a commit log on open.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RecoveryResult {
    /// Number of entries read and replayed.
    pub entries_replayed: usize,
    /// Bytes cut off the end of the log.
    pub truncated_bytes: u64,
    /// Why the tail was truncated, if it was.
    pub truncation_reason: Option<String>,
}

/// An open commit log file.
#[derive(Debug)]
pub struct CommitLog {
    file: File,
    /// Length of the log up to the end of the last complete entry.
    len: u64,
    sync: bool,
    /// Set when a failed append could not be rolled back. The file may end
    /// in a partial entry, so nothing more may be appended after it.
    failed: bool,
}

impl CommitLog {
    /// Open the log at `path`, creating it if it does not exist.
    ///
    /// Returns the log positioned for appending, the entries it held, and a
    /// summary of the recovery. A torn or corrupt tail is truncated.
    ///
    /// When `sync` is set, every append is flushed to disk before returning.
    ///
    /// # Errors
    ///
    /// Fails only on I/O errors; unreadable entries are truncated instead.
    pub fn open(
        path: &Path,
        sync: bool,
    ) -> Result<(Self, Vec<CommitLogEntry>, RecoveryResult), CommitLogError> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let mut contents = Vec::new();
        file.read_to_end(&mut contents)?;

        let mut entries = Vec::new();
        let mut offset = 0;
        let mut truncation_reason = None;
        while offset < contents.len() {
            match CommitLogEntry::from_bytes(&contents[offset..]) {
                Ok((entry, consumed)) => {
                    entries.push(entry);
                    offset += consumed;
                }
                Err(e) => {
                    truncation_reason = Some(e.to_string());
                    break;
                }
            }
        }

        let truncated_bytes = (contents.len() - offset) as u64;
        if truncated_bytes > 0 {
            file.set_len(offset as u64)?;
            file.sync_all()?;
        }
        file.seek(SeekFrom::End(0))?;

        let result = RecoveryResult {
            entries_replayed: entries.len(),
            truncated_bytes,
            truncation_reason,
        };
        Ok((
            Self {
                file,
                len: offset as u64,
                sync,
                failed: false,
            },
            entries,
            result,
        ))
    }

    /// Append an entry to the end of the log.
    ///
    /// # Errors
    ///
    /// Fails if the entry cannot be serialized or written. A failed write is
    /// cut back off the file so later entries stay readable; if that fails
    /// too, the log refuses every further append.
    pub fn append(&mut self, entry: &CommitLogEntry) -> Result<(), CommitLogError> {
        if self.failed {
            return Err(CommitLogError::Failed);
        }
        let bytes = entry.to_bytes()?;
        if let Err(e) = self.write_entry(&bytes) {
            self.rollback();
            return Err(e);
        }
        self.len += bytes.len() as u64;
        Ok(())
    }

    fn write_entry(&mut self, bytes: &[u8]) -> Result<(), CommitLogError> {
        self.file.write_all(bytes)?;
        if self.sync {
            self.file.sync_data()?;
        }
        Ok(())
    }

    /// Drop anything written past the last complete entry.
    fn rollback(&mut self) {
        let restored = self
            .file
            .set_len(self.len)
            .and_then(|()| self.file.seek(SeekFrom::Start(self.len)));
        if let Err(e) = restored {
            tracing::error!(
                "Failed to roll back partial commit log entry at offset {}: {e}",
                self.len
            );
            self.failed = true;
        }
    }
}

/// Errors from the commit log.
#[derive(Debug)]
pub enum CommitLogError {
    /// I/O error.
    Io(std::io::Error),
    /// The log ends partway through an entry.
    Incomplete,
    /// An entry could not be decoded.
    CorruptEntry(String),
    /// Unknown entry type byte.
    InvalidEntryType(u8),
    /// Checksum mismatch.
    ChecksumMismatch { expected: u32, actual: u32 },
    /// Entry larger than `MAX_ENTRY_SIZE`.
    EntryTooLarge(usize),
    /// An earlier append could not be rolled back; the log is read-only.
    Failed,
}

impl std::fmt::Display for CommitLogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "commit log I/O error: {e}"),
            Self::Incomplete => write!(f, "incomplete commit log entry"),
            Self::CorruptEntry(message) => write!(f, "corrupt commit log entry: {message}"),
            Self::InvalidEntryType(t) => write!(f, "invalid commit log entry type: 0x{t:02x}"),
            Self::ChecksumMismatch { expected, actual } => write!(
                f,
                "commit log checksum mismatch: expected 0x{expected:08x}, got 0x{actual:08x}"
            ),
            Self::EntryTooLarge(size) => write!(
                f,
                "commit log entry too large: {size} bytes exceeds {MAX_ENTRY_SIZE} bytes"
            ),
            Self::Failed => write!(
                f,
                "commit log is unusable after a failed append; restart to recover"
            ),
        }
    }
}

impl std::error::Error for CommitLogError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CommitLogError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}
