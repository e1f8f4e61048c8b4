//! High-level database interface.
//!
//! Owns the schema catalog, the row data of every table and, when opened on
//! disk, the commit log. Each mutation is checked against the catalog, logged,
//! and only then applied in memory, so a failed append changes nothing.

use std::collections::BTreeMap;
use std::path::Path;

use crate::schema::{Catalog, CatalogError, TableSchema};
use crate::storage::commitlog::{CommitLog, CommitLogEntry, CommitLogError, RecoveryResult};
use crate::storage::record::{self, Cells, RecordError};

/// Row records of one table, keyed by partition key bytes.
type Partitions = BTreeMap<Vec<u8>, Vec<u8>>;

/// A database instance.
#[derive(Debug, Default)]
pub struct Database {
    catalog: Catalog,
    data: BTreeMap<String, BTreeMap<String, Partitions>>,
    commit_log: Option<CommitLog>,
}

impl Database {
    /// Create an empty database that is never persisted.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open the database whose commit log lives at `path`, replaying the log.
    ///
    /// The log is created if it does not exist.
    pub fn open(path: &Path, sync: bool) -> Result<(Self, RecoveryResult), DatabaseError> {
        let (commit_log, entries, result) = CommitLog::open(path, sync)?;
        let mut database = Self::default();
        for entry in entries {
            database.apply(entry);
        }
        database.commit_log = Some(commit_log);
        Ok((database, result))
    }

    #[must_use]
    pub const fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn create_keyspace(&mut self, name: &str) -> Result<(), DatabaseError> {
        self.catalog.check_create_keyspace(name)?;
        self.commit(CommitLogEntry::CreateKeyspace {
            name: name.to_owned(),
        })
    }

    pub fn drop_keyspace(&mut self, name: &str) -> Result<(), DatabaseError> {
        self.catalog.check_drop_keyspace(name)?;
        self.commit(CommitLogEntry::DropKeyspace {
            name: name.to_owned(),
        })
    }

    pub fn create_table(&mut self, schema: TableSchema) -> Result<(), DatabaseError> {
        self.catalog.check_create_table(&schema)?;
        self.commit(CommitLogEntry::CreateTable { schema })
    }

    pub fn drop_table(&mut self, keyspace: &str, table: &str) -> Result<(), DatabaseError> {
        self.catalog.check_drop_table(keyspace, table)?;
        self.commit(CommitLogEntry::DropTable {
            keyspace: keyspace.to_owned(),
            table: table.to_owned(),
        })
    }

    /// Write cells of the row with partition key `key`.
    ///
    /// `updates` pairs column positions with new cell values; columns not
    /// mentioned keep their previous value. A `None` value clears the cell.
    pub fn upsert(
        &mut self,
        keyspace: &str,
        table: &str,
        key: &[u8],
        updates: Vec<(usize, Option<Vec<u8>>)>,
    ) -> Result<(), DatabaseError> {
        let column_count = self.catalog.table(keyspace, table)?.columns.len();
        let mut cells = self
            .get(keyspace, table, key)?
            .unwrap_or_else(|| vec![None; column_count]);
        cells.resize(column_count, None);
        for (index, value) in updates {
            if index >= column_count {
                return Err(DatabaseError::ColumnOutOfRange(index));
            }
            cells[index] = value;
        }

        let record = record::encode(&cells)?;
        self.commit(CommitLogEntry::Upsert {
            keyspace: keyspace.to_owned(),
            table: table.to_owned(),
            key: key.to_vec(),
            record,
        })
    }

    /// Remove the row with partition key `key`.
    ///
    /// Returns whether a row was removed.
    pub fn delete(&mut self, keyspace: &str, table: &str, key: &[u8]) -> Result<bool, DatabaseError> {
        self.catalog.table(keyspace, table)?;
        if self.partitions(keyspace, table).is_none_or(|p| !p.contains_key(key)) {
            return Ok(false);
        }
        self.commit(CommitLogEntry::Delete {
            keyspace: keyspace.to_owned(),
            table: table.to_owned(),
            key: key.to_vec(),
        })?;
        Ok(true)
    }

    /// Read one row.
    pub fn get(&self, keyspace: &str, table: &str, key: &[u8]) -> Result<Option<Cells>, DatabaseError> {
        self.catalog.table(keyspace, table)?;
        match self.partitions(keyspace, table).and_then(|p| p.get(key)) {
            Some(bytes) => Ok(Some(record::decode(bytes)?)),
            None => Ok(None),
        }
    }

    /// Read every row of a table in partition key order.
    pub fn scan(&self, keyspace: &str, table: &str) -> Result<Vec<Cells>, DatabaseError> {
        self.catalog.table(keyspace, table)?;
        self.partitions(keyspace, table)
            .into_iter()
            .flat_map(BTreeMap::values)
            .map(|bytes| record::decode(bytes).map_err(DatabaseError::from))
            .collect()
    }

    fn partitions(&self, keyspace: &str, table: &str) -> Option<&Partitions> {
        self.data.get(keyspace).and_then(|tables| tables.get(table))
    }

    /// Log an entry, then apply it.
    fn commit(&mut self, entry: CommitLogEntry) -> Result<(), DatabaseError> {
        if let Some(log) = &mut self.commit_log {
            log.append(&entry)?;
        }
        self.apply(entry);
        Ok(())
    }

    /// Apply an entry to the in-memory state.
    ///
    /// Entries are checked before they are logged, so this never fails.
    /// During replay an entry for a missing table is skipped.
    fn apply(&mut self, entry: CommitLogEntry) {
        match entry {
            CommitLogEntry::CreateKeyspace { name } => {
                self.catalog.create_keyspace(&name);
                self.data.entry(name).or_default();
            }
            CommitLogEntry::DropKeyspace { name } => {
                self.catalog.drop_keyspace(&name);
                self.data.remove(&name);
            }
            CommitLogEntry::CreateTable { schema } => {
                self.data
                    .entry(schema.keyspace.as_str().to_owned())
                    .or_default()
                    .insert(schema.name.as_str().to_owned(), Partitions::new());
                self.catalog.create_table(schema);
            }
            CommitLogEntry::DropTable { keyspace, table } => {
                self.catalog.drop_table(&keyspace, &table);
                if let Some(tables) = self.data.get_mut(&keyspace) {
                    tables.remove(&table);
                }
            }
            CommitLogEntry::Upsert {
                keyspace,
                table,
                key,
                record,
            } => {
                match self.data.get_mut(&keyspace).and_then(|t| t.get_mut(&table)) {
                    Some(partitions) => {
                        partitions.insert(key, record);
                    }
                    None => tracing::warn!("skipping write to missing table {keyspace}.{table}"),
                }
            }
            CommitLogEntry::Delete {
                keyspace,
                table,
                key,
            } => {
                if let Some(partitions) = self.data.get_mut(&keyspace).and_then(|t| t.get_mut(&table)) {
                    partitions.remove(&key);
                }
            }
        }
    }
}

/// Errors that can occur during database operations.
#[derive(Debug)]
pub enum DatabaseError {
    /// Schema error.
    Catalog(CatalogError),
    /// Row record error.
    Record(RecordError),
    /// Commit log error.
    CommitLog(CommitLogError),
    /// A write referenced a column position past the end of the row.
    ColumnOutOfRange(usize),
}

impl std::fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Catalog(e) => write!(f, "{e}"),
            Self::Record(e) => write!(f, "record error: {e}"),
            Self::CommitLog(e) => write!(f, "{e}"),
            Self::ColumnOutOfRange(index) => write!(f, "column {index} out of range"),
        }
    }
}

impl std::error::Error for DatabaseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Catalog(e) => Some(e),
            Self::Record(e) => Some(e),
            Self::CommitLog(e) => Some(e),
            Self::ColumnOutOfRange(_) => None,
        }
    }
}

impl From<CatalogError> for DatabaseError {
    fn from(e: CatalogError) -> Self {
        Self::Catalog(e)
    }
}

impl From<RecordError> for DatabaseError {
    fn from(e: RecordError) -> Self {
        Self::Record(e)
    }
}

impl From<CommitLogError> for DatabaseError {
    fn from(e: CommitLogError) -> Self {
        Self::CommitLog(e)
    }
}
