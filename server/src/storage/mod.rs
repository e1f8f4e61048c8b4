//! Row storage.
//!
//! Tables are held in memory as partition key bytes mapped to row records.
//! When opened on disk, every schema change and row write goes through an
//! append-only commit log first and is replayed on the next open.
//!
//! # Usage
//!
//! ```ignore
//! use storage::Database;
//!
//! let (mut db, recovery) = Database::open(path, true)?;
//! db.create_keyspace("ks")?;
//! db.create_table(schema)?;
//! db.upsert("ks", "t", b"key", vec![(0, Some(b"key".to_vec()))])?;
//! let rows = db.scan("ks", "t")?;
//! ```

mod commitlog;
mod database;
mod record;

pub use commitlog::{CommitLog, CommitLogEntry, CommitLogError, RecoveryResult};
pub use database::{Database, DatabaseError};
pub use record::{Cells, RecordError};
