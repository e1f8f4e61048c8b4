//! Query execution for the statement language.
//!
//! This module runs parsed statements against the storage engine:
//! - DDL against the catalog (keyspaces and tables)
//! - INSERT and DELETE against row storage
//! - SELECT against user tables and the virtual `system_schema` tables
//! - Preparation of statements with `?` bind markers
//!
//! # Example
//!
//! ```ignore
//! use query::{QueryExecutor, Session};
//!
//! let parsed = cql::parse("SELECT t, v FROM ks.t WHERE p = ?")?;
//! let values = vec![Some(StringValue::from("key"))];
//! let executor = QueryExecutor::new(session.keyspace(), &values);
//! let (result, _) = executor.read(&db, &parsed.statement)?;
//! ```

mod executor;
mod prepare;
pub mod types;

pub use executor::{QueryExecutor, Session, is_read_only};
pub use prepare::prepare;
pub use types::{ColumnSpec, PreparedStatement, ProtoQueryResult, QueryResult, QueryRow};

use crate::cql::ParseError;
use crate::proto::google::rpc::Code;
use crate::schema::CatalogError;
use crate::storage::DatabaseError;
use crate::types::ValidationError;

/// Errors that can occur while preparing or executing a statement.
#[derive(Debug)]
pub enum QueryError {
    /// The statement text could not be parsed.
    Parse(ParseError),
    /// A value violated its column type.
    Validation(ValidationError),
    /// The statement is well-formed but cannot be executed as written.
    InvalidRequest(String),
    /// Storage or schema error.
    Database(DatabaseError),
    /// An execute request named a statement this connection never prepared.
    UnknownPreparedStatement(u32),
    /// The shared database lock was poisoned by a panicking writer.
    LockPoisoned,
}

impl QueryError {
    /// The status code reported to the client.
    #[must_use]
    pub const fn code(&self) -> Code {
        match self {
            Self::Parse(_) | Self::Validation(_) | Self::InvalidRequest(_) => Code::InvalidArgument,
            Self::UnknownPreparedStatement(_) => Code::NotFound,
            Self::Database(DatabaseError::Catalog(e)) => match e {
                CatalogError::KeyspaceNotFound(_) | CatalogError::TableNotFound { .. } => {
                    Code::NotFound
                }
                CatalogError::KeyspaceExists(_) | CatalogError::TableExists { .. } => {
                    Code::AlreadyExists
                }
                CatalogError::ReadOnlyKeyspace(_) | CatalogError::InvalidDefinition(_) => {
                    Code::InvalidArgument
                }
            },
            Self::Database(_) | Self::LockPoisoned => Code::Internal,
        }
    }
}

impl std::fmt::Display for QueryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(e) => write!(f, "{e}"),
            Self::Validation(e) => write!(f, "{e}"),
            Self::InvalidRequest(message) => f.write_str(message),
            Self::Database(e) => write!(f, "{e}"),
            Self::UnknownPreparedStatement(id) => write!(f, "Prepared statement {id} not found"),
            Self::LockPoisoned => write!(f, "Database lock poisoned"),
        }
    }
}

impl std::error::Error for QueryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Parse(e) => Some(e),
            Self::Validation(e) => Some(e),
            Self::Database(e) => Some(e),
            Self::InvalidRequest(_) | Self::UnknownPreparedStatement(_) | Self::LockPoisoned => {
                None
            }
        }
    }
}

impl From<ParseError> for QueryError {
    fn from(e: ParseError) -> Self {
        Self::Parse(e)
    }
}

impl From<ValidationError> for QueryError {
    fn from(e: ValidationError) -> Self {
        Self::Validation(e)
    }
}

impl From<DatabaseError> for QueryError {
    fn from(e: DatabaseError) -> Self {
        Self::Database(e)
    }
}

impl From<CatalogError> for QueryError {
    fn from(e: CatalogError) -> Self {
        Self::Database(DatabaseError::Catalog(e))
    }
}
