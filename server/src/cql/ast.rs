//! Parsed statement representation.
//!
//! Type tokens are already resolved to `ColumnType` here, so `varchar` and
//! `text` are indistinguishable from this point on.

use crate::types::{ColumnType, StringValue};

/// A possibly keyspace-qualified table name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualifiedName {
    pub keyspace: Option<String>,
    pub name: String,
}

/// A value expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Term {
    /// `'...'`
    String(String),
    /// `0x...`
    Hex(StringValue),
    /// `NULL`
    Null,
    /// `?`, numbered from 0 in order of appearance.
    BindMarker(usize),
    /// `(type) term`
    Cast {
        column_type: ColumnType,
        term: Box<Term>,
    },
}

/// A WHERE clause condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Relation {
    /// `column = term`
    Eq { column: String, term: Term },
    /// `column IN (term, ...)`
    In { column: String, terms: Vec<Term> },
}

impl Relation {
    /// The column this relation restricts.
    #[must_use]
    pub fn column(&self) -> &str {
        match self {
            Self::Eq { column, .. } | Self::In { column, .. } => column,
        }
    }

    /// The terms compared against the column.
    #[must_use]
    pub fn terms(&self) -> Vec<&Term> {
        match self {
            Self::Eq { term, .. } => vec![term],
            Self::In { terms, .. } => terms.iter().collect(),
        }
    }
}

/// A column in a CREATE TABLE statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDefinition {
    pub name: String,
    pub column_type: ColumnType,
}

/// The columns a SELECT returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Wildcard,
    Columns(Vec<String>),
}

/// A parsed statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    CreateKeyspace {
        name: String,
        if_not_exists: bool,
    },
    DropKeyspace {
        name: String,
        if_exists: bool,
    },
    Use {
        keyspace: String,
    },
    CreateTable {
        table: QualifiedName,
        if_not_exists: bool,
        columns: Vec<ColumnDefinition>,
        partition_key: String,
    },
    DropTable {
        table: QualifiedName,
        if_exists: bool,
    },
    Insert {
        table: QualifiedName,
        columns: Vec<String>,
        values: Vec<Term>,
    },
    Select {
        table: QualifiedName,
        selection: Selection,
        relations: Vec<Relation>,
    },
    Delete {
        table: QualifiedName,
        relations: Vec<Relation>,
    },
}

impl Statement {
    /// Short statement kind, used in logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::CreateKeyspace { .. } => "CREATE KEYSPACE",
            Self::DropKeyspace { .. } => "DROP KEYSPACE",
            Self::Use { .. } => "USE",
            Self::CreateTable { .. } => "CREATE TABLE",
            Self::DropTable { .. } => "DROP TABLE",
            Self::Insert { .. } => "INSERT",
            Self::Select { .. } => "SELECT",
            Self::Delete { .. } => "DELETE",
        }
    }
}

/// A statement together with the number of `?` markers it contains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedStatement {
    pub statement: Statement,
    pub bind_marker_count: usize,
}
