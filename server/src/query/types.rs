//! Query result types.
//!
//! - `ColumnSpec` - A result column or bind variable: where it lives and its type
//! - `QueryResult` - Column specs plus decoded rows
//! - `PreparedStatement` - A parsed statement kept for repeated execution

use crate::cql::ParsedStatement;
use crate::proto;
use crate::schema::{ColumnSchema, TableSchema};
use crate::types::{ColumnType, ProtoSerializable, StringValue};

/// Describes one result column or bind variable.
#[derive(Debug, PartialEq, Eq)]
pub struct ColumnSpec {
    pub keyspace: String,
    pub table: String,
    pub name: String,
    pub column_type: ColumnType,
}

impl ColumnSpec {
    /// Describe `column` of `table`.
    #[must_use]
    pub fn of(table: &TableSchema, column: &ColumnSchema) -> Self {
        Self {
            keyspace: table.keyspace.as_str().to_owned(),
            table: table.name.as_str().to_owned(),
            name: column.name.as_str().to_owned(),
            column_type: column.column_type,
        }
    }

    /// Create a copy of this spec.
    ///
    /// This is used instead of Clone to comply with project policy.
    #[must_use]
    pub fn clone_value(&self) -> Self {
        Self {
            keyspace: self.keyspace.as_str().to_owned(),
            table: self.table.as_str().to_owned(),
            name: self.name.as_str().to_owned(),
            column_type: self.column_type,
        }
    }
}

impl ProtoSerializable<proto::ColumnSpec> for ColumnSpec {
    fn to_proto(self) -> proto::ColumnSpec {
        proto::ColumnSpec {
            keyspace_name: self.keyspace,
            table_name: self.table,
            name: self.name,
            r#type: self.column_type.canonical_name().to_owned(),
        }
    }
}

/// A decoded result row. `None` cells are null.
pub type QueryRow = Vec<Option<StringValue>>;

/// The result of executing a statement.
///
/// Statements other than SELECT return an empty result.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct QueryResult {
    pub columns: Vec<ColumnSpec>,
    pub rows: Vec<QueryRow>,
}

impl QueryResult {
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Proto form of a result: the column specs and rows of a `ServerResponse`.
pub struct ProtoQueryResult {
    pub columns: Vec<proto::ColumnSpec>,
    pub rows: Vec<proto::Row>,
}

impl ProtoSerializable<ProtoQueryResult> for QueryResult {
    fn to_proto(self) -> ProtoQueryResult {
        ProtoQueryResult {
            columns: self.columns.into_iter().map(ProtoSerializable::to_proto).collect(),
            rows: self
                .rows
                .into_iter()
                .map(|row| proto::Row {
                    cells: row
                        .into_iter()
                        .map(|cell| proto::Cell {
                            value: cell.map(StringValue::into_bytes),
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

/// A statement parsed once and executed by id.
#[derive(Debug)]
pub struct PreparedStatement {
    pub parsed: ParsedStatement,
    /// The session keyspace when the statement was prepared.
    pub keyspace: Option<String>,
    /// One entry per `?` marker, in marker order.
    pub bind_variables: Vec<ColumnSpec>,
}
