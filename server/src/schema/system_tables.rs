//! # System Tables
//!
//! The `system_schema` keyspace is virtual: its tables are generated from the
//! catalog each time they are read and cannot be written.
//!
//! - `keyspaces`: one row per keyspace
//! - `tables`: one row per table
//! - `columns`: one row per column, with its canonical type name
//!
//! ```text
//! SELECT * FROM system_schema.columns
//!     WHERE keyspace_name = 'ks' AND table_name = 't' AND column_name IN ('t', 'v');
//! ```
//!
//! Both a `text` and a `varchar` column report `type = 'text'` here, because
//! the alias was resolved when the table was created.

use crate::schema::catalog::{Catalog, ColumnKind, ColumnSchema, TableSchema};
use crate::storage::Cells;
use crate::types::{ColumnType, StringValue};

/// Name of the virtual schema keyspace.
pub const SYSTEM_SCHEMA: &str = "system_schema";

pub const KEYSPACES_TABLE: &str = "keyspaces";
pub const TABLES_TABLE: &str = "tables";
pub const COLUMNS_TABLE: &str = "columns";

const SYSTEM_TABLES: [&str; 3] = [COLUMNS_TABLE, KEYSPACES_TABLE, TABLES_TABLE];

fn column(name: &str, column_type: ColumnType, kind: ColumnKind) -> ColumnSchema {
    ColumnSchema {
        name: name.to_owned(),
        column_type,
        kind,
    }
}

/// The definition of a system table, or `None` if there is no such table.
#[must_use]
pub fn table_schema(table: &str) -> Option<TableSchema> {
    let columns = match table {
        KEYSPACES_TABLE => vec![column(
            "keyspace_name",
            ColumnType::Text,
            ColumnKind::PartitionKey,
        )],
        TABLES_TABLE => vec![
            column("keyspace_name", ColumnType::Text, ColumnKind::PartitionKey),
            column("table_name", ColumnType::Text, ColumnKind::Clustering),
        ],
        COLUMNS_TABLE => vec![
            column("keyspace_name", ColumnType::Text, ColumnKind::PartitionKey),
            column("table_name", ColumnType::Text, ColumnKind::Clustering),
            column("column_name", ColumnType::Text, ColumnKind::Clustering),
            column("clustering_order", ColumnType::Text, ColumnKind::Regular),
            column("column_name_bytes", ColumnType::Blob, ColumnKind::Regular),
            column("kind", ColumnType::Text, ColumnKind::Regular),
            column("type", ColumnType::Text, ColumnKind::Regular),
        ],
        _ => return None,
    };
    Some(TableSchema {
        keyspace: SYSTEM_SCHEMA.to_owned(),
        name: table.to_owned(),
        columns,
    })
}

/// All tables visible through the catalog, system tables first.
fn all_tables(catalog: &Catalog) -> Vec<TableSchema> {
    let mut tables: Vec<TableSchema> = SYSTEM_TABLES
        .iter()
        .filter_map(|name| table_schema(name))
        .collect();
    for keyspace in catalog.keyspace_names() {
        tables.extend(catalog.tables(keyspace).map(|t| TableSchema {
            keyspace: t.keyspace.as_str().to_owned(),
            name: t.name.as_str().to_owned(),
            columns: t.columns.iter().map(clone_column).collect(),
        }));
    }
    tables.sort_by(|a, b| (&a.keyspace, &a.name).cmp(&(&b.keyspace, &b.name)));
    tables
}

fn clone_column(c: &ColumnSchema) -> ColumnSchema {
    column(&c.name, c.column_type, c.kind)
}

fn text(s: &str) -> Option<Vec<u8>> {
    Some(ColumnType::Text.encode(&StringValue::from(s)))
}

/// Generate the encoded rows of a system table.
///
/// Rows come out in (`keyspace_name`, `table_name`, `column_name`) order.
#[must_use]
pub fn rows(table: &str, catalog: &Catalog) -> Vec<Cells> {
    let tables = all_tables(catalog);
    match table {
        KEYSPACES_TABLE => {
            let mut names: Vec<&str> = catalog.keyspace_names().collect();
            names.push(SYSTEM_SCHEMA);
            names.sort_unstable();
            names.into_iter().map(|name| vec![text(name)]).collect()
        }
        TABLES_TABLE => tables
            .iter()
            .map(|t| vec![text(&t.keyspace), text(&t.name)])
            .collect(),
        COLUMNS_TABLE => {
            let mut rows = Vec::new();
            for t in &tables {
                let mut columns: Vec<&ColumnSchema> = t.columns.iter().collect();
                columns.sort_by(|a, b| a.name.cmp(&b.name));
                for c in columns {
                    let clustering_order = if c.kind == ColumnKind::Clustering {
                        "asc"
                    } else {
                        "none"
                    };
                    rows.push(vec![
                        text(&t.keyspace),
                        text(&t.name),
                        text(&c.name),
                        text(clustering_order),
                        Some(ColumnType::Blob.encode(&StringValue::from(c.name.as_str()))),
                        text(c.kind.as_str()),
                        text(c.column_type.canonical_name()),
                    ]);
                }
            }
            rows
        }
        _ => Vec::new(),
    }
}
