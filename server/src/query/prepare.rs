//! Statement preparation.
//!
//! Preparing parses a statement once, checks its terms against the columns
//! they are bound to, and describes each `?` marker by the column that will
//! receive its value.

use crate::cql::{self, QualifiedName, Relation, Statement, Term};
use crate::query::QueryError;
use crate::query::executor::{NO_KEYSPACE, check_assignable};
use crate::query::types::{ColumnSpec, PreparedStatement};
use crate::schema::{CatalogError, ColumnSchema, SYSTEM_SCHEMA, TableSchema, system_tables};
use crate::storage::Database;

/// Parse and check `cql` for later execution.
///
/// `keyspace` is the session keyspace at prepare time; unqualified table
/// names resolve against it for every later execution.
pub fn prepare(db: &Database, keyspace: Option<&str>, cql: &str) -> Result<PreparedStatement, QueryError> {
    let parsed = cql::parse(cql)?;
    let mut receivers: Vec<Option<ColumnSpec>> = Vec::new();
    receivers.resize_with(parsed.bind_marker_count, || None);

    match &parsed.statement {
        Statement::Insert {
            table,
            columns,
            values,
        } => {
            let schema = table_schema(db, keyspace, table)?;
            for (name, term) in columns.iter().zip(values) {
                let column = column_of(&schema, name)?;
                describe_markers(&schema, column, term, &mut receivers)?;
            }
        }
        Statement::Select { table, relations, .. } | Statement::Delete { table, relations } => {
            let schema = table_schema(db, keyspace, table)?;
            describe_relations(&schema, relations, &mut receivers)?;
        }
        _ => {}
    }

    let bind_variables = receivers
        .into_iter()
        .enumerate()
        .map(|(index, spec)| {
            spec.ok_or_else(|| {
                QueryError::InvalidRequest(format!("Bind marker {index} has no receiver"))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(PreparedStatement {
        parsed,
        keyspace: keyspace.map(str::to_owned),
        bind_variables,
    })
}

/// Look up a table, owning the result so system tables work too.
fn table_schema(
    db: &Database,
    keyspace: Option<&str>,
    table: &QualifiedName,
) -> Result<TableSchema, QueryError> {
    let keyspace = table
        .keyspace
        .as_deref()
        .or(keyspace)
        .ok_or_else(|| QueryError::InvalidRequest(NO_KEYSPACE.to_string()))?;
    if keyspace == SYSTEM_SCHEMA {
        return system_tables::table_schema(&table.name).ok_or_else(|| {
            CatalogError::TableNotFound {
                keyspace: keyspace.to_owned(),
                table: table.name.as_str().to_owned(),
            }
            .into()
        });
    }
    let schema = db.catalog().table(keyspace, &table.name)?;
    Ok(TableSchema {
        keyspace: schema.keyspace.as_str().to_owned(),
        name: schema.name.as_str().to_owned(),
        columns: schema
            .columns
            .iter()
            .map(|c| ColumnSchema {
                name: c.name.as_str().to_owned(),
                column_type: c.column_type,
                kind: c.kind,
            })
            .collect(),
    })
}

fn column_of<'s>(schema: &'s TableSchema, name: &str) -> Result<&'s ColumnSchema, QueryError> {
    schema
        .column(name)
        .map(|(_, column)| column)
        .ok_or_else(|| QueryError::InvalidRequest(format!("Undefined column name {name}")))
}

fn describe_relations(
    schema: &TableSchema,
    relations: &[Relation],
    receivers: &mut [Option<ColumnSpec>],
) -> Result<(), QueryError> {
    for relation in relations {
        let column = column_of(schema, relation.column())?;
        for term in relation.terms() {
            describe_markers(schema, column, term, receivers)?;
        }
    }
    Ok(())
}

/// Check `term` against `column` and record the receiver of each marker in it.
///
/// A marker under a cast receives a value of the cast type.
fn describe_markers(
    schema: &TableSchema,
    column: &ColumnSchema,
    term: &Term,
    receivers: &mut [Option<ColumnSpec>],
) -> Result<(), QueryError> {
    check_assignable(term, column.column_type, &column.name)?;
    let mut current = term;
    let mut column_type = column.column_type;
    while let Term::Cast {
        column_type: cast,
        term,
    } = current
    {
        column_type = *cast;
        current = &**term;
    }
    if let Term::BindMarker(index) = current {
        if let Some(slot) = receivers.get_mut(*index) {
            *slot = Some(ColumnSpec {
                column_type,
                ..ColumnSpec::of(schema, column)
            });
        }
    }
    Ok(())
}
