//! Statement execution.
//!
//! Runs parsed statements against a `Database`. Terms are checked against
//! their receiving column before any value is produced, and every value of a
//! write is validated before anything is stored, so a rejected statement
//! leaves no partial state behind.

use std::collections::{BTreeMap, BTreeSet};

use crate::cql::{ColumnDefinition, QualifiedName, Relation, Selection, Statement, Term};
use crate::query::types::{ColumnSpec, QueryResult, QueryRow};
use crate::query::QueryError;
use crate::schema::{system_tables, CatalogError, ColumnKind, ColumnSchema, TableSchema, SYSTEM_SCHEMA};
use crate::storage::{Cells, Database};
use crate::types::client_message::BoundValue;
use crate::types::{ColumnType, StringValue};

pub(crate) const NO_KEYSPACE: &str =
    "No keyspace has been specified. USE a keyspace, or explicitly specify keyspace.tablename";

/// Per-connection execution state.
#[derive(Debug, Default)]
pub struct Session {
    keyspace: Option<String>,
}

impl Session {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The keyspace selected with `USE`, if any.
    #[must_use]
    pub fn keyspace(&self) -> Option<&str> {
        self.keyspace.as_deref()
    }

    pub fn set_keyspace(&mut self, keyspace: &str) {
        self.keyspace = Some(keyspace.to_owned());
    }
}

/// Whether a statement only reads, so it can run under a shared lock.
#[must_use]
pub const fn is_read_only(statement: &Statement) -> bool {
    matches!(statement, Statement::Select { .. } | Statement::Use { .. })
}

/// Executes statements for one session keyspace and one set of bound values.
pub struct QueryExecutor<'a> {
    keyspace: Option<&'a str>,
    values: &'a [BoundValue],
}

impl<'a> QueryExecutor<'a> {
    #[must_use]
    pub const fn new(keyspace: Option<&'a str>, values: &'a [BoundValue]) -> Self {
        Self { keyspace, values }
    }

    /// Execute a read-only statement.
    ///
    /// `USE` is reported back through `Ok(Some(keyspace))`; the caller owns
    /// the session.
    pub fn read(
        &self,
        db: &Database,
        statement: &Statement,
    ) -> Result<(QueryResult, Option<String>), QueryError> {
        match statement {
            Statement::Use { keyspace } => {
                if keyspace != SYSTEM_SCHEMA && !db.catalog().keyspace_exists(keyspace) {
                    return Err(CatalogError::KeyspaceNotFound(keyspace.as_str().to_owned()).into());
                }
                Ok((QueryResult::empty(), Some(keyspace.as_str().to_owned())))
            }
            Statement::Select {
                table,
                selection,
                relations,
            } => Ok((self.select(db, table, selection, relations)?, None)),
            _ => Err(QueryError::InvalidRequest(format!(
                "{} is not a read-only statement",
                statement.kind()
            ))),
        }
    }

    /// Execute a statement that may modify the database.
    pub fn write(&self, db: &mut Database, statement: &Statement) -> Result<QueryResult, QueryError> {
        match statement {
            Statement::CreateKeyspace {
                name,
                if_not_exists,
            } => {
                if *if_not_exists && db.catalog().keyspace_exists(name) {
                    return Ok(QueryResult::empty());
                }
                db.create_keyspace(name)?;
            }
            Statement::DropKeyspace { name, if_exists } => {
                if *if_exists && name != SYSTEM_SCHEMA && !db.catalog().keyspace_exists(name) {
                    return Ok(QueryResult::empty());
                }
                db.drop_keyspace(name)?;
            }
            Statement::CreateTable {
                table,
                if_not_exists,
                columns,
                partition_key,
            } => self.create_table(db, table, *if_not_exists, columns, partition_key)?,
            Statement::DropTable { table, if_exists } => {
                let keyspace = self.keyspace_of(table)?;
                if *if_exists
                    && keyspace != SYSTEM_SCHEMA
                    && db.catalog().table(keyspace, &table.name).is_err()
                {
                    return Ok(QueryResult::empty());
                }
                db.drop_table(keyspace, &table.name)?;
            }
            Statement::Insert {
                table,
                columns,
                values,
            } => self.insert(db, table, columns, values)?,
            Statement::Delete { table, relations } => self.delete(db, table, relations)?,
            Statement::Use { .. } | Statement::Select { .. } => {
                return Ok(self.read(db, statement)?.0);
            }
        }
        Ok(QueryResult::empty())
    }

    fn keyspace_of<'n>(&'n self, table: &'n QualifiedName) -> Result<&'n str, QueryError> {
        table
            .keyspace
            .as_deref()
            .or(self.keyspace)
            .ok_or_else(|| QueryError::InvalidRequest(NO_KEYSPACE.to_string()))
    }

    fn create_table(
        &self,
        db: &mut Database,
        table: &QualifiedName,
        if_not_exists: bool,
        columns: &[ColumnDefinition],
        partition_key: &str,
    ) -> Result<(), QueryError> {
        let keyspace = self.keyspace_of(table)?;
        if if_not_exists && db.catalog().table(keyspace, &table.name).is_ok() {
            return Ok(());
        }
        let definitions = columns
            .iter()
            .map(|c| ColumnDefinition {
                name: c.name.as_str().to_owned(),
                column_type: c.column_type,
            })
            .collect();
        let schema = TableSchema::new(keyspace, &table.name, definitions, partition_key)?;
        db.create_table(schema)?;
        Ok(())
    }

    /// Resolve a user table for a write.
    fn writable_table<'d>(
        &self,
        db: &'d Database,
        table: &QualifiedName,
    ) -> Result<&'d TableSchema, QueryError> {
        let keyspace = self.keyspace_of(table)?;
        if keyspace == SYSTEM_SCHEMA {
            return Err(CatalogError::ReadOnlyKeyspace(keyspace.to_owned()).into());
        }
        Ok(db.catalog().table(keyspace, &table.name)?)
    }

    fn insert(
        &self,
        db: &mut Database,
        table: &QualifiedName,
        columns: &[String],
        values: &[Term],
    ) -> Result<(), QueryError> {
        let schema = self.writable_table(db, table)?;
        if columns.len() != values.len() {
            return Err(QueryError::InvalidRequest(
                "Unmatched column names/values".to_string(),
            ));
        }

        let mut updates: BTreeMap<usize, Option<Vec<u8>>> = BTreeMap::new();
        for (name, term) in columns.iter().zip(values) {
            let (index, column) = column_of(schema, name)?;
            let value = self.evaluate(term, column)?;
            if let Some(value) = &value {
                column.column_type.validate(value)?;
            }
            let encoded = value.map(|v| column.column_type.encode(&v));
            if updates.insert(index, encoded).is_some() {
                return Err(QueryError::InvalidRequest(format!(
                    "Multiple definitions found for column {name}"
                )));
            }
        }

        let key_index = schema.partition_key_index();
        let key_name = schema.partition_key().name.as_str().to_owned();
        let key = match updates.get(&key_index) {
            None => {
                return Err(QueryError::InvalidRequest(format!(
                    "Some partition key parts are missing: {key_name}"
                )));
            }
            Some(None) => {
                return Err(QueryError::InvalidRequest(format!(
                    "Invalid null value for partition key part {key_name}"
                )));
            }
            Some(Some(key)) if key.is_empty() => {
                return Err(QueryError::InvalidRequest("Key may not be empty".to_string()));
            }
            Some(Some(key)) => key.as_slice().to_vec(),
        };

        let keyspace = schema.keyspace.as_str().to_owned();
        let name = schema.name.as_str().to_owned();
        tracing::debug!(
            "upsert {keyspace}.{name} key={} cells={}",
            StringValue::from(key.as_slice()).to_hex(),
            updates.len()
        );
        db.upsert(&keyspace, &name, &key, updates.into_iter().collect())?;
        Ok(())
    }

    fn delete(
        &self,
        db: &mut Database,
        table: &QualifiedName,
        relations: &[Relation],
    ) -> Result<(), QueryError> {
        let schema = self.writable_table(db, table)?;
        let filter = self.row_filter(schema, relations)?;
        let Some(keys) = filter.partition_keys(schema) else {
            return Err(QueryError::InvalidRequest(format!(
                "DELETE requires a restriction on the partition key {}",
                schema.partition_key().name
            )));
        };
        if filter.conditions.len() != 1 {
            return Err(QueryError::InvalidRequest(
                "DELETE may only restrict the partition key".to_string(),
            ));
        }

        let keyspace = schema.keyspace.as_str().to_owned();
        let name = schema.name.as_str().to_owned();
        for key in keys {
            db.delete(&keyspace, &name, &key)?;
        }
        Ok(())
    }

    fn select(
        &self,
        db: &Database,
        table: &QualifiedName,
        selection: &Selection,
        relations: &[Relation],
    ) -> Result<QueryResult, QueryError> {
        let keyspace = self.keyspace_of(table)?;
        let system_schema;
        let schema = if keyspace == SYSTEM_SCHEMA {
            system_schema = system_tables::table_schema(&table.name).ok_or_else(|| {
                CatalogError::TableNotFound {
                    keyspace: keyspace.to_owned(),
                    table: table.name.as_str().to_owned(),
                }
            })?;
            &system_schema
        } else {
            db.catalog().table(keyspace, &table.name)?
        };

        let projection: Vec<(usize, &ColumnSchema)> = match selection {
            Selection::Wildcard => wildcard_columns(schema),
            Selection::Columns(names) => names
                .iter()
                .map(|name| column_of(schema, name))
                .collect::<Result<_, _>>()?,
        };

        let filter = self.row_filter(schema, relations)?;
        let rows: Vec<Cells> = if keyspace == SYSTEM_SCHEMA {
            system_tables::rows(&schema.name, db.catalog())
        } else if let Some(keys) = filter.partition_keys(schema) {
            let mut rows = Vec::new();
            for key in keys {
                if let Some(row) = db.get(keyspace, &schema.name, &key)? {
                    rows.push(row);
                }
            }
            rows
        } else {
            db.scan(keyspace, &schema.name)?
        };

        let rows: Vec<QueryRow> = rows
            .into_iter()
            .filter(|row| filter.matches(row))
            .map(|row| {
                projection
                    .iter()
                    .map(|(index, column)| {
                        row.get(*index)
                            .and_then(Option::as_deref)
                            .map(|bytes| column.column_type.decode(bytes))
                    })
                    .collect()
            })
            .collect();

        tracing::debug!("select {keyspace}.{} returned {} rows", schema.name, rows.len());
        Ok(QueryResult {
            columns: projection
                .iter()
                .map(|(_, column)| ColumnSpec::of(schema, column))
                .collect(),
            rows,
        })
    }

    /// Evaluate the WHERE clause into per-column sets of accepted values.
    fn row_filter(&self, schema: &TableSchema, relations: &[Relation]) -> Result<RowFilter, QueryError> {
        let mut conditions: BTreeMap<usize, BTreeSet<Vec<u8>>> = BTreeMap::new();
        for relation in relations {
            let (index, column) = column_of(schema, relation.column())?;
            let mut accepted = BTreeSet::new();
            for term in relation.terms() {
                let Some(value) = self.evaluate(term, column)? else {
                    return Err(QueryError::InvalidRequest(format!(
                        "Invalid null value in condition for column {}",
                        column.name
                    )));
                };
                column.column_type.validate(&value)?;
                accepted.insert(column.column_type.encode(&value));
            }
            // Repeated restrictions on one column must all hold.
            match conditions.get_mut(&index) {
                Some(existing) => existing.retain(|v| accepted.contains(v)),
                None => {
                    conditions.insert(index, accepted);
                }
            }
        }
        Ok(RowFilter { conditions })
    }

    /// Check that `term` can be assigned to `column` and produce its value.
    fn evaluate(&self, term: &Term, column: &ColumnSchema) -> Result<Option<StringValue>, QueryError> {
        check_assignable(term, column.column_type, &column.name)?;
        self.term_value(term)
    }

    fn term_value(&self, term: &Term) -> Result<Option<StringValue>, QueryError> {
        match term {
            Term::String(s) => Ok(Some(StringValue::from(s.as_str()))),
            Term::Hex(value) => Ok(Some(StringValue::from(value.as_bytes()))),
            Term::Null => Ok(None),
            Term::BindMarker(index) => self
                .values
                .get(*index)
                .map(|v| v.as_ref().map(|v| StringValue::from(v.as_bytes())))
                .ok_or_else(|| {
                    QueryError::InvalidRequest(format!("No value bound for marker {index}"))
                }),
            Term::Cast { term, .. } => self.term_value(term),
        }
    }
}

/// Accepted encoded values per column position.
struct RowFilter {
    conditions: BTreeMap<usize, BTreeSet<Vec<u8>>>,
}

impl RowFilter {
    /// The partition keys the filter restricts to, if it restricts the key.
    fn partition_keys(&self, schema: &TableSchema) -> Option<Vec<Vec<u8>>> {
        if schema
            .columns
            .iter()
            .any(|c| c.kind == ColumnKind::Clustering)
        {
            return None;
        }
        self.conditions
            .get(&schema.partition_key_index())
            .map(|keys| keys.iter().map(|k| k.as_slice().to_vec()).collect())
    }

    fn matches(&self, row: &Cells) -> bool {
        self.conditions.iter().all(|(index, accepted)| {
            row.get(*index)
                .and_then(Option::as_ref)
                .is_some_and(|cell| accepted.contains(cell))
        })
    }
}

fn column_of<'s>(schema: &'s TableSchema, name: &str) -> Result<(usize, &'s ColumnSchema), QueryError> {
    schema
        .column(name)
        .ok_or_else(|| QueryError::InvalidRequest(format!("Undefined column name {name}")))
}

/// `SELECT *` order: partition key, clustering columns, then regular columns
/// by name.
fn wildcard_columns(schema: &TableSchema) -> Vec<(usize, &ColumnSchema)> {
    let rank = |c: &ColumnSchema| match c.kind {
        ColumnKind::PartitionKey => 0,
        ColumnKind::Clustering => 1,
        ColumnKind::Regular => 2,
    };
    let mut columns: Vec<(usize, &ColumnSchema)> = schema.columns.iter().enumerate().collect();
    columns.sort_by(|(ia, a), (ib, b)| {
        rank(a).cmp(&rank(b)).then_with(|| {
            if a.kind == ColumnKind::Regular {
                a.name.cmp(&b.name)
            } else {
                ia.cmp(ib)
            }
        })
    });
    columns
}

/// Check that `term` may be assigned to a receiver of type `receiver`.
///
/// String literals fit `ascii` and `text`, hex literals fit `blob`, and null
/// or a bind marker fits anything. A cast `(T) term` needs `term` to fit `T`
/// and the receiver to accept values of type `T`.
pub fn check_assignable(term: &Term, receiver: ColumnType, column: &str) -> Result<(), QueryError> {
    match term {
        Term::String(s) => {
            if receiver == ColumnType::Blob {
                return Err(QueryError::InvalidRequest(format!(
                    "Invalid STRING constant ({s}) for \"{column}\" of type {receiver}"
                )));
            }
            Ok(())
        }
        Term::Hex(value) => {
            if receiver != ColumnType::Blob {
                return Err(QueryError::InvalidRequest(format!(
                    "Invalid HEX constant ({}) for \"{column}\" of type {receiver}",
                    value.to_hex()
                )));
            }
            Ok(())
        }
        Term::Null | Term::BindMarker(_) => Ok(()),
        Term::Cast { column_type, term } => {
            check_assignable(term, *column_type, column)?;
            if !receiver.is_value_compatible_with(*column_type) {
                return Err(QueryError::InvalidRequest(format!(
                    "Cannot assign value {} to {column} of type {receiver}",
                    describe_cast(*column_type, term)
                )));
            }
            Ok(())
        }
    }
}

fn describe_cast(column_type: ColumnType, term: &Term) -> String {
    let inner = match term {
        Term::String(s) => column_type.to_cql_literal(&StringValue::from(s.as_str())),
        Term::Hex(value) => value.to_hex(),
        Term::Null => "NULL".to_string(),
        Term::BindMarker(_) => "?".to_string(),
        Term::Cast { column_type, term } => describe_cast(*column_type, term),
    };
    format!("({column_type}){inner}")
}
