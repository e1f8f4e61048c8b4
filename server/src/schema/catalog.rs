//! Keyspace and table definitions.
//!
//! A column's `ColumnType` is fixed when its table is created and never changes
//! afterwards; there is no ALTER.

use std::collections::BTreeMap;

use crate::cql::ColumnDefinition;
use crate::schema::system_tables::SYSTEM_SCHEMA;
use crate::types::ColumnType;

/// The role a column plays in its table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    PartitionKey,
    Clustering,
    Regular,
}

impl ColumnKind {
    /// Name reported in `system_schema.columns.kind`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PartitionKey => "partition_key",
            Self::Clustering => "clustering",
            Self::Regular => "regular",
        }
    }
}

/// A column of a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSchema {
    pub name: String,
    pub column_type: ColumnType,
    pub kind: ColumnKind,
}

/// A table definition. Columns are kept in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub keyspace: String,
    pub name: String,
    pub columns: Vec<ColumnSchema>,
}

impl TableSchema {
    /// Build a table definition from parsed column definitions.
    ///
    /// # Errors
    ///
    /// Fails if a column name repeats or the partition key is not one of the
    /// declared columns.
    pub fn new(
        keyspace: &str,
        name: &str,
        definitions: Vec<ColumnDefinition>,
        partition_key: &str,
    ) -> Result<Self, CatalogError> {
        let mut columns: Vec<ColumnSchema> = Vec::with_capacity(definitions.len());
        for definition in definitions {
            if columns.iter().any(|c| c.name == definition.name) {
                return Err(CatalogError::InvalidDefinition(format!(
                    "Multiple definition of identifier {}",
                    definition.name
                )));
            }
            let kind = if definition.name == partition_key {
                ColumnKind::PartitionKey
            } else {
                ColumnKind::Regular
            };
            columns.push(ColumnSchema {
                name: definition.name,
                column_type: definition.column_type,
                kind,
            });
        }
        if !columns.iter().any(|c| c.kind == ColumnKind::PartitionKey) {
            return Err(CatalogError::InvalidDefinition(format!(
                "Unknown definition {partition_key} referenced in PRIMARY KEY"
            )));
        }
        Ok(Self {
            keyspace: keyspace.to_owned(),
            name: name.to_owned(),
            columns,
        })
    }

    /// Look up a column by name, returning its position and definition.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<(usize, &ColumnSchema)> {
        self.columns.iter().enumerate().find(|(_, c)| c.name == name)
    }

    /// Position of the partition key column.
    #[must_use]
    pub fn partition_key_index(&self) -> usize {
        self.columns
            .iter()
            .position(|c| c.kind == ColumnKind::PartitionKey)
            .unwrap_or(0)
    }

    /// The partition key column.
    #[must_use]
    pub fn partition_key(&self) -> &ColumnSchema {
        &self.columns[self.partition_key_index()]
    }
}

/// All user keyspaces and their tables.
#[derive(Debug, Default)]
pub struct Catalog {
    keyspaces: BTreeMap<String, BTreeMap<String, TableSchema>>,
}

impl Catalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a user keyspace exists. `system_schema` is not a user keyspace.
    #[must_use]
    pub fn keyspace_exists(&self, name: &str) -> bool {
        self.keyspaces.contains_key(name)
    }

    /// Names of all user keyspaces, sorted.
    pub fn keyspace_names(&self) -> impl Iterator<Item = &str> {
        self.keyspaces.keys().map(String::as_str)
    }

    /// Tables of a keyspace, sorted by name.
    pub fn tables(&self, keyspace: &str) -> impl Iterator<Item = &TableSchema> {
        self.keyspaces
            .get(keyspace)
            .into_iter()
            .flat_map(BTreeMap::values)
    }

    /// Look up a table.
    ///
    /// # Errors
    ///
    /// Fails if the keyspace or the table does not exist.
    pub fn table(&self, keyspace: &str, table: &str) -> Result<&TableSchema, CatalogError> {
        let tables = self
            .keyspaces
            .get(keyspace)
            .ok_or_else(|| CatalogError::KeyspaceNotFound(keyspace.to_owned()))?;
        tables.get(table).ok_or_else(|| CatalogError::TableNotFound {
            keyspace: keyspace.to_owned(),
            table: table.to_owned(),
        })
    }

    /// Check that a keyspace can be created.
    ///
    /// # Errors
    ///
    /// Returns the `CatalogError` that applying the change would cause.
    pub fn check_create_keyspace(&self, name: &str) -> Result<(), CatalogError> {
        if name == SYSTEM_SCHEMA {
            return Err(CatalogError::ReadOnlyKeyspace(name.to_owned()));
        }
        if self.keyspaces.contains_key(name) {
            return Err(CatalogError::KeyspaceExists(name.to_owned()));
        }
        Ok(())
    }

    /// Add an empty keyspace. Call `check_create_keyspace` first.
    pub fn create_keyspace(&mut self, name: &str) {
        self.keyspaces.entry(name.to_owned()).or_default();
    }

    /// Check that a keyspace can be dropped.
    ///
    /// # Errors
    ///
    /// Returns the `CatalogError` that applying the change would cause.
    pub fn check_drop_keyspace(&self, name: &str) -> Result<(), CatalogError> {
        if name == SYSTEM_SCHEMA {
            return Err(CatalogError::ReadOnlyKeyspace(name.to_owned()));
        }
        if !self.keyspaces.contains_key(name) {
            return Err(CatalogError::KeyspaceNotFound(name.to_owned()));
        }
        Ok(())
    }

    /// Remove a keyspace, returning the names of the tables it held.
    pub fn drop_keyspace(&mut self, name: &str) -> Vec<String> {
        self.keyspaces
            .remove(name)
            .map(|tables| tables.into_keys().collect())
            .unwrap_or_default()
    }

    /// Check that a table can be created.
    ///
    /// # Errors
    ///
    /// Returns the `CatalogError` that applying the change would cause.
    pub fn check_create_table(&self, schema: &TableSchema) -> Result<(), CatalogError> {
        if schema.keyspace == SYSTEM_SCHEMA {
            return Err(CatalogError::ReadOnlyKeyspace(schema.keyspace.as_str().to_owned()));
        }
        let tables = self
            .keyspaces
            .get(&schema.keyspace)
            .ok_or_else(|| CatalogError::KeyspaceNotFound(schema.keyspace.as_str().to_owned()))?;
        if tables.contains_key(&schema.name) {
            return Err(CatalogError::TableExists {
                keyspace: schema.keyspace.as_str().to_owned(),
                table: schema.name.as_str().to_owned(),
            });
        }
        Ok(())
    }

    /// Add a table. Call `check_create_table` first.
    pub fn create_table(&mut self, schema: TableSchema) {
        self.keyspaces
            .entry(schema.keyspace.as_str().to_owned())
            .or_default()
            .insert(schema.name.as_str().to_owned(), schema);
    }

    /// Check that a table can be dropped.
    ///
    /// # Errors
    ///
    /// Returns the `CatalogError` that applying the change would cause.
    pub fn check_drop_table(&self, keyspace: &str, table: &str) -> Result<(), CatalogError> {
        if keyspace == SYSTEM_SCHEMA {
            return Err(CatalogError::ReadOnlyKeyspace(keyspace.to_owned()));
        }
        self.table(keyspace, table).map(|_| ())
    }

    /// Remove a table definition.
    pub fn drop_table(&mut self, keyspace: &str, table: &str) {
        if let Some(tables) = self.keyspaces.get_mut(keyspace) {
            tables.remove(table);
        }
    }
}

/// Schema lookup and definition errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    KeyspaceExists(String),
    KeyspaceNotFound(String),
    TableExists { keyspace: String, table: String },
    TableNotFound { keyspace: String, table: String },
    /// The keyspace is virtual and cannot be modified.
    ReadOnlyKeyspace(String),
    /// A CREATE TABLE statement that cannot describe a valid table.
    InvalidDefinition(String),
}

impl std::fmt::Display for CatalogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::KeyspaceExists(name) => write!(f, "Keyspace {name} already exists"),
            Self::KeyspaceNotFound(name) => write!(f, "Keyspace {name} does not exist"),
            Self::TableExists { keyspace, table } => {
                write!(f, "Table {keyspace}.{table} already exists")
            }
            Self::TableNotFound { keyspace, table } => {
                write!(f, "unconfigured table {keyspace}.{table}")
            }
            Self::ReadOnlyKeyspace(name) => write!(f, "keyspace {name} is read-only"),
            Self::InvalidDefinition(message) => f.write_str(message),
        }
    }
}

impl std::error::Error for CatalogError {}
