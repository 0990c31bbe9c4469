//! Schema catalog reader
//!
//! Answers the three catalog questions the walker needs for a table: its
//! columns in declared order, its single primary-key column, and its
//! outbound foreign keys.

use super::error::ExportError;
use super::script::quote_ident;
use super::value::{ForeignKeyEdge, TableRef};
use async_trait::async_trait;

/// How a column is decoded when a row is fetched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    SmallInt,
    Integer,
    BigInt,
    Real,
    Double,
    Boolean,
    Timestamp,
    TimestampTz,
    Binary,
    Text,
    /// Anything else travels as the engine's text rendering
    Other,
}

impl ColumnKind {
    /// Map an engine base type name (`pg_type.typname`) to a decode kind
    pub fn from_type_name(type_name: &str) -> Self {
        match type_name {
            "int2" => ColumnKind::SmallInt,
            "int4" => ColumnKind::Integer,
            "int8" => ColumnKind::BigInt,
            "float4" => ColumnKind::Real,
            "float8" => ColumnKind::Double,
            "bool" => ColumnKind::Boolean,
            "timestamp" => ColumnKind::Timestamp,
            "timestamptz" => ColumnKind::TimestampTz,
            "bytea" => ColumnKind::Binary,
            "text" | "varchar" | "bpchar" | "name" => ColumnKind::Text,
            _ => ColumnKind::Other,
        }
    }
}

/// A table column as declared in the catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    /// Declared type, e.g. `character varying(255)`
    pub data_type: String,
    pub kind: ColumnKind,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            kind,
        }
    }

    /// Select-list expression for this column
    pub fn projection(&self) -> String {
        match self.kind {
            ColumnKind::Other => format!("{}::text", quote_ident(&self.name)),
            _ => quote_ident(&self.name),
        }
    }
}

/// Outbound foreign keys of one table
#[derive(Debug, Clone, Default)]
pub struct ForeignKeySet {
    pub edges: Vec<ForeignKeyEdge>,
    /// Multi-column constraints, which are not traversed
    pub composite: Vec<String>,
}

/// Everything the walker needs to know about one table
#[derive(Debug, Clone)]
pub struct TableSchema {
    /// The name as it was asked for; used in generated SQL and messages
    pub table: TableRef,
    /// Schema-qualified relation the name resolved to; identifies rows
    pub relation: TableRef,
    pub columns: Vec<Column>,
    pub primary_key: String,
    pub foreign_keys: Vec<ForeignKeyEdge>,
    pub composite_foreign_keys: Vec<String>,
}

impl TableSchema {
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}

/// Catalog lookups against a live engine
#[async_trait]
pub trait SchemaCatalog: Send + Sync {
    /// Schema-qualified relation an optionally qualified name refers to.
    /// Unknown tables are a schema error.
    async fn resolve(&self, table: &TableRef) -> Result<TableRef, ExportError>;

    /// Columns in declared position order. Unknown tables are a schema error.
    async fn columns(&self, table: &TableRef) -> Result<Vec<Column>, ExportError>;

    /// The single primary-key column. Missing or composite keys are a schema error.
    async fn primary_key(&self, table: &TableRef) -> Result<String, ExportError>;

    /// Outbound foreign-key constraints
    async fn foreign_keys(&self, table: &TableRef) -> Result<ForeignKeySet, ExportError>;

    async fn describe(&self, table: &TableRef) -> Result<TableSchema, ExportError> {
        let relation = self.resolve(table).await?;
        let columns = self.columns(table).await?;
        let primary_key = self.primary_key(table).await?;
        let foreign_keys = self.foreign_keys(table).await?;

        Ok(TableSchema {
            table: table.clone(),
            relation,
            columns,
            primary_key,
            foreign_keys: foreign_keys.edges,
            composite_foreign_keys: foreign_keys.composite,
        })
    }
}

/// Fail fast unless exactly one primary-key column was found
pub fn single_primary_key(
    table: &TableRef,
    mut columns: Vec<String>,
) -> Result<String, ExportError> {
    match columns.len() {
        0 => Err(ExportError::Schema(format!("table {} has no primary key", table))),
        1 => Ok(columns.remove(0)),
        n => Err(ExportError::Schema(format!(
            "table {} has a composite primary key ({} columns: {}), which is not supported",
            table,
            n,
            columns.join(", ")
        ))),
    }
}
