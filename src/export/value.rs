//! Row data model: table references, typed values, records and FK edges

use super::error::ExportError;
use super::script::quote_ident;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A column value as captured at fetch time
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Text(String),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
    Binary(Vec<u8>),
}

impl Value {
    /// Textual form of the value as the engine's input parser accepts it.
    ///
    /// Used to bind lookups and to identify rows in the visited set. `None`
    /// for NULL, which never identifies a row.
    pub fn key_text(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Integer(n) => Some(n.to_string()),
            Value::Float(f) => Some(f.to_string()),
            Value::Boolean(b) => Some(b.to_string()),
            Value::Text(s) => Some(s.clone()),
            Value::Timestamp(ts) => Some(format_naive_timestamp(ts)),
            Value::TimestampTz(ts) => Some(format_zoned_timestamp(ts)),
            Value::Binary(bytes) => Some(hex_bytea(bytes)),
        }
    }
}

pub(crate) fn format_naive_timestamp(ts: &NaiveDateTime) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%.f").to_string()
}

pub(crate) fn format_zoned_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(chrono::SecondsFormat::AutoSi, false)
}

/// bytea hex input format: `\x` followed by two hex digits per byte
pub(crate) fn hex_bytea(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(2 + bytes.len() * 2);
    out.push_str("\\x");
    for b in bytes {
        out.push_str(&format!("{:02x}", b));
    }
    out
}

/// Identifier of the root row supplied by the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RowId {
    Integer(i64),
    Text(String),
}

impl RowId {
    /// Integer only when the input is already written the way the integer
    /// prints, so the text bound for the lookup is always the caller's own.
    pub fn parse(input: &str) -> Self {
        match input.parse::<i64>() {
            Ok(n) if n.to_string() == input => RowId::Integer(n),
            _ => RowId::Text(input.to_string()),
        }
    }

    pub fn key_text(&self) -> String {
        match self {
            RowId::Integer(n) => n.to_string(),
            RowId::Text(s) => s.clone(),
        }
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key_text())
    }
}

/// Optionally schema-qualified table name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableRef {
    pub schema: Option<String>,
    pub name: String,
}

impl TableRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            schema: None,
            name: name.into(),
        }
    }

    pub fn qualified(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: Some(schema.into()),
            name: name.into(),
        }
    }

    /// Parse `table` or `schema.table`
    pub fn parse(input: &str) -> Result<Self, ExportError> {
        let input = input.trim();
        let (schema, name) = match input.split_once('.') {
            Some((schema, name)) => (Some(schema.to_string()), name.to_string()),
            None => (None, input.to_string()),
        };

        if name.is_empty() || schema.as_deref() == Some("") {
            return Err(ExportError::Schema(format!(
                "invalid table name '{}'",
                input
            )));
        }

        Ok(Self { schema, name })
    }

    /// Name as it appears in generated SQL, quoted only where required
    pub fn sql_name(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", quote_ident(schema), quote_ident(&self.name)),
            None => quote_ident(&self.name),
        }
    }

    /// Always-quoted form, resolved against the search path when unqualified
    pub fn regclass_name(&self) -> String {
        let quote = |s: &str| format!("\"{}\"", s.replace('"', "\"\""));
        match &self.schema {
            Some(schema) => format!("{}.{}", quote(schema), quote(&self.name)),
            None => quote(&self.name),
        }
    }

    /// Reference to `name` in `schema`, keeping this table's qualification
    /// when both live in the same schema.
    pub fn sibling(&self, own_schema: &str, schema: &str, name: &str) -> Self {
        if own_schema == schema {
            Self {
                schema: self.schema.clone(),
                name: name.to_string(),
            }
        } else {
            Self::qualified(schema, name)
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{}.{}", schema, self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// One fetched row, columns and values in declared order
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    table: TableRef,
    columns: Vec<String>,
    values: Vec<Value>,
}

impl Record {
    pub fn new(
        table: TableRef,
        columns: Vec<String>,
        values: Vec<Value>,
    ) -> Result<Self, ExportError> {
        if columns.len() != values.len() {
            return Err(ExportError::Serialization(format!(
                "{} has {} columns but {} values",
                table,
                columns.len(),
                values.len()
            )));
        }
        Ok(Self {
            table,
            columns,
            values,
        })
    }

    pub fn table(&self) -> &TableRef {
        &self.table
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|idx| &self.values[idx])
    }
}

/// One outbound single-column foreign key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyEdge {
    pub constraint_name: String,
    pub source_table: TableRef,
    pub source_column: String,
    pub target_table: TableRef,
    pub target_column: String,
}

/// Identity of an exported row: resolved relation plus primary-key value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RowKey {
    table: String,
    id: String,
}

impl RowKey {
    pub fn new(table: &TableRef, id: &str) -> Self {
        Self {
            table: table.to_string(),
            id: id.to_string(),
        }
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.table, self.id)
    }
}
