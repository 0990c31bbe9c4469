//! PostgreSQL catalog reader and row fetcher
//!
//! Reads `pg_catalog` directly rather than `information_schema`, which has no
//! positional pairing between the columns of a foreign key and the columns it
//! references.

use super::catalog::{
    single_primary_key, Column, ColumnKind, ForeignKeySet, SchemaCatalog, TableSchema,
};
use super::error::ExportError;
use super::fetch::RowFetcher;
use super::script::quote_ident;
use super::value::{ForeignKeyEdge, Record, TableRef, Value};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use tokio_postgres::{Client, Row};
use tracing::debug;

const TABLE_OID_QUERY: &str = "SELECT to_regclass($1::text)::oid AS oid";

const RELATION_QUERY: &str = r#"
    SELECT n.nspname::text AS schema_name, c.relname::text AS table_name
    FROM pg_class c
    JOIN pg_namespace n ON n.oid = c.relnamespace
    WHERE c.oid = $1
"#;

const COLUMNS_QUERY: &str = r#"
    SELECT
        a.attname::text AS column_name,
        format_type(a.atttypid, a.atttypmod) AS data_type,
        t.typname::text AS type_name
    FROM pg_attribute a
    JOIN pg_type t ON t.oid = a.atttypid
    WHERE a.attrelid = $1
      AND a.attnum > 0
      AND NOT a.attisdropped
      AND a.attgenerated = ''
    ORDER BY a.attnum
"#;

const PRIMARY_KEY_QUERY: &str = r#"
    SELECT a.attname::text AS column_name
    FROM pg_index i
    JOIN pg_attribute a ON a.attrelid = i.indrelid AND a.attnum = ANY(i.indkey)
    WHERE i.indrelid = $1
      AND i.indisprimary
    ORDER BY a.attnum
"#;

const FOREIGN_KEYS_QUERY: &str = r#"
    SELECT
        c.conname::text AS constraint_name,
        cardinality(c.conkey) AS arity,
        sn.nspname::text AS source_schema,
        sa.attname::text AS source_column,
        tn.nspname::text AS target_schema,
        tc.relname::text AS target_table,
        ta.attname::text AS target_column
    FROM pg_constraint c
    JOIN pg_class sc ON sc.oid = c.conrelid
    JOIN pg_namespace sn ON sn.oid = sc.relnamespace
    JOIN pg_class tc ON tc.oid = c.confrelid
    JOIN pg_namespace tn ON tn.oid = tc.relnamespace
    JOIN pg_attribute sa ON sa.attrelid = c.conrelid AND sa.attnum = c.conkey[1]
    JOIN pg_attribute ta ON ta.attrelid = c.confrelid AND ta.attnum = c.confkey[1]
    WHERE c.conrelid = $1
      AND c.contype = 'f'
    ORDER BY c.conname
"#;

/// Catalog reader and row fetcher over one borrowed client
///
/// The caller owns the connection for the duration of the export.
pub struct PgSource<'a> {
    client: &'a Client,
}

impl<'a> PgSource<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    async fn table_oid(&self, table: &TableRef) -> Result<u32, ExportError> {
        let row = self
            .client
            .query_one(TABLE_OID_QUERY, &[&table.regclass_name()])
            .await
            .map_err(|e| ExportError::from_pg(e, format!("resolving table {}", table)))?;

        let oid: Option<u32> = row
            .try_get("oid")
            .map_err(|e| ExportError::from_pg(e, format!("resolving table {}", table)))?;

        oid.ok_or_else(|| ExportError::Schema(format!("unknown table {}", table)))
    }
}

#[async_trait]
impl SchemaCatalog for PgSource<'_> {
    async fn resolve(&self, table: &TableRef) -> Result<TableRef, ExportError> {
        let oid = self.table_oid(table).await?;
        let row = self
            .client
            .query_one(RELATION_QUERY, &[&oid])
            .await
            .map_err(|e| ExportError::from_pg(e, format!("resolving table {}", table)))?;

        Ok(TableRef::qualified(
            row.get::<_, String>("schema_name"),
            row.get::<_, String>("table_name"),
        ))
    }

    async fn columns(&self, table: &TableRef) -> Result<Vec<Column>, ExportError> {
        let oid = self.table_oid(table).await?;
        let rows = self
            .client
            .query(COLUMNS_QUERY, &[&oid])
            .await
            .map_err(|e| ExportError::from_pg(e, format!("reading columns of {}", table)))?;

        let columns = rows
            .iter()
            .map(|row| {
                let type_name: String = row.get("type_name");
                Column {
                    name: row.get("column_name"),
                    data_type: row.get("data_type"),
                    kind: ColumnKind::from_type_name(&type_name),
                }
            })
            .collect::<Vec<_>>();

        debug!("Table {} has {} columns", table, columns.len());
        Ok(columns)
    }

    async fn primary_key(&self, table: &TableRef) -> Result<String, ExportError> {
        let oid = self.table_oid(table).await?;
        let rows = self
            .client
            .query(PRIMARY_KEY_QUERY, &[&oid])
            .await
            .map_err(|e| ExportError::from_pg(e, format!("reading primary key of {}", table)))?;

        single_primary_key(table, rows.iter().map(|row| row.get("column_name")).collect())
    }

    async fn foreign_keys(&self, table: &TableRef) -> Result<ForeignKeySet, ExportError> {
        let oid = self.table_oid(table).await?;
        let rows = self
            .client
            .query(FOREIGN_KEYS_QUERY, &[&oid])
            .await
            .map_err(|e| ExportError::from_pg(e, format!("reading foreign keys of {}", table)))?;

        let mut set = ForeignKeySet::default();
        for row in &rows {
            let constraint_name: String = row.get("constraint_name");
            let arity: i32 = row.get("arity");
            if arity > 1 {
                set.composite.push(constraint_name);
                continue;
            }

            let source_schema: String = row.get("source_schema");
            let target_schema: String = row.get("target_schema");
            let target_table: String = row.get("target_table");

            set.edges.push(ForeignKeyEdge {
                constraint_name,
                source_table: table.clone(),
                source_column: row.get("source_column"),
                target_table: table.sibling(&source_schema, &target_schema, &target_table),
                target_column: row.get("target_column"),
            });
        }

        debug!(
            "Table {} has {} foreign keys ({} composite)",
            table,
            set.edges.len(),
            set.composite.len()
        );
        Ok(set)
    }
}

#[async_trait]
impl RowFetcher for PgSource<'_> {
    async fn fetch_row(
        &self,
        table: &TableSchema,
        column: &str,
        id: &str,
    ) -> Result<Option<Record>, ExportError> {
        let lookup = table.column(column).ok_or_else(|| {
            ExportError::Schema(format!("table {} has no column {}", table.table, column))
        })?;

        let query = select_by_key(table, lookup);
        let row = match self.client.query_opt(query.as_str(), &[&id]).await {
            Ok(row) => row,
            Err(e) if ExportError::is_invalid_key(&e) => {
                debug!("Key {} is not a valid {} for {}", id, lookup.data_type, table.table);
                return Ok(None);
            }
            Err(e) => return Err(fetch_error(e, &table.table)),
        };

        let Some(row) = row else {
            return Ok(None);
        };

        let values = table
            .columns
            .iter()
            .enumerate()
            .map(|(idx, c)| decode(&row, idx, c, &table.table))
            .collect::<Result<Vec<_>, _>>()?;

        Record::new(table.table.clone(), table.column_names(), values).map(Some)
    }
}

/// `SELECT ... WHERE key = $1`, binding the key as text and casting it to the
/// column's declared type so every key type shares one bind path.
fn select_by_key(table: &TableSchema, lookup: &Column) -> String {
    let projection = table
        .columns
        .iter()
        .map(Column::projection)
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "SELECT {} FROM {} WHERE {} = $1::text::{}",
        projection,
        table.table.regclass_name(),
        quote_ident(&lookup.name),
        lookup.data_type
    )
}

fn fetch_error(err: tokio_postgres::Error, table: &TableRef) -> ExportError {
    match err.as_db_error() {
        Some(db) => ExportError::Schema(format!("fetching from {}: {}", table, db.message())),
        None => ExportError::Connection(format!("fetching from {}: {}", table, err)),
    }
}

fn decode(row: &Row, idx: usize, column: &Column, table: &TableRef) -> Result<Value, ExportError> {
    let value = match column.kind {
        ColumnKind::SmallInt => row
            .try_get::<_, Option<i16>>(idx)
            .map(|v| v.map(|n| Value::Integer(n.into()))),
        ColumnKind::Integer => row
            .try_get::<_, Option<i32>>(idx)
            .map(|v| v.map(|n| Value::Integer(n.into()))),
        ColumnKind::BigInt => row.try_get::<_, Option<i64>>(idx).map(|v| v.map(Value::Integer)),
        ColumnKind::Real => row
            .try_get::<_, Option<f32>>(idx)
            .map(|v| v.map(|f| Value::Float(f.into()))),
        ColumnKind::Double => row.try_get::<_, Option<f64>>(idx).map(|v| v.map(Value::Float)),
        ColumnKind::Boolean => row.try_get::<_, Option<bool>>(idx).map(|v| v.map(Value::Boolean)),
        ColumnKind::Timestamp => row
            .try_get::<_, Option<NaiveDateTime>>(idx)
            .map(|v| v.map(Value::Timestamp)),
        ColumnKind::TimestampTz => row
            .try_get::<_, Option<DateTime<Utc>>>(idx)
            .map(|v| v.map(Value::TimestampTz)),
        ColumnKind::Binary => row.try_get::<_, Option<Vec<u8>>>(idx).map(|v| v.map(Value::Binary)),
        ColumnKind::Text | ColumnKind::Other => {
            row.try_get::<_, Option<String>>(idx).map(|v| v.map(Value::Text))
        }
    };

    value.map(|v| v.unwrap_or(Value::Null)).map_err(|e| {
        ExportError::Serialization(format!(
            "cannot decode {}.{} ({}): {}",
            table, column.name, column.data_type, e
        ))
    })
}
