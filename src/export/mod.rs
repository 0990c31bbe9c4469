//! Foreign-key closure export
//!
//! Extracts one row plus every row it transitively references and renders
//! the result as a replayable SQL script:
//!
//! - [`catalog`]: table columns, primary key and outbound foreign keys
//! - [`fetch`]: single-row retrieval by key
//! - [`walker`]: cycle-safe, dependency-ordered traversal
//! - [`script`]: transactional, idempotent INSERT script
//! - [`postgres`]: the PostgreSQL implementation of the catalog and fetcher

pub mod catalog;
pub mod error;
pub mod fetch;
pub mod postgres;
pub mod script;
pub mod value;
pub mod walker;

pub use catalog::{Column, ColumnKind, ForeignKeySet, SchemaCatalog, TableSchema};
pub use error::ExportError;
pub use fetch::RowFetcher;
pub use postgres::PgSource;
pub use script::{format_value, quote_ident, quote_literal, ScriptGenerator, TOOL_NAME};
pub use value::{ForeignKeyEdge, Record, RowId, RowKey, TableRef, Value};
pub use walker::{DependencyWalker, ExportOptions, ExportResult, ExportWarning, DEFAULT_MAX_DEPTH};

use deadpool_postgres::Pool;
use tracing::debug;

/// Runs exports against a pooled PostgreSQL source.
///
/// Each export checks one client out of the pool and holds it until the walk
/// completes.
#[derive(Clone)]
pub struct Exporter {
    pool: Pool,
    options: ExportOptions,
}

impl Exporter {
    pub fn new(pool: Pool, options: ExportOptions) -> Self {
        Self { pool, options }
    }

    pub async fn export(&self, table: &str, id: &RowId) -> Result<ExportResult, ExportError> {
        let table = TableRef::parse(table)?;
        let client = self.pool.get().await?;
        debug!("Exporting {} = {}", table, id);

        let source = PgSource::new(&client);
        DependencyWalker::new(&source, self.options.clone())
            .export(&table, id)
            .await
    }
}
