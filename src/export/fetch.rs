//! Row fetcher

use super::catalog::TableSchema;
use super::error::ExportError;
use super::value::Record;
use async_trait::async_trait;

/// Retrieves single rows by key
#[async_trait]
pub trait RowFetcher: Send + Sync {
    /// Fetch the one row of `table` whose `column` equals `id`.
    ///
    /// `id` is the textual key form (see [`Value::key_text`]). `Ok(None)`
    /// means no such row exists.
    ///
    /// [`Value::key_text`]: super::value::Value::key_text
    async fn fetch_row(
        &self,
        table: &TableSchema,
        column: &str,
        id: &str,
    ) -> Result<Option<Record>, ExportError>;
}
