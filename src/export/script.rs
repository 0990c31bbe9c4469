//! SQL script generation
//!
//! Turns an ordered record sequence into a single-transaction script of
//! `INSERT ... ON CONFLICT DO NOTHING` statements that can be replayed
//! against a partially populated database.

use super::error::ExportError;
use super::value::{format_naive_timestamp, format_zoned_timestamp, hex_bytea, Record, Value};
use chrono::{DateTime, SecondsFormat, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::io::Write;

/// Name written into the script header
pub const TOOL_NAME: &str = "rowseed";

static PLAIN_IDENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z_][a-z0-9_$]*$").expect("identifier pattern is valid"));

/// Keywords that cannot appear as bare column or table names
static RESERVED: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "all", "analyse", "analyze", "and", "any", "array", "as", "asc", "asymmetric",
        "authorization", "binary", "both", "case", "cast", "check", "collate", "collation",
        "column", "concurrently", "constraint", "create", "cross", "current_catalog",
        "current_date", "current_role", "current_schema", "current_time", "current_timestamp",
        "current_user", "default", "deferrable", "desc", "distinct", "do", "else", "end",
        "except", "false", "fetch", "for", "foreign", "freeze", "from", "full", "grant",
        "group", "having", "ilike", "in", "initially", "inner", "intersect", "into", "is",
        "isnull", "join", "lateral", "leading", "left", "like", "limit", "localtime",
        "localtimestamp", "natural", "not", "notnull", "null", "offset", "on", "only", "or",
        "order", "outer", "overlaps", "placing", "primary", "references", "returning", "right",
        "select", "session_user", "similar", "some", "symmetric", "system_user", "table",
        "tablesample", "then", "to", "trailing", "true", "union", "unique", "user", "using",
        "variadic", "verbose", "when", "where", "window", "with",
    ]
    .into_iter()
    .collect()
});

/// Quote an identifier only when the engine would otherwise fold or reject it
pub fn quote_ident(name: &str) -> String {
    if PLAIN_IDENT.is_match(name) && !RESERVED.contains(name) {
        name.to_string()
    } else {
        format!("\"{}\"", name.replace('"', "\"\""))
    }
}

/// Double single quotes and backslashes
pub fn escape_string(s: &str) -> String {
    s.replace('\\', "\\\\").replace('\'', "''")
}

/// Single-quoted literal. Doubled backslashes are only read back as one
/// backslash inside an escape string, so those literals carry the `E` prefix.
pub fn quote_literal(s: &str) -> String {
    let escaped = escape_string(s);
    if s.contains('\\') {
        format!("E'{}'", escaped)
    } else {
        format!("'{}'", escaped)
    }
}

/// Render one value as a SQL literal
pub fn format_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Boolean(true) => "true".to_string(),
        Value::Boolean(false) => "false".to_string(),
        Value::Integer(n) => n.to_string(),
        Value::Float(f) if f.is_nan() => "'NaN'".to_string(),
        Value::Float(f) if f.is_infinite() && *f > 0.0 => "'Infinity'".to_string(),
        Value::Float(f) if f.is_infinite() => "'-Infinity'".to_string(),
        Value::Float(f) => f.to_string(),
        Value::Text(s) => quote_literal(s),
        Value::Binary(bytes) => quote_literal(&hex_bytea(bytes)),
        Value::Timestamp(ts) => quote_literal(&format_naive_timestamp(ts)),
        Value::TimestampTz(ts) => quote_literal(&format_zoned_timestamp(ts)),
    }
}

/// Serializes records into a transactional seed script
#[derive(Debug, Clone)]
pub struct ScriptGenerator {
    generated_at: DateTime<Utc>,
}

impl ScriptGenerator {
    pub fn new() -> Self {
        Self::with_timestamp(Utc::now())
    }

    pub fn with_timestamp(generated_at: DateTime<Utc>) -> Self {
        Self { generated_at }
    }

    /// Render the whole script in memory
    pub fn render(&self, records: &[Record]) -> String {
        let mut out = String::new();
        out.push_str(&format!("-- Database export generated by {}\n", TOOL_NAME));
        out.push_str(&format!(
            "-- Generated at: {}\n\n",
            self.generated_at.to_rfc3339_opts(SecondsFormat::Secs, true)
        ));
        out.push_str("BEGIN;\n\n");

        for record in records {
            let columns = record
                .columns()
                .iter()
                .map(|c| quote_ident(c))
                .collect::<Vec<_>>()
                .join(", ");
            let values = record
                .values()
                .iter()
                .map(format_value)
                .collect::<Vec<_>>()
                .join(", ");

            out.push_str(&format!(
                "INSERT INTO {} ({})\n",
                record.table().sql_name(),
                columns
            ));
            out.push_str(&format!("VALUES ({})\n", values));
            out.push_str("ON CONFLICT DO NOTHING;\n\n");
        }

        out.push_str("COMMIT;\n");
        out
    }

    /// Render, then write the script in one call
    pub fn write_script<W: Write>(
        &self,
        records: &[Record],
        writer: &mut W,
    ) -> Result<(), ExportError> {
        let script = self.render(records);
        writer.write_all(script.as_bytes())?;
        writer.flush()?;
        Ok(())
    }
}

impl Default for ScriptGenerator {
    fn default() -> Self {
        Self::new()
    }
}
