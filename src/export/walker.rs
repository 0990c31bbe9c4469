//! Dependency walker
//!
//! Depth-first, post-order traversal of the foreign-key graph starting at a
//! root row. Every row is visited once; each row is emitted only after every
//! row it references has been emitted (cycles excepted, where the back edge
//! is simply not followed).
//!
//! Traversal runs on an explicit stack. Popping `Enter` resolves and fetches
//! a row, then pushes its `Emit` followed by its dependencies, so a whole
//! dependency subtree completes before the row itself is emitted, exactly as
//! with call-stack recursion.

use super::catalog::{SchemaCatalog, TableSchema};
use super::error::ExportError;
use super::fetch::RowFetcher;
use super::value::{ForeignKeyEdge, Record, RowId, RowKey, TableRef, Value};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Default bound on dependency chain length
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Per-export tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportOptions {
    /// Dependencies further than this many edges from the root are not followed
    pub max_depth: usize,
    /// Fail the export on the first dependency failure instead of warning
    pub strict: bool,
    /// Budget for the whole export, enforced on every round trip
    pub timeout: Option<Duration>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            strict: false,
            timeout: None,
        }
    }
}

/// A problem that was logged and skipped instead of failing the export
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ExportWarning {
    /// A referenced row could not be exported and is absent from the script
    #[serde(rename_all = "camelCase")]
    DependencySkipped {
        table: String,
        column: String,
        target: String,
        id: String,
        reason: String,
    },
    /// A multi-column foreign key that was not traversed
    #[serde(rename_all = "camelCase")]
    CompositeForeignKey { table: String, constraint: String },
}

impl ExportWarning {
    fn skipped(edge: &ForeignKeyEdge, id: &str, err: &ExportError) -> Self {
        ExportWarning::DependencySkipped {
            table: edge.source_table.to_string(),
            column: edge.source_column.clone(),
            target: edge.target_table.to_string(),
            id: id.to_string(),
            reason: err.to_string(),
        }
    }
}

impl fmt::Display for ExportWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportWarning::DependencySkipped {
                table,
                column,
                target,
                id,
                reason,
            } => write!(
                f,
                "failed to export FK {}.{} -> {} ({}): {}",
                table, column, target, id, reason
            ),
            ExportWarning::CompositeForeignKey { table, constraint } => write!(
                f,
                "composite foreign key {} on {} was not followed",
                constraint, table
            ),
        }
    }
}

/// Records in dependency order plus everything that was skipped
#[derive(Debug, Clone, Default)]
pub struct ExportResult {
    pub records: Vec<Record>,
    pub warnings: Vec<ExportWarning>,
}

impl ExportResult {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of exported records per table
    pub fn table_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for record in &self.records {
            *counts.entry(record.table().to_string()).or_insert(0) += 1;
        }
        counts
    }
}

/// State scoped to one export call
struct ExportContext {
    visited: HashSet<RowKey>,
    records: Vec<Record>,
    warnings: Vec<ExportWarning>,
    schemas: HashMap<TableRef, Arc<TableSchema>>,
    deadline: Option<Instant>,
}

impl ExportContext {
    fn new(timeout: Option<Duration>) -> Self {
        Self {
            visited: HashSet::new(),
            records: Vec::new(),
            warnings: Vec::new(),
            schemas: HashMap::new(),
            deadline: timeout.map(|t| Instant::now() + t),
        }
    }
}

/// A row still to be looked at
#[derive(Debug)]
struct Visit {
    table: TableRef,
    /// Column the row is looked up by; `None` means the primary key
    lookup: Option<String>,
    id: String,
    depth: usize,
    /// Edge this row was reached through; `None` for the root
    via: Option<ForeignKeyEdge>,
}

enum Step {
    Enter(Visit),
    Emit(Record),
}

/// Walks the foreign-key closure of a root row
pub struct DependencyWalker<'a, S> {
    source: &'a S,
    options: ExportOptions,
}

impl<'a, S> DependencyWalker<'a, S>
where
    S: SchemaCatalog + RowFetcher,
{
    pub fn new(source: &'a S, options: ExportOptions) -> Self {
        Self { source, options }
    }

    /// Export `table` row `id` and everything it transitively references
    pub async fn export(&self, table: &TableRef, id: &RowId) -> Result<ExportResult, ExportError> {
        let mut ctx = ExportContext::new(self.options.timeout);
        let mut stack = vec![Step::Enter(Visit {
            table: table.clone(),
            lookup: None,
            id: id.key_text(),
            depth: 0,
            via: None,
        })];

        while let Some(step) = stack.pop() {
            match step {
                Step::Emit(record) => ctx.records.push(record),
                Step::Enter(visit) => match self.enter(&mut ctx, &visit).await {
                    Ok(Some((record, dependencies))) => {
                        stack.push(Step::Emit(record));
                        stack.extend(dependencies.into_iter().rev().map(Step::Enter));
                    }
                    Ok(None) => {}
                    Err(err) => self.downgrade(&mut ctx, &visit, err)?,
                },
            }
        }

        info!(
            "Exported {} record(s) for {} = {} with {} warning(s)",
            ctx.records.len(),
            table,
            id,
            ctx.warnings.len()
        );

        Ok(ExportResult {
            records: ctx.records,
            warnings: ctx.warnings,
        })
    }

    /// Resolve, dedupe and fetch one row. `Ok(None)` when already visited.
    async fn enter(
        &self,
        ctx: &mut ExportContext,
        visit: &Visit,
    ) -> Result<Option<(Record, Vec<Visit>)>, ExportError> {
        let schema = self.describe(ctx, &visit.table).await?;
        let lookup = visit.lookup.as_deref().unwrap_or(&schema.primary_key);
        let by_primary_key = lookup == schema.primary_key;

        if by_primary_key {
            let key = RowKey::new(&schema.relation, &visit.id);
            if ctx.visited.contains(&key) {
                return Ok(None);
            }
            self.check_depth(visit)?;
            ctx.visited.insert(key);
        } else {
            self.check_depth(visit)?;
        }

        let fetched = self
            .round_trip(ctx.deadline, self.source.fetch_row(&schema, lookup, &visit.id))
            .await?;
        let record = fetched.ok_or_else(|| ExportError::RecordNotFound {
            table: visit.table.to_string(),
            column: lookup.to_string(),
            id: visit.id.clone(),
        })?;

        // Key the row on its fetched primary-key value as well: the lookup text
        // may be a unique column or a non-canonical spelling of the key.
        let pk = match record.get(&schema.primary_key).and_then(Value::key_text) {
            Some(pk) => pk,
            None if by_primary_key => visit.id.clone(),
            None => {
                return Err(ExportError::Schema(format!(
                    "row of {} fetched by {} has no primary key value",
                    visit.table, lookup
                )))
            }
        };
        let already_keyed = by_primary_key && pk == visit.id;
        if !ctx.visited.insert(RowKey::new(&schema.relation, &pk)) && !already_keyed {
            return Ok(None);
        }

        debug!("Fetched {}.{} = {}", visit.table, lookup, visit.id);

        let dependencies = schema
            .foreign_keys
            .iter()
            .filter_map(|edge| {
                let id = record.get(&edge.source_column)?.key_text()?;
                Some(Visit {
                    table: edge.target_table.clone(),
                    lookup: Some(edge.target_column.clone()),
                    id,
                    depth: visit.depth + 1,
                    via: Some(edge.clone()),
                })
            })
            .collect();

        Ok(Some((record, dependencies)))
    }

    /// Catalog metadata, looked up at most once per table per export
    async fn describe(
        &self,
        ctx: &mut ExportContext,
        table: &TableRef,
    ) -> Result<Arc<TableSchema>, ExportError> {
        if let Some(schema) = ctx.schemas.get(table) {
            return Ok(Arc::clone(schema));
        }

        let schema = Arc::new(self.round_trip(ctx.deadline, self.source.describe(table)).await?);
        for constraint in &schema.composite_foreign_keys {
            let warning = ExportWarning::CompositeForeignKey {
                table: table.to_string(),
                constraint: constraint.clone(),
            };
            warn!("{}", warning);
            ctx.warnings.push(warning);
        }

        ctx.schemas.insert(table.clone(), Arc::clone(&schema));
        Ok(schema)
    }

    fn check_depth(&self, visit: &Visit) -> Result<(), ExportError> {
        if visit.depth > self.options.max_depth {
            return Err(ExportError::DepthExceeded {
                table: visit.table.to_string(),
                id: visit.id.clone(),
                max_depth: self.options.max_depth,
            });
        }
        Ok(())
    }

    /// Root and fatal failures propagate; dependency failures become warnings.
    fn downgrade(
        &self,
        ctx: &mut ExportContext,
        visit: &Visit,
        err: ExportError,
    ) -> Result<(), ExportError> {
        let Some(edge) = &visit.via else {
            return Err(err);
        };
        if err.is_fatal() {
            return Err(err);
        }

        let warning = ExportWarning::skipped(edge, &visit.id, &err);
        warn!("{}", warning);

        if self.options.strict {
            return Err(ExportError::DependencyFailed {
                message: warning.to_string(),
                source: Box::new(err),
            });
        }

        ctx.warnings.push(warning);
        Ok(())
    }

    async fn round_trip<T>(
        &self,
        deadline: Option<Instant>,
        call: impl Future<Output = Result<T, ExportError>>,
    ) -> Result<T, ExportError> {
        match deadline {
            Some(at) => tokio::time::timeout_at(at, call)
                .await
                .map_err(|_| ExportError::DeadlineExceeded)?,
            None => call.await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::catalog::{single_primary_key, Column, ColumnKind, ForeignKeySet};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    struct FakeTable {
        schema: &'static str,
        columns: Vec<&'static str>,
        primary_key: Vec<&'static str>,
        /// (constraint, source column, target table, target column)
        foreign_keys: Vec<(&'static str, &'static str, &'static str, &'static str)>,
        composite: Vec<&'static str>,
        rows: Vec<Vec<Value>>,
    }

    impl FakeTable {
        fn new(columns: &[&'static str]) -> Self {
            Self {
                schema: "public",
                columns: columns.to_vec(),
                primary_key: vec!["id"],
                foreign_keys: vec![],
                composite: vec![],
                rows: vec![],
            }
        }

        fn in_schema(mut self, schema: &'static str) -> Self {
            self.schema = schema;
            self
        }

        /// `target` may be schema-qualified, as the catalog reports cross-schema targets
        fn fk(
            mut self,
            column: &'static str,
            target: &'static str,
            target_column: &'static str,
        ) -> Self {
            self.foreign_keys.push((column, column, target, target_column));
            self
        }

        fn row(mut self, values: Vec<Value>) -> Self {
            self.rows.push(values);
            self
        }
    }

    #[derive(Default)]
    struct FakeDb {
        tables: HashMap<&'static str, FakeTable>,
        fetches: Mutex<Vec<String>>,
        unreachable: HashSet<&'static str>,
        latency: Option<Duration>,
    }

    impl FakeDb {
        fn table(mut self, name: &'static str, table: FakeTable) -> Self {
            self.tables.insert(name, table);
            self
        }

        fn get(&self, table: &TableRef) -> Result<&FakeTable, ExportError> {
            self.tables
                .get(table.name.as_str())
                .filter(|fake| table.schema.as_deref().map_or(true, |s| s == fake.schema))
                .ok_or_else(|| ExportError::Schema(format!("unknown table {}", table)))
        }

        fn fetches(&self) -> Vec<String> {
            self.fetches.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SchemaCatalog for FakeDb {
        async fn resolve(&self, table: &TableRef) -> Result<TableRef, ExportError> {
            let fake = self.get(table)?;
            Ok(TableRef::qualified(fake.schema, table.name.clone()))
        }

        async fn columns(&self, table: &TableRef) -> Result<Vec<Column>, ExportError> {
            Ok(self
                .get(table)?
                .columns
                .iter()
                .map(|c| Column::new(*c, "text", ColumnKind::Text))
                .collect())
        }

        async fn primary_key(&self, table: &TableRef) -> Result<String, ExportError> {
            let pk = self.get(table)?.primary_key.iter().map(|c| c.to_string()).collect();
            single_primary_key(table, pk)
        }

        async fn foreign_keys(&self, table: &TableRef) -> Result<ForeignKeySet, ExportError> {
            let fake = self.get(table)?;
            Ok(ForeignKeySet {
                edges: fake
                    .foreign_keys
                    .iter()
                    .map(|(name, column, target, target_column)| ForeignKeyEdge {
                        constraint_name: name.to_string(),
                        source_table: table.clone(),
                        source_column: column.to_string(),
                        target_table: TableRef::parse(target).unwrap(),
                        target_column: target_column.to_string(),
                    })
                    .collect(),
                composite: fake.composite.iter().map(|c| c.to_string()).collect(),
            })
        }
    }

    #[async_trait]
    impl RowFetcher for FakeDb {
        async fn fetch_row(
            &self,
            table: &TableSchema,
            column: &str,
            id: &str,
        ) -> Result<Option<Record>, ExportError> {
            if let Some(latency) = self.latency {
                tokio::time::sleep(latency).await;
            }
            if self.unreachable.contains(table.table.name.as_str()) {
                return Err(ExportError::Connection("connection reset".into()));
            }
            self.fetches
                .lock()
                .unwrap()
                .push(format!("{}.{}={}", table.table, column, id));

            let fake = self.get(&table.table)?;
            let idx = fake.columns.iter().position(|c| *c == column).unwrap();
            let row = fake.rows.iter().find(|row| same_key(&row[idx], id));

            Ok(row.map(|values| {
                Record::new(table.table.clone(), table.column_names(), values.clone()).unwrap()
            }))
        }
    }

    /// Compares the way a `$1::text::<type>` cast would: integers by value
    fn same_key(stored: &Value, id: &str) -> bool {
        match stored {
            Value::Integer(n) => id.trim().parse::<i64>().ok() == Some(*n),
            other => other.key_text().as_deref() == Some(id),
        }
    }

    fn int(n: i64) -> Value {
        Value::Integer(n)
    }

    fn text(s: &str) -> Value {
        Value::Text(s.to_string())
    }

    fn tables(result: &ExportResult) -> Vec<String> {
        result
            .records
            .iter()
            .map(|r| format!("{}:{}", r.table(), r.values()[0].key_text().unwrap()))
            .collect()
    }

    async fn export(db: &FakeDb, table: &str, id: i64) -> Result<ExportResult, ExportError> {
        DependencyWalker::new(db, ExportOptions::default())
            .export(&TableRef::new(table), &RowId::Integer(id))
            .await
    }

    fn blog() -> FakeDb {
        FakeDb::default()
            .table(
                "users",
                FakeTable::new(&["id", "email"])
                    .row(vec![int(1), text("a@example.com")])
                    .row(vec![int(2), text("b@example.com")]),
            )
            .table(
                "posts",
                FakeTable::new(&["id", "user_id", "title"])
                    .fk("user_id", "users", "id")
                    .row(vec![int(100), int(1), text("Hello")])
                    .row(vec![int(101), Value::Null, text("Anonymous")])
                    .row(vec![int(102), int(99), text("Orphan")]),
            )
    }

    #[tokio::test]
    async fn test_single_row_without_foreign_keys() {
        let db = blog();
        let result = export(&db, "users", 1).await.unwrap();
        assert_eq!(tables(&result), vec!["users:1"]);
        assert!(result.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_dependency_precedes_dependent() {
        let db = blog();
        let result = export(&db, "posts", 100).await.unwrap();
        assert_eq!(tables(&result), vec!["users:1", "posts:100"]);
    }

    #[tokio::test]
    async fn test_self_reference_terminates() {
        let db = FakeDb::default().table(
            "nodes",
            FakeTable::new(&["id", "parent_id"])
                .fk("parent_id", "nodes", "id")
                .row(vec![int(5), int(5)]),
        );
        let result = export(&db, "nodes", 5).await.unwrap();
        assert_eq!(tables(&result), vec!["nodes:5"]);
        assert_eq!(db.fetches(), vec!["nodes.id=5"]);
    }

    #[tokio::test]
    async fn test_null_foreign_key_is_not_fetched() {
        let db = blog();
        let result = export(&db, "posts", 101).await.unwrap();
        assert_eq!(tables(&result), vec!["posts:101"]);
        assert_eq!(db.fetches(), vec!["posts.id=101"]);
    }

    #[tokio::test]
    async fn test_missing_dependency_is_a_warning() {
        let db = blog();
        let result = export(&db, "posts", 102).await.unwrap();
        assert_eq!(tables(&result), vec!["posts:102"]);
        assert_eq!(result.warnings.len(), 1);
        match &result.warnings[0] {
            ExportWarning::DependencySkipped {
                table,
                column,
                target,
                id,
                ..
            } => {
                assert_eq!(table, "posts");
                assert_eq!(column, "user_id");
                assert_eq!(target, "users");
                assert_eq!(id, "99");
            }
            other => panic!("unexpected warning {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_root_is_fatal() {
        let db = blog();
        let err = export(&db, "users", 404).await.unwrap_err();
        assert!(matches!(err, ExportError::RecordNotFound { .. }));
    }

    #[tokio::test]
    async fn test_unknown_root_table_is_fatal() {
        let db = blog();
        let err = export(&db, "missing", 1).await.unwrap_err();
        assert!(matches!(err, ExportError::Schema(_)));
    }

    #[tokio::test]
    async fn test_composite_primary_key_root_is_fatal() {
        let mut memberships = FakeTable::new(&["team_id", "user_id"]).row(vec![int(1), int(1)]);
        memberships.primary_key = vec!["team_id", "user_id"];
        let db = FakeDb::default().table("memberships", memberships);

        let err = export(&db, "memberships", 1).await.unwrap_err();
        assert!(err.to_string().contains("composite primary key"));
    }

    #[tokio::test]
    async fn test_dependency_without_primary_key_is_skipped() {
        let mut tags = FakeTable::new(&["id", "label"]).row(vec![int(7), text("rust")]);
        tags.primary_key = vec![];
        let db = FakeDb::default()
            .table("tags", tags)
            .table(
                "articles",
                FakeTable::new(&["id", "tag_id"])
                    .fk("tag_id", "tags", "id")
                    .row(vec![int(1), int(7)]),
            );

        let result = export(&db, "articles", 1).await.unwrap();
        assert_eq!(tables(&result), vec!["articles:1"]);
        assert!(result.warnings[0].to_string().contains("no primary key"));
    }

    #[tokio::test]
    async fn test_diamond_is_exported_once() {
        let db = FakeDb::default()
            .table("orgs", FakeTable::new(&["id"]).row(vec![int(1)]))
            .table(
                "teams",
                FakeTable::new(&["id", "org_id"])
                    .fk("org_id", "orgs", "id")
                    .row(vec![int(10), int(1)]),
            )
            .table(
                "projects",
                FakeTable::new(&["id", "org_id"])
                    .fk("org_id", "orgs", "id")
                    .row(vec![int(20), int(1)]),
            )
            .table(
                "tasks",
                FakeTable::new(&["id", "team_id", "project_id"])
                    .fk("team_id", "teams", "id")
                    .fk("project_id", "projects", "id")
                    .row(vec![int(30), int(10), int(20)]),
            );

        let result = export(&db, "tasks", 30).await.unwrap();
        assert_eq!(
            tables(&result),
            vec!["orgs:1", "teams:10", "projects:20", "tasks:30"]
        );
        assert_eq!(
            db.fetches().iter().filter(|f| f.starts_with("orgs")).count(),
            1
        );
    }

    #[tokio::test]
    async fn test_cycle_terminates_without_duplicates() {
        let db = FakeDb::default()
            .table(
                "employees",
                FakeTable::new(&["id", "dept_id"])
                    .fk("dept_id", "departments", "id")
                    .row(vec![int(1), int(10)]),
            )
            .table(
                "departments",
                FakeTable::new(&["id", "manager_id"])
                    .fk("manager_id", "employees", "id")
                    .row(vec![int(10), int(1)]),
            );

        let result = export(&db, "employees", 1).await.unwrap();
        assert_eq!(tables(&result), vec!["departments:10", "employees:1"]);
    }

    #[tokio::test]
    async fn test_every_record_follows_its_dependencies() {
        let db = FakeDb::default()
            .table("countries", FakeTable::new(&["id"]).row(vec![int(1)]))
            .table(
                "cities",
                FakeTable::new(&["id", "country_id"])
                    .fk("country_id", "countries", "id")
                    .row(vec![int(2), int(1)]),
            )
            .table(
                "addresses",
                FakeTable::new(&["id", "city_id", "country_id"])
                    .fk("city_id", "cities", "id")
                    .fk("country_id", "countries", "id")
                    .row(vec![int(3), int(2), int(1)]),
            )
            .table(
                "customers",
                FakeTable::new(&["id", "address_id"])
                    .fk("address_id", "addresses", "id")
                    .row(vec![int(4), int(3)]),
            );

        let result = export(&db, "customers", 4).await.unwrap();
        let order = tables(&result);
        let position = |key: &str| order.iter().position(|k| k == key).unwrap();

        assert!(position("countries:1") < position("cities:2"));
        assert!(position("cities:2") < position("addresses:3"));
        assert!(position("countries:1") < position("addresses:3"));
        assert!(position("addresses:3") < position("customers:4"));

        let unique: HashSet<_> = order.iter().collect();
        assert_eq!(unique.len(), order.len());
    }

    #[tokio::test]
    async fn test_unique_column_reference_is_deduplicated() {
        let db = FakeDb::default()
            .table(
                "accounts",
                FakeTable::new(&["id", "handle"]).row(vec![int(1), text("ada")]),
            )
            .table(
                "mentions",
                FakeTable::new(&["id", "account_id", "handle"])
                    .fk("account_id", "accounts", "id")
                    .fk("handle", "accounts", "handle")
                    .row(vec![int(9), int(1), text("ada")]),
            );

        let result = export(&db, "mentions", 9).await.unwrap();
        assert_eq!(tables(&result), vec!["accounts:1", "mentions:9"]);
        assert!(db.fetches().contains(&"accounts.handle=ada".to_string()));
    }

    #[tokio::test]
    async fn test_depth_guard_skips_deep_dependencies() {
        let db = FakeDb::default().table(
            "nodes",
            FakeTable::new(&["id", "parent_id"])
                .fk("parent_id", "nodes", "id")
                .row(vec![int(1), Value::Null])
                .row(vec![int(2), int(1)])
                .row(vec![int(3), int(2)])
                .row(vec![int(4), int(3)]),
        );

        let options = ExportOptions {
            max_depth: 2,
            ..ExportOptions::default()
        };
        let result = DependencyWalker::new(&db, options)
            .export(&TableRef::new("nodes"), &RowId::Integer(4))
            .await
            .unwrap();

        assert_eq!(tables(&result), vec!["nodes:2", "nodes:3", "nodes:4"]);
        assert!(result.warnings[0].to_string().contains("deeper than 2"));
    }

    #[tokio::test]
    async fn test_strict_mode_fails_on_missing_dependency() {
        let db = blog();
        let options = ExportOptions {
            strict: true,
            ..ExportOptions::default()
        };
        let err = DependencyWalker::new(&db, options)
            .export(&TableRef::new("posts"), &RowId::Integer(102))
            .await
            .unwrap_err();

        assert!(matches!(err, ExportError::DependencyFailed { .. }));
        assert!(err.to_string().contains("posts.user_id -> users"));
    }

    #[tokio::test]
    async fn test_connection_error_in_dependency_is_fatal() {
        let mut db = blog();
        db.unreachable.insert("users");
        let err = export(&db, "posts", 100).await.unwrap_err();
        assert!(matches!(err, ExportError::Connection(_)));
    }

    #[tokio::test]
    async fn test_deadline_aborts_export() {
        let mut db = blog();
        db.latency = Some(Duration::from_millis(200));
        let options = ExportOptions {
            timeout: Some(Duration::from_millis(20)),
            ..ExportOptions::default()
        };
        let err = DependencyWalker::new(&db, options)
            .export(&TableRef::new("posts"), &RowId::Integer(100))
            .await
            .unwrap_err();
        assert!(matches!(err, ExportError::DeadlineExceeded));
    }

    #[tokio::test]
    async fn test_composite_foreign_keys_are_reported() {
        let mut shipments = FakeTable::new(&["id"]).row(vec![int(1)]);
        shipments.composite = vec!["shipments_order_line_fkey"];
        let db = FakeDb::default().table("shipments", shipments);

        let result = export(&db, "shipments", 1).await.unwrap();
        assert_eq!(
            result.warnings,
            vec![ExportWarning::CompositeForeignKey {
                table: "shipments".into(),
                constraint: "shipments_order_line_fkey".into(),
            }]
        );
    }

    #[tokio::test]
    async fn test_text_root_id() {
        let db = FakeDb::default().table(
            "slugs",
            FakeTable::new(&["id", "target"]).row(vec![text("intro"), text("/docs")]),
        );
        let result = DependencyWalker::new(&db, ExportOptions::default())
            .export(&TableRef::new("slugs"), &RowId::parse("intro"))
            .await
            .unwrap();
        assert_eq!(tables(&result), vec!["slugs:intro"]);
    }

    #[tokio::test]
    async fn test_table_counts() {
        let db = blog();
        let result = export(&db, "posts", 100).await.unwrap();
        let counts = result.table_counts();
        assert_eq!(counts.get("users"), Some(&1));
        assert_eq!(counts.get("posts"), Some(&1));
        assert_eq!(result.len(), 2);
    }

    #[tokio::test]
    async fn test_same_row_through_qualified_and_unqualified_names() {
        let db = FakeDb::default()
            .table("users", FakeTable::new(&["id"]).row(vec![int(1)]))
            .table(
                "log",
                FakeTable::new(&["id", "user_id"])
                    .in_schema("audit")
                    .fk("user_id", "public.users", "id")
                    .row(vec![int(7), int(1)]),
            )
            .table(
                "orders",
                FakeTable::new(&["id", "user_id", "log_id"])
                    .fk("user_id", "users", "id")
                    .fk("log_id", "audit.log", "id")
                    .row(vec![int(3), int(1), int(7)]),
            );

        let result = export(&db, "orders", 3).await.unwrap();
        assert_eq!(tables(&result), vec!["users:1", "audit.log:7", "orders:3"]);
        assert_eq!(
            db.fetches().iter().filter(|f| f.ends_with("users.id=1")).count(),
            1
        );
    }

    #[tokio::test]
    async fn test_qualified_root_matches_unqualified_back_reference() {
        let db = FakeDb::default()
            .table(
                "employees",
                FakeTable::new(&["id", "dept_id"])
                    .fk("dept_id", "departments", "id")
                    .row(vec![int(1), int(10)]),
            )
            .table(
                "departments",
                FakeTable::new(&["id", "manager_id"])
                    .fk("manager_id", "employees", "id")
                    .row(vec![int(10), int(1)]),
            );

        let result = DependencyWalker::new(&db, ExportOptions::default())
            .export(&TableRef::qualified("public", "employees"), &RowId::Integer(1))
            .await
            .unwrap();
        assert_eq!(tables(&result), vec!["departments:10", "public.employees:1"]);
    }

    #[tokio::test]
    async fn test_zero_padded_text_root() {
        let db = FakeDb::default().table(
            "zips",
            FakeTable::new(&["id", "city"]).row(vec![text("01234"), text("Springfield")]),
        );

        let result = DependencyWalker::new(&db, ExportOptions::default())
            .export(&TableRef::new("zips"), &RowId::parse("01234"))
            .await
            .unwrap();
        assert_eq!(tables(&result), vec!["zips:01234"]);
        assert_eq!(db.fetches(), vec!["zips.id=01234"]);
    }

    #[tokio::test]
    async fn test_non_canonical_root_id_is_exported_once() {
        let db = FakeDb::default().table(
            "nodes",
            FakeTable::new(&["id", "parent_id"])
                .fk("parent_id", "nodes", "id")
                .row(vec![int(1), int(2)])
                .row(vec![int(2), int(1)]),
        );

        let result = DependencyWalker::new(&db, ExportOptions::default())
            .export(&TableRef::new("nodes"), &RowId::parse("01"))
            .await
            .unwrap();
        assert_eq!(tables(&result), vec!["nodes:2", "nodes:1"]);
    }
}
