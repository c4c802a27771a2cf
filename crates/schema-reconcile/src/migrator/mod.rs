//! Migrator: inspect, plan, allocate, apply, verify.

use std::collections::HashSet;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::allocator::{allocate, TagAssignment};
use crate::config::{Config, MigrateOptions};
use crate::core::entity::Schema;
use crate::core::traits::{Dialect, PlanExecutor, SchemaInspector};
use crate::drivers::{self, Backend, DialectImpl};
use crate::error::{MigrateError, Result};
use crate::plan::diff::{self, DesiredSchema};
use crate::plan::{MigrationPlan, RenderedOperation};

/// Reconciles a desired schema against one live database.
pub struct Migrator {
    dialect: DialectImpl,
    inspector: Box<dyn SchemaInspector>,
    executor: Box<dyn PlanExecutor>,
    options: MigrateOptions,
}

/// Result of a migration run.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationReport {
    /// Dialect name.
    pub dialect: String,

    /// Schema (database on MySQL) that was migrated.
    pub namespace: String,

    /// When the migration started.
    pub started_at: DateTime<Utc>,

    /// When the migration completed.
    pub completed_at: DateTime<Utc>,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// Operations applied, in order.
    pub operations: Vec<String>,

    /// Destructive operations among them.
    pub destructive: usize,

    /// Id-block tags, when globally unique ids are enabled.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<TagAssignment>,

    /// Whether the post-apply re-inspection ran.
    pub verified: bool,
}

impl MigrationReport {
    pub fn applied(&self) -> usize {
        self.operations.len()
    }

    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Connectivity of the live database.
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheckResult {
    pub dialect: String,
    pub namespace: String,
    pub connected: bool,
    pub latency_ms: u64,
    pub error: Option<String>,
    pub healthy: bool,
}

impl Migrator {
    /// Connect to the configured database.
    pub async fn connect(config: &Config) -> Result<Self> {
        let dialect = DialectImpl::from_kind(config.database.dialect);
        let backend = drivers::connect(&config.database).await?;
        Ok(Self::new(dialect, backend, config.migration))
    }

    /// Build a migrator over any inspector/executor pair.
    pub fn new(dialect: DialectImpl, backend: Backend, options: MigrateOptions) -> Self {
        Self {
            dialect,
            inspector: backend.inspector,
            executor: backend.executor,
            options,
        }
    }

    pub fn with_options(mut self, options: MigrateOptions) -> Self {
        self.options = options;
        self
    }

    pub fn dialect(&self) -> &DialectImpl {
        &self.dialect
    }

    pub fn options(&self) -> &MigrateOptions {
        &self.options
    }

    pub fn namespace(&self) -> &str {
        self.inspector.namespace()
    }

    /// Compute the plan without executing anything.
    pub async fn plan(&self, schema: &Schema) -> Result<MigrationPlan> {
        let mut desired = DesiredSchema::build(&self.dialect, schema)?;
        let names = desired.table_names();

        info!(
            "Inspecting {} tables in {} ({})",
            names.len(),
            self.namespace(),
            self.dialect.name()
        );
        let live = self.inspector.inspect(&names).await?;
        debug!("{} of {} tables exist", live.len(), names.len());

        let tags = if self.options.global_unique_id {
            let starts = self.inspector.identity_starts().await?;
            // Existing tables without an identity column cannot take a block.
            let existing: HashSet<&str> = live.iter().map(|t| t.name.as_str()).collect();
            let taggable: Vec<String> = names
                .iter()
                .filter(|n| starts.contains_key(*n) || !existing.contains(n.as_str()))
                .cloned()
                .collect();
            if taggable.len() < names.len() {
                debug!(
                    "{} existing tables have no identity column and keep no id block",
                    names.len() - taggable.len()
                );
            }
            let tags = allocate(&taggable, &starts)?;
            for tag in tags.iter().filter(|t| t.new) {
                if let Some(table) = desired.tables.iter_mut().find(|t| t.name == tag.table) {
                    table.identity_start = Some(tag.start);
                }
            }
            tags
        } else {
            Vec::new()
        };

        let mut plan = diff::plan(&self.dialect, &desired, &live, &self.options)?;
        plan.tags = tags;
        Ok(plan)
    }

    /// Bring the live schema in line with `schema`.
    ///
    /// Cancellation is observed between operations.
    pub async fn migrate(&self, schema: &Schema, cancel: CancellationToken) -> Result<MigrationReport> {
        let started = Instant::now();
        let started_at = Utc::now();

        info!("Phase 1: Planning");
        let plan = self.plan(schema).await?;
        let rendered = plan.render(&self.dialect, self.namespace());

        if rendered.is_empty() {
            info!("Schema is up to date");
        } else {
            info!(
                "Phase 2: Applying {} operations ({} destructive)",
                rendered.len(),
                plan.destructive_count()
            );
            self.execute(&rendered, &cancel).await?;
        }

        let verified = self.options.verify && !rendered.is_empty();
        if verified {
            info!("Phase 3: Verifying");
            self.verify(schema).await?;
        }

        let completed_at = Utc::now();
        let report = MigrationReport {
            dialect: self.dialect.name().to_string(),
            namespace: self.namespace().to_string(),
            started_at,
            completed_at,
            duration_seconds: started.elapsed().as_secs_f64(),
            operations: rendered.into_iter().map(|op| op.description).collect(),
            destructive: plan.destructive_count(),
            tags: plan.tags,
            verified,
        };
        info!(
            "Migration complete: {} operations in {:.2}s",
            report.applied(),
            report.duration_seconds
        );
        Ok(report)
    }

    /// Re-plan and fail if anything is still pending.
    pub async fn verify(&self, schema: &Schema) -> Result<()> {
        let residual = self.plan(schema).await?;
        match residual.operations.first() {
            None => Ok(()),
            Some(op) => Err(MigrateError::conflict(
                op.table(),
                format!(
                    "{} operations still pending after apply, first: {}",
                    residual.len(),
                    op
                ),
            )),
        }
    }

    async fn execute(&self, ops: &[RenderedOperation], cancel: &CancellationToken) -> Result<()> {
        let total = ops.len();
        let transactional = self.executor.transactional();
        if !transactional {
            warn!(
                "{} DDL is not transactional; a failure leaves earlier operations applied",
                self.dialect.name()
            );
        }

        let mut session = self.executor.session().await?;
        if transactional {
            session.begin().await?;
        }

        let mut last_applied: Option<&str> = None;
        for (i, op) in ops.iter().enumerate() {
            if cancel.is_cancelled() {
                info!("Cancellation requested after {}/{} operations", i, total);
                if transactional {
                    session.rollback().await?;
                }
                return Err(MigrateError::Cancelled {
                    applied: i,
                    total,
                    rolled_back: transactional,
                });
            }

            info!("[{}/{}] {}", i + 1, total, op.description);
            if let Err(e) = session.apply(op).await {
                error!("{} failed: {}", op.description, e);
                if transactional {
                    if let Err(rb) = session.rollback().await {
                        warn!("Rollback failed: {}", rb);
                    }
                    return Err(MigrateError::execution(op.description.clone(), e));
                }
                return Err(match last_applied {
                    None => MigrateError::execution(op.description.clone(), e),
                    Some(last) => MigrateError::PartialApply {
                        applied: i,
                        total,
                        last_applied: Some(last.to_string()),
                        failed: op.description.clone(),
                        source: Box::new(e),
                    },
                });
            }
            last_applied = Some(op.description.as_str());
        }

        if transactional {
            session
                .commit()
                .await
                .map_err(|e| MigrateError::execution("commit", e))?;
        }
        Ok(())
    }

    /// Round-trip a trivial query and report latency.
    pub async fn health_check(&self) -> Result<HealthCheckResult> {
        let started = Instant::now();
        let outcome = self.inspector.ping().await;
        let latency_ms = started.elapsed().as_millis() as u64;
        let connected = outcome.is_ok();
        Ok(HealthCheckResult {
            dialect: self.dialect.name().to_string(),
            namespace: self.namespace().to_string(),
            connected,
            latency_ms,
            error: outcome.err().map(|e| e.to_string()),
            healthy: connected,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DialectKind;
    use crate::core::entity::{EntityType, Field, FieldType, IndexDef, Reference};
    use crate::plan::Operation;
    use crate::testing::MemoryDatabase;

    fn migrator(db: &MemoryDatabase, options: MigrateOptions) -> Migrator {
        Migrator::new(DialectImpl::from_kind(DialectKind::Postgres), db.backend(), options)
    }

    fn scenario() -> Schema {
        Schema::new(
            ["Car", "Conversion", "CustomType", "Group", "Media", "Pet", "User"]
                .iter()
                .map(|name| EntityType::new(*name))
                .collect(),
        )
    }

    fn v1() -> Schema {
        Schema::new(vec![
            EntityType::new("User")
                .field(Field::new("age", FieldType::Int32))
                .field(Field::new("name", FieldType::string(10)))
                .field(Field::new("renamed", FieldType::string(50)).nullable())
                .field(Field::new("blob", FieldType::bytes(255)).nullable())
                .field(
                    Field::new("state", FieldType::enumeration(["logged_in", "logged_out"]))
                        .nullable(),
                )
                .index(IndexDef::new(["name", "age"]).unique()),
            EntityType::new("Car"),
            EntityType::new("Conversion"),
        ])
    }

    fn v2() -> Schema {
        Schema::new(vec![
            EntityType::new("Car"),
            EntityType::new("Conversion"),
            EntityType::new("CustomType"),
            EntityType::new("Group"),
            EntityType::new("User")
                .field(Field::new("age", FieldType::Int64))
                .field(Field::new("name", FieldType::string(20)))
                .field(Field::new("new_name", FieldType::string(50)).nullable().renamed_from("renamed"))
                .field(Field::new("blob", FieldType::bytes(1000)).nullable())
                .field(
                    Field::new(
                        "state",
                        FieldType::enumeration(["logged_in", "logged_out", "online"]),
                    )
                    .nullable(),
                )
                .field(Field::new("nickname", FieldType::string(255)).unique().nullable())
                .index(IndexDef::new(["name", "age"]).unique()),
            EntityType::new("Media"),
            EntityType::new("Pet").reference(Reference::new("owner_id", "User")),
        ])
    }

    #[tokio::test]
    async fn test_second_run_is_noop() {
        let db = MemoryDatabase::new();
        let m = migrator(&db, MigrateOptions::default());

        let report = m.migrate(&v1(), CancellationToken::new()).await.unwrap();
        assert_eq!(report.applied(), 3);
        assert!(report.verified);

        let again = m.migrate(&v1(), CancellationToken::new()).await.unwrap();
        assert_eq!(again.applied(), 0);
        assert!(m.plan(&v1()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_global_ids_follow_declared_order() {
        let db = MemoryDatabase::new();
        let m = migrator(&db, MigrateOptions::default().with_global_unique_id(true));
        m.migrate(&scenario(), CancellationToken::new()).await.unwrap();

        for (tag, entity) in scenario().entities.iter().enumerate() {
            let id = db.next_id(&entity.table_name()).unwrap();
            assert!(id >= (tag as i64) << 32, "{} id {}", entity.name, id);
            assert!(id < (tag as i64 + 1) << 32, "{} id {}", entity.name, id);
        }
    }

    #[tokio::test]
    async fn test_v1_to_v2_keeps_tags_and_data_shape() {
        let db = MemoryDatabase::new();
        let options = MigrateOptions::default().with_global_unique_id(true);
        migrator(&db, options)
            .migrate(&v1(), CancellationToken::new())
            .await
            .unwrap();

        let m = migrator(&db, options.with_drop_column(true).with_drop_index(true));
        let report = m.migrate(&v2(), CancellationToken::new()).await.unwrap();
        assert!(report.operations.iter().any(|d| d.starts_with("rename column users.renamed")));
        assert!(m.plan(&v2()).await.unwrap().is_empty());

        // users kept tag 0 from v1 though it is now declared fifth
        assert!(db.next_id("users").unwrap() < 1 << 32);
        assert!(db.next_id("custom_types").unwrap() >= 3 << 32);
        assert!(db.next_id("pets").unwrap() >= 6 << 32);

        let users = db.table("users").unwrap();
        assert!(users.column("new_name").is_some());
        assert!(users.column("renamed").is_none());
        assert_eq!(users.column("name").unwrap().max_length, 20);
    }

    #[tokio::test]
    async fn test_additive_only_by_default() {
        let db = MemoryDatabase::new();
        let m = migrator(&db, MigrateOptions::default());
        m.migrate(&v2(), CancellationToken::new()).await.unwrap();

        let shrunk = Schema::new(vec![EntityType::new("User")
            .field(Field::new("age", FieldType::Int64))
            .field(Field::new("name", FieldType::string(20)))]);
        let plan = m.plan(&shrunk).await.unwrap();
        assert_eq!(plan.destructive_count(), 0);
        assert!(plan.is_empty());
    }

    #[tokio::test]
    async fn test_transactional_failure_rolls_back() {
        let db = MemoryDatabase::new().fail_at(1);
        let m = migrator(&db, MigrateOptions::default());
        let err = m.migrate(&v1(), CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, MigrateError::Execution { .. }));
        assert!(db.table_names().is_empty());
        assert!(db.applied().is_empty());
    }

    #[tokio::test]
    async fn test_non_transactional_failure_reports_partial_apply() {
        let db = MemoryDatabase::new().non_transactional().fail_at(2);
        let m = migrator(&db, MigrateOptions::default());
        match m.migrate(&v1(), CancellationToken::new()).await.unwrap_err() {
            MigrateError::PartialApply {
                applied,
                total,
                last_applied,
                ..
            } => {
                assert_eq!(applied, 2);
                assert_eq!(total, 3);
                assert_eq!(last_applied.as_deref(), db.applied().last().map(String::as_str));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(db.table_names().len(), 2);
        assert_eq!(db.applied().len(), 2);
    }

    #[tokio::test]
    async fn test_cancel_between_operations() {
        let cancel = CancellationToken::new();
        let db = MemoryDatabase::new().cancel_after(1, cancel.clone());
        let m = migrator(&db, MigrateOptions::default());
        match m.migrate(&v1(), cancel).await.unwrap_err() {
            MigrateError::Cancelled {
                applied,
                total,
                rolled_back,
            } => {
                assert_eq!((applied, total), (1, 3));
                assert!(rolled_back);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(db.table_names().is_empty());
    }

    #[tokio::test]
    async fn test_existing_table_without_identity_keeps_no_tag() {
        let schema = Schema::new(vec![EntityType::new("User"), EntityType::new("Pet")]);
        let dialect = DialectImpl::from_kind(DialectKind::Postgres);
        let mut users = DesiredSchema::build(&dialect, &schema).unwrap().tables.remove(0);
        for column in &mut users.columns {
            column.is_identity = false;
        }
        let db = MemoryDatabase::new().with_table(users);

        let m = migrator(&db, MigrateOptions::default().with_global_unique_id(true));
        let plan = m.plan(&schema).await.unwrap();
        let tagged: Vec<&str> = plan.tags.iter().map(|t| t.table.as_str()).collect();
        assert_eq!(tagged, vec!["pets"]);
        assert!(plan.tags[0].new);
        assert_eq!(plan.tags[0].tag, 0);
    }

    #[tokio::test]
    async fn test_plan_is_dry_run() {
        let db = MemoryDatabase::new();
        let m = migrator(&db, MigrateOptions::default());
        let plan = m.plan(&v2()).await.unwrap();
        assert!(matches!(plan.operations[0], Operation::CreateTable { .. }));
        assert!(db.table_names().is_empty());
    }

    #[tokio::test]
    async fn test_health_check() {
        let db = MemoryDatabase::new();
        let result = migrator(&db, MigrateOptions::default())
            .health_check()
            .await
            .unwrap();
        assert!(result.healthy);
        assert_eq!(result.dialect, "postgres");
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        const ENTITIES: [&str; 4] = ["Car", "Group", "Pet", "User"];

        fn field_type() -> impl Strategy<Value = FieldType> {
            prop_oneof![
                Just(FieldType::Int32),
                Just(FieldType::Int64),
                Just(FieldType::Bool),
                Just(FieldType::Time),
                Just(FieldType::text()),
                (1u32..300).prop_map(FieldType::string),
                prop::sample::subsequence(vec!["a", "b", "c", "d"], 1..=4)
                    .prop_map(|values| FieldType::enumeration(values)),
            ]
        }

        fn schema_strategy() -> impl Strategy<Value = Schema> {
            prop::collection::vec(
                prop::collection::vec((field_type(), any::<bool>()), 0..5),
                1..=ENTITIES.len(),
            )
            .prop_map(|entities| {
                Schema::new(
                    entities
                        .into_iter()
                        .enumerate()
                        .map(|(i, fields)| {
                            fields.into_iter().enumerate().fold(
                                EntityType::new(ENTITIES[i]),
                                |entity, (j, (ty, nullable))| {
                                    let field = Field::new(format!("f{}", j), ty);
                                    entity.field(if nullable { field.nullable() } else { field })
                                },
                            )
                        })
                        .collect(),
                )
            })
        }

        /// Every change a later version may make without conflicts.
        fn grow(schema: &Schema) -> Schema {
            let mut grown = schema.clone();
            for entity in &mut grown.entities {
                for field in &mut entity.fields {
                    field.field_type = match &field.field_type {
                        FieldType::Int32 => FieldType::Int64,
                        FieldType::String { max_len: Some(n) } => FieldType::string(n + 10),
                        FieldType::Enum { values } => {
                            let mut values = values.clone();
                            values.push("z".to_string());
                            FieldType::Enum { values }
                        }
                        other => other.clone(),
                    };
                }
                entity
                    .fields
                    .push(Field::new("extra", FieldType::string(20)).nullable());
            }
            grown
        }

        fn runtime() -> tokio::runtime::Runtime {
            tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap()
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(64))]

            #[test]
            fn prop_migrate_then_plan_is_empty(schema in schema_strategy()) {
                runtime().block_on(async {
                    let db = MemoryDatabase::new();
                    let m = migrator(&db, MigrateOptions::default().with_global_unique_id(true));
                    m.migrate(&schema, CancellationToken::new()).await.unwrap();
                    assert!(m.plan(&schema).await.unwrap().is_empty());
                });
            }

            #[test]
            fn prop_growth_is_additive(schema in schema_strategy()) {
                runtime().block_on(async {
                    let db = MemoryDatabase::new();
                    let m = migrator(&db, MigrateOptions::default());
                    m.migrate(&schema, CancellationToken::new()).await.unwrap();

                    let grown = grow(&schema);
                    let plan = m.plan(&grown).await.unwrap();
                    assert_eq!(plan.destructive_count(), 0);
                    assert!(!plan.is_empty());

                    m.migrate(&grown, CancellationToken::new()).await.unwrap();
                    assert!(m.plan(&grown).await.unwrap().is_empty());

                    // going back to the older version never shrinks anything
                    match m.plan(&schema).await {
                        Ok(plan) => assert_eq!(plan.destructive_count(), 0),
                        Err(e) => assert!(matches!(e, MigrateError::SchemaConflict { .. })),
                    }
                });
            }
        }
    }
}
