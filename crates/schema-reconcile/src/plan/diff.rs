//! Diff planner: desired tables against live tables.
//!
//! Tables are visited in foreign-key dependency order (referenced tables
//! first, reference cycles broken by declared order). Each table contributes
//! its changes in a fixed order:
//!
//! 1. index drops (only with `drop_index`)
//! 2. explicit renames
//! 3. widenings (type capacity or `NOT NULL -> NULL`)
//! 4. default changes
//! 5. new columns
//! 6. column drops (only with `drop_column`)
//! 7. new indexes
//!
//! Foreign keys are added after every table exists, which also resolves
//! reference cycles between new tables. Dialects that can only declare
//! foreign keys inline keep them in `CreateTable` instead.
//!
//! Operations the dialect cannot apply in place are refused as conflicts
//! before anything runs.
//!
//! Columns are compared by [`TypeClass`], never by type name, and renames are
//! only ever taken from `previous_name` directives.

use std::collections::{BTreeMap, HashSet};

use tracing::{debug, warn};

use super::{CheckRename, MigrationPlan, Operation};
use crate::config::MigrateOptions;
use crate::core::entity::Schema;
use crate::core::identifier::check_name;
use crate::core::schema::{CheckConstraint, Column, Table};
use crate::core::traits::Dialect;
use crate::dialect::check::CheckKind;
use crate::dialect::typemap::{compare, desired_tables, same_default, Compat};
use crate::error::{MigrateError, Result};

/// An explicit column rename taken from a field's `previous_name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameDirective {
    pub table: String,
    pub from: String,
    pub to: String,
}

/// Desired physical tables for one dialect plus the rename directives.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DesiredSchema {
    /// Tables in declared entity order.
    pub tables: Vec<Table>,
    pub renames: Vec<RenameDirective>,
}

impl DesiredSchema {
    /// Validate the schema and map every entity through the dialect.
    pub fn build<D: Dialect + ?Sized>(dialect: &D, schema: &Schema) -> Result<Self> {
        schema.validate()?;
        let tables = desired_tables(dialect, schema)?;
        let renames = schema
            .entities
            .iter()
            .flat_map(|entity| {
                let table = entity.table_name();
                entity.fields.iter().filter_map(move |field| {
                    field.previous_name.as_ref().map(|from| RenameDirective {
                        table: table.clone(),
                        from: from.clone(),
                        to: field.name.clone(),
                    })
                })
            })
            .collect();
        Ok(Self { tables, renames })
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables.iter().map(|t| t.name.clone()).collect()
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }

    fn renames_for<'a>(&'a self, table: &'a str) -> impl Iterator<Item = &'a RenameDirective> {
        self.renames.iter().filter(move |r| r.table == table)
    }
}

/// Compute the operations that bring `live` to `desired`.
///
/// `live` holds the tables the inspector found; desired tables missing from it
/// are created. Live tables not in `desired` are never touched.
pub fn plan<D: Dialect + ?Sized>(
    dialect: &D,
    desired: &DesiredSchema,
    live: &[Table],
    options: &MigrateOptions,
) -> Result<MigrationPlan> {
    let live_by_name: BTreeMap<&str, &Table> = live.iter().map(|t| (t.name.as_str(), t)).collect();

    let mut operations = Vec::new();
    let mut foreign_keys = Vec::new();

    for table in dependency_order(&desired.tables) {
        match live_by_name.get(table.name.as_str()) {
            None => {
                let mut create = table.clone();
                if !dialect.inline_foreign_keys() {
                    for fk in std::mem::take(&mut create.foreign_keys) {
                        foreign_keys.push(Operation::AddForeignKey {
                            table: table.name.clone(),
                            foreign_key: fk,
                        });
                    }
                }
                operations.push(Operation::CreateTable { table: create });
            }
            Some(live_table) => {
                let renames: Vec<&RenameDirective> = desired.renames_for(&table.name).collect();
                let changes = TableDiff::new(dialect, table, live_table, options).diff(&renames)?;
                operations.extend(changes.alterations);
                foreign_keys.extend(changes.foreign_keys);
            }
        }
    }
    operations.extend(foreign_keys);

    for op in &operations {
        if let Some(reason) = dialect.unsupported_reason(op) {
            return Err(MigrateError::conflict(op.table(), format!("{}: {}", op, reason)));
        }
    }

    debug!(
        "Planned {} operations over {} desired tables ({} live)",
        operations.len(),
        desired.tables.len(),
        live.len()
    );
    Ok(MigrationPlan {
        operations,
        tags: Vec::new(),
    })
}

/// Order tables so that referenced tables come first.
///
/// Each step takes the first table, in declared order, whose referenced
/// tables are all placed. A cycle places the first remaining table.
pub fn dependency_order(tables: &[Table]) -> Vec<&Table> {
    let names: HashSet<&str> = tables.iter().map(|t| t.name.as_str()).collect();
    let mut placed: HashSet<&str> = HashSet::new();
    let mut remaining: Vec<&Table> = tables.iter().collect();
    let mut ordered = Vec::with_capacity(tables.len());

    while !remaining.is_empty() {
        let ready = remaining.iter().position(|t| {
            t.referenced_tables()
                .all(|r| !names.contains(r) || placed.contains(r))
        });
        let next = remaining.remove(ready.unwrap_or(0));
        placed.insert(next.name.as_str());
        ordered.push(next);
    }
    ordered
}

#[derive(Default)]
struct TableChanges {
    alterations: Vec<Operation>,
    foreign_keys: Vec<Operation>,
}

/// Diff state for one table present on both sides.
struct TableDiff<'a, D: Dialect + ?Sized> {
    dialect: &'a D,
    desired: &'a Table,
    options: &'a MigrateOptions,
    /// Live table with planned renames already applied.
    view: Table,
    dropped_indexes: HashSet<String>,
}

impl<'a, D: Dialect + ?Sized> TableDiff<'a, D> {
    fn new(dialect: &'a D, desired: &'a Table, live: &Table, options: &'a MigrateOptions) -> Self {
        Self {
            dialect,
            desired,
            options,
            view: live.clone(),
            dropped_indexes: HashSet::new(),
        }
    }

    fn name(&self) -> &str {
        &self.desired.name
    }

    fn diff(mut self, renames: &[&RenameDirective]) -> Result<TableChanges> {
        let mut changes = TableChanges::default();

        // Index drops compare against the view with renames applied.
        let renamed = self.renames(renames);
        let index_drops = self.index_drops()?;
        let (widened, defaults) = self.column_changes()?;
        let added = self.added_columns();
        let column_drops = self.column_drops();
        let index_adds = self.index_adds();

        changes.alterations.extend(index_drops);
        changes.alterations.extend(renamed);
        changes.alterations.extend(widened);
        changes.alterations.extend(defaults);
        changes.alterations.extend(added);
        changes.alterations.extend(column_drops);
        changes.alterations.extend(index_adds);
        changes.foreign_keys = self.foreign_key_adds();
        Ok(changes)
    }

    fn index_drops(&mut self) -> Result<Vec<Operation>> {
        let mut ops = Vec::new();
        for index in &self.view.indexes {
            let redefined = match self.desired.index(&index.name) {
                Some(wanted) if wanted.same_definition(index) => continue,
                Some(_) => true,
                None => false,
            };
            if self.options.drop_index {
                ops.push(Operation::DropIndex {
                    table: self.desired.name.clone(),
                    index: index.name.clone(),
                });
                self.dropped_indexes.insert(index.name.clone());
            } else if redefined {
                return Err(MigrateError::conflict(
                    self.name(),
                    format!(
                        "index {} exists with a different definition; enable drop_index to rebuild it",
                        index.name
                    ),
                ));
            } else {
                warn!(
                    "Index {}.{} is not in the desired schema and is kept (drop_index is off)",
                    self.name(),
                    index.name
                );
            }
        }
        Ok(ops)
    }

    fn renames(&mut self, renames: &[&RenameDirective]) -> Vec<Operation> {
        let mut ops = Vec::new();
        for rename in renames {
            if self.view.column(&rename.to).is_some() {
                continue;
            }
            let Some(position) = self.view.columns.iter().position(|c| c.name == rename.from) else {
                debug!(
                    "Rename {}.{} -> {}: no live column {}, adding instead",
                    self.name(),
                    rename.from,
                    rename.to,
                    rename.from
                );
                continue;
            };

            let mut column = self.view.columns[position].clone();
            column.name = rename.to.clone();

            let old_check = check_name(self.name(), &rename.from);
            let check = self
                .view
                .check(&old_check)
                .and_then(|c| CheckKind::parse(&c.definition))
                .map(|kind| CheckRename {
                    from: old_check.clone(),
                    to: CheckConstraint {
                        name: check_name(self.name(), &rename.to),
                        definition: self.dialect.check_sql(&column, &kind),
                    },
                });

            self.view.columns[position] = column;
            for index in &mut self.view.indexes {
                for c in &mut index.columns {
                    if *c == rename.from {
                        *c = rename.to.clone();
                    }
                }
            }
            for fk in &mut self.view.foreign_keys {
                for c in &mut fk.columns {
                    if *c == rename.from {
                        *c = rename.to.clone();
                    }
                }
            }
            if let Some(c) = &check {
                self.view.check_constraints.retain(|x| x.name != c.from);
                self.view.check_constraints.push(c.to.clone());
            }

            ops.push(Operation::RenameColumn {
                table: self.desired.name.clone(),
                from: rename.from.clone(),
                to: rename.to.clone(),
                check,
            });
        }
        ops
    }

    /// Widen and default changes for columns present on both sides.
    fn column_changes(&self) -> Result<(Vec<Operation>, Vec<Operation>)> {
        let mut widened = Vec::new();
        let mut defaults = Vec::new();

        for wanted in &self.desired.columns {
            let Some(live) = self.view.column(&wanted.name) else {
                continue;
            };
            if let Some(op) = self.widening(wanted, live)? {
                widened.push(op);
            }
            if !same_default(wanted.default.as_deref(), live.default.as_deref()) {
                defaults.push(Operation::ChangeDefault {
                    table: self.desired.name.clone(),
                    column: wanted.clone(),
                });
            }
        }
        Ok((widened, defaults))
    }

    fn widening(&self, wanted: &Column, live: &Column) -> Result<Option<Operation>> {
        let name = check_name(self.name(), &wanted.name);
        let desired_check = self.desired.check(&name);
        let live_check = self.view.check(&name);
        let desired_kind = desired_check.and_then(|c| CheckKind::parse(&c.definition));
        let live_kind = live_check.and_then(|c| CheckKind::parse(&c.definition));

        let want = self.dialect.classify(wanted, desired_kind.as_ref());
        let have = self.dialect.classify(live, live_kind.as_ref());
        let type_change = match compare(&want, &have) {
            Compat::Equal => false,
            Compat::Widening => true,
            Compat::Conflict(reason) => {
                return Err(MigrateError::column_conflict(self.name(), &wanted.name, reason))
            }
        };

        if !wanted.is_nullable && live.is_nullable {
            return Err(MigrateError::column_conflict(
                self.name(),
                &wanted.name,
                "column is nullable in the database; making it NOT NULL needs a backfill",
            ));
        }
        let relax_null = wanted.is_nullable && !live.is_nullable;
        if !type_change && !relax_null {
            return Ok(None);
        }

        let (drop_check, add_check) = if type_change && desired_kind != live_kind {
            (live_check.map(|c| c.name.clone()), desired_check.cloned())
        } else {
            (None, None)
        };

        // The default is reconciled separately by ChangeDefault.
        let mut to = wanted.clone();
        to.default = live.default.clone();

        let indexes = self
            .view
            .indexes
            .iter()
            .filter(|i| i.columns.contains(&wanted.name) && !self.dropped_indexes.contains(&i.name))
            .cloned()
            .collect();

        Ok(Some(Operation::WidenColumn {
            table: self.desired.name.clone(),
            from: live.clone(),
            to,
            drop_check,
            add_check,
            indexes,
        }))
    }

    fn added_columns(&self) -> Vec<Operation> {
        self.desired
            .columns
            .iter()
            .filter(|c| self.view.column(&c.name).is_none())
            .map(|c| Operation::AddColumn {
                table: self.desired.name.clone(),
                column: c.clone(),
                check: self.desired.check(&check_name(self.name(), &c.name)).cloned(),
            })
            .collect()
    }

    fn column_drops(&self) -> Vec<Operation> {
        let mut ops = Vec::new();
        for live in &self.view.columns {
            if self.desired.column(&live.name).is_some() {
                continue;
            }
            if self.options.drop_column {
                let check = check_name(self.name(), &live.name);
                let indexes = self
                    .view
                    .indexes
                    .iter()
                    .filter(|i| i.columns.contains(&live.name) && !self.dropped_indexes.contains(&i.name))
                    .map(|i| i.name.clone())
                    .collect();
                ops.push(Operation::DropColumn {
                    table: self.desired.name.clone(),
                    column: live.name.clone(),
                    check: self.view.check(&check).map(|c| c.name.clone()),
                    indexes,
                });
            } else {
                warn!(
                    "Column {}.{} is not in the desired schema and is kept (drop_column is off)",
                    self.name(),
                    live.name
                );
            }
        }
        ops
    }

    fn index_adds(&self) -> Vec<Operation> {
        self.desired
            .indexes
            .iter()
            .filter(|i| self.view.index(&i.name).is_none() || self.dropped_indexes.contains(&i.name))
            .map(|i| Operation::AddIndex {
                table: self.desired.name.clone(),
                index: i.clone(),
            })
            .collect()
    }

    fn foreign_key_adds(&self) -> Vec<Operation> {
        self.desired
            .foreign_keys
            .iter()
            .filter(|fk| {
                !self.view.foreign_keys.iter().any(|live| {
                    live.name == fk.name
                        || (live.columns == fk.columns && live.ref_table == fk.ref_table)
                })
            })
            .map(|fk| Operation::AddForeignKey {
                table: self.desired.name.clone(),
                foreign_key: fk.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::entity::{DefaultValue, EntityType, Field, FieldType, IndexDef, Reference};
    use crate::drivers::{PostgresDialect, SqliteDialect};

    fn users(name_len: u32) -> EntityType {
        EntityType::new("User")
            .field(Field::new("age", FieldType::Int32))
            .field(Field::new("name", FieldType::string(name_len)))
            .field(
                Field::new("state", FieldType::enumeration(["logged_in", "logged_out"]))
                    .nullable(),
            )
    }

    fn desired(schema: &Schema) -> DesiredSchema {
        DesiredSchema::build(&PostgresDialect::new(), schema).unwrap()
    }

    fn plan_against(schema: &Schema, live: &[Table], options: MigrateOptions) -> MigrationPlan {
        plan(&PostgresDialect::new(), &desired(schema), live, &options).unwrap()
    }

    fn kinds(plan: &MigrationPlan) -> Vec<&'static str> {
        plan.operations.iter().map(|op| op.kind()).collect()
    }

    #[test]
    fn test_empty_database_creates_everything() {
        let schema = Schema::new(vec![
            EntityType::new("Pet").reference(Reference::new("owner_id", "User")),
            users(10),
        ]);
        let plan = plan_against(&schema, &[], MigrateOptions::default());
        assert_eq!(kinds(&plan), vec!["create_table", "create_table", "add_foreign_key"]);

        // the referenced table is created first despite being declared second
        assert_eq!(plan.operations[0].table(), "users");
        assert_eq!(plan.operations[1].table(), "pets");
        match &plan.operations[1] {
            Operation::CreateTable { table } => assert!(table.foreign_keys.is_empty()),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_matching_live_schema_is_empty_plan() {
        let schema = Schema::new(vec![users(10)]);
        let live = desired(&schema).tables;
        assert!(plan_against(&schema, &live, MigrateOptions::default()).is_empty());
    }

    #[test]
    fn test_string_bound_widens() {
        let live = desired(&Schema::new(vec![users(10)])).tables;
        let plan = plan_against(&Schema::new(vec![users(20)]), &live, MigrateOptions::default());
        assert_eq!(kinds(&plan), vec!["widen_column"]);
        match &plan.operations[0] {
            Operation::WidenColumn { from, to, .. } => {
                assert_eq!(from.max_length, 10);
                assert_eq!(to.max_length, 20);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_string_bound_shrink_is_conflict() {
        let live = desired(&Schema::new(vec![users(20)])).tables;
        let err = plan(
            &PostgresDialect::new(),
            &desired(&Schema::new(vec![users(10)])),
            &live,
            &MigrateOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            MigrateError::SchemaConflict { ref column, .. } if column.as_deref() == Some("name")
        ));
    }

    #[test]
    fn test_enum_growth_replaces_check() {
        let live = desired(&Schema::new(vec![users(10)])).tables;
        let grown = Schema::new(vec![EntityType::new("User")
            .field(Field::new("age", FieldType::Int32))
            .field(Field::new("name", FieldType::string(10)))
            .field(
                Field::new(
                    "state",
                    FieldType::enumeration(["logged_in", "logged_out", "online"]),
                )
                .nullable(),
            )]);
        let plan = plan_against(&grown, &live, MigrateOptions::default());
        match plan.operations.as_slice() {
            [Operation::WidenColumn {
                drop_check,
                add_check,
                ..
            }] => {
                assert_eq!(drop_check.as_deref(), Some("users_state_check"));
                assert!(add_check.as_ref().unwrap().definition.contains("'online'"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_obsolete_columns_and_indexes_kept_by_default() {
        let rich = Schema::new(vec![users(10)
            .field(Field::new("nickname", FieldType::string(30)).unique())
            .index(IndexDef::new(["age", "name"]))]);
        let live = desired(&rich).tables;
        let lean = Schema::new(vec![users(10)]);

        assert!(plan_against(&lean, &live, MigrateOptions::default()).is_empty());

        let plan = plan_against(
            &lean,
            &live,
            MigrateOptions::default()
                .with_drop_column(true)
                .with_drop_index(true),
        );
        assert_eq!(kinds(&plan), vec!["drop_index", "drop_index", "drop_column"]);
        assert_eq!(plan.destructive_count(), 3);
    }

    #[test]
    fn test_rename_precedes_widen() {
        let old = Schema::new(vec![EntityType::new("User").field(Field::new("title", FieldType::string(10)))]);
        let live = desired(&old).tables;
        let new = Schema::new(vec![EntityType::new("User")
            .field(Field::new("name", FieldType::string(20)).renamed_from("title"))]);

        let plan = plan_against(&new, &live, MigrateOptions::default().with_drop_column(true));
        assert_eq!(kinds(&plan), vec!["rename_column", "widen_column"]);
        match &plan.operations[0] {
            Operation::RenameColumn { from, to, .. } => {
                assert_eq!(from, "title");
                assert_eq!(to, "name");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_rename_already_applied_is_noop() {
        let schema = Schema::new(vec![EntityType::new("User")
            .field(Field::new("name", FieldType::string(10)).renamed_from("title"))]);
        let live = desired(&schema).tables;
        assert!(plan_against(&schema, &live, MigrateOptions::default()).is_empty());
    }

    #[test]
    fn test_relaxing_nullability_widens_and_tightening_conflicts() {
        let strict = Schema::new(vec![EntityType::new("User").field(Field::new("age", FieldType::Int32))]);
        let loose = Schema::new(vec![
            EntityType::new("User").field(Field::new("age", FieldType::Int32).nullable())
        ]);

        let plan = plan_against(&loose, &desired(&strict).tables, MigrateOptions::default());
        assert_eq!(kinds(&plan), vec!["widen_column"]);

        let err = plan_fn_err(&strict, &desired(&loose).tables);
        assert!(err.to_string().contains("NOT NULL"));
    }

    fn plan_fn_err(schema: &Schema, live: &[Table]) -> MigrateError {
        plan(&PostgresDialect::new(), &desired(schema), live, &MigrateOptions::default()).unwrap_err()
    }

    #[test]
    fn test_default_change() {
        let before = Schema::new(vec![EntityType::new("User").field(
            Field::new("country", FieldType::string(3)).default_value(DefaultValue::String("SWE".into())),
        )]);
        let after = Schema::new(vec![EntityType::new("User").field(
            Field::new("country", FieldType::string(3)).default_value(DefaultValue::String("NOR".into())),
        )]);

        let mut live = desired(&before).tables;
        // catalog form of the same default
        live[0].columns[1].default = Some("'SWE'::character varying".into());
        assert!(plan_against(&before, &live, MigrateOptions::default()).is_empty());

        let plan = plan_against(&after, &live, MigrateOptions::default());
        assert_eq!(kinds(&plan), vec!["change_default"]);
    }

    #[test]
    fn test_new_column_with_check_and_new_foreign_key() {
        let before = Schema::new(vec![
            EntityType::new("User"),
            EntityType::new("Pet"),
        ]);
        let after = Schema::new(vec![
            EntityType::new("User").field(Field::new("age", FieldType::Uint16)),
            EntityType::new("Pet").reference(Reference::new("owner_id", "User")),
        ]);
        let plan = plan_against(&after, &desired(&before).tables, MigrateOptions::default());
        assert_eq!(kinds(&plan), vec!["add_column", "add_column", "add_foreign_key"]);
        match &plan.operations[0] {
            Operation::AddColumn { column, check, .. } => {
                assert_eq!(column.name, "age");
                assert_eq!(check.as_ref().unwrap().name, "users_age_check");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_reference_cycle_creates_tables_then_keys() {
        let schema = Schema::new(vec![
            EntityType::new("User").reference(Reference::new("best_friend_id", "Pet")),
            EntityType::new("Pet").reference(Reference::new("owner_id", "User")),
        ]);
        let plan = plan_against(&schema, &[], MigrateOptions::default());
        assert_eq!(
            kinds(&plan),
            vec!["create_table", "create_table", "add_foreign_key", "add_foreign_key"]
        );
    }

    #[test]
    fn test_redefined_index_requires_drop_index() {
        let before = Schema::new(vec![users(10).index(IndexDef::new(["age"]).named("users_lookup"))]);
        let after = Schema::new(vec![users(10).index(IndexDef::new(["name"]).named("users_lookup"))]);
        let live = desired(&before).tables;

        assert!(plan_fn_err(&after, &live).to_string().contains("users_lookup"));

        let plan = plan_against(&after, &live, MigrateOptions::default().with_drop_index(true));
        assert_eq!(kinds(&plan), vec!["drop_index", "add_index"]);
    }

    #[test]
    fn test_rename_keeps_named_index() {
        let old = Schema::new(vec![EntityType::new("User")
            .field(Field::new("title", FieldType::string(10)))
            .index(IndexDef::new(["title"]).named("users_lookup"))]);
        let new = Schema::new(vec![EntityType::new("User")
            .field(Field::new("name", FieldType::string(10)).renamed_from("title"))
            .index(IndexDef::new(["name"]).named("users_lookup"))]);
        let live = desired(&old).tables;

        let plan = plan_against(&new, &live, MigrateOptions::default());
        assert_eq!(kinds(&plan), vec!["rename_column"]);

        let plan = plan_against(&new, &live, MigrateOptions::default().with_drop_index(true));
        assert_eq!(kinds(&plan), vec!["rename_column"]);
    }

    #[test]
    fn test_drop_column_carries_covering_indexes() {
        let rich = Schema::new(vec![users(10)
            .field(Field::new("nickname", FieldType::string(30)).unique())
            .index(IndexDef::new(["age", "name"]))]);
        let live = desired(&rich).tables;
        let lean = Schema::new(vec![users(10).index(IndexDef::new(["age", "name"]))]);

        let plan = plan_against(&lean, &live, MigrateOptions::default().with_drop_column(true));
        match plan.operations.as_slice() {
            [Operation::DropColumn { column, indexes, .. }] => {
                assert_eq!(column, "nickname");
                assert_eq!(indexes, &vec!["users_nickname_key".to_string()]);
            }
            other => panic!("unexpected {:?}", other),
        }

        // an index already dropped by drop_index is not dropped twice
        let plan = plan_against(
            &Schema::new(vec![users(10)]),
            &live,
            MigrateOptions::default()
                .with_drop_column(true)
                .with_drop_index(true),
        );
        let drops: Vec<&Vec<String>> = plan
            .operations
            .iter()
            .filter_map(|op| match op {
                Operation::DropColumn { indexes, .. } => Some(indexes),
                _ => None,
            })
            .collect();
        assert_eq!(drops.len(), 1);
        assert!(drops[0].is_empty());
    }

    #[test]
    fn test_inline_foreign_keys_stay_in_create_table() {
        let schema = Schema::new(vec![
            EntityType::new("Pet").reference(Reference::new("owner_id", "User")),
            EntityType::new("User"),
        ]);
        let plan = plan(
            &SqliteDialect::new(),
            &DesiredSchema::build(&SqliteDialect::new(), &schema).unwrap(),
            &[],
            &MigrateOptions::default(),
        )
        .unwrap();
        assert_eq!(kinds(&plan), vec!["create_table", "create_table"]);
        match &plan.operations[1] {
            Operation::CreateTable { table } => assert_eq!(table.foreign_keys.len(), 1),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_unsupported_operation_is_conflict() {
        let dialect = SqliteDialect::new();
        let before = Schema::new(vec![EntityType::new("User").field(
            Field::new("country", FieldType::string(3)).default_value(DefaultValue::String("SWE".into())),
        )]);
        let after = Schema::new(vec![EntityType::new("User").field(
            Field::new("country", FieldType::string(3)).default_value(DefaultValue::String("NOR".into())),
        )]);
        let live = DesiredSchema::build(&dialect, &before).unwrap().tables;
        let err = plan(
            &dialect,
            &DesiredSchema::build(&dialect, &after).unwrap(),
            &live,
            &MigrateOptions::default(),
        )
        .unwrap_err();
        match err {
            MigrateError::SchemaConflict { table, reason, .. } => {
                assert_eq!(table, "users");
                assert!(reason.starts_with("set default users.country"), "{}", reason);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_dependency_order_is_stable() {
        let tables = desired(&Schema::new(vec![
            EntityType::new("Car").reference(Reference::new("owner_id", "User")),
            EntityType::new("Group"),
            EntityType::new("User"),
        ]))
        .tables;
        let order: Vec<&str> = dependency_order(&tables).iter().map(|t| t.name.as_str()).collect();
        assert_eq!(order, vec!["groups", "users", "cars"]);
    }
}
