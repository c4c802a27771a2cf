//! In-memory database for planner and migrator tests.
//!
//! Applies [`Operation`]s directly to the [`Table`] model, so a second
//! inspection sees exactly what was applied.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::core::schema::Table;
use crate::core::traits::{DdlSession, PlanExecutor, SchemaInspector};
use crate::drivers::Backend;
use crate::error::{MigrateError, Result};
use crate::plan::{Operation, RenderedOperation};

#[derive(Default)]
struct State {
    tables: BTreeMap<String, Table>,
    applied: Vec<String>,
}

#[derive(Clone)]
pub struct MemoryDatabase {
    state: Arc<Mutex<State>>,
    transactional: bool,
    fail_at: Option<usize>,
    cancel_after: Option<(usize, CancellationToken)>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            transactional: true,
            fail_at: None,
            cancel_after: None,
        }
    }

    /// Seed a table as if it already existed.
    pub fn with_table(self, table: Table) -> Self {
        self.state
            .lock()
            .unwrap()
            .tables
            .insert(table.name.clone(), table);
        self
    }

    pub fn non_transactional(mut self) -> Self {
        self.transactional = false;
        self
    }

    /// Fail the operation at zero-based position `n` of every session.
    pub fn fail_at(mut self, n: usize) -> Self {
        self.fail_at = Some(n);
        self
    }

    /// Cancel `token` once `n` operations have been applied.
    pub fn cancel_after(mut self, n: usize, token: CancellationToken) -> Self {
        self.cancel_after = Some((n, token));
        self
    }

    pub fn backend(&self) -> Backend {
        Backend {
            inspector: Box::new(self.clone()),
            executor: Box::new(self.clone()),
        }
    }

    pub fn table(&self, name: &str) -> Option<Table> {
        self.state.lock().unwrap().tables.get(name).cloned()
    }

    pub fn table_names(&self) -> Vec<String> {
        self.state.lock().unwrap().tables.keys().cloned().collect()
    }

    /// Descriptions of every committed operation.
    pub fn applied(&self) -> Vec<String> {
        self.state.lock().unwrap().applied.clone()
    }

    /// Value the identity column hands out next.
    pub fn next_id(&self, table: &str) -> Option<i64> {
        let table = self.table(table)?;
        table.identity_column()?;
        Some(table.identity_start.unwrap_or(1))
    }
}

#[async_trait]
impl SchemaInspector for MemoryDatabase {
    fn namespace(&self) -> &str {
        "public"
    }

    async fn inspect(&self, tables: &[String]) -> Result<Vec<Table>> {
        let state = self.state.lock().unwrap();
        Ok(tables
            .iter()
            .filter_map(|name| state.tables.get(name).cloned())
            .collect())
    }

    async fn identity_starts(&self) -> Result<BTreeMap<String, i64>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .tables
            .values()
            .filter(|t| t.identity_column().is_some())
            .map(|t| (t.name.clone(), t.identity_start.unwrap_or(1)))
            .collect())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl PlanExecutor for MemoryDatabase {
    fn transactional(&self) -> bool {
        self.transactional
    }

    async fn session(&self) -> Result<Box<dyn DdlSession>> {
        Ok(Box::new(MemorySession {
            db: self.clone(),
            staged: None,
            count: 0,
        }))
    }
}

struct MemorySession {
    db: MemoryDatabase,
    /// Uncommitted copy of the tables inside a transaction.
    staged: Option<State>,
    count: usize,
}

#[async_trait]
impl DdlSession for MemorySession {
    async fn begin(&mut self) -> Result<()> {
        let state = self.db.state.lock().unwrap();
        self.staged = Some(State {
            tables: state.tables.clone(),
            applied: state.applied.clone(),
        });
        Ok(())
    }

    async fn execute(&mut self, sql: &str) -> Result<()> {
        Err(MigrateError::Config(format!("in-memory database cannot run SQL: {}", sql)))
    }

    async fn apply(&mut self, op: &RenderedOperation) -> Result<()> {
        let position = self.count;
        self.count += 1;
        if self.db.fail_at == Some(position) {
            return Err(MigrateError::execution(
                op.description.clone(),
                MigrateError::Config("injected failure".into()),
            ));
        }

        match &mut self.staged {
            Some(staged) => apply_to(staged, op)?,
            None => apply_to(&mut self.db.state.lock().unwrap(), op)?,
        }

        if let Some((n, token)) = &self.db.cancel_after {
            if self.count >= *n {
                token.cancel();
            }
        }
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        if let Some(staged) = self.staged.take() {
            *self.db.state.lock().unwrap() = staged;
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.staged = None;
        Ok(())
    }
}

fn apply_to(state: &mut State, op: &RenderedOperation) -> Result<()> {
    let table_name = op.operation.table().to_string();
    if let Operation::CreateTable { table } = &op.operation {
        if state.tables.contains_key(&table.name) {
            return Err(MigrateError::conflict(&table.name, "table already exists"));
        }
        state.tables.insert(table.name.clone(), table.clone());
        state.applied.push(op.description.clone());
        return Ok(());
    }

    let table = state
        .tables
        .get_mut(&table_name)
        .ok_or_else(|| MigrateError::conflict(&table_name, "no such table"))?;

    match &op.operation {
        Operation::CreateTable { .. } => {}
        Operation::AddColumn { column, check, .. } => {
            if table.column(&column.name).is_some() {
                return Err(MigrateError::column_conflict(&table_name, &column.name, "exists"));
            }
            table.columns.push(column.clone());
            table.check_constraints.extend(check.clone());
        }
        Operation::RenameColumn { from, to, check, .. } => {
            let column = table
                .columns
                .iter_mut()
                .find(|c| c.name == *from)
                .ok_or_else(|| MigrateError::column_conflict(&table_name, from, "missing"))?;
            column.name = to.clone();
            for index in &mut table.indexes {
                rename_in(&mut index.columns, from, to);
            }
            for fk in &mut table.foreign_keys {
                rename_in(&mut fk.columns, from, to);
            }
            if let Some(check) = check {
                table.check_constraints.retain(|c| c.name != check.from);
                table.check_constraints.push(check.to.clone());
            }
        }
        Operation::WidenColumn {
            to,
            drop_check,
            add_check,
            ..
        } => {
            let column = table
                .columns
                .iter_mut()
                .find(|c| c.name == to.name)
                .ok_or_else(|| MigrateError::column_conflict(&table_name, &to.name, "missing"))?;
            *column = to.clone();
            if let Some(name) = drop_check {
                table.check_constraints.retain(|c| c.name != *name);
            }
            table.check_constraints.extend(add_check.clone());
        }
        Operation::ChangeDefault { column, .. } => {
            let live = table
                .columns
                .iter_mut()
                .find(|c| c.name == column.name)
                .ok_or_else(|| MigrateError::column_conflict(&table_name, &column.name, "missing"))?;
            live.default = column.default.clone();
        }
        Operation::DropColumn { column, check, .. } => {
            table.columns.retain(|c| c.name != *column);
            if let Some(name) = check {
                table.check_constraints.retain(|c| c.name != *name);
            }
            table.indexes.retain(|i| !i.columns.contains(column));
        }
        Operation::AddIndex { index, .. } => {
            if table.index(&index.name).is_some() {
                return Err(MigrateError::conflict(&table_name, "index exists"));
            }
            table.indexes.push(index.clone());
        }
        Operation::DropIndex { index, .. } => table.indexes.retain(|i| i.name != *index),
        Operation::AddForeignKey { foreign_key, .. } => table.foreign_keys.push(foreign_key.clone()),
    }
    state.applied.push(op.description.clone());
    Ok(())
}

fn rename_in(columns: &mut [String], from: &str, to: &str) {
    for c in columns.iter_mut() {
        if c == from {
            *c = to.to_string();
        }
    }
}
