//! PostgreSQL dialect.
//!
//! Columns use catalog `udt_name`s (`int2`, `int8`, `varchar`, ...) so desired
//! and inspected columns compare without aliasing. PostgreSQL has no unsigned
//! integers and no inline enums here: both are emulated with check constraints.

use crate::config::DialectKind;
use crate::core::entity::{DefaultValue, FieldType};
use crate::core::identifier::{quote_literal, quote_pg};
use crate::core::schema::{Column, Table};
use crate::core::traits::Dialect;
use crate::dialect::check::CheckKind;
use crate::dialect::typemap::{column, Emulation, TypeClass, TypeMapping};
use crate::drivers::common::ddl::{add_check, add_foreign_key, create_index, literal_list};
use crate::plan::Operation;

/// Longest `varchar(n)` PostgreSQL accepts.
const MAX_VARCHAR: u64 = 10_485_760;

/// Largest value a `bytea` can hold.
const MAX_BYTEA: u64 = 1_073_741_823;

/// PostgreSQL dialect implementation.
#[derive(Debug, Clone, Default)]
pub struct PostgresDialect;

impl PostgresDialect {
    pub fn new() -> Self {
        Self
    }

    fn column_def(&self, col: &Column, identity_start: Option<i64>) -> String {
        let mut def = format!("{} {}", self.quote_ident(&col.name), self.column_type_sql(col));
        if col.is_identity {
            def.push_str(" GENERATED BY DEFAULT AS IDENTITY");
            if let Some(start) = identity_start {
                def.push_str(&format!(" (START WITH {})", start));
            }
        }
        if !col.is_nullable {
            def.push_str(" NOT NULL");
        }
        if let Some(default) = &col.default {
            def.push_str(&format!(" DEFAULT {}", default));
        }
        def
    }

    fn create_table(&self, schema: &str, table: &Table) -> Vec<String> {
        let mut parts: Vec<String> = table
            .columns
            .iter()
            .map(|c| self.column_def(c, table.identity_start))
            .collect();
        if let Some(id) = table.identity_column() {
            parts.push(format!(
                "CONSTRAINT {} PRIMARY KEY ({})",
                self.quote_ident(&format!("{}_pkey", table.name)),
                self.quote_ident(&id.name)
            ));
        }
        for check in &table.check_constraints {
            parts.push(format!(
                "CONSTRAINT {} CHECK ({})",
                self.quote_ident(&check.name),
                check.definition
            ));
        }

        let mut stmts = vec![format!(
            "CREATE TABLE {} (\n    {}\n)",
            self.qualify(schema, &table.name),
            parts.join(",\n    ")
        )];
        stmts.extend(
            table
                .indexes
                .iter()
                .map(|idx| create_index(self, schema, &table.name, idx)),
        );
        stmts
    }

    fn drop_constraint(&self, schema: &str, table: &str, name: &str) -> String {
        format!(
            "ALTER TABLE {} DROP CONSTRAINT IF EXISTS {}",
            self.qualify(schema, table),
            self.quote_ident(name)
        )
    }
}

impl Dialect for PostgresDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Postgres
    }

    fn name(&self) -> &str {
        "postgres"
    }

    fn quote_ident(&self, name: &str) -> String {
        quote_pg(name)
    }

    fn param_placeholder(&self, index: usize) -> String {
        format!("${}", index)
    }

    fn max_identifier_len(&self) -> usize {
        63
    }

    fn supports_transactional_ddl(&self) -> bool {
        true
    }

    fn map_field(&self, field_type: &FieldType) -> Result<TypeMapping, String> {
        let non_negative = |data_type: &str, emulation| {
            TypeMapping::emulated(column(data_type, 0), CheckKind::NonNegative, emulation)
        };

        Ok(match field_type {
            FieldType::Int8 | FieldType::Int16 => TypeMapping::native(column("int2", 0)),
            FieldType::Int32 => TypeMapping::native(column("int4", 0)),
            FieldType::Int64 => TypeMapping::native(column("int8", 0)),
            FieldType::Uint8 => non_negative("int2", Emulation::UnsignedWidened),
            FieldType::Uint16 => non_negative("int4", Emulation::UnsignedWidened),
            FieldType::Uint32 => non_negative("int8", Emulation::UnsignedWidened),
            FieldType::Uint64 => non_negative("int8", Emulation::UnsignedChecked)
                .with_warning("uint64 stored as int8: values above 9223372036854775807 are rejected"),
            FieldType::String { max_len: Some(n) } if u64::from(*n) <= MAX_VARCHAR => {
                TypeMapping::native(column("varchar", i64::from(*n)))
            }
            FieldType::String { max_len: Some(n) } => TypeMapping::emulated(
                column("text", 0),
                CheckKind::MaxLen(u64::from(*n)),
                Emulation::LengthChecked,
            ),
            FieldType::String { max_len: None } => TypeMapping::native(column("text", 0)),
            FieldType::Bytes { max_size: Some(n) } if *n > MAX_BYTEA => {
                return Err(format!("bytea holds at most {} bytes, got {}", MAX_BYTEA, n));
            }
            FieldType::Bytes { max_size: Some(n) } => TypeMapping::emulated(
                column("bytea", 0),
                CheckKind::MaxLen(*n),
                Emulation::LengthChecked,
            ),
            FieldType::Bytes { max_size: None } => TypeMapping::native(column("bytea", 0)),
            FieldType::Enum { values } => TypeMapping::emulated(
                column("varchar", 0),
                CheckKind::one_of(values.iter().cloned()),
                Emulation::EnumChecked,
            ),
            FieldType::Time => TypeMapping::native(column("timestamptz", 0)),
            FieldType::Bool => TypeMapping::native(column("bool", 0)),
        })
    }

    fn id_column(&self) -> Column {
        Column {
            name: crate::core::ID_COLUMN.to_string(),
            data_type: "int8".to_string(),
            is_identity: true,
            ..Default::default()
        }
    }

    fn column_type_sql(&self, column: &Column) -> String {
        match column.data_type.as_str() {
            "varchar" | "bpchar" if column.max_length > 0 => {
                format!("{}({})", column.data_type, column.max_length)
            }
            other => other.to_string(),
        }
    }

    fn base_class(&self, column: &Column) -> TypeClass {
        match column.data_type.as_str() {
            "int2" | "smallint" => TypeClass::integer(16, true),
            "int4" | "integer" | "int" => TypeClass::integer(32, true),
            "int8" | "bigint" => TypeClass::integer(64, true),
            "varchar" | "bpchar" | "text" => TypeClass::text(column.max_length),
            "bytea" => TypeClass::binary(column.max_length),
            "timestamptz" | "timestamp" => TypeClass::Timestamp,
            "bool" | "boolean" => TypeClass::Bool,
            other => TypeClass::Other(other.to_string()),
        }
    }

    fn can_index(&self, _column: &Column) -> bool {
        true
    }

    fn check_sql(&self, column: &Column, check: &CheckKind) -> String {
        let col = self.quote_ident(&column.name);
        match check {
            CheckKind::NonNegative => format!("{} >= 0", col),
            CheckKind::MaxLen(n) if column.data_type == "bytea" => {
                format!("octet_length({}) <= {}", col, n)
            }
            CheckKind::MaxLen(n) => format!("char_length({}) <= {}", col, n),
            CheckKind::OneOf(values) => format!("{} IN ({})", col, literal_list(values, "")),
        }
    }

    fn default_sql(&self, value: &DefaultValue, column: &Column) -> String {
        match value {
            DefaultValue::Bool(b) => b.to_string(),
            DefaultValue::Int(i) => i.to_string(),
            DefaultValue::String(s) if column.data_type == "timestamptz" => s.clone(),
            DefaultValue::String(s) => quote_literal(s),
        }
    }

    fn render(&self, schema: &str, op: &Operation) -> Vec<String> {
        match op {
            Operation::CreateTable { table } => self.create_table(schema, table),
            Operation::AddColumn {
                table,
                column,
                check,
            } => {
                let mut stmts = vec![format!(
                    "ALTER TABLE {} ADD COLUMN {}",
                    self.qualify(schema, table),
                    self.column_def(column, None)
                )];
                if let Some(check) = check {
                    stmts.push(add_check(self, schema, table, &check.name, &check.definition));
                }
                stmts
            }
            Operation::RenameColumn {
                table,
                from,
                to,
                check,
            } => {
                let mut stmts = Vec::new();
                if let Some(c) = check {
                    stmts.push(self.drop_constraint(schema, table, &c.from));
                }
                stmts.push(format!(
                    "ALTER TABLE {} RENAME COLUMN {} TO {}",
                    self.qualify(schema, table),
                    self.quote_ident(from),
                    self.quote_ident(to)
                ));
                if let Some(c) = check {
                    stmts.push(add_check(self, schema, table, &c.to.name, &c.to.definition));
                }
                stmts
            }
            Operation::WidenColumn {
                table,
                from,
                to,
                drop_check,
                add_check: check,
                ..
            } => {
                let qualified = self.qualify(schema, table);
                let col = self.quote_ident(&to.name);
                let mut stmts = Vec::new();
                if let Some(name) = drop_check {
                    stmts.push(self.drop_constraint(schema, table, name));
                }
                let ty = self.column_type_sql(to);
                if self.column_type_sql(from) != ty {
                    stmts.push(format!(
                        "ALTER TABLE {} ALTER COLUMN {} TYPE {} USING {}::{}",
                        qualified, col, ty, col, ty
                    ));
                }
                if to.is_nullable && !from.is_nullable {
                    stmts.push(format!(
                        "ALTER TABLE {} ALTER COLUMN {} DROP NOT NULL",
                        qualified, col
                    ));
                }
                if let Some(c) = check {
                    stmts.push(add_check(self, schema, table, &c.name, &c.definition));
                }
                stmts
            }
            Operation::ChangeDefault { table, column } => {
                let action = match &column.default {
                    Some(d) => format!("SET DEFAULT {}", d),
                    None => "DROP DEFAULT".to_string(),
                };
                vec![format!(
                    "ALTER TABLE {} ALTER COLUMN {} {}",
                    self.qualify(schema, table),
                    self.quote_ident(&column.name),
                    action
                )]
            }
            Operation::DropColumn {
                table,
                column,
                indexes,
                ..
            } => {
                let mut stmts: Vec<String> = indexes
                    .iter()
                    .map(|index| format!("DROP INDEX IF EXISTS {}", self.qualify(schema, index)))
                    .collect();
                stmts.push(format!(
                    "ALTER TABLE {} DROP COLUMN {}",
                    self.qualify(schema, table),
                    self.quote_ident(column)
                ));
                stmts
            }
            Operation::AddIndex { table, index } => vec![create_index(self, schema, table, index)],
            Operation::DropIndex { index, .. } => {
                vec![format!("DROP INDEX {}", self.qualify(schema, index))]
            }
            Operation::AddForeignKey { table, foreign_key } => {
                vec![add_foreign_key(self, schema, table, foreign_key)]
            }
        }
    }

    fn equal_fold(&self, column: &str, param: usize) -> String {
        format!(
            "lower({}) = lower({})",
            self.quote_ident(column),
            self.param_placeholder(param)
        )
    }

    fn contains_fold(&self, column: &str, param: usize) -> String {
        format!(
            "{} ILIKE {}",
            self.quote_ident(column),
            self.param_placeholder(param)
        )
    }
}
