//! SQL Server dialect.
//!
//! SQL Server names default constraints itself unless told otherwise and refuses
//! to alter a column while a default, check or index depends on it. Defaults are
//! therefore created as `DF_{table}_{column}`, dropped by catalog lookup, and a
//! widen rebuilds every dependent object around the `ALTER COLUMN`.

use crate::config::DialectKind;
use crate::core::entity::{DefaultValue, FieldType};
use crate::core::identifier::{quote_literal, quote_mssql};
use crate::core::schema::{Column, Table};
use crate::core::traits::Dialect;
use crate::dialect::check::CheckKind;
use crate::dialect::predicate::escape_like;
use crate::dialect::typemap::{column, Emulation, TypeClass, TypeMapping};
use crate::drivers::common::ddl::{add_check, add_foreign_key, create_index, literal_list};
use crate::plan::Operation;

/// Longest bounded `nvarchar(n)`.
const MAX_NVARCHAR: u64 = 4_000;

/// Longest bounded `varbinary(n)`.
const MAX_VARBINARY: u64 = 8_000;

/// Capacity of `nvarchar(max)` in characters.
const MAX_NVARCHAR_MAX: u64 = 1_073_741_823;

/// Capacity of `varbinary(max)` in bytes.
const MAX_VARBINARY_MAX: u64 = 2_147_483_647;

/// SQL Server dialect implementation.
#[derive(Debug, Clone, Default)]
pub struct MssqlDialect;

impl MssqlDialect {
    pub fn new() -> Self {
        Self
    }

    fn default_name(table: &str, column: &str) -> String {
        format!("DF_{}_{}", table, column)
    }

    /// Column definition without the default, which is a named constraint here.
    fn column_def(&self, col: &Column, identity_start: Option<i64>) -> String {
        let mut def = format!("{} {}", self.quote_ident(&col.name), self.column_type_sql(col));
        if col.is_identity {
            def.push_str(&format!(" IDENTITY({},1)", identity_start.unwrap_or(1)));
        }
        def.push_str(if col.is_nullable { " NULL" } else { " NOT NULL" });
        def
    }

    fn inline_default(&self, table: &str, col: &Column) -> String {
        match &col.default {
            Some(d) => format!(
                " CONSTRAINT {} DEFAULT {}",
                self.quote_ident(&Self::default_name(table, &col.name)),
                d
            ),
            None => String::new(),
        }
    }

    fn create_table(&self, schema: &str, table: &Table) -> Vec<String> {
        let mut parts: Vec<String> = table
            .columns
            .iter()
            .map(|c| {
                format!(
                    "{}{}",
                    self.column_def(c, table.identity_start),
                    self.inline_default(&table.name, c)
                )
            })
            .collect();
        if let Some(id) = table.identity_column() {
            parts.push(format!(
                "CONSTRAINT {} PRIMARY KEY ({})",
                self.quote_ident(&format!("PK_{}", table.name)),
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

    /// Drop whatever default constraint is bound to the column, whatever its name.
    fn drop_default(&self, schema: &str, table: &str, column: &str) -> String {
        let qualified = self.qualify(schema, table);
        format!(
            "DECLARE @df sysname; \
             SELECT @df = dc.name FROM sys.default_constraints dc \
             JOIN sys.columns c ON c.object_id = dc.parent_object_id AND c.column_id = dc.parent_column_id \
             WHERE dc.parent_object_id = OBJECT_ID(N{}) AND c.name = N{}; \
             IF @df IS NOT NULL EXEC(N{} + QUOTENAME(@df));",
            quote_literal(&qualified),
            quote_literal(column),
            quote_literal(&format!("ALTER TABLE {} DROP CONSTRAINT ", qualified))
        )
    }

    fn add_default(&self, schema: &str, table: &str, col: &Column) -> Option<String> {
        col.default.as_ref().map(|d| {
            format!(
                "ALTER TABLE {} ADD CONSTRAINT {} DEFAULT {} FOR {}",
                self.qualify(schema, table),
                self.quote_ident(&Self::default_name(table, &col.name)),
                d,
                self.quote_ident(&col.name)
            )
        })
    }

    fn drop_index(&self, schema: &str, table: &str, index: &str) -> String {
        format!(
            "DROP INDEX {} ON {}",
            self.quote_ident(index),
            self.qualify(schema, table)
        )
    }
}

impl Dialect for MssqlDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Mssql
    }

    fn name(&self) -> &str {
        "mssql"
    }

    fn quote_ident(&self, name: &str) -> String {
        quote_mssql(name)
    }

    fn param_placeholder(&self, index: usize) -> String {
        format!("@P{}", index)
    }

    fn max_identifier_len(&self) -> usize {
        128
    }

    fn supports_transactional_ddl(&self) -> bool {
        true
    }

    fn map_field(&self, field_type: &FieldType) -> Result<TypeMapping, String> {
        let non_negative = |data_type: &str, emulation| {
            TypeMapping::emulated(column(data_type, 0), CheckKind::NonNegative, emulation)
        };

        Ok(match field_type {
            FieldType::Int8 | FieldType::Int16 => TypeMapping::native(column("smallint", 0)),
            FieldType::Int32 => TypeMapping::native(column("int", 0)),
            FieldType::Int64 => TypeMapping::native(column("bigint", 0)),
            FieldType::Uint8 => TypeMapping::native(column("tinyint", 0)),
            FieldType::Uint16 => non_negative("int", Emulation::UnsignedWidened),
            FieldType::Uint32 => non_negative("bigint", Emulation::UnsignedWidened),
            FieldType::Uint64 => non_negative("bigint", Emulation::UnsignedChecked)
                .with_warning("uint64 stored as bigint: values above 9223372036854775807 are rejected"),
            FieldType::String { max_len: Some(n) } => {
                let n = u64::from(*n);
                if n <= MAX_NVARCHAR {
                    TypeMapping::native(column("nvarchar", n as i64))
                } else if n <= MAX_NVARCHAR_MAX {
                    TypeMapping::emulated(
                        column("nvarchar", -1),
                        CheckKind::MaxLen(n),
                        Emulation::LengthChecked,
                    )
                } else {
                    return Err(format!(
                        "nvarchar(max) holds at most {} characters, got {}",
                        MAX_NVARCHAR_MAX, n
                    ));
                }
            }
            FieldType::String { max_len: None } => TypeMapping::native(column("nvarchar", -1)),
            FieldType::Bytes { max_size: Some(n) } if *n <= MAX_VARBINARY => {
                TypeMapping::native(column("varbinary", *n as i64))
            }
            FieldType::Bytes { max_size: Some(n) } if *n <= MAX_VARBINARY_MAX => {
                TypeMapping::emulated(
                    column("varbinary", -1),
                    CheckKind::MaxLen(*n),
                    Emulation::LengthChecked,
                )
            }
            FieldType::Bytes { max_size: Some(n) } => {
                return Err(format!(
                    "varbinary(max) holds at most {} bytes, got {}",
                    MAX_VARBINARY_MAX, n
                ));
            }
            FieldType::Bytes { max_size: None } => TypeMapping::native(column("varbinary", -1)),
            FieldType::Enum { values } => {
                let longest = values.iter().map(|v| v.chars().count()).max().unwrap_or(0) as u64;
                let len = longest.max(255);
                let len = if len > MAX_NVARCHAR { -1 } else { len as i64 };
                TypeMapping::emulated(
                    column("nvarchar", len),
                    CheckKind::one_of(values.iter().cloned()),
                    Emulation::EnumChecked,
                )
            }
            FieldType::Time => TypeMapping::native(column("datetime2", 0)),
            FieldType::Bool => TypeMapping::native(column("bit", 0)),
        })
    }

    fn id_column(&self) -> Column {
        Column {
            name: crate::core::ID_COLUMN.to_string(),
            data_type: "bigint".to_string(),
            is_identity: true,
            ..Default::default()
        }
    }

    fn column_type_sql(&self, column: &Column) -> String {
        match column.data_type.as_str() {
            "nvarchar" | "varchar" | "nchar" | "char" | "varbinary" | "binary" => {
                match column.max_length {
                    -1 => format!("{}(max)", column.data_type),
                    n if n > 0 => format!("{}({})", column.data_type, n),
                    _ => column.data_type.clone(),
                }
            }
            other => other.to_string(),
        }
    }

    fn base_class(&self, column: &Column) -> TypeClass {
        match column.data_type.as_str() {
            "tinyint" => TypeClass::integer(8, false),
            "smallint" => TypeClass::integer(16, true),
            "int" => TypeClass::integer(32, true),
            "bigint" => TypeClass::integer(64, true),
            "nvarchar" | "varchar" | "nchar" | "char" | "ntext" | "text" => {
                TypeClass::text(column.max_length)
            }
            "varbinary" | "binary" | "image" => TypeClass::binary(column.max_length),
            "datetime2" | "datetime" | "datetimeoffset" => TypeClass::Timestamp,
            "bit" => TypeClass::Bool,
            other => TypeClass::Other(other.to_string()),
        }
    }

    fn can_index(&self, column: &Column) -> bool {
        column.max_length != -1 && !matches!(column.data_type.as_str(), "ntext" | "text" | "image")
    }

    fn check_sql(&self, column: &Column, check: &CheckKind) -> String {
        let col = self.quote_ident(&column.name);
        match check {
            CheckKind::NonNegative => format!("{} >= 0", col),
            CheckKind::MaxLen(n) if column.data_type == "varbinary" => {
                format!("DATALENGTH({}) <= {}", col, n)
            }
            CheckKind::MaxLen(n) => format!("LEN({}) <= {}", col, n),
            CheckKind::OneOf(values) => format!("{} IN ({})", col, literal_list(values, "N")),
        }
    }

    fn default_sql(&self, value: &DefaultValue, column: &Column) -> String {
        match value {
            DefaultValue::Bool(b) => if *b { "1" } else { "0" }.to_string(),
            DefaultValue::Int(i) => i.to_string(),
            DefaultValue::String(s) if column.data_type == "datetime2" => s.clone(),
            DefaultValue::String(s) => format!("N{}", quote_literal(s)),
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
                    "ALTER TABLE {} ADD {}{}",
                    self.qualify(schema, table),
                    self.column_def(column, None),
                    self.inline_default(table, column)
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
                    "EXEC sp_rename N{}, N{}, N'COLUMN'",
                    quote_literal(&format!("{}.{}.{}", schema, table, from)),
                    quote_literal(to)
                ));
                if let Some(c) = check {
                    stmts.push(add_check(self, schema, table, &c.to.name, &c.to.definition));
                }
                stmts
            }
            Operation::WidenColumn {
                table,
                to,
                drop_check,
                add_check: check,
                indexes,
                ..
            } => {
                let mut stmts = Vec::new();
                if let Some(name) = drop_check {
                    stmts.push(self.drop_constraint(schema, table, name));
                }
                stmts.push(self.drop_default(schema, table, &to.name));
                for idx in indexes {
                    stmts.push(self.drop_index(schema, table, &idx.name));
                }
                stmts.push(format!(
                    "ALTER TABLE {} ALTER COLUMN {}",
                    self.qualify(schema, table),
                    self.column_def(to, None)
                ));
                stmts.extend(self.add_default(schema, table, to));
                for idx in indexes {
                    stmts.push(create_index(self, schema, table, idx));
                }
                if let Some(c) = check {
                    stmts.push(add_check(self, schema, table, &c.name, &c.definition));
                }
                stmts
            }
            Operation::ChangeDefault { table, column } => {
                let mut stmts = vec![self.drop_default(schema, table, &column.name)];
                stmts.extend(self.add_default(schema, table, column));
                stmts
            }
            Operation::DropColumn {
                table,
                column,
                check,
                indexes,
            } => {
                let mut stmts = Vec::new();
                if let Some(name) = check {
                    stmts.push(self.drop_constraint(schema, table, name));
                }
                for index in indexes {
                    stmts.push(self.drop_index(schema, table, index));
                }
                stmts.push(self.drop_default(schema, table, column));
                stmts.push(format!(
                    "ALTER TABLE {} DROP COLUMN {}",
                    self.qualify(schema, table),
                    self.quote_ident(column)
                ));
                stmts
            }
            Operation::AddIndex { table, index } => vec![create_index(self, schema, table, index)],
            Operation::DropIndex { table, index } => vec![self.drop_index(schema, table, index)],
            Operation::AddForeignKey { table, foreign_key } => {
                vec![add_foreign_key(self, schema, table, foreign_key)]
            }
        }
    }

    fn equal_fold(&self, column: &str, param: usize) -> String {
        format!(
            "{} COLLATE Latin1_General_CI_AS = {}",
            self.quote_ident(column),
            self.param_placeholder(param)
        )
    }

    fn contains_fold(&self, column: &str, param: usize) -> String {
        format!(
            "{} COLLATE Latin1_General_CI_AS LIKE {} ESCAPE '\\'",
            self.quote_ident(column),
            self.param_placeholder(param)
        )
    }

    /// `[` opens a character class in T-SQL LIKE patterns, so it is escaped too.
    fn contains_pattern(&self, value: &str) -> String {
        format!("%{}%", escape_like(value).replace('[', "\\["))
    }
}
