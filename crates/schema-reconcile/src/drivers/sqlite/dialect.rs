//! SQLite dialect.
//!
//! SQLite types are affinities: declared lengths are not enforced and every
//! integer width shares one 64-bit storage class. Bounded strings and blobs,
//! unsigned integers and enumerations are all guarded by column checks.
//!
//! Checks are declared on the column itself. `ALTER TABLE RENAME COLUMN`
//! rewrites them in place and `DROP COLUMN` accepts them, so neither needs
//! to touch the constraint.

use crate::config::DialectKind;
use crate::core::entity::{DefaultValue, FieldType};
use crate::core::identifier::{check_name, quote_literal, quote_pg};
use crate::core::schema::{CheckConstraint, Column, ForeignKey, Table};
use crate::core::traits::Dialect;
use crate::dialect::check::CheckKind;
use crate::dialect::typemap::{column, Emulation, TypeClass, TypeMapping};
use crate::drivers::common::ddl::{column_list, literal_list};
use crate::plan::Operation;

/// Bound applied to strings and blobs; SQLite's default `SQLITE_MAX_LENGTH`.
const MAX_LENGTH: u64 = 1_000_000_000;

/// Bookkeeping table behind `AUTOINCREMENT`.
pub(super) const SEQUENCE_TABLE: &str = "sqlite_sequence";

/// SQLite dialect implementation.
#[derive(Debug, Clone, Default)]
pub struct SqliteDialect;

impl SqliteDialect {
    pub fn new() -> Self {
        Self
    }

    fn column_def(&self, col: &Column, check: Option<&CheckConstraint>) -> String {
        let mut def = format!("{} {}", self.quote_ident(&col.name), self.column_type_sql(col));
        if col.is_identity {
            def.push_str(" PRIMARY KEY AUTOINCREMENT");
        } else if !col.is_nullable {
            def.push_str(" NOT NULL");
        }
        if let Some(default) = &col.default {
            def.push_str(&format!(" DEFAULT {}", default));
        }
        if let Some(check) = check {
            def.push_str(&format!(
                " CONSTRAINT {} CHECK ({})",
                self.quote_ident(&check.name),
                check.definition
            ));
        }
        def
    }

    fn foreign_key_def(&self, fk: &ForeignKey) -> String {
        format!(
            "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE {}",
            self.quote_ident(&fk.name),
            column_list(self, &fk.columns),
            self.quote_ident(&fk.ref_table),
            column_list(self, &fk.ref_columns),
            fk.on_delete
        )
    }

    fn create_table(&self, schema: &str, table: &Table) -> Vec<String> {
        let mut parts: Vec<String> = table
            .columns
            .iter()
            .map(|c| self.column_def(c, table.check(&check_name(&table.name, &c.name))))
            .collect();
        parts.extend(table.foreign_keys.iter().map(|fk| self.foreign_key_def(fk)));

        let mut stmts = vec![format!(
            "CREATE TABLE {} (\n    {}\n)",
            self.qualify(schema, &table.name),
            parts.join(",\n    ")
        )];
        // AUTOINCREMENT hands out max(seq, max(rowid)) + 1
        if let Some(start) = table.identity_start.filter(|s| *s > 1) {
            stmts.push(format!(
                "INSERT INTO {} (name, seq) VALUES ({}, {})",
                self.qualify(schema, SEQUENCE_TABLE),
                quote_literal(&table.name),
                start - 1
            ));
        }
        for idx in &table.indexes {
            stmts.push(format!(
                "CREATE {}INDEX {} ON {} ({})",
                if idx.is_unique { "UNIQUE " } else { "" },
                self.qualify(schema, &idx.name),
                self.quote_ident(&table.name),
                column_list(self, &idx.columns)
            ));
        }
        stmts
    }
}

impl Dialect for SqliteDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Sqlite
    }

    fn name(&self) -> &str {
        "sqlite"
    }

    fn quote_ident(&self, name: &str) -> String {
        quote_pg(name)
    }

    fn param_placeholder(&self, index: usize) -> String {
        format!("?{}", index)
    }

    /// SQLite imposes no limit.
    fn max_identifier_len(&self) -> usize {
        usize::MAX
    }

    fn supports_transactional_ddl(&self) -> bool {
        true
    }

    fn map_field(&self, field_type: &FieldType) -> Result<TypeMapping, String> {
        let bounded = |data_type: &str, n: u64, what: &str| {
            if n > MAX_LENGTH {
                return Err(format!("{} are limited to {} bytes, got {}", what, MAX_LENGTH, n));
            }
            let max_length = if data_type == "varchar" { n as i64 } else { 0 };
            Ok(TypeMapping::emulated(
                column(data_type, max_length),
                CheckKind::MaxLen(n),
                Emulation::LengthChecked,
            ))
        };
        let non_negative =
            |emulation| TypeMapping::emulated(column("integer", 0), CheckKind::NonNegative, emulation);

        Ok(match field_type {
            FieldType::Int8 | FieldType::Int16 | FieldType::Int32 | FieldType::Int64 => {
                TypeMapping::native(column("integer", 0))
            }
            FieldType::Uint8 | FieldType::Uint16 | FieldType::Uint32 => {
                non_negative(Emulation::UnsignedWidened)
            }
            FieldType::Uint64 => non_negative(Emulation::UnsignedChecked)
                .with_warning("uint64 stored as integer: values above 9223372036854775807 are rejected"),
            FieldType::String { max_len: Some(n) } => bounded("varchar", u64::from(*n), "strings")?,
            FieldType::String { max_len: None } => TypeMapping::native(column("text", 0)),
            FieldType::Bytes { max_size: Some(n) } => bounded("blob", *n, "blobs")?,
            FieldType::Bytes { max_size: None } => TypeMapping::native(column("blob", 0)),
            FieldType::Enum { values } => TypeMapping::emulated(
                column("text", 0),
                CheckKind::one_of(values.iter().cloned()),
                Emulation::EnumChecked,
            ),
            FieldType::Time => TypeMapping::native(column("datetime", 0)),
            FieldType::Bool => TypeMapping::native(column("boolean", 0)),
        })
    }

    /// `AUTOINCREMENT` requires the declared type to be exactly `integer`.
    fn id_column(&self) -> Column {
        Column {
            name: crate::core::ID_COLUMN.to_string(),
            data_type: "integer".to_string(),
            is_identity: true,
            ..Default::default()
        }
    }

    fn column_type_sql(&self, column: &Column) -> String {
        match column.data_type.as_str() {
            "varchar" | "char" if column.max_length > 0 => {
                format!("{}({})", column.data_type, column.max_length)
            }
            other => other.to_string(),
        }
    }

    /// Classify by affinity; declared lengths carry no capacity.
    fn base_class(&self, column: &Column) -> TypeClass {
        let ty = column.data_type.as_str();
        if ty.contains("int") {
            TypeClass::integer(64, true)
        } else if ty.contains("char") || ty.contains("clob") || ty.contains("text") {
            TypeClass::Text { max_len: None }
        } else if ty.is_empty() || ty.contains("blob") {
            TypeClass::Binary { max_len: None }
        } else if ty.contains("date") || ty.contains("time") {
            TypeClass::Timestamp
        } else if ty.contains("bool") {
            TypeClass::Bool
        } else {
            TypeClass::Other(ty.to_string())
        }
    }

    fn can_index(&self, _column: &Column) -> bool {
        true
    }

    fn check_sql(&self, column: &Column, check: &CheckKind) -> String {
        let col = self.quote_ident(&column.name);
        match check {
            CheckKind::NonNegative => format!("{} >= 0", col),
            // characters for text, bytes for blobs
            CheckKind::MaxLen(n) => format!("length({}) <= {}", col, n),
            CheckKind::OneOf(values) => format!("{} IN ({})", col, literal_list(values, "")),
        }
    }

    fn default_sql(&self, value: &DefaultValue, column: &Column) -> String {
        match value {
            DefaultValue::Bool(b) => if *b { "1" } else { "0" }.to_string(),
            DefaultValue::Int(i) => i.to_string(),
            DefaultValue::String(s) if column.data_type == "datetime" => s.clone(),
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
            } => vec![format!(
                "ALTER TABLE {} ADD COLUMN {}",
                self.qualify(schema, table),
                self.column_def(column, check.as_ref())
            )],
            Operation::RenameColumn { table, from, to, .. } => vec![format!(
                "ALTER TABLE {} RENAME COLUMN {} TO {}",
                self.qualify(schema, table),
                self.quote_ident(from),
                self.quote_ident(to)
            )],
            Operation::DropColumn {
                table,
                column,
                indexes,
                ..
            } => {
                let mut stmts: Vec<String> = indexes
                    .iter()
                    .map(|index| format!("DROP INDEX {}", self.qualify(schema, index)))
                    .collect();
                stmts.push(format!(
                    "ALTER TABLE {} DROP COLUMN {}",
                    self.qualify(schema, table),
                    self.quote_ident(column)
                ));
                stmts
            }
            Operation::AddIndex { table, index } => vec![format!(
                "CREATE {}INDEX {} ON {} ({})",
                if index.is_unique { "UNIQUE " } else { "" },
                self.qualify(schema, &index.name),
                self.quote_ident(table),
                column_list(self, &index.columns)
            )],
            Operation::DropIndex { index, .. } => {
                vec![format!("DROP INDEX {}", self.qualify(schema, index))]
            }
            // refused by unsupported_reason before rendering
            Operation::WidenColumn { .. }
            | Operation::ChangeDefault { .. }
            | Operation::AddForeignKey { .. } => Vec::new(),
        }
    }

    fn inline_foreign_keys(&self) -> bool {
        true
    }

    fn unsupported_reason(&self, op: &Operation) -> Option<String> {
        match op {
            Operation::WidenColumn { .. } => {
                Some("SQLite cannot change a column's type or checks in place".to_string())
            }
            Operation::ChangeDefault { .. } => {
                Some("SQLite cannot change a column default in place".to_string())
            }
            Operation::AddForeignKey { .. } => {
                Some("SQLite cannot add a foreign key to an existing table".to_string())
            }
            Operation::AddColumn { column, .. } if !column.is_nullable && column.default.is_none() => {
                Some("SQLite cannot add a NOT NULL column without a default".to_string())
            }
            _ => None,
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
            "lower({}) LIKE lower({}) ESCAPE '\\'",
            self.quote_ident(column),
            self.param_placeholder(param)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::Index;

    fn dialect() -> SqliteDialect {
        SqliteDialect::new()
    }

    fn named(mut col: Column, name: &str) -> Column {
        col.name = name.into();
        col
    }

    #[test]
    fn test_every_integer_is_one_affinity() {
        let d = dialect();
        for ty in [FieldType::Int8, FieldType::Int32, FieldType::Int64] {
            let m = d.map_field(&ty).unwrap();
            assert_eq!(m.column.data_type, "integer");
            assert!(m.check.is_none());
        }

        let m = d.map_field(&FieldType::Uint16).unwrap();
        assert_eq!(m.check, Some(CheckKind::NonNegative));
        assert_eq!(
            d.classify(&m.column, m.check.as_ref()),
            TypeClass::Integer {
                min: 0,
                max: i64::MAX as i128
            }
        );
        assert!(d.map_field(&FieldType::Uint64).unwrap().warning.is_some());
    }

    #[test]
    fn test_lengths_are_enforced_by_checks() {
        let d = dialect();
        let m = d.map_field(&FieldType::string(10)).unwrap();
        assert_eq!(d.column_type_sql(&m.column), "varchar(10)");
        assert_eq!(m.emulation, Some(Emulation::LengthChecked));
        assert_eq!(
            d.check_sql(&named(m.column.clone(), "name"), m.check.as_ref().unwrap()),
            "length(\"name\") <= 10"
        );
        assert_eq!(
            d.classify(&m.column, m.check.as_ref()),
            TypeClass::Text { max_len: Some(10) }
        );
        // the declared length alone guarantees nothing
        assert_eq!(d.base_class(&m.column), TypeClass::Text { max_len: None });

        let m = d.map_field(&FieldType::bytes(255)).unwrap();
        assert_eq!(d.column_type_sql(&m.column), "blob");
        assert_eq!(m.check, Some(CheckKind::MaxLen(255)));
        assert!(d.map_field(&FieldType::bytes(MAX_LENGTH + 1)).is_err());
    }

    #[test]
    fn test_affinity_classes() {
        let d = dialect();
        assert_eq!(d.base_class(&column("bigint", 0)), TypeClass::integer(64, true));
        assert_eq!(d.base_class(&column("nvarchar", 20)), TypeClass::Text { max_len: None });
        assert_eq!(d.base_class(&column("", 0)), TypeClass::Binary { max_len: None });
        assert_eq!(d.base_class(&column("datetime", 0)), TypeClass::Timestamp);
        assert_eq!(d.base_class(&column("boolean", 0)), TypeClass::Bool);
        assert_eq!(d.base_class(&column("real", 0)), TypeClass::Other("real".into()));
    }

    #[test]
    fn test_render_create_table_inline() {
        let d = dialect();
        let mut table = Table::new("pets");
        table.columns.push(d.id_column());
        table.columns.push(Column {
            name: "state".into(),
            data_type: "text".into(),
            default: Some("'online'".into()),
            ..Default::default()
        });
        let mut owner = d.id_column();
        owner.name = "owner_id".into();
        owner.is_identity = false;
        owner.is_nullable = true;
        table.columns.push(owner);
        table.check_constraints.push(CheckConstraint {
            name: "pets_state_check".into(),
            definition: "\"state\" IN ('offline', 'online')".into(),
        });
        table.foreign_keys.push(ForeignKey {
            name: "pets_owner_id_fkey".into(),
            columns: vec!["owner_id".into()],
            ref_table: "users".into(),
            ref_columns: vec!["id".into()],
            on_delete: "SET NULL".into(),
        });
        table.indexes.push(Index {
            name: "pets_state".into(),
            columns: vec!["state".into()],
            is_unique: false,
        });
        table.identity_start = Some((1 << 32) + 1);

        let stmts = d.render("main", &Operation::CreateTable { table });
        assert_eq!(stmts.len(), 3);
        assert!(stmts[0].starts_with("CREATE TABLE \"main\".\"pets\" ("));
        assert!(stmts[0].contains("\"id\" integer PRIMARY KEY AUTOINCREMENT,"));
        assert!(stmts[0].contains(
            "\"state\" text NOT NULL DEFAULT 'online' CONSTRAINT \"pets_state_check\" CHECK (\"state\" IN ('offline', 'online'))"
        ));
        assert!(stmts[0].contains("\"owner_id\" integer,"));
        assert!(stmts[0].contains(
            "CONSTRAINT \"pets_owner_id_fkey\" FOREIGN KEY (\"owner_id\") REFERENCES \"users\" (\"id\") ON DELETE SET NULL"
        ));
        assert_eq!(
            stmts[1],
            "INSERT INTO \"main\".\"sqlite_sequence\" (name, seq) VALUES ('pets', 4294967296)"
        );
        assert_eq!(stmts[2], "CREATE INDEX \"main\".\"pets_state\" ON \"pets\" (\"state\")");
    }

    #[test]
    fn test_first_block_needs_no_sequence_row() {
        let d = dialect();
        let mut table = Table::new("users");
        table.columns.push(d.id_column());
        table.identity_start = Some(1);
        assert_eq!(d.render("main", &Operation::CreateTable { table }).len(), 1);
    }

    #[test]
    fn test_add_column_carries_its_check() {
        let d = dialect();
        let stmts = d.render(
            "main",
            &Operation::AddColumn {
                table: "users".into(),
                column: Column {
                    name: "age".into(),
                    data_type: "integer".into(),
                    is_nullable: true,
                    ..Default::default()
                },
                check: Some(CheckConstraint {
                    name: "users_age_check".into(),
                    definition: "\"age\" >= 0".into(),
                }),
            },
        );
        assert_eq!(
            stmts,
            vec!["ALTER TABLE \"main\".\"users\" ADD COLUMN \"age\" integer CONSTRAINT \"users_age_check\" CHECK (\"age\" >= 0)".to_string()]
        );
    }

    #[test]
    fn test_rename_and_drop_leave_checks_alone() {
        let d = dialect();
        let stmts = d.render(
            "main",
            &Operation::RenameColumn {
                table: "pets".into(),
                from: "years".into(),
                to: "age".into(),
                check: Some(crate::plan::CheckRename {
                    from: "pets_years_check".into(),
                    to: CheckConstraint {
                        name: "pets_age_check".into(),
                        definition: "\"age\" >= 0".into(),
                    },
                }),
            },
        );
        assert_eq!(
            stmts,
            vec!["ALTER TABLE \"main\".\"pets\" RENAME COLUMN \"years\" TO \"age\"".to_string()]
        );

        let stmts = d.render(
            "main",
            &Operation::DropColumn {
                table: "users".into(),
                column: "nickname".into(),
                check: Some("users_nickname_check".into()),
                indexes: vec!["users_nickname_key".into()],
            },
        );
        assert_eq!(
            stmts,
            vec![
                "DROP INDEX \"main\".\"users_nickname_key\"".to_string(),
                "ALTER TABLE \"main\".\"users\" DROP COLUMN \"nickname\"".to_string(),
            ]
        );
    }

    #[test]
    fn test_unsupported_operations() {
        let d = dialect();
        let required = Column {
            name: "nickname".into(),
            data_type: "text".into(),
            ..Default::default()
        };
        let add = |column: Column| Operation::AddColumn {
            table: "users".into(),
            column,
            check: None,
        };
        assert!(d.unsupported_reason(&add(required.clone())).is_some());
        assert!(d
            .unsupported_reason(&add(Column {
                default: Some("''".into()),
                ..required.clone()
            }))
            .is_none());
        assert!(d
            .unsupported_reason(&add(Column {
                is_nullable: true,
                ..required
            }))
            .is_none());

        let fk = Operation::AddForeignKey {
            table: "pets".into(),
            foreign_key: ForeignKey {
                name: "pets_owner_id_fkey".into(),
                columns: vec!["owner_id".into()],
                ref_table: "users".into(),
                ref_columns: vec!["id".into()],
                on_delete: "NO ACTION".into(),
            },
        };
        assert!(d.unsupported_reason(&fk).unwrap().contains("foreign key"));
    }

    #[test]
    fn test_fold_predicates() {
        let d = dialect();
        assert_eq!(d.equal_fold("name", 1), "lower(\"name\") = lower(?1)");
        assert_eq!(
            d.contains_fold("name", 2),
            "lower(\"name\") LIKE lower(?2) ESCAPE '\\'"
        );
        assert_eq!(d.contains_pattern("50%"), "%50\\%%");
    }

    #[test]
    fn test_defaults() {
        let d = dialect();
        assert_eq!(d.default_sql(&DefaultValue::Bool(false), &column("boolean", 0)), "0");
        assert_eq!(d.default_sql(&DefaultValue::String("SWE".into()), &column("varchar", 3)), "'SWE'");
        assert_eq!(
            d.default_sql(
                &DefaultValue::String("CURRENT_TIMESTAMP".into()),
                &column("datetime", 0)
            ),
            "CURRENT_TIMESTAMP"
        );
    }
}
