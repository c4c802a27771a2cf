//! MySQL/MariaDB dialect.
//!
//! MySQL has native unsigned integers and enumerations, so most logical types
//! map without emulation. Long strings and blobs fall back to the TEXT/BLOB
//! tiers plus a length check; those tiers cannot be index keys and cannot carry
//! literal defaults.

use crate::config::DialectKind;
use crate::core::entity::{DefaultValue, FieldType};
use crate::core::identifier::{quote_literal, quote_mysql};
use crate::core::schema::{Column, Table};
use crate::core::traits::Dialect;
use crate::dialect::check::CheckKind;
use crate::dialect::typemap::{column, Emulation, TypeClass, TypeMapping};
use crate::drivers::common::ddl::{add_foreign_key, column_list, create_index, literal_list};
use crate::plan::Operation;

/// Longest `varchar(n)` that fits a utf8mb4 row.
const MAX_VARCHAR: u64 = 16_383;

/// Longest `varbinary(n)` used before falling back to the blob tiers.
const MAX_VARBINARY: u64 = 16_383;

/// Text tiers and their capacity in utf8mb4 characters (`None` = longtext).
const TEXT_TIERS: [(&str, Option<u64>); 4] = [
    ("tinytext", Some(63)),
    ("text", Some(16_383)),
    ("mediumtext", Some(4_194_303)),
    ("longtext", None),
];

/// Blob tiers and their capacity in bytes.
const BLOB_TIERS: [(&str, u64); 4] = [
    ("tinyblob", 255),
    ("blob", 65_535),
    ("mediumblob", 16_777_215),
    ("longblob", 4_294_967_295),
];

/// Longest string accepted (longtext in utf8mb4).
const MAX_STRING: u64 = 1_073_741_823;

/// MySQL dialect implementation.
#[derive(Debug, Clone, Default)]
pub struct MysqlDialect;

impl MysqlDialect {
    pub fn new() -> Self {
        Self
    }

    fn text_tier(name: &str) -> Option<Option<u64>> {
        TEXT_TIERS.iter().find(|(t, _)| *t == name).map(|(_, cap)| *cap)
    }

    fn blob_tier(name: &str) -> Option<u64> {
        BLOB_TIERS.iter().find(|(t, _)| *t == name).map(|(_, cap)| *cap)
    }

    fn column_def(&self, col: &Column) -> String {
        let mut def = format!("{} {}", self.quote_ident(&col.name), self.column_type_sql(col));
        def.push_str(if col.is_nullable { " NULL" } else { " NOT NULL" });
        if let Some(default) = &col.default {
            def.push_str(&format!(" DEFAULT {}", default));
        }
        if col.is_identity {
            def.push_str(" AUTO_INCREMENT");
        }
        def
    }

    fn create_table(&self, schema: &str, table: &Table) -> Vec<String> {
        let mut parts: Vec<String> = table.columns.iter().map(|c| self.column_def(c)).collect();
        if let Some(id) = table.identity_column() {
            parts.push(format!("PRIMARY KEY ({})", self.quote_ident(&id.name)));
        }
        for idx in &table.indexes {
            parts.push(format!(
                "{}INDEX {} ({})",
                if idx.is_unique { "UNIQUE " } else { "" },
                self.quote_ident(&idx.name),
                column_list(self, &idx.columns)
            ));
        }
        for check in &table.check_constraints {
            parts.push(format!(
                "CONSTRAINT {} CHECK ({})",
                self.quote_ident(&check.name),
                check.definition
            ));
        }

        let mut sql = format!(
            "CREATE TABLE {} (\n    {}\n) DEFAULT CHARSET = utf8mb4",
            self.qualify(schema, &table.name),
            parts.join(",\n    ")
        );
        if let Some(start) = table.identity_start {
            sql.push_str(&format!(" AUTO_INCREMENT = {}", start));
        }
        vec![sql]
    }

    fn drop_check(&self, schema: &str, table: &str, name: &str) -> String {
        format!(
            "ALTER TABLE {} DROP CONSTRAINT {}",
            self.qualify(schema, table),
            self.quote_ident(name)
        )
    }

    fn drop_index(&self, schema: &str, table: &str, index: &str) -> String {
        format!(
            "DROP INDEX {} ON {}",
            self.quote_ident(index),
            self.qualify(schema, table)
        )
    }

    fn add_check(&self, schema: &str, table: &str, name: &str, definition: &str) -> String {
        crate::drivers::common::ddl::add_check(self, schema, table, name, definition)
    }
}

impl Dialect for MysqlDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Mysql
    }

    fn name(&self) -> &str {
        "mysql"
    }

    fn quote_ident(&self, name: &str) -> String {
        quote_mysql(name)
    }

    fn param_placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    fn max_identifier_len(&self) -> usize {
        64
    }

    fn supports_transactional_ddl(&self) -> bool {
        false
    }

    fn map_field(&self, field_type: &FieldType) -> Result<TypeMapping, String> {
        let int = |data_type: &str, unsigned: bool| {
            let mut col = column(data_type, 0);
            col.is_unsigned = unsigned;
            TypeMapping::native(col)
        };

        Ok(match field_type {
            FieldType::Int8 => int("tinyint", false),
            FieldType::Int16 => int("smallint", false),
            FieldType::Int32 => int("int", false),
            FieldType::Int64 => int("bigint", false),
            FieldType::Uint8 => int("tinyint", true),
            FieldType::Uint16 => int("smallint", true),
            FieldType::Uint32 => int("int", true),
            FieldType::Uint64 => int("bigint", true),
            FieldType::String { max_len: Some(n) } => {
                let n = u64::from(*n);
                if n <= MAX_VARCHAR {
                    TypeMapping::native(column("varchar", n as i64))
                } else if n > MAX_STRING {
                    return Err(format!(
                        "strings are limited to {} characters, got {}",
                        MAX_STRING, n
                    ));
                } else {
                    let tier = TEXT_TIERS
                        .iter()
                        .find(|(_, cap)| cap.map_or(true, |c| c >= n))
                        .map(|(t, _)| *t)
                        .unwrap_or("longtext");
                    TypeMapping::emulated(column(tier, 0), CheckKind::MaxLen(n), Emulation::LengthChecked)
                }
            }
            FieldType::String { max_len: None } => TypeMapping::native(column("longtext", 0)),
            FieldType::Bytes { max_size: Some(n) } if *n <= MAX_VARBINARY => {
                TypeMapping::native(column("varbinary", *n as i64))
            }
            FieldType::Bytes { max_size: Some(n) } => {
                let tier = BLOB_TIERS
                    .iter()
                    .find(|(_, cap)| *cap >= *n)
                    .map(|(t, _)| *t)
                    .ok_or_else(|| format!("longblob holds at most 4294967295 bytes, got {}", n))?;
                TypeMapping::emulated(column(tier, 0), CheckKind::MaxLen(*n), Emulation::LengthChecked)
            }
            FieldType::Bytes { max_size: None } => TypeMapping::native(column("longblob", 0)),
            FieldType::Enum { values } => {
                let mut col = column("enum", 0);
                col.enum_values = values.clone();
                TypeMapping::native(col)
            }
            FieldType::Time => TypeMapping::native(column("datetime", 0)),
            FieldType::Bool => TypeMapping::native(column("tinyint", 1)),
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
        let base = match column.data_type.as_str() {
            "enum" => format!(
                "enum({})",
                column
                    .enum_values
                    .iter()
                    .map(|v| quote_literal(v))
                    .collect::<Vec<_>>()
                    .join(",")
            ),
            "varchar" | "char" | "varbinary" | "binary" if column.max_length > 0 => {
                format!("{}({})", column.data_type, column.max_length)
            }
            "tinyint" if column.max_length == 1 => "tinyint(1)".to_string(),
            "datetime" => "datetime(6)".to_string(),
            other => other.to_string(),
        };
        if column.is_unsigned {
            format!("{} unsigned", base)
        } else {
            base
        }
    }

    fn base_class(&self, column: &Column) -> TypeClass {
        let signed = !column.is_unsigned;
        match column.data_type.as_str() {
            "tinyint" if column.max_length == 1 => TypeClass::Bool,
            "tinyint" => TypeClass::integer(8, signed),
            "smallint" => TypeClass::integer(16, signed),
            "mediumint" => TypeClass::integer(24, signed),
            "int" | "integer" => TypeClass::integer(32, signed),
            "bigint" => TypeClass::integer(64, signed),
            "varchar" | "char" => TypeClass::text(column.max_length),
            "varbinary" | "binary" => TypeClass::binary(column.max_length),
            "enum" => TypeClass::Enum(column.enum_values.iter().cloned().collect()),
            "datetime" | "timestamp" => TypeClass::Timestamp,
            "bool" | "boolean" => TypeClass::Bool,
            other => {
                if let Some(cap) = Self::text_tier(other) {
                    TypeClass::Text { max_len: cap }
                } else if let Some(cap) = Self::blob_tier(other) {
                    // longblob is treated as unbounded
                    TypeClass::Binary {
                        max_len: if other == "longblob" { None } else { Some(cap) },
                    }
                } else {
                    TypeClass::Other(other.to_string())
                }
            }
        }
    }

    fn can_index(&self, column: &Column) -> bool {
        Self::text_tier(&column.data_type).is_none() && Self::blob_tier(&column.data_type).is_none()
    }

    fn default_allowed(&self, column: &Column) -> bool {
        self.can_index(column)
    }

    fn check_sql(&self, column: &Column, check: &CheckKind) -> String {
        let col = self.quote_ident(&column.name);
        match check {
            CheckKind::NonNegative => format!("{} >= 0", col),
            CheckKind::MaxLen(n) if Self::blob_tier(&column.data_type).is_some() => {
                format!("length({}) <= {}", col, n)
            }
            CheckKind::MaxLen(n) => format!("char_length({}) <= {}", col, n),
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
            } => {
                let mut sql = format!(
                    "ALTER TABLE {} ADD COLUMN {}",
                    self.qualify(schema, table),
                    self.column_def(column)
                );
                if let Some(check) = check {
                    sql.push_str(&format!(
                        ", ADD CONSTRAINT {} CHECK ({})",
                        self.quote_ident(&check.name),
                        check.definition
                    ));
                }
                vec![sql]
            }
            Operation::RenameColumn {
                table,
                from,
                to,
                check,
            } => {
                let mut stmts = Vec::new();
                if let Some(c) = check {
                    stmts.push(self.drop_check(schema, table, &c.from));
                }
                stmts.push(format!(
                    "ALTER TABLE {} RENAME COLUMN {} TO {}",
                    self.qualify(schema, table),
                    self.quote_ident(from),
                    self.quote_ident(to)
                ));
                if let Some(c) = check {
                    stmts.push(self.add_check(schema, table, &c.to.name, &c.to.definition));
                }
                stmts
            }
            Operation::WidenColumn {
                table,
                to,
                drop_check,
                add_check,
                ..
            } => {
                let mut stmts = Vec::new();
                if let Some(name) = drop_check {
                    stmts.push(self.drop_check(schema, table, name));
                }
                stmts.push(format!(
                    "ALTER TABLE {} MODIFY COLUMN {}",
                    self.qualify(schema, table),
                    self.column_def(to)
                ));
                if let Some(c) = add_check {
                    stmts.push(self.add_check(schema, table, &c.name, &c.definition));
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
                check,
                indexes,
            } => {
                let mut stmts = Vec::new();
                if let Some(name) = check {
                    stmts.push(self.drop_check(schema, table, name));
                }
                for index in indexes {
                    stmts.push(self.drop_index(schema, table, index));
                }
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
            "{} COLLATE utf8mb4_general_ci = {}",
            self.quote_ident(column),
            self.param_placeholder(param)
        )
    }

    fn contains_fold(&self, column: &str, param: usize) -> String {
        format!(
            "{} COLLATE utf8mb4_general_ci LIKE {}",
            self.quote_ident(column),
            self.param_placeholder(param)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dialect() -> MysqlDialect {
        MysqlDialect::new()
    }

    #[test]
    fn test_native_unsigned_and_enum() {
        let d = dialect();
        let m = d.map_field(&FieldType::Uint16).unwrap();
        assert_eq!(d.column_type_sql(&m.column), "smallint unsigned");
        assert!(m.check.is_none());

        let m = d
            .map_field(&FieldType::enumeration(["logged_in", "logged_out"]))
            .unwrap();
        assert_eq!(d.column_type_sql(&m.column), "enum('logged_in','logged_out')");
        assert!(m.emulation.is_none());
    }

    #[test]
    fn test_long_strings_use_text_tiers() {
        let d = dialect();
        let m = d.map_field(&FieldType::string(20_000)).unwrap();
        assert_eq!(m.column.data_type, "mediumtext");
        assert_eq!(m.check, Some(CheckKind::MaxLen(20_000)));
        assert_eq!(
            d.classify(&m.column, m.check.as_ref()),
            TypeClass::Text {
                max_len: Some(20_000)
            }
        );
        assert!(!d.can_index(&m.column));
        assert!(!d.default_allowed(&m.column));
        assert!(d.map_field(&FieldType::string(u32::MAX)).is_err());
    }

    #[test]
    fn test_blob_tiers() {
        let d = dialect();
        let m = d.map_field(&FieldType::bytes(255)).unwrap();
        assert_eq!(d.column_type_sql(&m.column), "varbinary(255)");

        let m = d.map_field(&FieldType::bytes(100_000)).unwrap();
        assert_eq!(m.column.data_type, "mediumblob");
        let mut col = m.column.clone();
        col.name = "blob".into();
        assert_eq!(d.check_sql(&col, m.check.as_ref().unwrap()), "length(`blob`) <= 100000");

        assert!(d.map_field(&FieldType::bytes(5_000_000_000)).is_err());
    }

    #[test]
    fn test_bool_is_tinyint_one() {
        let d = dialect();
        let m = d.map_field(&FieldType::Bool).unwrap();
        assert_eq!(d.column_type_sql(&m.column), "tinyint(1)");
        assert_eq!(d.base_class(&m.column), TypeClass::Bool);
        assert_eq!(d.default_sql(&DefaultValue::Bool(true), &m.column), "1");
    }

    #[test]
    fn test_render_create_table_sets_auto_increment() {
        let d = dialect();
        let mut table = Table::new("pets");
        table.columns.push(d.id_column());
        table.identity_start = Some(5 << 32);
        let stmts = d.render("app", &Operation::CreateTable { table });
        assert_eq!(stmts.len(), 1);
        assert!(stmts[0].contains("`id` bigint NOT NULL AUTO_INCREMENT"));
        assert!(stmts[0].contains("PRIMARY KEY (`id`)"));
        assert!(stmts[0].ends_with("AUTO_INCREMENT = 21474836480"));
    }

    #[test]
    fn test_render_widen_keeps_identity() {
        let d = dialect();
        let from = Column {
            name: "name".into(),
            data_type: "varchar".into(),
            max_length: 10,
            ..Default::default()
        };
        let to = Column {
            max_length: 20,
            ..from.clone()
        };
        let stmts = d.render(
            "app",
            &Operation::WidenColumn {
                table: "users".into(),
                from,
                to,
                drop_check: None,
                add_check: None,
                indexes: vec![],
            },
        );
        assert_eq!(
            stmts,
            vec!["ALTER TABLE `app`.`users` MODIFY COLUMN `name` varchar(20) NOT NULL".to_string()]
        );
    }

    #[test]
    fn test_drop_column_drops_check_first() {
        let d = dialect();
        let stmts = d.render(
            "app",
            &Operation::DropColumn {
                table: "users".into(),
                column: "bio".into(),
                check: Some("users_bio_check".into()),
                indexes: vec!["users_bio_idx".into()],
            },
        );
        assert_eq!(stmts.len(), 3);
        assert!(stmts[0].contains("DROP CONSTRAINT `users_bio_check`"));
        assert_eq!(stmts[1], "DROP INDEX `users_bio_idx` ON `app`.`users`");
        assert!(stmts[2].ends_with("DROP COLUMN `bio`"));
    }

    #[test]
    fn test_fold_predicates() {
        let d = dialect();
        assert_eq!(d.equal_fold("name", 1), "`name` COLLATE utf8mb4_general_ci = ?");
        assert_eq!(d.contains_fold("name", 1), "`name` COLLATE utf8mb4_general_ci LIKE ?");
    }
}
