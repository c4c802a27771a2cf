//! Identifier validation, quoting, and derived constraint names.
//!
//! SQL identifiers (table, column, index and constraint names) cannot be bound as
//! statement parameters, so every DDL statement this crate renders embeds them
//! directly. Names are validated once when the desired schema is loaded and are
//! quoted with dialect-specific escaping whenever they are rendered.

use crate::error::{MigrateError, Result};

/// Maximum identifier length accepted before dialect-specific limits apply.
/// - PostgreSQL: 63 bytes
/// - SQL Server: 128 characters
/// - MySQL: 64 characters
const MAX_IDENTIFIER_LENGTH: usize = 128;

/// Validate an identifier for security issues.
///
/// Rejects empty identifiers, identifiers containing null bytes, and identifiers
/// longer than `max_len` bytes.
pub fn validate_identifier_len(name: &str, max_len: usize) -> Result<()> {
    if name.is_empty() {
        return Err(MigrateError::Config(
            "Identifier cannot be empty".to_string(),
        ));
    }

    if name.contains('\0') {
        return Err(MigrateError::Config(format!(
            "SECURITY: Identifier contains null byte (possible injection attempt): {:?}",
            name
        )));
    }

    if name.len() > max_len {
        return Err(MigrateError::Config(format!(
            "Identifier exceeds maximum length of {} bytes (got {} bytes): {:?}",
            max_len,
            name.len(),
            name
        )));
    }

    Ok(())
}

/// Validate an identifier against the generic length limit.
pub fn validate_identifier(name: &str) -> Result<()> {
    validate_identifier_len(name, MAX_IDENTIFIER_LENGTH)
}

/// Quote a PostgreSQL identifier, doubling embedded double quotes.
pub fn quote_pg(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a MySQL identifier using backticks, doubling embedded backticks.
pub fn quote_mysql(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Quote a SQL Server identifier using brackets, doubling closing brackets.
pub fn quote_mssql(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}

/// Quote a string literal, doubling embedded single quotes.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Name of the check constraint guarding `column`.
pub fn check_name(table: &str, column: &str) -> String {
    format!("{}_{}_check", table, column)
}

/// Name of the unique index backing a unique field.
pub fn unique_index_name(table: &str, column: &str) -> String {
    format!("{}_{}_key", table, column)
}

/// Default name for an explicit index over `columns`.
pub fn index_name(table: &str, columns: &[String]) -> String {
    format!("{}_{}", table, columns.join("_"))
}

/// Name of the foreign key created for a reference column.
pub fn foreign_key_name(table: &str, column: &str) -> String {
    format!("{}_{}_fkey", table, column)
}

/// Convert an entity name such as `CustomType` into `custom_type`.
pub fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let chars: Vec<char> = name.chars().collect();
    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            let prev_lower = i > 0 && (chars[i - 1].is_lowercase() || chars[i - 1].is_ascii_digit());
            let next_lower = chars.get(i + 1).map(|n| n.is_lowercase()).unwrap_or(false);
            let prev_upper = i > 0 && chars[i - 1].is_uppercase();
            if i > 0 && (prev_lower || (prev_upper && next_lower)) {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Default table name for an entity: snake_case plural.
pub fn table_name_for(entity: &str) -> String {
    let base = snake_case(entity);
    if base.ends_with('s') {
        base
    } else {
        format!("{}s", base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_identifier_rejects_empty_and_null() {
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("users\0; DROP TABLE x").is_err());
        assert!(validate_identifier("users").is_ok());
    }

    #[test]
    fn test_validate_identifier_length() {
        let long = "a".repeat(64);
        assert!(validate_identifier(&long).is_ok());
        assert!(validate_identifier_len(&long, 63).is_err());
        assert!(validate_identifier(&"a".repeat(129)).is_err());
    }

    #[test]
    fn test_quoting_escapes_delimiters() {
        assert_eq!(quote_pg("users"), "\"users\"");
        assert_eq!(quote_pg("table\"name"), "\"table\"\"name\"");
        assert_eq!(quote_mysql("table`name"), "`table``name`");
        assert_eq!(quote_mssql("table]name"), "[table]]name]");
        assert_eq!(quote_literal("it's"), "'it''s'");
    }

    #[test]
    fn test_derived_names() {
        assert_eq!(check_name("users", "age"), "users_age_check");
        assert_eq!(unique_index_name("users", "phone"), "users_phone_key");
        assert_eq!(
            index_name("users", &["name".to_string(), "address".to_string()]),
            "users_name_address"
        );
        assert_eq!(foreign_key_name("pets", "owner_id"), "pets_owner_id_fkey");
    }

    #[test]
    fn test_table_names() {
        assert_eq!(table_name_for("Car"), "cars");
        assert_eq!(table_name_for("CustomType"), "custom_types");
        assert_eq!(table_name_for("Media"), "medias");
        assert_eq!(table_name_for("User"), "users");
        assert_eq!(table_name_for("HTTPLog"), "http_logs");
        assert_eq!(table_name_for("Status"), "status");
    }
}
