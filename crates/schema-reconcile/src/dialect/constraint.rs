//! Classification of constraint-violation errors across drivers.
//!
//! Callers inserting data into reconciled tables need to tell "the row broke a
//! constraint" apart from transport or syntax failures, without matching on
//! driver-specific codes themselves.

use serde::Serialize;
use tokio_postgres::error::SqlState;

use crate::error::MigrateError;

/// Which kind of integrity rule a write violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintKind {
    Unique,
    ForeignKey,
    Check,
    NotNull,
    /// Value longer than the column allows.
    ValueTooLong,
    /// Value outside a native enumeration.
    InvalidEnumValue,
    /// SQL Server 547: a FOREIGN KEY or CHECK conflict, not distinguished by code.
    Conflict,
}

/// Errors that may carry a constraint violation.
pub trait ConstraintError {
    fn constraint_kind(&self) -> Option<ConstraintKind>;
}

/// Whether the error is an integrity-constraint violation.
pub fn is_constraint_error<E: ConstraintError + ?Sized>(err: &E) -> bool {
    err.constraint_kind().is_some()
}

fn postgres_kind(code: &SqlState) -> Option<ConstraintKind> {
    if *code == SqlState::UNIQUE_VIOLATION {
        Some(ConstraintKind::Unique)
    } else if *code == SqlState::FOREIGN_KEY_VIOLATION {
        Some(ConstraintKind::ForeignKey)
    } else if *code == SqlState::CHECK_VIOLATION {
        Some(ConstraintKind::Check)
    } else if *code == SqlState::NOT_NULL_VIOLATION {
        Some(ConstraintKind::NotNull)
    } else if *code == SqlState::STRING_DATA_RIGHT_TRUNCATION {
        Some(ConstraintKind::ValueTooLong)
    } else {
        None
    }
}

impl ConstraintError for tokio_postgres::Error {
    fn constraint_kind(&self) -> Option<ConstraintKind> {
        postgres_kind(self.code()?)
    }
}

fn mysql_kind(code: u16) -> Option<ConstraintKind> {
    match code {
        1062 => Some(ConstraintKind::Unique),
        1451 | 1452 => Some(ConstraintKind::ForeignKey),
        3819 => Some(ConstraintKind::Check),
        1048 => Some(ConstraintKind::NotNull),
        1406 => Some(ConstraintKind::ValueTooLong),
        1265 => Some(ConstraintKind::InvalidEnumValue),
        _ => None,
    }
}

impl ConstraintError for mysql_async::Error {
    fn constraint_kind(&self) -> Option<ConstraintKind> {
        match self {
            mysql_async::Error::Server(err) => mysql_kind(err.code),
            _ => None,
        }
    }
}

impl ConstraintError for sqlx::Error {
    fn constraint_kind(&self) -> Option<ConstraintKind> {
        let sqlx::Error::Database(db) = self else {
            return None;
        };
        if let Some(mysql) = db.try_downcast_ref::<sqlx::mysql::MySqlDatabaseError>() {
            if let Some(kind) = mysql_kind(mysql.number()) {
                return Some(kind);
            }
        }
        match db.kind() {
            sqlx::error::ErrorKind::UniqueViolation => Some(ConstraintKind::Unique),
            sqlx::error::ErrorKind::ForeignKeyViolation => Some(ConstraintKind::ForeignKey),
            sqlx::error::ErrorKind::NotNullViolation => Some(ConstraintKind::NotNull),
            sqlx::error::ErrorKind::CheckViolation => Some(ConstraintKind::Check),
            _ => None,
        }
    }
}

fn mssql_kind(code: u32) -> Option<ConstraintKind> {
    match code {
        2627 | 2601 => Some(ConstraintKind::Unique),
        547 => Some(ConstraintKind::Conflict),
        515 => Some(ConstraintKind::NotNull),
        8152 | 2628 => Some(ConstraintKind::ValueTooLong),
        _ => None,
    }
}

impl ConstraintError for tiberius::error::Error {
    fn constraint_kind(&self) -> Option<ConstraintKind> {
        match self {
            tiberius::error::Error::Server(token) => mssql_kind(token.code()),
            _ => None,
        }
    }
}

impl ConstraintError for MigrateError {
    fn constraint_kind(&self) -> Option<ConstraintKind> {
        match self {
            MigrateError::Postgres(e) => e.constraint_kind(),
            MigrateError::Mysql(e) => e.constraint_kind(),
            MigrateError::Sqlx(e) => e.constraint_kind(),
            MigrateError::Mssql(e) => e.constraint_kind(),
            MigrateError::Execution { source, .. } | MigrateError::PartialApply { source, .. } => {
                source.constraint_kind()
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mysql_server_error(code: u16) -> MigrateError {
        MigrateError::Mysql(mysql_async::Error::Server(mysql_async::ServerError {
            code,
            message: "constraint failed".to_string(),
            state: "23000".to_string(),
        }))
    }

    #[test]
    fn test_mysql_codes() {
        assert_eq!(
            mysql_server_error(1062).constraint_kind(),
            Some(ConstraintKind::Unique)
        );
        assert_eq!(
            mysql_server_error(1452).constraint_kind(),
            Some(ConstraintKind::ForeignKey)
        );
        assert_eq!(
            mysql_server_error(1265).constraint_kind(),
            Some(ConstraintKind::InvalidEnumValue)
        );
        assert_eq!(mysql_server_error(1146).constraint_kind(), None);
    }

    #[test]
    fn test_postgres_sqlstates() {
        assert_eq!(postgres_kind(&SqlState::UNIQUE_VIOLATION), Some(ConstraintKind::Unique));
        assert_eq!(
            postgres_kind(&SqlState::from_code("23503")),
            Some(ConstraintKind::ForeignKey)
        );
        // enum values are guarded by CHECK constraints
        assert_eq!(postgres_kind(&SqlState::from_code("23514")), Some(ConstraintKind::Check));
        assert_eq!(postgres_kind(&SqlState::NOT_NULL_VIOLATION), Some(ConstraintKind::NotNull));
        assert_eq!(
            postgres_kind(&SqlState::from_code("22001")),
            Some(ConstraintKind::ValueTooLong)
        );
        assert_eq!(postgres_kind(&SqlState::UNDEFINED_TABLE), None);
        assert_eq!(postgres_kind(&SqlState::SYNTAX_ERROR), None);
    }

    #[test]
    fn test_mssql_codes() {
        assert_eq!(mssql_kind(2627), Some(ConstraintKind::Unique));
        assert_eq!(mssql_kind(2601), Some(ConstraintKind::Unique));
        assert_eq!(mssql_kind(547), Some(ConstraintKind::Conflict));
        assert_eq!(mssql_kind(515), Some(ConstraintKind::NotNull));
        assert_eq!(mssql_kind(2628), Some(ConstraintKind::ValueTooLong));
        assert_eq!(mssql_kind(8152), Some(ConstraintKind::ValueTooLong));
        // invalid object name
        assert_eq!(mssql_kind(208), None);
    }

    #[test]
    fn test_wrapped_errors_are_unwrapped() {
        let err = MigrateError::execution("add index users_email_key", mysql_server_error(1062));
        assert!(is_constraint_error(&err));
    }

    #[test]
    fn test_non_driver_errors_are_not_constraints() {
        assert!(!is_constraint_error(&MigrateError::Config("bad".into())));
        assert!(!is_constraint_error(&MigrateError::conflict("users", "x")));
    }
}
