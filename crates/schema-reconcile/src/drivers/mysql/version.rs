//! Server version detection for MySQL and MariaDB.

use std::fmt;

use crate::error::{MigrateError, Result};

/// MySQL 8.0.19 adds `DROP CONSTRAINT`; 8.0.16 added enforced checks.
const MYSQL_MINIMUM: (u32, u32, u32) = (8, 0, 19);

/// MariaDB 10.5.2 adds `RENAME COLUMN`.
const MARIADB_MINIMUM: (u32, u32, u32) = (10, 5, 2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flavor {
    Mysql,
    MariaDb,
}

impl Flavor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Flavor::Mysql => "MySQL",
            Flavor::MariaDb => "MariaDB",
        }
    }

    fn minimum(&self) -> (u32, u32, u32) {
        match self {
            Flavor::Mysql => MYSQL_MINIMUM,
            Flavor::MariaDb => MARIADB_MINIMUM,
        }
    }
}

/// Parsed `SELECT VERSION()` output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerVersion {
    pub flavor: Flavor,
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl ServerVersion {
    /// Parse strings such as `8.0.36`, `5.7.44-log` or
    /// `10.11.6-MariaDB-1:10.11.6+maria~ubu2204`.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let flavor = if trimmed.to_lowercase().contains("mariadb") {
            Flavor::MariaDb
        } else {
            Flavor::Mysql
        };
        // MariaDB 10.x may still advertise the 5.5.5- replication prefix.
        let numeric = match flavor {
            Flavor::MariaDb => trimmed.strip_prefix("5.5.5-").unwrap_or(trimmed),
            Flavor::Mysql => trimmed,
        };
        let numeric: String = numeric
            .chars()
            .take_while(|c| c.is_ascii_digit() || *c == '.')
            .collect();

        let mut parts = numeric.split('.').filter(|p| !p.is_empty()).map(str::parse::<u32>);
        let invalid = || MigrateError::Config(format!("cannot parse server version '{}'", raw));
        let major = parts.next().and_then(|p| p.ok()).ok_or_else(invalid)?;
        let minor = parts.next().and_then(|p| p.ok()).ok_or_else(invalid)?;
        let patch = parts.next().and_then(|p| p.ok()).unwrap_or(0);

        Ok(Self {
            flavor,
            major,
            minor,
            patch,
        })
    }

    pub fn is_supported(&self) -> bool {
        (self.major, self.minor, self.patch) >= self.flavor.minimum()
    }

    /// Reject servers that lack the catalog tables and DDL this driver uses.
    pub fn check_supported(&self) -> Result<()> {
        if self.is_supported() {
            return Ok(());
        }
        let (mysql, mariadb) = (MYSQL_MINIMUM, MARIADB_MINIMUM);
        Err(MigrateError::Config(format!(
            "{} is not supported; need MySQL {}.{}.{}+ or MariaDB {}.{}.{}+",
            self, mysql.0, mysql.1, mysql.2, mariadb.0, mariadb.1, mariadb.2
        )))
    }
}

impl fmt::Display for ServerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}.{}.{}",
            self.flavor.as_str(),
            self.major,
            self.minor,
            self.patch
        )
    }
}
