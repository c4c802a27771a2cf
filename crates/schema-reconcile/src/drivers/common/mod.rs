//! Common utilities shared across database drivers.
//!
//! - [`tls`]: SSL mode parsing and rustls configuration
//! - [`ddl`]: DDL fragments rendered identically by every dialect

pub mod ddl;
pub mod tls;

pub use tls::{SslMode, TlsBuilder};
