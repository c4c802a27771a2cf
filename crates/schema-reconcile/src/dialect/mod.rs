//! Dialect-independent type reasoning.
//!
//! - [`typemap`]: capacity classes, widening comparison and desired-table derivation
//! - [`check`]: the check constraints that emulate logical types
//! - [`predicate`]: LIKE escaping shared by the case-insensitive predicates
//! - [`constraint`]: constraint-violation classification for driver errors
//!
//! Dialect-specific mappings live with each driver under `drivers/`.

pub mod check;
pub mod constraint;
pub mod predicate;
pub mod typemap;

pub use check::CheckKind;
pub use constraint::{is_constraint_error, ConstraintError, ConstraintKind};
pub use predicate::escape_like;
pub use typemap::{compare, normalize_default, refine_class, Compat, Emulation, TypeClass, TypeMapping};
