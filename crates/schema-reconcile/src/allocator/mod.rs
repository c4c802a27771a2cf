//! Globally unique identifiers.
//!
//! With `global_unique_id` on, every table owns a block of 2^32 ids selected
//! by its entity-type tag: ids of a table tagged `t` lie in
//! `[t << 32, (t + 1) << 32)`. The tag is never stored anywhere except as the
//! starting value of the table's identity sequence, so it is recovered by
//! inspection on every run:
//!
//! - existing tables keep the tag their identity start falls in
//! - new tables take the next unused tag, in declared order, starting one
//!   past the highest tag in use anywhere in the namespace
//!
//! On an empty database this assigns tags by declared position.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{MigrateError, Result};

/// Bits of an id below the entity-type tag.
pub const TAG_SHIFT: u32 = 32;

/// Highest tag whose block fits in a signed 64-bit id.
pub const MAX_TAG: u32 = (i64::MAX >> TAG_SHIFT) as u32;

/// The id range reserved for one tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct IdBlock {
    pub tag: u32,
}

impl IdBlock {
    pub fn new(tag: u32) -> Result<Self> {
        if tag > MAX_TAG {
            return Err(MigrateError::Config(format!(
                "id block tag {} exceeds the maximum of {}",
                tag, MAX_TAG
            )));
        }
        Ok(Self { tag })
    }

    /// Block containing `id`.
    pub fn containing(id: i64) -> Option<Self> {
        if id < 0 {
            return None;
        }
        Some(Self {
            tag: (id >> TAG_SHIFT) as u32,
        })
    }

    /// Inclusive lower bound.
    pub fn lower(&self) -> i64 {
        (self.tag as i64) << TAG_SHIFT
    }

    /// Exclusive upper bound.
    pub fn upper(&self) -> i64 {
        self.lower().saturating_add(1i64 << TAG_SHIFT)
    }

    /// Identity starting value. Block 0 starts at 1, like an untagged table.
    pub fn start(&self) -> i64 {
        self.lower() + 1
    }

    pub fn contains(&self, id: i64) -> bool {
        id >= self.lower() && id < self.upper()
    }
}

impl fmt::Display for IdBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tag {} [{}, {})", self.tag, self.lower(), self.upper())
    }
}

/// Tag of one desired table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagAssignment {
    pub table: String,
    pub tag: u32,
    /// Identity starting value (live value for existing tables).
    pub start: i64,
    /// Whether the tag was assigned in this run.
    pub new: bool,
}

impl TagAssignment {
    pub fn block(&self) -> IdBlock {
        IdBlock { tag: self.tag }
    }
}

/// Assign tags to `tables` (declared order) given every live identity start
/// in the namespace.
pub fn allocate(tables: &[String], live_starts: &BTreeMap<String, i64>) -> Result<Vec<TagAssignment>> {
    let mut owners: HashMap<u32, &str> = HashMap::new();
    let mut next = 0u32;

    for (table, start) in live_starts {
        let block = IdBlock::containing(*start).ok_or_else(|| {
            MigrateError::conflict(
                table.as_str(),
                format!("identity start {} is outside every id block", start),
            )
        })?;
        next = next.max(block.tag.saturating_add(1));
    }

    let mut assignments = Vec::with_capacity(tables.len());
    for table in tables {
        let assignment = match live_starts.get(table) {
            Some(&start) => {
                let tag = (start >> TAG_SHIFT) as u32;
                TagAssignment {
                    table: table.clone(),
                    tag,
                    start,
                    new: false,
                }
            }
            None => {
                let block = IdBlock::new(next)?;
                next += 1;
                TagAssignment {
                    table: table.clone(),
                    tag: block.tag,
                    start: block.start(),
                    new: true,
                }
            }
        };

        if let Some(owner) = owners.insert(assignment.tag, table.as_str()) {
            if assignment.tag == 0 {
                // Tables created before tagging was enabled all sit in block 0.
                warn!(
                    "Tables {} and {} share id block 0; their ids are not globally unique",
                    owner, table
                );
            } else {
                return Err(MigrateError::conflict(
                    table.as_str(),
                    format!("id block tag {} is already owned by {}", assignment.tag, owner),
                ));
            }
        }
        debug!("{} -> {}{}", table, assignment.block(), if assignment.new { " (new)" } else { "" });
        assignments.push(assignment);
    }

    Ok(assignments)
}
