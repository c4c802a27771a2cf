//! Check constraints used to emulate logical types.
//!
//! Each guarded column carries at most one check, named `{table}_{column}_check`.
//! Catalogs normalize check definitions differently (PostgreSQL rewrites `IN`
//! lists to `= ANY (ARRAY[...])`, SQL Server to chains of `OR`), so live
//! definitions are parsed back into a [`CheckKind`] rather than compared as text.

use std::collections::BTreeSet;

use serde::Serialize;

/// What a type-emulating check enforces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    /// `col >= 0` for unsigned integers on signed-only engines.
    NonNegative,
    /// Length bound in characters (text) or bytes (binary).
    MaxLen(u64),
    /// Closed value set for enumerations.
    OneOf(BTreeSet<String>),
}

impl CheckKind {
    pub fn one_of<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CheckKind::OneOf(values.into_iter().map(Into::into).collect())
    }

    /// Recover the kind from a check definition as rendered or as reported by a catalog.
    ///
    /// Returns `None` for checks this crate did not generate.
    pub fn parse(definition: &str) -> Option<CheckKind> {
        if definition.contains('\'') {
            let values = quoted_literals(definition);
            return if values.is_empty() {
                None
            } else {
                Some(CheckKind::OneOf(values.into_iter().collect()))
            };
        }

        if let Some(pos) = definition.find("<=") {
            return number_after(&definition[pos + 2..]).map(CheckKind::MaxLen);
        }

        if let Some(pos) = definition.find(">=") {
            return match number_after(&definition[pos + 2..]) {
                Some(0) => Some(CheckKind::NonNegative),
                _ => None,
            };
        }

        None
    }
}

/// Extract every single-quoted literal, unescaping doubled quotes.
pub fn quoted_literals(s: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\'' {
            continue;
        }
        let mut literal = String::new();
        loop {
            match chars.next() {
                Some('\'') => {
                    if chars.peek() == Some(&'\'') {
                        chars.next();
                        literal.push('\'');
                    } else {
                        break;
                    }
                }
                Some(ch) => literal.push(ch),
                None => break,
            }
        }
        out.push(literal);
    }
    out
}

/// Read the first unsigned integer, skipping whitespace and parentheses.
fn number_after(s: &str) -> Option<u64> {
    let trimmed = s.trim_start_matches(|c: char| c.is_whitespace() || c == '(');
    let digits: String = trimmed.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}
