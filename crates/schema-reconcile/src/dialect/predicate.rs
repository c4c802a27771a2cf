//! Case-insensitive predicate helpers.
//!
//! Each dialect renders its own `equal_fold` / `contains_fold` fragments; this
//! module holds the pieces they share.

/// Escape LIKE wildcards so `value` matches literally. The escape character is `\`.
pub fn escape_like(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 4);
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
