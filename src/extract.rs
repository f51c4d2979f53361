//! Recover referenced table names from SQL text.
//!
//! Live queries need to know which tables a statement touches so the change
//! router can decide whether a table-change event affects them. The
//! extractor is a case-insensitive regex over the identifiers following
//! `FROM`, `JOIN`, `INTO` and `UPDATE` (`DELETE FROM` is covered by `FROM`),
//! with optional backtick quoting. It is intentionally lossy: a string
//! literal containing the word `from` will produce a false positive, and CTE
//! aliases are reported as if they were tables. Over-approximation is
//! harmless here; a missed table would mean a missed update, so the
//! extractor must never return a strict subset of the truly referenced set.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

static TABLE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:FROM|JOIN|INTO|UPDATE)\s+(?:`([^`]+)`|([A-Za-z_][A-Za-z0-9_]*))")
        .expect("table extraction regex is valid")
});

/// Extract the set of table names referenced by `sql`, lowercased.
///
/// May return a superset of the tables actually read; never a strict subset.
pub fn table_names(sql: &str) -> BTreeSet<String> {
    let mut tables = BTreeSet::new();
    for captures in TABLE_RE.captures_iter(sql) {
        let name = captures
            .get(1)
            .or_else(|| captures.get(2))
            .map(|m| m.as_str());
        if let Some(name) = name {
            tables.insert(name.to_ascii_lowercase());
        }
    }
    tables
}
