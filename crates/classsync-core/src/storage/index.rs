//! Secondary index encoding
//!
//! Each collection has one index table whose keys are
//! `field \0 encoded-value \0 document-id` and whose values are empty.
//! Encoded values sort lexicographically in the same order as the
//! originals, so equality and range lookups are prefix/range scans.
//!
//! Only scalar JSON values are indexed: booleans, integers and strings.
//! Strings containing NUL are not indexed.

use std::cmp::Ordering;

use redb::Table;
use serde_json::Value;

use crate::error::SyncResult;
use crate::types::Collection;

const SEP: char = '\u{0}';
const SEP_NEXT: char = '\u{1}';

/// A scalar value that can live in an index
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum IndexValue {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl IndexValue {
    /// Extract an indexable value; `None` for null, floats, arrays, objects
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(IndexValue::Bool(*b)),
            Value::Number(n) => n.as_i64().map(IndexValue::Int),
            Value::String(s) if !s.contains(SEP) => Some(IndexValue::Text(s.clone())),
            _ => None,
        }
    }

    /// Parse a command-line style literal: `true`/`false`, integers, else text
    pub fn parse_literal(raw: &str) -> Self {
        match raw {
            "true" => IndexValue::Bool(true),
            "false" => IndexValue::Bool(false),
            _ => raw
                .parse::<i64>()
                .map(IndexValue::Int)
                .unwrap_or_else(|_| IndexValue::Text(raw.to_string())),
        }
    }

    fn tag(&self) -> char {
        match self {
            IndexValue::Bool(_) => 'b',
            IndexValue::Int(_) => 'i',
            IndexValue::Text(_) => 't',
        }
    }

    pub(crate) fn same_kind(&self, other: &IndexValue) -> bool {
        self.tag() == other.tag()
    }

    fn encode(&self) -> String {
        match self {
            IndexValue::Bool(b) => format!("b{}", u8::from(*b)),
            // Flip the sign bit so negative numbers sort first
            IndexValue::Int(n) => format!("i{:016x}", (*n as u64) ^ (1 << 63)),
            IndexValue::Text(s) => format!("t{s}"),
        }
    }
}

impl From<bool> for IndexValue {
    fn from(value: bool) -> Self {
        IndexValue::Bool(value)
    }
}

impl From<i64> for IndexValue {
    fn from(value: i64) -> Self {
        IndexValue::Int(value)
    }
}

impl From<&str> for IndexValue {
    fn from(value: &str) -> Self {
        IndexValue::Text(value.to_string())
    }
}

impl From<String> for IndexValue {
    fn from(value: String) -> Self {
        IndexValue::Text(value)
    }
}

/// Compare two records by a field; records missing the field sort last
pub(crate) fn compare_by_field(a: &Value, b: &Value, field: &str) -> Ordering {
    let a = a.get(field).and_then(IndexValue::from_json);
    let b = b.get(field).and_then(IndexValue::from_json);
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn entry_key(field: &str, value: &IndexValue, id: &str) -> String {
    format!("{field}{SEP}{}{SEP}{id}", value.encode())
}

/// Bounds covering every entry with exactly `value`
pub(crate) fn eq_bounds(field: &str, value: &IndexValue) -> (String, String) {
    let encoded = value.encode();
    (
        format!("{field}{SEP}{encoded}{SEP}"),
        format!("{field}{SEP}{encoded}{SEP_NEXT}"),
    )
}

/// Bounds covering `from <= value <= to`. Open ends stay within the
/// kind of the bound that is present.
pub(crate) fn range_bounds(
    field: &str,
    from: Option<&IndexValue>,
    to: Option<&IndexValue>,
) -> (String, String) {
    let kind = from.or(to).map_or('t', IndexValue::tag);
    let lower = match from {
        Some(v) => format!("{field}{SEP}{}{SEP}", v.encode()),
        None => format!("{field}{SEP}{kind}"),
    };
    let upper = match to {
        Some(v) => format!("{field}{SEP}{}{SEP_NEXT}", v.encode()),
        None => format!("{field}{SEP}{}", char::from(kind as u8 + 1)),
    };
    (lower, upper)
}

/// Document id stored at the tail of an index key
pub(crate) fn id_from_key(key: &str) -> Option<&str> {
    key.rsplit(SEP).next()
}

/// Replace the index entries of one document.
///
/// `old` is the stored version (if any), `new` the version being written
/// (`None` on delete).
pub(crate) fn reindex(
    table: &mut Table<'_, &'static str, ()>,
    collection: Collection,
    id: &str,
    old: Option<&Value>,
    new: Option<&Value>,
) -> SyncResult<()> {
    for field in collection.indexes() {
        let old_value = old.and_then(|v| v.get(*field)).and_then(IndexValue::from_json);
        let new_value = new.and_then(|v| v.get(*field)).and_then(IndexValue::from_json);
        if old_value == new_value && old.is_some() && new.is_some() {
            continue;
        }
        if let Some(value) = old_value {
            table.remove(entry_key(field, &value, id).as_str())?;
        }
        if let Some(value) = new_value {
            table.insert(entry_key(field, &value, id).as_str(), ())?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_int_encoding_preserves_order() {
        let values = [i64::MIN, -1000, -1, 0, 1, 42, 1_700_000_000_000, i64::MAX];
        let encoded: Vec<_> = values.iter().map(|v| IndexValue::Int(*v).encode()).collect();
        let mut sorted = encoded.clone();
        sorted.sort();
        assert_eq!(encoded, sorted);
    }

    #[test]
    fn test_from_json_skips_non_scalars() {
        assert_eq!(IndexValue::from_json(&json!(true)), Some(IndexValue::Bool(true)));
        assert_eq!(IndexValue::from_json(&json!(7)), Some(IndexValue::Int(7)));
        assert_eq!(IndexValue::from_json(&json!("a")), Some(IndexValue::Text("a".into())));
        assert_eq!(IndexValue::from_json(&json!(1.5)), None);
        assert_eq!(IndexValue::from_json(&json!(null)), None);
        assert_eq!(IndexValue::from_json(&json!(["a"])), None);
    }

    #[test]
    fn test_parse_literal() {
        assert_eq!(IndexValue::parse_literal("true"), IndexValue::Bool(true));
        assert_eq!(IndexValue::parse_literal("-3"), IndexValue::Int(-3));
        assert_eq!(
            IndexValue::parse_literal("2026-10-16"),
            IndexValue::Text("2026-10-16".into())
        );
    }

    #[test]
    fn test_eq_bounds_contain_only_exact_value() {
        let (lo, hi) = eq_bounds("date", &IndexValue::from("2026-10"));
        let exact = entry_key("date", &IndexValue::from("2026-10"), "a");
        let longer = entry_key("date", &IndexValue::from("2026-10-01"), "a");
        assert!(lo.as_str() <= exact.as_str() && exact.as_str() < hi.as_str());
        assert!(!(lo.as_str() <= longer.as_str() && longer.as_str() < hi.as_str()));
    }

    #[test]
    fn test_range_bounds_are_inclusive() {
        let from = IndexValue::from("2026-10-01");
        let to = IndexValue::from("2026-10-31");
        let (lo, hi) = range_bounds("date", Some(&from), Some(&to));

        let inside = |d: &str| {
            let key = entry_key("date", &IndexValue::from(d), "x");
            lo.as_str() <= key.as_str() && key.as_str() < hi.as_str()
        };
        assert!(inside("2026-10-01"));
        assert!(inside("2026-10-15"));
        assert!(inside("2026-10-31"));
        assert!(!inside("2026-09-30"));
        assert!(!inside("2026-11-01"));
    }

    #[test]
    fn test_open_range_stays_within_kind() {
        let (lo, hi) = range_bounds("createdAt", Some(&IndexValue::Int(10)), None);
        let int_key = entry_key("createdAt", &IndexValue::Int(99), "x");
        let text_key = entry_key("createdAt", &IndexValue::from("99"), "x");
        assert!(lo.as_str() <= int_key.as_str() && int_key.as_str() < hi.as_str());
        assert!(!(lo.as_str() <= text_key.as_str() && text_key.as_str() < hi.as_str()));
    }

    #[test]
    fn test_id_from_key() {
        let key = entry_key("userId", &IndexValue::from("u1"), "t1");
        assert_eq!(id_from_key(&key), Some("t1"));
    }

    #[test]
    fn test_compare_missing_sorts_last() {
        let a = json!({"date": "2026-01-01"});
        let b = json!({});
        assert_eq!(compare_by_field(&a, &b, "date"), Ordering::Less);
    }
}
