use std::cmp::Ordering;

use arrears_protocol::{Comparison, Filter, Order, Row};
use chrono::{DateTime, FixedOffset};
use serde_json::Value;

/// Orders two JSON values the way a relational backend would compare two
/// columns of the same type. RFC 3339 strings compare as instants, so
/// `2024-01-01T01:00:00+01:00` equals `2024-01-01T00:00:00Z`.
///
/// Returns `None` for values of unrelated types.
pub fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Bool(l), Value::Bool(r)) => Some(l.cmp(r)),
        (Value::Number(l), Value::Number(r)) => match (l.as_i64(), r.as_i64()) {
            (Some(l), Some(r)) => Some(l.cmp(&r)),
            _ => l.as_f64()?.partial_cmp(&r.as_f64()?),
        },
        (Value::String(l), Value::String(r)) => match (instant(l), instant(r)) {
            (Some(l), Some(r)) => Some(l.cmp(&r)),
            _ => Some(l.cmp(r)),
        },
        _ => None,
    }
}

fn instant(value: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(value).ok()
}

fn matches(row: &Row, filter: &Filter) -> bool {
    let column = row.get(&filter.column).unwrap_or(&Value::Null);
    let ordering = compare_values(column, &filter.value);
    match filter.op {
        Comparison::Eq => ordering == Some(Ordering::Equal),
        Comparison::Ne => ordering != Some(Ordering::Equal),
        Comparison::Gt => ordering == Some(Ordering::Greater),
        Comparison::Gte => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
        Comparison::Lt => ordering == Some(Ordering::Less),
        Comparison::Lte => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
        Comparison::Contains => contains(column, &filter.value),
    }
}

fn contains(column: &Value, needle: &Value) -> bool {
    match (column, needle) {
        (Value::String(haystack), Value::String(needle)) => haystack
            .to_lowercase()
            .contains(&needle.to_lowercase()),
        (Value::Array(items), needle) => items
            .iter()
            .any(|item| compare_values(item, needle) == Some(Ordering::Equal)),
        _ => false,
    }
}

/// True when the row satisfies every filter (an empty list matches all rows).
pub fn matches_all(row: &Row, filters: &[Filter]) -> bool {
    filters.iter().all(|filter| matches(row, filter))
}

/// Position of a value's kind in the sort order. Timestamps sort ahead of
/// other strings so that instant and lexical comparison never mix.
fn sort_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(s) if instant(s).is_some() => 3,
        Value::String(_) => 4,
        Value::Array(_) => 5,
        Value::Object(_) => 6,
    }
}

/// Total order over column values: kinds by [`sort_rank`], then values
/// within a kind. Arrays and objects tie.
fn sort_cmp(left: &Value, right: &Value) -> Ordering {
    let by_rank = sort_rank(left).cmp(&sort_rank(right));
    if by_rank != Ordering::Equal {
        return by_rank;
    }
    match (left, right) {
        (Value::Number(l), Value::Number(r)) => match (l.as_i64(), r.as_i64()) {
            (Some(l), Some(r)) => l.cmp(&r),
            _ => match (l.as_u64(), r.as_u64()) {
                (Some(l), Some(r)) => l.cmp(&r),
                _ => l
                    .as_f64()
                    .unwrap_or(f64::NAN)
                    .total_cmp(&r.as_f64().unwrap_or(f64::NAN)),
            },
        },
        _ => compare_values(left, right).unwrap_or(Ordering::Equal),
    }
}

pub(crate) fn sort_rows(rows: &mut [Row], column: &str, order: Order) {
    rows.sort_by(|left, right| {
        let ordering = sort_cmp(
            left.get(column).unwrap_or(&Value::Null),
            right.get(column).unwrap_or(&Value::Null),
        );
        match order {
            Order::Asc => ordering,
            Order::Desc => ordering.reverse(),
        }
    });
}
