// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Tolerant value equality.
//!
//! Local rows and remote documents rarely agree byte-for-byte: amounts pass
//! through floating point, nested lists live as JSON text in SQLite, and
//! integers come back as floats. [`values_equal`] looks through those
//! representation differences.
//!
//! | a | b | rule |
//! |---|---|------|
//! | null | null | equal |
//! | null | anything | unequal |
//! | number | number | `|a - b| < 0.001` |
//! | list | list | same length, pairwise equal, in order |
//! | map | map | same keys, equal values |
//! | text | text | parse both as JSON; if both parse compare parsed, else literal |
//! | otherwise | | literal |

use serde_json::Value;

/// Absolute tolerance for numeric comparison.
pub const NUMERIC_TOLERANCE: f64 = 0.001;

/// Compare two optional values; a missing value is treated as null.
pub fn optional_values_equal(a: Option<&Value>, b: Option<&Value>) -> bool {
    values_equal(a.unwrap_or(&Value::Null), b.unwrap_or(&Value::Null))
}

/// Tolerant equality over JSON values.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => (x - y).abs() < NUMERIC_TOLERANCE,
            _ => x == y,
        },
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(l, r)| values_equal(l, r))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(k, v)| y.get(k).map(|w| values_equal(v, w)).unwrap_or(false))
        }
        (Value::String(x), Value::String(y)) => text_equal(x, y),
        _ => a == b,
    }
}

fn text_equal(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    match (parse_structured(a), parse_structured(b)) {
        (Some(x), Some(y)) => values_equal(&x, &y),
        _ => false,
    }
}

/// Parse text as JSON. Failures are a normal outcome, not an error.
fn parse_structured(text: &str) -> Option<Value> {
    serde_json::from_str::<Value>(text).ok()
}
