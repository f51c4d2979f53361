//! Structural equality for JSON-shaped rows.
//!
//! Live queries suppress no-op notifications by comparing the freshly
//! fetched result against the previous one. `serde_json::Value` already
//! implements `PartialEq`, but its float comparison follows IEEE semantics
//! where `NaN != NaN`; a row containing a NaN column would then re-notify on
//! every refetch. This module provides the comparison the reactive layer
//! needs: deep, order-sensitive for arrays, key-set based for objects, and
//! treating two NaN values as equal.

use serde_json::Value;

/// Deep structural equality over JSON values.
///
/// Arrays compare by length and element-wise recursion. Objects compare by
/// identical key sets with recursive values. Numbers compare equal when both
/// are the same integer, or both are floats that are equal or both NaN.
/// The data domain is JSON-shaped rows; dates, maps and the like never
/// appear here.
pub fn structural_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => {
            if let (Some(xi), Some(yi)) = (x.as_i64(), y.as_i64()) {
                return xi == yi;
            }
            if let (Some(xu), Some(yu)) = (x.as_u64(), y.as_u64()) {
                return xu == yu;
            }
            match (x.as_f64(), y.as_f64()) {
                (Some(xf), Some(yf)) => xf == yf || (xf.is_nan() && yf.is_nan()),
                _ => false,
            }
        }
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y.iter()).all(|(xv, yv)| structural_eq(xv, yv))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter().all(|(key, xv)| match y.get(key) {
                    Some(yv) => structural_eq(xv, yv),
                    None => false,
                })
        }
        _ => false,
    }
}
