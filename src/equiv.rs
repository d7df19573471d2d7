//! Wire equivalence.
//!
//! Decides whether two containers represent the same logical message regardless of which of
//! the valid wire encodings each scalar used: booleans as `true`/`false` or `1`/`0`, 64-bit
//! integers as numbers or decimal strings, non-finite doubles as numbers or sentinel
//! strings. The walk operates on raw arrays only — it never consults the storage kernel or
//! the coercion codecs, and the handful of conversion rules it needs are duplicated here so
//! this module stays independent of container shape.

use std::rc::Rc;

use crate::value::{SharedArr, SharedBucket, Value};

/// Whether two values are wire-equivalent. Arrays compare as containers.
pub fn equivalent(a: &Value, b: &Value) -> bool {
    values_equivalent(a, b)
}

/// Whether two backing arrays are wire-equivalent.
///
/// The field walk is one-directional, so it runs both ways: one side may carry an extension
/// bucket whose keys lie outside the other's visible range, and a single pass would miss
/// fields present only in the second container's bucket.
pub fn arrays_equivalent(a: &SharedArr, b: &SharedArr) -> bool {
    Rc::ptr_eq(a, b) || (one_way(a, b) && one_way(b, a))
}

/// Check that every field visible in `a` has an equivalent counterpart in `b`.
fn one_way(a: &SharedArr, b: &SharedArr) -> bool {
    let a_ref = a.borrow();
    let b_ref = b.borrow();
    let (a_main_len, a_bucket) = split(&a_ref);
    let (b_main_len, b_bucket) = split(&b_ref);

    for (i, va) in a_ref[..a_main_len].iter().enumerate() {
        let vb = lookup(&b_ref, b_main_len, b_bucket.as_ref(), i as u32);
        if !values_equivalent(va, vb.as_ref().unwrap_or(&Value::Null)) {
            return false;
        }
    }
    if let Some(a_bucket) = a_bucket {
        for (k, va) in a_bucket.borrow().iter() {
            let vb = lookup(&b_ref, b_main_len, b_bucket.as_ref(), *k);
            if !values_equivalent(va, vb.as_ref().unwrap_or(&Value::Null)) {
                return false;
            }
        }
    }
    true
}

/// Main sequence length and trailing bucket, if the last slot is one.
fn split(arr: &[Value]) -> (usize, Option<SharedBucket>) {
    match arr.last() {
        Some(Value::Ext(bucket)) => (arr.len() - 1, Some(bucket.clone())),
        _ => (arr.len(), None),
    }
}

/// Find the counterpart for a slot key: the main sequence while the key is in range, the
/// bucket beyond it, nothing if there is no bucket.
fn lookup(
    arr: &[Value],
    main_len: usize,
    bucket: Option<&SharedBucket>,
    key: u32,
) -> Option<Value> {
    if (key as usize) < main_len {
        Some(arr[key as usize].clone())
    } else {
        bucket.and_then(|b| b.borrow().get(&key).cloned())
    }
}

/// Value comparison. The precedence order is load-bearing: arrays before scalars (nested
/// messages and repeated fields share the sparse-array shape), NaN before booleans, and the
/// truthiness check before falling through to failure.
fn values_equivalent(a: &Value, b: &Value) -> bool {
    if a.is_null() && b.is_null() {
        return true;
    }
    if a.is_arr() || b.is_arr() {
        return match (a, b) {
            (Value::Arr(a), Value::Arr(b)) => arrays_equivalent(a, b),
            _ => false,
        };
    }
    // Objects never appear as leaf values; a bucket only matches positionally.
    if a.is_ext() || b.is_ext() {
        return false;
    }
    if loose_eq(a, b) {
        return true;
    }
    if is_nan(a) || is_nan(b) {
        return display(a) == display(b);
    }
    if a.is_bool() || b.is_bool() {
        return truthy(a) == truthy(b);
    }
    false
}

fn is_nan(v: &Value) -> bool {
    matches!(v, Value::Num(n) if n.is_nan())
}

/// Host loose equality over the scalar shapes: strings compare exactly against strings,
/// booleans drop to numbers, and a number-string pair converts the string.
fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::Bool(x), _) => loose_eq(&Value::Num(if *x { 1.0 } else { 0.0 }), b),
        (_, Value::Bool(y)) => loose_eq(a, &Value::Num(if *y { 1.0 } else { 0.0 })),
        (Value::Num(x), Value::Num(y)) => x == y,
        (Value::Num(x), Value::Str(y)) => *x == str_num(y),
        (Value::Str(x), Value::Num(y)) => str_num(x) == *y,
        _ => false,
    }
}

fn str_num(s: &str) -> f64 {
    let t = s.trim();
    if t.is_empty() {
        return 0.0;
    }
    if let Some(hex) = t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
        return match u64::from_str_radix(hex, 16) {
            Ok(v) => v as f64,
            Err(_) => f64::NAN,
        };
    }
    t.parse::<f64>().unwrap_or(f64::NAN)
}

fn display(v: &Value) -> String {
    match v {
        Value::Null => "null".to_string(),
        Value::Bool(b) => if *b { "true" } else { "false" }.to_string(),
        Value::Num(n) => {
            if n.is_nan() {
                "NaN".to_string()
            } else if n.is_infinite() {
                if *n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
            } else if *n == 0.0 {
                "0".to_string()
            } else if n.fract() == 0.0 && n.abs() <= 9007199254740992.0 {
                format!("{}", *n as i64)
            } else {
                format!("{}", n)
            }
        }
        Value::Str(s) => s.clone(),
        Value::Arr(_) | Value::Ext(_) => String::new(),
    }
}

fn truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Num(n) => *n != 0.0 && !n.is_nan(),
        Value::Str(s) => !s.is_empty(),
        Value::Arr(_) | Value::Ext(_) => true,
    }
}
