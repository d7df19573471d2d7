//! The wire slot representation.
//!
//! A container slot holds exactly one of the shapes a JSON-array-shaped message can carry:
//! nothing, a boolean, a double, a string, a nested array (sub-message, repeated field, or
//! map entry list), or the trailing extension bucket object. Arrays and buckets are shared,
//! interiorly mutable handles: cloning a [`Value`] aliases the same underlying storage, the
//! reference semantics the container model assumes. The crate is single-threaded by design,
//! so `Rc`/`RefCell` is the sharing discipline.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use serde::de::{self, Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

/// Shared handle to a container or repeated-field backing array.
pub type SharedArr = Rc<RefCell<Vec<Value>>>;

/// Shared handle to an extension bucket, keyed by unadjusted field number.
pub type SharedBucket = Rc<RefCell<BTreeMap<u32, Value>>>;

/// Largest double that still holds every smaller integer exactly (2^53).
pub const MAX_SAFE_INTEGER: f64 = 9007199254740992.0;

#[derive(Clone, Debug)]
pub enum Value {
    Null,
    Bool(bool),
    Num(f64),
    Str(String),
    Arr(SharedArr),
    Ext(SharedBucket),
}

impl Value {
    /// Wrap a plain vector in a fresh shared array handle.
    pub fn arr(values: Vec<Value>) -> Value {
        Value::Arr(Rc::new(RefCell::new(values)))
    }

    /// Wrap a plain map in a fresh extension bucket handle.
    pub fn ext(map: BTreeMap<u32, Value>) -> Value {
        Value::Ext(Rc::new(RefCell::new(map)))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_bool(&self) -> bool {
        matches!(self, Value::Bool(_))
    }

    pub fn is_num(&self) -> bool {
        matches!(self, Value::Num(_))
    }

    pub fn is_str(&self) -> bool {
        matches!(self, Value::Str(_))
    }

    pub fn is_arr(&self) -> bool {
        matches!(self, Value::Arr(_))
    }

    pub fn is_ext(&self) -> bool {
        matches!(self, Value::Ext(_))
    }

    pub fn as_bool(&self) -> Option<bool> {
        if let Value::Bool(v) = *self {
            Some(v)
        } else {
            None
        }
    }

    pub fn as_num(&self) -> Option<f64> {
        if let Value::Num(v) = *self {
            Some(v)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        if let Value::Str(ref v) = *self {
            Some(v)
        } else {
            None
        }
    }

    pub fn as_arr(&self) -> Option<&SharedArr> {
        if let Value::Arr(ref v) = *self {
            Some(v)
        } else {
            None
        }
    }

    pub fn as_ext(&self) -> Option<&SharedBucket> {
        if let Value::Ext(ref v) = *self {
            Some(v)
        } else {
            None
        }
    }

    /// Short name of the shape, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Num(_) => "number",
            Value::Str(_) => "string",
            Value::Arr(_) => "array",
            Value::Ext(_) => "object",
        }
    }
}

/// Structural equality: arrays and buckets compare by content, numbers by IEEE equality.
/// This is *not* the wire equivalence relation; see [`crate::equivalent`] for that.
impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Num(a), Value::Num(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Arr(a), Value::Arr(b)) => Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            (Value::Ext(a), Value::Ext(b)) => Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            _ => false,
        }
    }
}

macro_rules! impl_from_num {
    ($t: ty) => {
        impl From<$t> for Value {
            fn from(n: $t) -> Self {
                Value::Num(n as f64)
            }
        }
    };
}

impl_from_num!(u8);
impl_from_num!(u16);
impl_from_num!(u32);
impl_from_num!(i8);
impl_from_num!(i16);
impl_from_num!(i32);
impl_from_num!(f32);
impl_from_num!(f64);

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::arr(v)
    }
}

/// Host ToNumber. Containers aren't numeric here; they convert to NaN.
pub fn to_number(v: &Value) -> f64 {
    match v {
        Value::Null => 0.0,
        Value::Bool(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        Value::Num(n) => *n,
        Value::Str(s) => str_to_number(s),
        Value::Arr(_) | Value::Ext(_) => f64::NAN,
    }
}

/// Host string-to-number: empty is zero, hex literals are honored, anything unparseable
/// is NaN.
pub fn str_to_number(s: &str) -> f64 {
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

/// Host ToString, including the `NaN`/`Infinity` sentinel spellings.
pub fn to_display(v: &Value) -> String {
    match v {
        Value::Null => "null".to_string(),
        Value::Bool(b) => if *b { "true" } else { "false" }.to_string(),
        Value::Num(n) => format_number(*n),
        Value::Str(s) => s.clone(),
        Value::Arr(a) => {
            let a = a.borrow();
            let mut out = String::new();
            for (i, v) in a.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                if !v.is_null() {
                    out.push_str(&to_display(v));
                }
            }
            out
        }
        Value::Ext(_) => "[object Object]".to_string(),
    }
}

/// Number-to-string in the host spelling: no trailing `.0` on integral values, `NaN` and
/// `Infinity` spelled out, negative zero collapsed to `0`.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }
    if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
        return format!("{}", n as i64);
    }
    format!("{}", n)
}

/// Host truthiness.
pub fn truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Num(n) => *n != 0.0 && !n.is_nan(),
        Value::Str(s) => !s.is_empty(),
        Value::Arr(_) | Value::Ext(_) => true,
    }
}

/// Host ToInt32: truncate toward zero, wrap modulo 2^32, reinterpret as signed.
pub fn to_int32(n: f64) -> i32 {
    to_uint32(n) as i32
}

/// Host ToUint32: truncate toward zero, wrap modulo 2^32.
pub fn to_uint32(n: f64) -> u32 {
    if !n.is_finite() || n == 0.0 {
        return 0;
    }
    let m = n.trunc().rem_euclid(4294967296.0);
    m as u32
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            // JSON has no non-finite literals; those render as their sentinel strings so
            // the round trip stays within the wire equivalence relation.
            Value::Num(n) => {
                if !n.is_finite() {
                    serializer.serialize_str(&format_number(*n))
                } else if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
                    serializer.serialize_i64(*n as i64)
                } else {
                    serializer.serialize_f64(*n)
                }
            }
            Value::Str(s) => serializer.serialize_str(s),
            Value::Arr(a) => {
                let a = a.borrow();
                let mut seq = serializer.serialize_seq(Some(a.len()))?;
                for v in a.iter() {
                    seq.serialize_element(v)?;
                }
                seq.end()
            }
            Value::Ext(b) => {
                let b = b.borrow();
                let mut map = serializer.serialize_map(Some(b.len()))?;
                for (k, v) in b.iter() {
                    map.serialize_entry(&k.to_string(), v)?;
                }
                map.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct ValueVisitor;

        impl<'de> Visitor<'de> for ValueVisitor {
            type Value = Value;

            fn expecting(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(fmt, "a JSON container value")
            }

            fn visit_unit<E: de::Error>(self) -> Result<Value, E> {
                Ok(Value::Null)
            }

            fn visit_bool<E: de::Error>(self, v: bool) -> Result<Value, E> {
                Ok(Value::Bool(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Value, E> {
                Ok(Value::Num(v as f64))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Value, E> {
                Ok(Value::Num(v as f64))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Value, E> {
                Ok(Value::Num(v))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Value, E> {
                Ok(Value::Str(v.to_string()))
            }

            fn visit_string<E: de::Error>(self, v: String) -> Result<Value, E> {
                Ok(Value::Str(v))
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Value, A::Error> {
                let mut values = Vec::with_capacity(seq.size_hint().unwrap_or(0));
                while let Some(v) = seq.next_element()? {
                    values.push(v);
                }
                Ok(Value::arr(values))
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Value, A::Error> {
                let mut bucket = BTreeMap::new();
                while let Some((key, value)) = map.next_entry::<String, Value>()? {
                    let field: u32 = key.parse().map_err(|_| {
                        de::Error::invalid_value(
                            de::Unexpected::Str(&key),
                            &"a decimal field number key",
                        )
                    })?;
                    bucket.insert(field, value);
                }
                Ok(Value::ext(bucket))
            }
        }

        deserializer.deserialize_any(ValueVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_formatting() {
        assert_eq!(format_number(0.0), "0");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(1.0), "1");
        assert_eq!(format_number(-17.0), "-17");
        assert_eq!(format_number(1.5), "1.5");
        assert_eq!(format_number(f64::NAN), "NaN");
        assert_eq!(format_number(f64::INFINITY), "Infinity");
        assert_eq!(format_number(f64::NEG_INFINITY), "-Infinity");
    }

    #[test]
    fn string_to_number() {
        assert_eq!(str_to_number(""), 0.0);
        assert_eq!(str_to_number("  42  "), 42.0);
        assert_eq!(str_to_number("-1.5e3"), -1500.0);
        assert_eq!(str_to_number("0x10"), 16.0);
        assert_eq!(str_to_number("Infinity"), f64::INFINITY);
        assert!(str_to_number("pelican").is_nan());
    }

    #[test]
    fn int32_wrapping() {
        assert_eq!(to_int32(0.0), 0);
        assert_eq!(to_int32(-1.0), -1);
        assert_eq!(to_int32(2147483648.0), -2147483648);
        assert_eq!(to_int32(4294967296.0), 0);
        assert_eq!(to_int32(4294967297.0), 1);
        assert_eq!(to_int32(f64::NAN), 0);
        assert_eq!(to_int32(f64::INFINITY), 0);
        assert_eq!(to_int32(1.9), 1);
        assert_eq!(to_int32(-1.9), -1);

        assert_eq!(to_uint32(-1.0), 4294967295);
        assert_eq!(to_uint32(-2147483648.0), 2147483648);
    }

    #[test]
    fn shared_array_aliases_on_clone() {
        let a = Value::arr(vec![Value::Num(1.0)]);
        let b = a.clone();
        if let (Value::Arr(a), Value::Arr(b)) = (&a, &b) {
            a.borrow_mut().push(Value::Num(2.0));
            assert_eq!(b.borrow().len(), 2);
        } else {
            unreachable!();
        }
    }

    #[test]
    fn json_round_trip() {
        let v = Value::arr(vec![
            Value::Bool(true),
            Value::Str("hello".to_string()),
            Value::Null,
            Value::Num(3.0),
        ]);
        let text = serde_json::to_string(&v).unwrap();
        assert_eq!(text, r#"[true,"hello",null,3]"#);
        let back: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(back, v);
    }

    #[test]
    fn bucket_serializes_with_decimal_keys() {
        let mut map = BTreeMap::new();
        map.insert(500u32, Value::Str("x".to_string()));
        let v = Value::arr(vec![Value::Num(1.0), Value::ext(map)]);
        let text = serde_json::to_string(&v).unwrap();
        assert_eq!(text, r#"[1,{"500":"x"}]"#);
        let back: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(back, v);
    }

    #[test]
    fn non_finite_serializes_as_sentinel() {
        let v = Value::arr(vec![Value::Num(f64::NAN), Value::Num(f64::NEG_INFINITY)]);
        let text = serde_json::to_string(&v).unwrap();
        assert_eq!(text, r#"["NaN","-Infinity"]"#);
    }
}
