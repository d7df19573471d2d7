//! Wire value coercion.
//!
//! Converts between strongly-typed program values and their wire slot representations. Each
//! scalar wire type gets one [`WireCodec`] implementation; the storage kernel routes every
//! typed field operation through exactly one of these. The wire format allows more than one
//! encoding for several types (booleans as `1`/`0`, 64-bit integers as decimal strings,
//! non-finite doubles as sentinel strings), so `decode` accepts every valid form and
//! normalizes, while `encode` always writes the canonical form.
//!
//! Every codec is dual-mode: with type checks on, invalid representations raise
//! [`Error::BadValue`]; with them off, inputs are coerced best-effort and reads never fail.

use num_traits::cast::cast;

use crate::bytes::ByteData;
use crate::error::{Error, Result};
use crate::policy::Policy;
use crate::value::{
    self, str_to_number, to_display, to_int32, to_number, to_uint32, truthy, Value,
    MAX_SAFE_INTEGER,
};

/// One wire scalar type: slot representation on one side, program value on the other.
pub trait WireCodec {
    type Value: Clone;

    /// Wire type name, for error messages.
    const NAME: &'static str;

    /// Read a slot representation into the program value, normalizing across the accepted
    /// wire encodings.
    fn decode(raw: &Value, policy: Policy) -> Result<Self::Value>;

    /// Produce the canonical slot representation. Fallible only for the double-safe 64-bit
    /// variants, which refuse lossy values when data-loss checks are on.
    fn encode(value: Self::Value, policy: Policy) -> Result<Value>;

    /// The proto3 "is default" predicate for this type.
    fn is_default(value: &Self::Value) -> bool;

    /// The type's zero value, returned for unchecked out-of-bounds element reads.
    fn zero() -> Self::Value;
}

// Double-safe bounds in the integer domain. Casting to f64 before comparing would round
// 2^53 + 1 down to 2^53 and miss the loss.
const MAX_SAFE_I64: i64 = 1 << 53;
const MIN_SAFE_I64: i64 = -(1 << 53);
const MAX_SAFE_U64: u64 = 1 << 53;

fn bad(expected: &'static str, raw: &Value) -> Error {
    Error::BadValue {
        expected,
        actual: match raw {
            Value::Str(s) => format!("{:?}", s),
            other => to_display(other),
        },
    }
}

pub struct BoolCodec;

impl WireCodec for BoolCodec {
    type Value = bool;
    const NAME: &'static str = "boolean";

    fn decode(raw: &Value, policy: Policy) -> Result<bool> {
        if !policy.type_checks {
            return Ok(truthy(raw));
        }
        match raw {
            Value::Bool(b) => Ok(*b),
            Value::Num(n) if *n == 1.0 => Ok(true),
            Value::Num(n) if *n == 0.0 => Ok(false),
            other => Err(bad(Self::NAME, other)),
        }
    }

    fn encode(value: bool, _policy: Policy) -> Result<Value> {
        Ok(Value::Bool(value))
    }

    fn is_default(value: &bool) -> bool {
        !*value
    }

    fn zero() -> bool {
        false
    }
}

fn decode_i32(raw: &Value, policy: Policy, name: &'static str) -> Result<i32> {
    if !policy.type_checks {
        return Ok(to_int32(to_number(raw)));
    }
    match raw {
        Value::Num(n) if n.fract() == 0.0 => cast(*n).ok_or_else(|| bad(name, raw)),
        other => Err(bad(name, other)),
    }
}

pub struct Int32Codec;

impl WireCodec for Int32Codec {
    type Value = i32;
    const NAME: &'static str = "int32";

    fn decode(raw: &Value, policy: Policy) -> Result<i32> {
        decode_i32(raw, policy, Self::NAME)
    }

    fn encode(value: i32, _policy: Policy) -> Result<Value> {
        Ok(Value::Num(value as f64))
    }

    fn is_default(value: &i32) -> bool {
        *value == 0
    }

    fn zero() -> i32 {
        0
    }
}

pub struct Uint32Codec;

impl WireCodec for Uint32Codec {
    type Value = u32;
    const NAME: &'static str = "uint32";

    /// The slot may hold either sign; the low 32 bits are reinterpreted as unsigned on
    /// read, so a stored `-1` surfaces as `4294967295`.
    fn decode(raw: &Value, policy: Policy) -> Result<u32> {
        if !policy.type_checks {
            return Ok(to_uint32(to_number(raw)));
        }
        match raw {
            Value::Num(n)
                if n.fract() == 0.0 && *n >= -2147483648.0 && *n < 4294967296.0 =>
            {
                Ok(to_uint32(*n))
            }
            other => Err(bad(Self::NAME, other)),
        }
    }

    fn encode(value: u32, _policy: Policy) -> Result<Value> {
        Ok(Value::Num(value as f64))
    }

    fn is_default(value: &u32) -> bool {
        *value == 0
    }

    fn zero() -> u32 {
        0
    }
}

fn decode_i64(raw: &Value, policy: Policy, name: &'static str) -> Result<i64> {
    match raw {
        Value::Num(n) => {
            if policy.type_checks && (n.fract() != 0.0 || n.abs() > MAX_SAFE_INTEGER) {
                return Err(bad(name, raw));
            }
            Ok(n.trunc() as i64)
        }
        Value::Str(s) => match s.parse::<i64>() {
            Ok(v) => Ok(v),
            Err(_) if policy.type_checks => Err(bad(name, raw)),
            Err(_) => Ok(str_to_number(s).trunc() as i64),
        },
        other if policy.type_checks => Err(bad(name, other)),
        other => Ok(to_number(other).trunc() as i64),
    }
}

fn decode_u64(raw: &Value, policy: Policy, name: &'static str) -> Result<u64> {
    match raw {
        Value::Num(n) => {
            if policy.type_checks && (n.fract() != 0.0 || *n < 0.0 || *n > MAX_SAFE_INTEGER) {
                return Err(bad(name, raw));
            }
            Ok(n.trunc() as u64)
        }
        Value::Str(s) => match s.parse::<u64>() {
            Ok(v) => Ok(v),
            Err(_) if policy.type_checks => Err(bad(name, raw)),
            Err(_) => Ok(str_to_number(s).trunc() as u64),
        },
        other if policy.type_checks => Err(bad(name, other)),
        other => Ok(to_number(other).trunc() as u64),
    }
}

pub struct Int64Codec;

impl WireCodec for Int64Codec {
    type Value = i64;
    const NAME: &'static str = "int64";

    fn decode(raw: &Value, policy: Policy) -> Result<i64> {
        decode_i64(raw, policy, Self::NAME)
    }

    /// Numeric form is chosen whenever the value survives a double round trip; only values
    /// beyond the safe range ride as decimal strings.
    fn encode(value: i64, _policy: Policy) -> Result<Value> {
        if (MIN_SAFE_I64..=MAX_SAFE_I64).contains(&value) {
            Ok(Value::Num(value as f64))
        } else {
            Ok(Value::Str(value.to_string()))
        }
    }

    fn is_default(value: &i64) -> bool {
        *value == 0
    }

    fn zero() -> i64 {
        0
    }
}

pub struct Uint64Codec;

impl WireCodec for Uint64Codec {
    type Value = u64;
    const NAME: &'static str = "uint64";

    fn decode(raw: &Value, policy: Policy) -> Result<u64> {
        decode_u64(raw, policy, Self::NAME)
    }

    fn encode(value: u64, _policy: Policy) -> Result<Value> {
        if value <= MAX_SAFE_U64 {
            Ok(Value::Num(value as f64))
        } else {
            Ok(Value::Str(value.to_string()))
        }
    }

    fn is_default(value: &u64) -> bool {
        *value == 0
    }

    fn zero() -> u64 {
        0
    }
}

/// The double-safe signed 64-bit variant: the slot is always numeric, so values outside
/// ±2^53 either fail (data-loss checks on) or silently round-trip through a double.
pub struct Int52Codec;

impl WireCodec for Int52Codec {
    type Value = i64;
    const NAME: &'static str = "int52";

    fn decode(raw: &Value, policy: Policy) -> Result<i64> {
        let v = decode_i64(raw, policy, Self::NAME)?;
        if !(MIN_SAFE_I64..=MAX_SAFE_I64).contains(&v) {
            if policy.data_loss_checks {
                return Err(Error::DataLoss {
                    value: v.to_string(),
                });
            }
            return Ok((v as f64) as i64);
        }
        Ok(v)
    }

    fn encode(value: i64, policy: Policy) -> Result<Value> {
        if !(MIN_SAFE_I64..=MAX_SAFE_I64).contains(&value) && policy.data_loss_checks {
            return Err(Error::DataLoss {
                value: value.to_string(),
            });
        }
        Ok(Value::Num(value as f64))
    }

    fn is_default(value: &i64) -> bool {
        *value == 0
    }

    fn zero() -> i64 {
        0
    }
}

/// The double-safe unsigned 64-bit variant.
pub struct Uint52Codec;

impl WireCodec for Uint52Codec {
    type Value = u64;
    const NAME: &'static str = "uint52";

    fn decode(raw: &Value, policy: Policy) -> Result<u64> {
        let v = decode_u64(raw, policy, Self::NAME)?;
        if v > MAX_SAFE_U64 {
            if policy.data_loss_checks {
                return Err(Error::DataLoss {
                    value: v.to_string(),
                });
            }
            return Ok((v as f64) as u64);
        }
        Ok(v)
    }

    fn encode(value: u64, policy: Policy) -> Result<Value> {
        if value > MAX_SAFE_U64 && policy.data_loss_checks {
            return Err(Error::DataLoss {
                value: value.to_string(),
            });
        }
        Ok(Value::Num(value as f64))
    }

    fn is_default(value: &u64) -> bool {
        *value == 0
    }

    fn zero() -> u64 {
        0
    }
}

fn decode_f64(raw: &Value, policy: Policy, name: &'static str) -> Result<f64> {
    match raw {
        Value::Num(n) => Ok(*n),
        Value::Str(s) => match s.as_str() {
            "NaN" => Ok(f64::NAN),
            "Infinity" => Ok(f64::INFINITY),
            "-Infinity" => Ok(f64::NEG_INFINITY),
            _ if policy.type_checks => Err(bad(name, raw)),
            _ => Ok(str_to_number(s)),
        },
        other if policy.type_checks => Err(bad(name, other)),
        other => Ok(to_number(other)),
    }
}

fn encode_f64(value: f64) -> Value {
    if value.is_finite() {
        Value::Num(value)
    } else {
        Value::Str(value::format_number(value))
    }
}

pub struct DoubleCodec;

impl WireCodec for DoubleCodec {
    type Value = f64;
    const NAME: &'static str = "double";

    fn decode(raw: &Value, policy: Policy) -> Result<f64> {
        decode_f64(raw, policy, Self::NAME)
    }

    /// Non-finite values ride as their sentinel strings; JSON has no literal for them.
    fn encode(value: f64, _policy: Policy) -> Result<Value> {
        Ok(encode_f64(value))
    }

    fn is_default(value: &f64) -> bool {
        *value == 0.0
    }

    fn zero() -> f64 {
        0.0
    }
}

pub struct FloatCodec;

impl WireCodec for FloatCodec {
    type Value = f32;
    const NAME: &'static str = "float";

    fn decode(raw: &Value, policy: Policy) -> Result<f32> {
        Ok(decode_f64(raw, policy, Self::NAME)? as f32)
    }

    fn encode(value: f32, _policy: Policy) -> Result<Value> {
        Ok(encode_f64(value as f64))
    }

    fn is_default(value: &f32) -> bool {
        *value == 0.0
    }

    fn zero() -> f32 {
        0.0
    }
}

pub struct StringCodec;

impl WireCodec for StringCodec {
    type Value = String;
    const NAME: &'static str = "string";

    fn decode(raw: &Value, policy: Policy) -> Result<String> {
        match raw {
            Value::Str(s) => Ok(s.clone()),
            other if policy.type_checks => Err(bad(Self::NAME, other)),
            other => Ok(to_display(other)),
        }
    }

    fn encode(value: String, _policy: Policy) -> Result<Value> {
        Ok(Value::Str(value))
    }

    fn is_default(value: &String) -> bool {
        value.is_empty()
    }

    fn zero() -> String {
        String::new()
    }
}

pub struct BytesCodec;

impl WireCodec for BytesCodec {
    type Value = ByteData;
    const NAME: &'static str = "bytes";

    /// Strict mode validates the base64 up front; lenient mode defers the decode to first
    /// byte access.
    fn decode(raw: &Value, policy: Policy) -> Result<ByteData> {
        match raw {
            Value::Str(s) if policy.type_checks => ByteData::from_base64(s),
            Value::Str(s) => Ok(ByteData::from_base64_lazy(s.clone())),
            other if policy.type_checks => Err(bad(Self::NAME, other)),
            _ => Ok(ByteData::default()),
        }
    }

    fn encode(value: ByteData, _policy: Policy) -> Result<Value> {
        Ok(Value::Str(value.to_base64().to_string()))
    }

    fn is_default(value: &ByteData) -> bool {
        value.is_empty()
    }

    fn zero() -> ByteData {
        ByteData::default()
    }
}

/// Open enum: any 32-bit value is representable, known or not.
pub struct EnumCodec;

impl WireCodec for EnumCodec {
    type Value = i32;
    const NAME: &'static str = "enum";

    fn decode(raw: &Value, policy: Policy) -> Result<i32> {
        decode_i32(raw, policy, Self::NAME)
    }

    fn encode(value: i32, _policy: Policy) -> Result<Value> {
        Ok(Value::Num(value as f64))
    }

    fn is_default(value: &i32) -> bool {
        *value == 0
    }

    fn zero() -> i32 {
        0
    }
}
