//! ---
//! fed_section: "02-federate-sync-core"
//! fed_subsection: "module"
//! fed_type: "source"
//! fed_scope: "code"
//! fed_description: "Scalar values and their big-endian wire encoding."
//! fed_version: "v0.0.0-prealpha"
//! fed_owner: "tbd"
//! ---
//! Layout follows the usual basic data representation table:
//!
//! | type      | bytes                                         |
//! |-----------|-----------------------------------------------|
//! | `boolean` | 4-byte big-endian integer, 1 or 0             |
//! | `int32`   | 4-byte big-endian two's complement            |
//! | `int64`   | 8-byte big-endian two's complement            |
//! | `float32` | 4-byte big-endian IEEE 754                    |
//! | `float64` | 8-byte big-endian IEEE 754                    |
//! | `string`  | 4-byte element count, then UTF-16BE code units|

use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use simfed_common::ValueType;
use thiserror::Error;

/// A decoded attribute or parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    Boolean(bool),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Text(String),
}

impl ScalarValue {
    pub fn kind(&self) -> &'static str {
        match self {
            ScalarValue::Boolean(_) => "boolean",
            ScalarValue::Int32(_) => "int32",
            ScalarValue::Int64(_) => "int64",
            ScalarValue::Float32(_) => "float32",
            ScalarValue::Float64(_) => "float64",
            ScalarValue::Text(_) => "string",
        }
    }

    /// Numeric view, if the value is a number.
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            ScalarValue::Int32(v) => Some(f64::from(v)),
            ScalarValue::Int64(v) => Some(v as f64),
            ScalarValue::Float32(v) => Some(f64::from(v)),
            ScalarValue::Float64(v) => Some(v),
            ScalarValue::Boolean(_) | ScalarValue::Text(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ScalarValue::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Boolean(v) => write!(f, "{v}"),
            ScalarValue::Int32(v) => write!(f, "{v}"),
            ScalarValue::Int64(v) => write!(f, "{v}"),
            ScalarValue::Float32(v) => write!(f, "{v}"),
            ScalarValue::Float64(v) => write!(f, "{v}"),
            ScalarValue::Text(v) => f.write_str(v),
        }
    }
}

impl From<bool> for ScalarValue {
    fn from(value: bool) -> Self {
        ScalarValue::Boolean(value)
    }
}

impl From<i32> for ScalarValue {
    fn from(value: i32) -> Self {
        ScalarValue::Int32(value)
    }
}

impl From<i64> for ScalarValue {
    fn from(value: i64) -> Self {
        ScalarValue::Int64(value)
    }
}

impl From<f32> for ScalarValue {
    fn from(value: f32) -> Self {
        ScalarValue::Float32(value)
    }
}

impl From<f64> for ScalarValue {
    fn from(value: f64) -> Self {
        ScalarValue::Float64(value)
    }
}

impl From<String> for ScalarValue {
    fn from(value: String) -> Self {
        ScalarValue::Text(value)
    }
}

impl From<&str> for ScalarValue {
    fn from(value: &str) -> Self {
        ScalarValue::Text(value.to_owned())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("a {found} value cannot be encoded as {expected}")]
    TypeMismatch {
        expected: ValueType,
        found: &'static str,
    },
    #[error("{value} cannot be represented exactly as {expected}")]
    OutOfRange { expected: ValueType, value: String },
    #[error("{value_type} payload must be {expected} bytes, got {actual}")]
    Length {
        value_type: ValueType,
        expected: usize,
        actual: usize,
    },
    #[error("boolean payload holds {0}, expected 0 or 1")]
    InvalidBoolean(i32),
    #[error("string payload has a negative element count {0}")]
    NegativeCount(i32),
    #[error("string payload is not valid UTF-16")]
    InvalidText,
}

// Largest magnitudes an integer may have and still convert exactly.
const F32_EXACT_INT: i64 = 1 << 24;
const F64_EXACT_INT: i64 = 1 << 53;

/// Convert `value` to the variant `value_type` declares, losslessly.
pub fn coerce(value_type: ValueType, value: &ScalarValue) -> Result<ScalarValue, CodecError> {
    let out_of_range = || CodecError::OutOfRange {
        expected: value_type,
        value: value.to_string(),
    };
    let coerced = match (value_type, value) {
        (ValueType::Boolean, ScalarValue::Boolean(v)) => ScalarValue::Boolean(*v),
        (ValueType::Int32, ScalarValue::Int32(v)) => ScalarValue::Int32(*v),
        (ValueType::Int32, ScalarValue::Int64(v)) => {
            ScalarValue::Int32(i32::try_from(*v).map_err(|_| out_of_range())?)
        }
        (ValueType::Int64, ScalarValue::Int32(v)) => ScalarValue::Int64(i64::from(*v)),
        (ValueType::Int64, ScalarValue::Int64(v)) => ScalarValue::Int64(*v),
        (ValueType::Float32, ScalarValue::Float32(v)) => ScalarValue::Float32(*v),
        (ValueType::Float32, ScalarValue::Float64(v)) => {
            let narrowed = *v as f32;
            if f64::from(narrowed) == *v || v.is_nan() {
                ScalarValue::Float32(narrowed)
            } else {
                return Err(out_of_range());
            }
        }
        (ValueType::Float32, ScalarValue::Int32(v)) if i64::from(*v).abs() <= F32_EXACT_INT => {
            ScalarValue::Float32(*v as f32)
        }
        (ValueType::Float32, ScalarValue::Int64(v)) if v.unsigned_abs() <= F32_EXACT_INT as u64 => {
            ScalarValue::Float32(*v as f32)
        }
        (ValueType::Float32, ScalarValue::Int32(_) | ScalarValue::Int64(_)) => {
            return Err(out_of_range())
        }
        (ValueType::Float64, ScalarValue::Float64(v)) => ScalarValue::Float64(*v),
        (ValueType::Float64, ScalarValue::Float32(v)) => ScalarValue::Float64(f64::from(*v)),
        (ValueType::Float64, ScalarValue::Int32(v)) => ScalarValue::Float64(f64::from(*v)),
        (ValueType::Float64, ScalarValue::Int64(v)) if v.unsigned_abs() <= F64_EXACT_INT as u64 => {
            ScalarValue::Float64(*v as f64)
        }
        (ValueType::Float64, ScalarValue::Int64(_)) => return Err(out_of_range()),
        (ValueType::Text, ScalarValue::Text(v)) => ScalarValue::Text(v.clone()),
        (expected, found) => {
            return Err(CodecError::TypeMismatch {
                expected,
                found: found.kind(),
            })
        }
    };
    Ok(coerced)
}

/// Encode `value` as `value_type`.
pub fn encode(value_type: ValueType, value: &ScalarValue) -> Result<Bytes, CodecError> {
    let value = coerce(value_type, value)?;
    let mut buf = BytesMut::with_capacity(8);
    match value {
        ScalarValue::Boolean(v) => buf.put_i32(i32::from(v)),
        ScalarValue::Int32(v) => buf.put_i32(v),
        ScalarValue::Int64(v) => buf.put_i64(v),
        ScalarValue::Float32(v) => buf.put_f32(v),
        ScalarValue::Float64(v) => buf.put_f64(v),
        ScalarValue::Text(text) => {
            let units: Vec<u16> = text.encode_utf16().collect();
            let count = i32::try_from(units.len()).map_err(|_| CodecError::OutOfRange {
                expected: value_type,
                value: format!("string of {} code units", units.len()),
            })?;
            buf.reserve(4 + units.len() * 2);
            buf.put_i32(count);
            for unit in units {
                buf.put_u16(unit);
            }
        }
    }
    Ok(buf.freeze())
}

fn expect_len(value_type: ValueType, raw: &[u8], expected: usize) -> Result<(), CodecError> {
    if raw.len() != expected {
        return Err(CodecError::Length {
            value_type,
            expected,
            actual: raw.len(),
        });
    }
    Ok(())
}

/// Decode `raw` as `value_type`. The payload must be consumed exactly.
pub fn decode(value_type: ValueType, raw: &[u8]) -> Result<ScalarValue, CodecError> {
    let mut buf = raw;
    let value = match value_type {
        ValueType::Boolean => {
            expect_len(value_type, raw, 4)?;
            match buf.get_i32() {
                0 => ScalarValue::Boolean(false),
                1 => ScalarValue::Boolean(true),
                other => return Err(CodecError::InvalidBoolean(other)),
            }
        }
        ValueType::Int32 => {
            expect_len(value_type, raw, 4)?;
            ScalarValue::Int32(buf.get_i32())
        }
        ValueType::Int64 => {
            expect_len(value_type, raw, 8)?;
            ScalarValue::Int64(buf.get_i64())
        }
        ValueType::Float32 => {
            expect_len(value_type, raw, 4)?;
            ScalarValue::Float32(buf.get_f32())
        }
        ValueType::Float64 => {
            expect_len(value_type, raw, 8)?;
            ScalarValue::Float64(buf.get_f64())
        }
        ValueType::Text => {
            if raw.len() < 4 {
                return Err(CodecError::Length {
                    value_type,
                    expected: 4,
                    actual: raw.len(),
                });
            }
            let count = buf.get_i32();
            let units = usize::try_from(count).map_err(|_| CodecError::NegativeCount(count))?;
            expect_len(value_type, raw, 4 + units * 2)?;
            let units: Vec<u16> = (0..units).map(|_| buf.get_u16()).collect();
            ScalarValue::Text(String::from_utf16(&units).map_err(|_| CodecError::InvalidText)?)
        }
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int32_is_big_endian() {
        let bytes = encode(ValueType::Int32, &ScalarValue::Int32(5)).expect("encodes");
        assert_eq!(bytes.as_ref(), &[0, 0, 0, 5]);
    }

    #[test]
    fn boolean_uses_four_bytes() {
        let bytes = encode(ValueType::Boolean, &true.into()).expect("encodes");
        assert_eq!(bytes.as_ref(), &[0, 0, 0, 1]);
        assert_eq!(
            decode(ValueType::Boolean, &[0, 0, 0, 2]),
            Err(CodecError::InvalidBoolean(2))
        );
    }

    #[test]
    fn string_carries_utf16_count() {
        let bytes = encode(ValueType::Text, &"Aé".into()).expect("encodes");
        assert_eq!(bytes.as_ref(), &[0, 0, 0, 2, 0, 0x41, 0, 0xE9]);
        assert_eq!(
            decode(ValueType::Text, &bytes).expect("decodes"),
            ScalarValue::from("Aé")
        );
    }

    #[test]
    fn lossless_coercions_are_applied() {
        assert_eq!(
            coerce(ValueType::Float64, &ScalarValue::Int32(5)),
            Ok(ScalarValue::Float64(5.0))
        );
        assert_eq!(
            coerce(ValueType::Int32, &ScalarValue::Int64(-7)),
            Ok(ScalarValue::Int32(-7))
        );
        assert_eq!(
            coerce(ValueType::Float32, &ScalarValue::Float64(0.5)),
            Ok(ScalarValue::Float32(0.5))
        );
    }

    #[test]
    fn lossy_coercions_are_refused() {
        assert!(matches!(
            coerce(ValueType::Int32, &ScalarValue::Int64(i64::MAX)),
            Err(CodecError::OutOfRange { .. })
        ));
        assert!(matches!(
            coerce(ValueType::Float32, &ScalarValue::Float64(0.1)),
            Err(CodecError::OutOfRange { .. })
        ));
        assert!(matches!(
            coerce(ValueType::Int32, &ScalarValue::Float64(1.0)),
            Err(CodecError::TypeMismatch { .. })
        ));
        assert!(matches!(
            coerce(ValueType::Text, &ScalarValue::Int32(1)),
            Err(CodecError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn wrong_lengths_are_rejected() {
        assert!(matches!(
            decode(ValueType::Int64, &[0, 1, 2]),
            Err(CodecError::Length { expected: 8, .. })
        ));
        assert!(matches!(
            decode(ValueType::Text, &[0, 0, 0, 3, 0, 0x41]),
            Err(CodecError::Length { .. })
        ));
        assert_eq!(
            decode(ValueType::Text, &[0xFF, 0xFF, 0xFF, 0xFF]),
            Err(CodecError::NegativeCount(-1))
        );
    }

    #[test]
    fn unpaired_surrogate_is_invalid_text() {
        assert_eq!(
            decode(ValueType::Text, &[0, 0, 0, 1, 0xD8, 0x00]),
            Err(CodecError::InvalidText)
        );
    }
}
