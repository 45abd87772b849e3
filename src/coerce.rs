//! Type coercion between tabular text and typed values
//!
//! Boolean literals are matched case-insensitively and without trimming:
//!
//! | value | accepted literals              |
//! |-------|--------------------------------|
//! | true  | `t`, `true`, `y`, `yes`, `1`   |
//! | false | `f`, `false`, `n`, `no`, `0`   |
//!
//! Integers use `i64` parsing and numbers use `f64` parsing. Empty input is
//! always `None`. Unparseable input is an error in [`CoercionMode::Strict`]
//! and `None` in [`CoercionMode::Lenient`].

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use thiserror::Error;

use crate::error::AirrError;
use crate::schema::TypeTag;

const TRUE_LITERALS: [&str; 5] = ["t", "true", "y", "yes", "1"];
const FALSE_LITERALS: [&str; 5] = ["f", "false", "n", "no", "0"];

/// Behavior on values that cannot be converted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoercionMode {
    /// Fail with the offending raw value
    Strict,
    /// Replace the value with null
    #[default]
    Lenient,
}

/// A value that does not parse as its schema type
#[derive(Error, Debug, Clone, PartialEq)]
#[error("cannot read {raw:?} as {expected}")]
pub struct CoercionError {
    pub raw: String,
    pub expected: TypeTag,
}

impl CoercionError {
    fn new(raw: impl Into<String>, expected: TypeTag) -> Self {
        Self {
            raw: raw.into(),
            expected,
        }
    }

    /// Attach the field name and row number
    pub fn into_airr(self, field: &str, row: Option<usize>) -> AirrError {
        AirrError::InvalidValue {
            field: field.to_string(),
            raw: self.raw,
            expected: self.expected,
            row,
        }
    }
}

type Coerced<T> = std::result::Result<Option<T>, CoercionError>;

fn reject<T>(raw: &str, expected: TypeTag, mode: CoercionMode) -> Coerced<T> {
    match mode {
        CoercionMode::Strict => Err(CoercionError::new(raw, expected)),
        CoercionMode::Lenient => Ok(None),
    }
}

/// Match a boolean literal
pub fn parse_bool(raw: &str) -> Option<bool> {
    if TRUE_LITERALS.iter().any(|t| raw.eq_ignore_ascii_case(t)) {
        Some(true)
    } else if FALSE_LITERALS.iter().any(|f| raw.eq_ignore_ascii_case(f)) {
        Some(false)
    } else {
        None
    }
}

pub fn to_bool(raw: &str, mode: CoercionMode) -> Coerced<bool> {
    if raw.is_empty() {
        return Ok(None);
    }
    match parse_bool(raw) {
        Some(b) => Ok(Some(b)),
        None => reject(raw, TypeTag::Boolean, mode),
    }
}

pub fn to_int(raw: &str, mode: CoercionMode) -> Coerced<i64> {
    if raw.is_empty() {
        return Ok(None);
    }
    match raw.parse::<i64>() {
        Ok(i) => Ok(Some(i)),
        Err(_) => reject(raw, TypeTag::Integer, mode),
    }
}

pub fn to_number(raw: &str, mode: CoercionMode) -> Coerced<f64> {
    if raw.is_empty() {
        return Ok(None);
    }
    match raw.parse::<f64>() {
        Ok(n) if n.is_finite() => Ok(Some(n)),
        _ => reject(raw, TypeTag::Number, mode),
    }
}

/// Boolean view of an already typed value
pub fn value_to_bool(value: &Value, mode: CoercionMode) -> Coerced<bool> {
    match value {
        Value::Null => Ok(None),
        Value::Bool(b) => Ok(Some(*b)),
        Value::String(s) => to_bool(s, mode),
        Value::Number(n) => match n.as_i64() {
            Some(1) => Ok(Some(true)),
            Some(0) => Ok(Some(false)),
            _ => reject(&n.to_string(), TypeTag::Boolean, mode),
        },
        other => reject(&other.to_string(), TypeTag::Boolean, mode),
    }
}

pub fn value_to_int(value: &Value, mode: CoercionMode) -> Coerced<i64> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => to_int(s, mode),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                return Ok(Some(i));
            }
            match n.as_f64() {
                Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 => {
                    Ok(Some(f as i64))
                }
                _ => reject(&n.to_string(), TypeTag::Integer, mode),
            }
        }
        other => reject(&other.to_string(), TypeTag::Integer, mode),
    }
}

pub fn value_to_number(value: &Value, mode: CoercionMode) -> Coerced<f64> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => to_number(s, mode),
        Value::Number(n) => match n.as_f64() {
            Some(f) => Ok(Some(f)),
            None => reject(&n.to_string(), TypeTag::Number, mode),
        },
        other => reject(&other.to_string(), TypeTag::Number, mode),
    }
}

/// Canonical tabular token for a boolean
pub fn from_bool(value: Option<bool>) -> &'static str {
    match value {
        Some(true) => "T",
        Some(false) => "F",
        None => "",
    }
}

/// Convert one tabular cell to the value stored in a record.
///
/// Empty cells are null. Strings, arrays, objects and references keep the
/// raw text.
pub fn coerce_cell(raw: &str, expected: TypeTag, mode: CoercionMode) -> std::result::Result<Value, CoercionError> {
    if raw.is_empty() {
        return Ok(Value::Null);
    }
    let value = match expected {
        TypeTag::Boolean => to_bool(raw, mode)?.map(Value::Bool),
        TypeTag::Integer => to_int(raw, mode)?.map(Value::from),
        TypeTag::Number => to_number(raw, mode)?
            .and_then(Number::from_f64)
            .map(Value::Number),
        _ => Some(Value::String(raw.to_string())),
    };
    Ok(value.unwrap_or(Value::Null))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case("T", true)]
    #[case("t", true)]
    #[case("TRUE", true)]
    #[case("True", true)]
    #[case("yes", true)]
    #[case("Y", true)]
    #[case("1", true)]
    #[case("F", false)]
    #[case("false", false)]
    #[case("No", false)]
    #[case("n", false)]
    #[case("0", false)]
    fn test_bool_literals(#[case] raw: &str, #[case] expected: bool) {
        assert_eq!(to_bool(raw, CoercionMode::Strict), Ok(Some(expected)));
    }

    #[rstest]
    #[case("maybe")]
    #[case(" T")]
    #[case("2")]
    #[case("nope")]
    fn test_bool_rejects(#[case] raw: &str) {
        assert_eq!(to_bool(raw, CoercionMode::Lenient), Ok(None));
        let err = to_bool(raw, CoercionMode::Strict).unwrap_err();
        assert_eq!(err.raw, raw);
        assert_eq!(err.expected, TypeTag::Boolean);
    }

    #[test]
    fn test_empty_is_null_in_every_mode() {
        for mode in [CoercionMode::Strict, CoercionMode::Lenient] {
            assert_eq!(to_bool("", mode), Ok(None));
            assert_eq!(to_int("", mode), Ok(None));
            assert_eq!(to_number("", mode), Ok(None));
            assert_eq!(value_to_bool(&Value::Null, mode), Ok(None));
        }
    }

    #[rstest]
    #[case("42", Some(42))]
    #[case("-7", Some(-7))]
    #[case("4.0", None)]
    #[case("12abc", None)]
    fn test_int_parsing(#[case] raw: &str, #[case] expected: Option<i64>) {
        assert_eq!(to_int(raw, CoercionMode::Lenient), Ok(expected));
        assert_eq!(to_int(raw, CoercionMode::Strict).is_ok(), expected.is_some());
    }

    #[rstest]
    #[case("0.95", Some(0.95))]
    #[case("3", Some(3.0))]
    #[case("1e-3", Some(0.001))]
    #[case("NaN", None)]
    #[case("abc", None)]
    fn test_number_parsing(#[case] raw: &str, #[case] expected: Option<f64>) {
        assert_eq!(to_number(raw, CoercionMode::Lenient), Ok(expected));
    }

    #[test]
    fn test_lenient_never_fails() {
        let inputs = ["", "x", "T", "1.5", "--", "\u{00e9}", "99999999999999999999999"];
        for raw in inputs {
            assert!(to_bool(raw, CoercionMode::Lenient).is_ok());
            assert!(to_int(raw, CoercionMode::Lenient).is_ok());
            assert!(to_number(raw, CoercionMode::Lenient).is_ok());
        }
    }

    #[test]
    fn test_typed_values_pass_through() {
        let strict = CoercionMode::Strict;
        assert_eq!(value_to_bool(&json!(true), strict), Ok(Some(true)));
        assert_eq!(value_to_bool(&json!(0), strict), Ok(Some(false)));
        assert!(value_to_bool(&json!(2), strict).is_err());
        assert_eq!(value_to_int(&json!(12), strict), Ok(Some(12)));
        assert_eq!(value_to_int(&json!(12.0), strict), Ok(Some(12)));
        assert!(value_to_int(&json!(12.5), strict).is_err());
        assert_eq!(value_to_number(&json!(3), strict), Ok(Some(3.0)));
        assert_eq!(value_to_number(&json!("2.5"), strict), Ok(Some(2.5)));
    }

    #[test]
    fn test_from_bool() {
        assert_eq!(from_bool(Some(true)), "T");
        assert_eq!(from_bool(Some(false)), "F");
        assert_eq!(from_bool(None), "");
    }

    #[test]
    fn test_coerce_cell() {
        let strict = CoercionMode::Strict;
        assert_eq!(coerce_cell("T", TypeTag::Boolean, strict), Ok(json!(true)));
        assert_eq!(coerce_cell("17", TypeTag::Integer, strict), Ok(json!(17)));
        assert_eq!(coerce_cell("0.5", TypeTag::Number, strict), Ok(json!(0.5)));
        assert_eq!(coerce_cell("IGHV1-2*02", TypeTag::String, strict), Ok(json!("IGHV1-2*02")));
        assert_eq!(coerce_cell("", TypeTag::String, strict), Ok(Value::Null));
        assert_eq!(
            coerce_cell("bad", TypeTag::Integer, CoercionMode::Lenient),
            Ok(Value::Null)
        );
        let err = coerce_cell("bad", TypeTag::Integer, strict).unwrap_err();
        assert!(matches!(
            err.into_airr("v_sequence_start", Some(2)),
            AirrError::InvalidValue { row: Some(2), expected: TypeTag::Integer, .. }
        ));
    }
}
