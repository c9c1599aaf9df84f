//! Conversion of raw source strings into typed values.

use std::path::PathBuf;

use crate::error::CastError;
use crate::schema::{Field, FieldType, TupleShape};
use crate::value::Value;

/// Separator for sequence and tuple elements.
pub const LIST_DELIMITER: &str = ",";

const TRUE_WORDS: &[&str] = &["true", "1", "yes"];
const FALSE_WORDS: &[&str] = &["false", "0", "no"];

/// Casts a raw value for `field`.
///
/// An absent raw value stays absent; deciding whether that is an error is the
/// validator's job.
pub fn cast(raw: Option<&str>, field: &Field) -> Result<Option<Value>, CastError> {
    match raw {
        None => Ok(None),
        Some(raw) => cast_str(raw, field.field_type()).map(Some),
    }
}

/// Casts a present raw string against a declared type.
pub fn cast_str(raw: &str, ty: &FieldType) -> Result<Value, CastError> {
    match ty {
        FieldType::String => Ok(Value::Str(raw.to_string())),
        FieldType::Integer => raw
            .trim()
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|e| CastError::new(raw, ty, e.to_string())),
        FieldType::Float => raw
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|e| CastError::new(raw, ty, e.to_string())),
        FieldType::Boolean => cast_bool(raw)
            .map(Value::Bool)
            .ok_or_else(|| CastError::new(raw, ty, "expected one of true/false/1/0/yes/no")),
        FieldType::Path => Ok(Value::Path(PathBuf::from(raw))),
        FieldType::Sequence(item) => cast_items(raw, item).map(Value::List),
        FieldType::Tuple(TupleShape::Repeated(item)) => cast_items(raw, item).map(Value::Tuple),
        FieldType::Tuple(TupleShape::Fixed(types)) => {
            let parts = split_items(raw);
            if parts.len() != types.len() {
                return Err(CastError::new(
                    raw,
                    ty,
                    format!("expected {} element(s), found {}", types.len(), parts.len()),
                ));
            }
            parts
                .into_iter()
                .zip(types)
                .map(|(part, t)| cast_str(part, t))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Tuple)
        }
        FieldType::Optional(_) if raw.is_empty() => Ok(Value::None),
        FieldType::Optional(inner) => cast_str(raw, inner),
        FieldType::Nested(_) => Err(CastError::new(
            raw,
            ty,
            "nested schemas are built from their own keys, not cast",
        )),
    }
}

fn cast_bool(raw: &str) -> Option<bool> {
    let lowered = raw.trim().to_ascii_lowercase();
    if TRUE_WORDS.contains(&lowered.as_str()) {
        Some(true)
    } else if FALSE_WORDS.contains(&lowered.as_str()) {
        Some(false)
    } else {
        None
    }
}

fn split_items(raw: &str) -> Vec<&str> {
    if raw.trim().is_empty() {
        return Vec::new();
    }
    raw.split(LIST_DELIMITER).map(str::trim).collect()
}

fn cast_items(raw: &str, item: &FieldType) -> Result<Vec<Value>, CastError> {
    split_items(raw)
        .into_iter()
        .map(|part| cast_str(part, item))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boolean_vocabulary() {
        for raw in ["true", "TRUE", "1", "yes", "Yes"] {
            assert_eq!(cast_str(raw, &FieldType::Boolean).unwrap(), Value::Bool(true), "{raw}");
        }
        for raw in ["false", "False", "0", "no", "NO"] {
            assert_eq!(cast_str(raw, &FieldType::Boolean).unwrap(), Value::Bool(false), "{raw}");
        }
        for raw in ["on", "off", "y", "2", ""] {
            assert!(cast_str(raw, &FieldType::Boolean).is_err(), "{raw}");
        }
    }

    #[test]
    fn test_integer_is_strict() {
        assert_eq!(cast_str("42", &FieldType::Integer).unwrap(), Value::Int(42));
        assert!(cast_str("4.2", &FieldType::Integer).is_err());
        assert!(cast_str("not an int", &FieldType::Integer).is_err());
    }

    #[test]
    fn test_float() {
        assert_eq!(cast_str("3.14", &FieldType::Float).unwrap(), Value::Float(3.14));
        assert!(cast_str("pi", &FieldType::Float).is_err());
    }

    #[test]
    fn test_sequence_trims_and_casts_elements() {
        let ty = FieldType::list(FieldType::Float);
        assert_eq!(
            cast_str(" 1.1, 2.2 , 3.3 ", &ty).unwrap(),
            Value::List(vec![Value::Float(1.1), Value::Float(2.2), Value::Float(3.3)])
        );
    }

    #[test]
    fn test_empty_sequence() {
        let ty = FieldType::list(FieldType::Integer);
        assert_eq!(cast_str("", &ty).unwrap(), Value::List(vec![]));
        let ty = FieldType::tuple_of(FieldType::Integer);
        assert_eq!(cast_str("", &ty).unwrap(), Value::Tuple(vec![]));
    }

    #[test]
    fn test_sequence_element_error() {
        let ty = FieldType::list(FieldType::Integer);
        let err = cast_str("1,x,3", &ty).unwrap_err();
        assert_eq!(err.raw, "x");
    }

    #[test]
    fn test_fixed_tuple_arity() {
        let ty = FieldType::tuple(vec![FieldType::Integer, FieldType::String]);
        assert_eq!(
            cast_str("1, a", &ty).unwrap(),
            Value::Tuple(vec![Value::Int(1), Value::from("a")])
        );
        assert!(cast_str("1", &ty).is_err());
    }

    #[test]
    fn test_optional_empty_is_none() {
        let ty = FieldType::optional(FieldType::Integer);
        assert_eq!(cast_str("", &ty).unwrap(), Value::None);
        assert_eq!(cast_str("100", &ty).unwrap(), Value::Int(100));
        let ty = FieldType::optional(FieldType::String);
        assert_eq!(cast_str("", &ty).unwrap(), Value::None);
    }

    #[test]
    fn test_path_is_not_checked() {
        assert_eq!(
            cast_str("./does/not/exist", &FieldType::Path).unwrap(),
            Value::Path(PathBuf::from("./does/not/exist"))
        );
    }

    #[test]
    fn test_absent_stays_absent() {
        let field = Field::integer("PORT");
        assert_eq!(cast(None, &field).unwrap(), None);
    }

    #[test]
    fn test_cast_render_cast_is_stable() {
        let cases = [
            ("0042", FieldType::Integer),
            ("-7", FieldType::Integer),
            ("YES", FieldType::Boolean),
            ("0", FieldType::Boolean),
            (" 1, 2 ,3", FieldType::list(FieldType::Integer)),
            ("a,b", FieldType::list(FieldType::String)),
            ("", FieldType::list(FieldType::Boolean)),
            ("true,no", FieldType::tuple_of(FieldType::Boolean)),
        ];
        for (raw, ty) in cases {
            let first = cast_str(raw, &ty).unwrap();
            let second = cast_str(&first.to_raw(), &ty).unwrap();
            assert_eq!(first, second, "{raw} as {ty}");
        }
    }
}
