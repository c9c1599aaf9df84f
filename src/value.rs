//! Typed configuration values.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::ser::{Serialize, SerializeSeq, Serializer};

use crate::cast::LIST_DELIMITER;
use crate::config::instance::ConfigInstance;
use crate::schema::{FieldType, TupleShape};

/// A value produced by casting a raw string against a declared type.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// No value: an empty optional or a default declared as None.
    None,
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Path(PathBuf),
    List(Vec<Value>),
    Tuple(Vec<Value>),
    /// A fully built nested schema.
    Section(Arc<ConfigInstance>),
}

impl Value {
    /// Short name of the value's kind, used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::None => "none",
            Value::Str(_) => "str",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Bool(_) => "bool",
            Value::Path(_) => "path",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Section(_) => "section",
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    /// Numeric view used for bounds checks.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_section(&self) -> Option<&Arc<ConfigInstance>> {
        match self {
            Value::Section(section) => Some(section),
            _ => None,
        }
    }

    /// Renders the value back to the raw string form the caster accepts.
    pub fn to_raw(&self) -> String {
        match self {
            Value::None | Value::Section(_) => String::new(),
            Value::Str(s) => s.clone(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Path(p) => p.display().to_string(),
            Value::List(items) | Value::Tuple(items) => items
                .iter()
                .map(Value::to_raw)
                .collect::<Vec<_>>()
                .join(LIST_DELIMITER),
        }
    }

    /// Normalizes a declared literal (default or choice) to the shape `ty` produces.
    ///
    /// Integers widen to floats and strings become paths where the type asks for it.
    pub(crate) fn coerce_to(self, ty: &FieldType) -> Option<Value> {
        match (ty, self) {
            (FieldType::Optional(_), Value::None) => Some(Value::None),
            (FieldType::Optional(inner), value) => value.coerce_to(inner),
            (FieldType::String, v @ Value::Str(_)) => Some(v),
            (FieldType::Integer, v @ Value::Int(_)) => Some(v),
            (FieldType::Float, v @ Value::Float(_)) => Some(v),
            (FieldType::Float, Value::Int(i)) => Some(Value::Float(i as f64)),
            (FieldType::Boolean, v @ Value::Bool(_)) => Some(v),
            (FieldType::Path, v @ Value::Path(_)) => Some(v),
            (FieldType::Path, Value::Str(s)) => Some(Value::Path(PathBuf::from(s))),
            (FieldType::Sequence(item), Value::List(items) | Value::Tuple(items)) => items
                .into_iter()
                .map(|v| v.coerce_to(item))
                .collect::<Option<Vec<_>>>()
                .map(Value::List),
            (
                FieldType::Tuple(TupleShape::Repeated(item)),
                Value::List(items) | Value::Tuple(items),
            ) => items
                .into_iter()
                .map(|v| v.coerce_to(item))
                .collect::<Option<Vec<_>>>()
                .map(Value::Tuple),
            (
                FieldType::Tuple(TupleShape::Fixed(types)),
                Value::List(items) | Value::Tuple(items),
            ) => {
                if types.len() != items.len() {
                    return None;
                }
                types
                    .iter()
                    .zip(items)
                    .map(|(t, v)| v.coerce_to(t))
                    .collect::<Option<Vec<_>>>()
                    .map(Value::Tuple)
            }
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => f.write_str("None"),
            Value::List(items) => write_items(f, items, '[', ']'),
            Value::Tuple(items) => write_items(f, items, '(', ')'),
            Value::Section(section) => write!(f, "{}", section),
            other => f.write_str(&other.to_raw()),
        }
    }
}

fn write_items(
    f: &mut fmt::Formatter<'_>,
    items: &[Value],
    open: char,
    close: char,
) -> fmt::Result {
    write!(f, "{}", open)?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}", item)?;
    }
    write!(f, "{}", close)
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::None => serializer.serialize_none(),
            Value::Str(s) => serializer.serialize_str(s),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(x) => serializer.serialize_f64(*x),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Path(p) => serializer.serialize_str(&p.display().to_string()),
            Value::List(items) | Value::Tuple(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Section(section) => section.to_mapping(false).serialize(serializer),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<u16> for Value {
    fn from(i: u16) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<PathBuf> for Value {
    fn from(p: PathBuf) -> Self {
        Value::Path(p)
    }
}

impl From<&Path> for Value {
    fn from(p: &Path) -> Self {
        Value::Path(p.to_path_buf())
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

/// Conversion out of a [`Value`] for typed field access.
pub trait FromValue: Sized {
    /// Human-readable name of the expected shape.
    fn expected() -> String;

    fn from_value(value: &Value) -> Option<Self>;
}

impl FromValue for String {
    fn expected() -> String {
        "str".to_string()
    }

    fn from_value(value: &Value) -> Option<Self> {
        value.as_str().map(str::to_string)
    }
}

impl FromValue for i64 {
    fn expected() -> String {
        "int".to_string()
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }
}

impl FromValue for f64 {
    fn expected() -> String {
        "float".to_string()
    }

    fn from_value(value: &Value) -> Option<Self> {
        value.as_f64()
    }
}

impl FromValue for bool {
    fn expected() -> String {
        "bool".to_string()
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl FromValue for PathBuf {
    fn expected() -> String {
        "path".to_string()
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Path(p) => Some(p.clone()),
            _ => None,
        }
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn expected() -> String {
        format!("list[{}]", T::expected())
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::List(items) | Value::Tuple(items) => items.iter().map(T::from_value).collect(),
            _ => None,
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn expected() -> String {
        format!("optional[{}]", T::expected())
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::None => Some(None),
            other => T::from_value(other).map(Some),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_raw_joins_sequences_with_delimiter() {
        let value = Value::from(vec![1, 2, 3]);
        assert_eq!(value.to_raw(), "1,2,3");
    }

    #[test]
    fn test_coerce_widens_int_to_float() {
        let coerced = Value::Int(3).coerce_to(&FieldType::Float);
        assert_eq!(coerced, Some(Value::Float(3.0)));
    }

    #[test]
    fn test_coerce_rejects_wrong_kind() {
        assert_eq!(Value::from("abc").coerce_to(&FieldType::Integer), None);
    }

    #[test]
    fn test_coerce_fixed_tuple_checks_arity() {
        let ty = FieldType::tuple(vec![FieldType::Integer, FieldType::String]);
        assert!(Value::from(vec![Value::Int(1)]).coerce_to(&ty).is_none());
        assert_eq!(
            Value::List(vec![Value::Int(1), Value::from("a")]).coerce_to(&ty),
            Some(Value::Tuple(vec![Value::Int(1), Value::from("a")]))
        );
    }

    #[test]
    fn test_optional_from_value() {
        assert_eq!(Option::<i64>::from_value(&Value::None), Some(None));
        assert_eq!(Option::<i64>::from_value(&Value::Int(4)), Some(Some(4)));
        assert_eq!(Option::<i64>::from_value(&Value::from("x")), None);
    }

    #[test]
    fn test_display_uses_brackets() {
        let list = Value::from(vec!["a", "b"]);
        assert_eq!(list.to_string(), "[a, b]");
        let tuple = Value::Tuple(vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(tuple.to_string(), "(1, 2)");
    }
}
