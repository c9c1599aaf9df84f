//! Field descriptors.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use super::ConfigSchema;
use crate::value::Value;

/// Predicate run against a field's cast value.
pub type Predicate = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// Element layout of a tuple type.
#[derive(Clone)]
pub enum TupleShape {
    /// Exactly one element per listed type.
    Fixed(Vec<FieldType>),
    /// Any number of elements of one type.
    Repeated(Box<FieldType>),
}

/// Declared semantic type of a field.
#[derive(Clone)]
pub enum FieldType {
    String,
    Integer,
    Float,
    Boolean,
    Path,
    Sequence(Box<FieldType>),
    Tuple(TupleShape),
    Optional(Box<FieldType>),
    Nested(Arc<ConfigSchema>),
}

impl FieldType {
    pub fn list(item: FieldType) -> Self {
        FieldType::Sequence(Box::new(item))
    }

    pub fn tuple(items: Vec<FieldType>) -> Self {
        FieldType::Tuple(TupleShape::Fixed(items))
    }

    pub fn tuple_of(item: FieldType) -> Self {
        FieldType::Tuple(TupleShape::Repeated(Box::new(item)))
    }

    pub fn optional(inner: FieldType) -> Self {
        FieldType::Optional(Box::new(inner))
    }

    /// Returns true if values of this type can be compared against numeric bounds.
    pub fn is_numeric(&self) -> bool {
        match self {
            FieldType::Integer | FieldType::Float => true,
            FieldType::Optional(inner) => inner.is_numeric(),
            _ => false,
        }
    }

    pub fn is_optional(&self) -> bool {
        matches!(self, FieldType::Optional(_))
    }

    /// Returns true if a nested schema appears anywhere inside a container type.
    pub(crate) fn wraps_nested(&self) -> bool {
        match self {
            FieldType::Sequence(item) | FieldType::Optional(item) => {
                matches!(**item, FieldType::Nested(_)) || item.wraps_nested()
            }
            FieldType::Tuple(TupleShape::Repeated(item)) => {
                matches!(**item, FieldType::Nested(_)) || item.wraps_nested()
            }
            FieldType::Tuple(TupleShape::Fixed(items)) => items
                .iter()
                .any(|item| matches!(item, FieldType::Nested(_)) || item.wraps_nested()),
            _ => false,
        }
    }

    pub fn nested_schema(&self) -> Option<&Arc<ConfigSchema>> {
        match self {
            FieldType::Nested(schema) => Some(schema),
            _ => None,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::String => f.write_str("str"),
            FieldType::Integer => f.write_str("int"),
            FieldType::Float => f.write_str("float"),
            FieldType::Boolean => f.write_str("bool"),
            FieldType::Path => f.write_str("path"),
            FieldType::Sequence(item) => write!(f, "list[{}]", item),
            FieldType::Tuple(TupleShape::Repeated(item)) => write!(f, "tuple[{}, ...]", item),
            FieldType::Tuple(TupleShape::Fixed(items)) => {
                f.write_str("tuple[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            FieldType::Optional(inner) => write!(f, "optional[{}]", inner),
            FieldType::Nested(schema) => f.write_str(schema.name()),
        }
    }
}

impl fmt::Debug for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

/// Whether a field has a default, and what it is.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum DefaultPresence {
    /// No default: the field is required.
    #[default]
    Required,
    /// Falls back to this value.
    Value(Value),
    /// Falls back to no value.
    NoneValue,
}

/// One declared configuration field.
#[derive(Clone)]
pub struct Field {
    pub(crate) name: String,
    pub(crate) ty: FieldType,
    pub(crate) default: DefaultPresence,
    pub(crate) secret: bool,
    pub(crate) min: Option<f64>,
    pub(crate) max: Option<f64>,
    pub(crate) choices: Option<Vec<Value>>,
    pub(crate) validator: Option<Predicate>,
    pub(crate) prefix: Option<String>,
    pub(crate) description: Option<String>,
}

impl Field {
    /// Creates a required field of the given type with no constraints.
    pub fn new(name: impl Into<String>, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            ty,
            default: DefaultPresence::Required,
            secret: false,
            min: None,
            max: None,
            choices: None,
            validator: None,
            prefix: None,
            description: None,
        }
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::String)
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Integer)
    }

    pub fn float(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Float)
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Boolean)
    }

    pub fn path(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Path)
    }

    /// A field holding a nested schema, looked up under `name + "_"` unless a prefix is set.
    pub fn nested(name: impl Into<String>, schema: Arc<ConfigSchema>) -> Self {
        Self::new(name, FieldType::Nested(schema))
    }

    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = DefaultPresence::Value(value.into());
        self
    }

    /// Makes the field optional at the source level, resolving to no value when absent.
    pub fn default_none(mut self) -> Self {
        self.default = DefaultPresence::NoneValue;
        self
    }

    pub fn secret(mut self) -> Self {
        self.secret = true;
        self
    }

    pub fn min(mut self, min: impl Into<f64>) -> Self {
        self.min = Some(min.into());
        self
    }

    pub fn max(mut self, max: impl Into<f64>) -> Self {
        self.max = Some(max.into());
        self
    }

    pub fn choices<I, V>(mut self, choices: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.choices = Some(choices.into_iter().map(Into::into).collect());
        self
    }

    pub fn validator<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        self.validator = Some(Arc::new(predicate));
        self
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field_type(&self) -> &FieldType {
        &self.ty
    }

    pub fn default_presence(&self) -> &DefaultPresence {
        &self.default
    }

    pub fn is_required(&self) -> bool {
        matches!(self.default, DefaultPresence::Required)
    }

    pub fn is_secret(&self) -> bool {
        self.secret
    }

    pub fn min_val(&self) -> Option<f64> {
        self.min
    }

    pub fn max_val(&self) -> Option<f64> {
        self.max
    }

    pub fn allowed_choices(&self) -> Option<&[Value]> {
        self.choices.as_deref()
    }

    pub fn custom_validator(&self) -> Option<&Predicate> {
        self.validator.as_ref()
    }

    pub fn doc(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Prefix this field contributes to lookups.
    ///
    /// Nested fields default to `name + "_"`; scalar fields default to no prefix.
    pub fn key_prefix(&self) -> Cow<'_, str> {
        match (&self.prefix, &self.ty) {
            (Some(prefix), _) => Cow::Borrowed(prefix),
            (None, FieldType::Nested(_)) => Cow::Owned(format!("{}_", self.name)),
            (None, _) => Cow::Borrowed(""),
        }
    }

    /// Key this scalar field is looked up under, relative to its schema's prefix.
    pub fn relative_key(&self) -> String {
        format!("{}{}", self.key_prefix(), self.name)
    }
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.name)
            .field("ty", &self.ty)
            .field("default", &self.default)
            .field("secret", &self.secret)
            .field("min", &self.min)
            .field("max", &self.max)
            .field("choices", &self.choices)
            .field("validator", &self.validator.is_some())
            .field("prefix", &self.prefix)
            .finish()
    }
}
