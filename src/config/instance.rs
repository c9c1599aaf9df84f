//! Built configuration instances and their rendered form.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::error::AccessError;
use crate::schema::ConfigSchema;
use crate::value::{FromValue, Value};

/// Text shown in place of a secret value.
pub const MASK: &str = "********";

/// An immutable, fully validated realization of a schema.
///
/// Instances are only ever produced by a successful build and are never mutated afterwards;
/// a reload publishes a new instance instead.
#[derive(Clone)]
pub struct ConfigInstance {
    schema: Arc<ConfigSchema>,
    prefix: String,
    values: HashMap<String, Value>,
    secrets: BTreeSet<String>,
}

impl ConfigInstance {
    pub(crate) fn new(
        schema: Arc<ConfigSchema>,
        prefix: impl Into<String>,
        values: HashMap<String, Value>,
    ) -> Self {
        let secrets = schema
            .fields()
            .iter()
            .filter(|f| f.is_secret())
            .map(|f| f.name().to_string())
            .collect();

        Self {
            schema,
            prefix: prefix.into(),
            values,
            secrets,
        }
    }

    /// Returns the schema this instance was built from.
    pub fn schema(&self) -> &Arc<ConfigSchema> {
        &self.schema
    }

    /// Key prefix this level was resolved under.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Typed access to a field.
    pub fn value<T: FromValue>(&self, name: &str) -> Result<T, AccessError> {
        let value = self.get(name).ok_or_else(|| AccessError::NoSuchField {
            name: name.to_string(),
        })?;
        T::from_value(value).ok_or_else(|| AccessError::TypeMismatch {
            name: name.to_string(),
            expected: T::expected(),
            found: value.kind_name(),
        })
    }

    /// The nested instance stored under `name`.
    pub fn section(&self, name: &str) -> Result<&Arc<ConfigInstance>, AccessError> {
        self.get(name)
            .ok_or_else(|| AccessError::NoSuchField {
                name: name.to_string(),
            })?
            .as_section()
            .ok_or_else(|| AccessError::NotASection {
                name: name.to_string(),
            })
    }

    /// Resolves a dotted path such as `"DB.HOST"` through nested sections.
    pub fn lookup(&self, path: &str) -> Result<&Value, AccessError> {
        let mut current = self;
        let mut parts = path.split('.').peekable();

        while let Some(part) = parts.next() {
            if parts.peek().is_none() {
                return current.get(part).ok_or_else(|| AccessError::NoSuchField {
                    name: path.to_string(),
                });
            }
            current = current.section(part)?;
        }

        Err(AccessError::NoSuchField {
            name: path.to_string(),
        })
    }

    /// Field names and values in schema order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.schema
            .fields()
            .iter()
            .filter_map(move |f| self.values.get(f.name()).map(|v| (f.name(), v)))
    }

    /// Names of the secret fields at this level.
    pub fn secrets(&self) -> &BTreeSet<String> {
        &self.secrets
    }

    pub fn is_secret(&self, name: &str) -> bool {
        self.secrets.contains(name)
    }

    /// Renders the instance as an ordered mapping, masking secrets unless `reveal` is set.
    pub fn to_mapping(&self, reveal: bool) -> Mapping {
        let entries = self
            .fields()
            .map(|(name, value)| {
                let rendered = match value {
                    Value::Section(section) => Rendered::Section(section.to_mapping(reveal)),
                    _ if !reveal && self.is_secret(name) => Rendered::Masked,
                    other => Rendered::Value(other.clone()),
                };
                (name.to_string(), rendered)
            })
            .collect();
        Mapping(entries)
    }

    /// Every non-empty secret value in this instance and its sections.
    pub fn secret_values(&self) -> Vec<String> {
        let mut out = Vec::new();
        for (name, value) in self.fields() {
            match value {
                Value::Section(section) => out.extend(section.secret_values()),
                Value::None => {}
                other if self.is_secret(name) => {
                    let raw = other.to_raw();
                    if !raw.is_empty() {
                        out.push(raw);
                    }
                }
                _ => {}
            }
        }
        out
    }
}

impl PartialEq for ConfigInstance {
    fn eq(&self, other: &Self) -> bool {
        self.schema.name() == other.schema.name()
            && self.prefix == other.prefix
            && self.values == other.values
    }
}

impl fmt::Debug for ConfigInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (name, value) in self.fields() {
            if self.is_secret(name) {
                map.entry(&name, &MASK);
            } else {
                map.entry(&name, value);
            }
        }
        map.finish()
    }
}

impl fmt::Display for ConfigInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{} {{", self.schema.name())?;
        for (i, (name, value)) in self.fields().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            if self.is_secret(name) {
                write!(f, "{}: {}", name, MASK)?;
            } else {
                write!(f, "{}: {}", name, value)?;
            }
        }
        f.write_str("}>")
    }
}

/// One rendered entry of a [`Mapping`].
#[derive(Debug, Clone, PartialEq)]
pub enum Rendered {
    Value(Value),
    Masked,
    Section(Mapping),
}

impl fmt::Display for Rendered {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rendered::Value(value) => write!(f, "{}", value),
            Rendered::Masked => f.write_str(MASK),
            Rendered::Section(mapping) => write!(f, "{}", mapping),
        }
    }
}

impl Serialize for Rendered {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Rendered::Value(value) => value.serialize(serializer),
            Rendered::Masked => serializer.serialize_str(MASK),
            Rendered::Section(mapping) => mapping.serialize(serializer),
        }
    }
}

/// Field names to rendered values, in schema order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mapping(Vec<(String, Rendered)>);

impl Mapping {
    pub fn get(&self, name: &str) -> Option<&Rendered> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, r)| r)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Rendered)> {
        self.0.iter().map(|(n, r)| (n.as_str(), r))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Mapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (name, rendered)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: {}", name, rendered)?;
        }
        f.write_str("}")
    }
}

impl Serialize for Mapping {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, rendered) in &self.0 {
            map.serialize_entry(name, rendered)?;
        }
        map.end()
    }
}
