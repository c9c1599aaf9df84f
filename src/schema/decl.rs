//! Schema declarations loaded from YAML files.
//!
//! ```yaml
//! name: AppConfig
//! fields:
//!   - name: PORT
//!     type: int
//!     default: 8000
//!     min: 1
//!   - name: DB
//!     prefix: DATABASE_
//!     fields:
//!       - name: HOST
//!         default: localhost
//! ```

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Deserializer};

use super::{ConfigSchema, Field, FieldType};
use crate::cast::cast_str;
use crate::error::SchemaError;
use crate::value::Value;

/// Root of a declarative schema file.
#[derive(Debug, Clone, Deserialize)]
pub struct SchemaDecl {
    #[serde(default = "default_schema_name")]
    pub name: String,
    #[serde(default)]
    pub fields: Vec<FieldDecl>,
}

/// One field in a declarative schema file.
#[derive(Debug, Clone, Deserialize)]
pub struct FieldDecl {
    pub name: String,

    /// Type expression such as `int`, `list[int]` or `optional[path]`. Defaults to `str`.
    #[serde(default, rename = "type")]
    pub ty: Option<String>,

    /// Absent means required; an explicit `null` means "defaults to no value".
    #[serde(default, deserialize_with = "present")]
    pub default: Option<serde_yaml::Value>,

    #[serde(default)]
    pub secret: bool,

    #[serde(default)]
    pub min: Option<f64>,

    #[serde(default)]
    pub max: Option<f64>,

    #[serde(default)]
    pub choices: Option<Vec<serde_yaml::Value>>,

    #[serde(default)]
    pub prefix: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    /// Present for nested sections.
    #[serde(default)]
    pub fields: Option<Vec<FieldDecl>>,
}

fn default_schema_name() -> String {
    "Config".to_string()
}

/// Keeps an explicit `null` distinguishable from a missing key.
fn present<'de, D>(deserializer: D) -> Result<Option<serde_yaml::Value>, D::Error>
where
    D: Deserializer<'de>,
{
    serde_yaml::Value::deserialize(deserializer).map(Some)
}

/// Reads and converts a schema file.
pub fn load_schema(path: &Path) -> Result<Arc<ConfigSchema>, SchemaError> {
    let content = std::fs::read_to_string(path).map_err(|e| SchemaError::ReadFailed {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let decl: SchemaDecl =
        serde_yaml::from_str(&content).map_err(|e| SchemaError::ParseFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    decl.into_schema()
}

impl SchemaDecl {
    /// Parses a declaration from YAML text.
    pub fn from_yaml(content: &str) -> Result<Self, SchemaError> {
        serde_yaml::from_str(content).map_err(|e| SchemaError::ParseFailed {
            path: "<inline>".into(),
            message: e.to_string(),
        })
    }

    /// Converts the declaration into a checked schema.
    pub fn into_schema(self) -> Result<Arc<ConfigSchema>, SchemaError> {
        build_schema(self.name, self.fields)
    }
}

fn build_schema(name: String, fields: Vec<FieldDecl>) -> Result<Arc<ConfigSchema>, SchemaError> {
    let mut builder = ConfigSchema::builder(name);
    for decl in fields {
        builder = builder.field(decl.into_field()?);
    }
    builder.build()
}

impl FieldDecl {
    fn into_field(self) -> Result<Field, SchemaError> {
        if let Some(children) = self.fields {
            let nested = build_schema(self.name.clone(), children)?;
            let mut field = Field::nested(self.name, nested);
            if let Some(prefix) = self.prefix {
                field = field.prefix(prefix);
            }
            if let Some(description) = self.description {
                field = field.description(description);
            }
            return Ok(field);
        }

        let expr = self.ty.as_deref().unwrap_or("str");
        let ty = parse_type(expr).ok_or_else(|| SchemaError::UnsupportedType {
            field: self.name.clone(),
            ty: expr.to_string(),
        })?;

        let mut field = Field::new(self.name.clone(), ty.clone());
        if self.secret {
            field = field.secret();
        }
        if let Some(min) = self.min {
            field = field.min(min);
        }
        if let Some(max) = self.max {
            field = field.max(max);
        }
        if let Some(prefix) = self.prefix {
            field = field.prefix(prefix);
        }
        if let Some(description) = self.description {
            field = field.description(description);
        }

        match self.default {
            None => {}
            Some(serde_yaml::Value::Null) => field = field.default_none(),
            Some(literal) => {
                let raw = literal_to_raw(&literal).unwrap_or_default();
                let value = cast_str(&raw, &ty).map_err(|_| SchemaError::DefaultTypeMismatch {
                    field: self.name.clone(),
                    value: raw.clone(),
                    ty: ty.to_string(),
                })?;
                field = field.default(value);
            }
        }

        if let Some(choices) = self.choices {
            let mut values: Vec<Value> = Vec::with_capacity(choices.len());
            for literal in &choices {
                let raw = literal_to_raw(literal).unwrap_or_default();
                let value = cast_str(&raw, &ty).map_err(|_| SchemaError::ChoiceTypeMismatch {
                    field: self.name.clone(),
                    choice: raw.clone(),
                    ty: ty.to_string(),
                })?;
                values.push(value);
            }
            field = field.choices(values);
        }

        Ok(field)
    }
}

/// Renders a YAML literal the way it would appear in an env file.
fn literal_to_raw(literal: &serde_yaml::Value) -> Option<String> {
    match literal {
        serde_yaml::Value::Null => Some(String::new()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Sequence(items) => items
            .iter()
            .map(literal_to_raw)
            .collect::<Option<Vec<_>>>()
            .map(|parts| parts.join(",")),
        _ => None,
    }
}

/// Parses a type expression: `str`, `int`, `float`, `bool`, `path`, `list[T]`,
/// `tuple[T, U]`, `tuple[T, ...]` and `optional[T]`.
pub fn parse_type(expr: &str) -> Option<FieldType> {
    let expr = expr.trim();
    let Some(open) = expr.find('[') else {
        return match expr.to_ascii_lowercase().as_str() {
            "str" | "string" => Some(FieldType::String),
            "int" | "integer" => Some(FieldType::Integer),
            "float" => Some(FieldType::Float),
            "bool" | "boolean" => Some(FieldType::Boolean),
            "path" => Some(FieldType::Path),
            _ => None,
        };
    };

    let inner = expr[open + 1..].strip_suffix(']')?;
    let args = split_args(inner)?;

    match expr[..open].trim().to_ascii_lowercase().as_str() {
        "list" if args.len() == 1 => Some(FieldType::list(parse_type(args[0])?)),
        "optional" if args.len() == 1 => Some(FieldType::optional(parse_type(args[0])?)),
        "tuple" if args.len() == 2 && args[1].trim() == "..." => {
            Some(FieldType::tuple_of(parse_type(args[0])?))
        }
        "tuple" => args
            .iter()
            .map(|a| parse_type(a))
            .collect::<Option<Vec<_>>>()
            .map(FieldType::tuple),
        _ => None,
    }
}

/// Splits on commas that are not inside brackets.
fn split_args(inner: &str) -> Option<Vec<&str>> {
    let mut args = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in inner.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => depth = depth.checked_sub(1)?,
            ',' if depth == 0 => {
                args.push(&inner[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return None;
    }
    args.push(&inner[start..]);
    if args.iter().any(|a| a.trim().is_empty()) {
        return None;
    }
    Some(args)
}
