//! Schema introspection for documentation tooling.

pub mod example;
pub mod markdown;

use serde::Serialize;

pub use example::example;
pub use markdown::markdown;

use crate::schema::{ConfigSchema, DefaultPresence};
use crate::value::Value;

/// Documentation view of one scalar field, with its fully-qualified key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldDoc {
    /// Key looked up in the sources, e.g. `DATABASE_HOST`.
    pub key: String,
    pub name: String,
    /// Dotted path of the enclosing nested fields, if any.
    pub section: Option<String>,
    pub type_name: String,
    pub required: bool,
    pub default: Option<Value>,
    pub secret: bool,
    pub choices: Vec<Value>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub description: Option<String>,
}

/// Lists every scalar field of `schema` in declaration order, descending into nested schemas.
pub fn describe(schema: &ConfigSchema) -> Vec<FieldDoc> {
    let mut docs = Vec::new();
    describe_into(schema, "", None, &mut docs);
    docs
}

fn describe_into(
    schema: &ConfigSchema,
    prefix: &str,
    section: Option<&str>,
    docs: &mut Vec<FieldDoc>,
) {
    for field in schema.fields() {
        if let Some(nested) = field.field_type().nested_schema() {
            let child_section = match section {
                Some(parent) => format!("{}.{}", parent, field.name()),
                None => field.name().to_string(),
            };
            let child_prefix = format!("{}{}", prefix, field.key_prefix());
            describe_into(nested, &child_prefix, Some(&child_section), docs);
            continue;
        }

        let default = match field.default_presence() {
            DefaultPresence::Required => None,
            DefaultPresence::Value(value) => Some(value.clone()),
            DefaultPresence::NoneValue => Some(Value::None),
        };

        docs.push(FieldDoc {
            key: format!("{}{}", prefix, field.relative_key()),
            name: field.name().to_string(),
            section: section.map(str::to_string),
            type_name: field.field_type().to_string(),
            required: field.is_required(),
            default,
            secret: field.is_secret(),
            choices: field.allowed_choices().map(<[Value]>::to_vec).unwrap_or_default(),
            min: field.min_val(),
            max: field.max_val(),
            description: field.doc().map(str::to_string),
        });
    }
}
