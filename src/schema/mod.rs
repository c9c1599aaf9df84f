//! Schema model: ordered field descriptors, built once at startup.

pub mod decl;
pub mod field;

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

pub use decl::{load_schema, SchemaDecl};
pub use field::{DefaultPresence, Field, FieldType, Predicate, TupleShape};

use crate::config::instance::ConfigInstance;
use crate::error::SchemaError;

/// Cross-field check run against a fully assembled instance.
pub type Hook = Arc<dyn Fn(&ConfigInstance) -> Result<(), String> + Send + Sync>;

/// An ordered set of fields describing one configuration shape.
pub struct ConfigSchema {
    name: String,
    fields: Vec<Field>,
    hook: Option<Hook>,
}

impl ConfigSchema {
    /// Starts declaring a schema.
    pub fn builder(name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder {
            name: name.into(),
            fields: Vec::new(),
            hook: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn hook(&self) -> Option<&Hook> {
        self.hook.as_ref()
    }
}

impl fmt::Debug for ConfigSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigSchema")
            .field("name", &self.name)
            .field("fields", &self.fields)
            .field("hook", &self.hook.is_some())
            .finish()
    }
}

/// Collects field declarations and checks them when built.
pub struct SchemaBuilder {
    name: String,
    fields: Vec<Field>,
    hook: Option<Hook>,
}

impl SchemaBuilder {
    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    /// Adds a nested schema field with its default `name + "_"` prefix.
    pub fn nested(self, name: impl Into<String>, schema: Arc<ConfigSchema>) -> Self {
        self.field(Field::nested(name, schema))
    }

    /// Registers a cross-field check that runs after every field of this schema is valid.
    pub fn hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ConfigInstance) -> Result<(), String> + Send + Sync + 'static,
    {
        self.hook = Some(Arc::new(hook));
        self
    }

    /// Checks every declaration and freezes the schema.
    pub fn build(self) -> Result<Arc<ConfigSchema>, SchemaError> {
        let mut seen = HashSet::new();
        let mut fields = Vec::with_capacity(self.fields.len());

        for field in self.fields {
            if field.name.trim().is_empty() {
                return Err(SchemaError::EmptyName {
                    schema: self.name.clone(),
                });
            }
            if !seen.insert(field.name.clone()) {
                return Err(SchemaError::DuplicateField {
                    schema: self.name.clone(),
                    field: field.name,
                });
            }
            fields.push(check_field(field)?);
        }

        debug!(schema = %self.name, fields = fields.len(), "Schema built");

        Ok(Arc::new(ConfigSchema {
            name: self.name,
            fields,
            hook: self.hook,
        }))
    }
}

/// Validates one declaration and normalizes its default and choices to the declared type.
fn check_field(mut field: Field) -> Result<Field, SchemaError> {
    if let FieldType::Nested(_) = field.ty {
        let constraint = if field.default != DefaultPresence::Required {
            Some("a default")
        } else if field.choices.is_some() {
            Some("choices")
        } else if field.validator.is_some() {
            Some("a validator")
        } else if field.min.is_some() || field.max.is_some() {
            Some("numeric bounds")
        } else if field.secret {
            Some("secret")
        } else {
            None
        };
        if let Some(what) = constraint {
            return Err(SchemaError::NestedConstraint {
                field: field.name,
                what,
            });
        }
        return Ok(field);
    }

    if field.ty.wraps_nested() {
        return Err(SchemaError::UnsupportedType {
            field: field.name,
            ty: field.ty.to_string(),
        });
    }

    if (field.min.is_some() || field.max.is_some()) && !field.ty.is_numeric() {
        return Err(SchemaError::BoundsOnNonNumeric {
            field: field.name,
            ty: field.ty.to_string(),
        });
    }

    if let (Some(min), Some(max)) = (field.min, field.max) {
        if min > max {
            return Err(SchemaError::InvertedBounds {
                field: field.name,
                min,
                max,
            });
        }
    }

    if let DefaultPresence::Value(value) = &field.default {
        let normalized = value.clone().coerce_to(&field.ty);
        match normalized {
            Some(v) => field.default = DefaultPresence::Value(v),
            None => {
                return Err(SchemaError::DefaultTypeMismatch {
                    field: field.name,
                    value: value.to_string(),
                    ty: field.ty.to_string(),
                })
            }
        }
    }

    if let Some(choices) = field.choices.take() {
        let mut normalized = Vec::with_capacity(choices.len());
        for choice in choices {
            match choice.clone().coerce_to(&field.ty) {
                Some(v) => normalized.push(v),
                None => {
                    return Err(SchemaError::ChoiceTypeMismatch {
                        field: field.name,
                        choice: choice.to_string(),
                        ty: field.ty.to_string(),
                    })
                }
            }
        }
        field.choices = Some(normalized);
    }

    Ok(field)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn test_duplicate_field_rejected() {
        let err = ConfigSchema::builder("App")
            .field(Field::string("HOST"))
            .field(Field::integer("HOST"))
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            SchemaError::DuplicateField {
                schema: "App".into(),
                field: "HOST".into()
            }
        );
    }

    #[test]
    fn test_bounds_on_string_rejected() {
        let err = ConfigSchema::builder("App")
            .field(Field::string("NAME").min(1))
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::BoundsOnNonNumeric { .. }));
    }

    #[test]
    fn test_bounds_allowed_on_optional_numeric() {
        let schema = ConfigSchema::builder("App")
            .field(Field::new("LIMIT", FieldType::optional(FieldType::Integer)).max(10))
            .build();
        assert!(schema.is_ok());
    }

    #[test]
    fn test_inverted_bounds_rejected() {
        let err = ConfigSchema::builder("App")
            .field(Field::integer("PORT").min(10).max(1))
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::InvertedBounds { .. }));
    }

    #[test]
    fn test_choice_type_mismatch_rejected() {
        let err = ConfigSchema::builder("App")
            .field(Field::integer("LEVEL").choices(["low", "high"]))
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::ChoiceTypeMismatch { .. }));
    }

    #[test]
    fn test_default_is_normalized_to_declared_type() {
        let schema = ConfigSchema::builder("App")
            .field(Field::float("RATIO").default(2))
            .field(Field::path("DATA_DIR").default("/var/lib/app"))
            .build()
            .unwrap();
        assert_eq!(
            schema.field("RATIO").unwrap().default_presence(),
            &DefaultPresence::Value(Value::Float(2.0))
        );
        assert_eq!(
            schema.field("DATA_DIR").unwrap().default_presence(),
            &DefaultPresence::Value(Value::Path("/var/lib/app".into()))
        );
    }

    #[test]
    fn test_default_type_mismatch_rejected() {
        let err = ConfigSchema::builder("App")
            .field(Field::boolean("DEBUG").default("maybe"))
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::DefaultTypeMismatch { .. }));
    }

    #[test]
    fn test_nested_field_cannot_have_default() {
        let inner = ConfigSchema::builder("Db").build().unwrap();
        let err = ConfigSchema::builder("App")
            .field(Field::nested("DB", inner).default("x"))
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::NestedConstraint { what: "a default", .. }));
    }

    #[test]
    fn test_nested_schema_inside_container_rejected() {
        let inner = ConfigSchema::builder("Inner")
            .field(Field::string("VAL"))
            .build()
            .unwrap();
        let wrapped = [
            FieldType::list(FieldType::Nested(inner.clone())),
            FieldType::optional(FieldType::Nested(inner.clone())),
            FieldType::tuple(vec![FieldType::Integer, FieldType::Nested(inner.clone())]),
            FieldType::tuple_of(FieldType::Nested(inner.clone())),
            FieldType::optional(FieldType::list(FieldType::Nested(inner))),
        ];
        for ty in wrapped {
            let err = ConfigSchema::builder("App")
                .field(Field::new("X", ty).default_none())
                .build()
                .unwrap_err();
            assert!(
                matches!(&err, SchemaError::UnsupportedType { field, .. } if field == "X"),
                "unexpected error: {err}"
            );
        }
    }

    #[test]
    fn test_key_prefix_defaults() {
        let inner = ConfigSchema::builder("Db").build().unwrap();
        let nested = Field::nested("DB", inner.clone());
        assert_eq!(nested.key_prefix(), "DB_");
        let renamed = Field::nested("DB", inner).prefix("DATABASE_");
        assert_eq!(renamed.key_prefix(), "DATABASE_");
        let scalar = Field::string("MISSING").prefix("MYAPP_");
        assert_eq!(scalar.relative_key(), "MYAPP_MISSING");
    }
}
