//! Constraint checking for cast field values.

pub mod report;

use crate::config::instance::MASK;
use crate::error::{Bound, FieldError};
use crate::schema::Field;
use crate::value::Value;

/// Severity level for validation issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationSeverity {
    /// Blocks configuration loading.
    Error,
    /// Logged but allows loading.
    Warning,
}

/// A validation issue found while building a configuration.
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    /// Severity of the issue.
    pub severity: ValidationSeverity,
    /// Fully-qualified key the issue is about (e.g., "DATABASE_PORT").
    pub path: String,
    /// Description of the issue.
    pub message: String,
    /// Optional suggestion for fixing the issue.
    pub suggestion: Option<String>,
}

impl ValidationIssue {
    /// Creates a new error-level validation issue.
    pub fn error(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: ValidationSeverity::Error,
            path: path.into(),
            message: message.into(),
            suggestion: None,
        }
    }

    /// Creates a new warning-level validation issue.
    pub fn warning(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: ValidationSeverity::Warning,
            path: path.into(),
            message: message.into(),
            suggestion: None,
        }
    }

    /// Adds a suggestion to this validation issue.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

impl From<&FieldError> for ValidationIssue {
    fn from(error: &FieldError) -> Self {
        let issue = ValidationIssue::error(error.key(), error.to_string());
        match error {
            FieldError::MissingRequired { key } => issue.with_suggestion(format!(
                "Set {} in the environment or in one of the source files",
                key
            )),
            FieldError::Choice { choices, .. } => {
                issue.with_suggestion(format!("Allowed values: {}", choices))
            }
            _ => issue,
        }
    }
}

/// Result of validating a configuration.
#[derive(Debug, Default)]
pub struct ValidationResult {
    issues: Vec<ValidationIssue>,
}

impl ValidationResult {
    /// Creates an empty validation result.
    pub fn new() -> Self {
        Self { issues: Vec::new() }
    }

    /// Converts build errors into error-level issues.
    pub fn from_errors(errors: &[FieldError]) -> Self {
        Self {
            issues: errors.iter().map(ValidationIssue::from).collect(),
        }
    }

    /// Adds an issue to the result.
    pub fn add(&mut self, issue: ValidationIssue) {
        self.issues.push(issue);
    }

    /// Returns true if there are no errors (warnings are allowed).
    pub fn is_valid(&self) -> bool {
        !self.issues.iter().any(|i| i.severity == ValidationSeverity::Error)
    }

    /// Returns an iterator over error-level issues.
    pub fn errors(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues
            .iter()
            .filter(|i| i.severity == ValidationSeverity::Error)
    }

    /// Returns an iterator over warning-level issues.
    pub fn warnings(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues
            .iter()
            .filter(|i| i.severity == ValidationSeverity::Warning)
    }

    /// Returns the number of errors.
    pub fn error_count(&self) -> usize {
        self.errors().count()
    }
}

/// Checks one field's resolved value against its declared constraints.
///
/// `value` is `None` when neither the sources nor a default supplied anything. A missing
/// required value stops further checks for the field; otherwise every constraint is
/// evaluated and all violations are returned.
pub fn validate(value: Option<&Value>, field: &Field, key: &str) -> Vec<FieldError> {
    let value = match value {
        Some(value) => value,
        None if field.is_required() => {
            return vec![FieldError::MissingRequired {
                key: key.to_string(),
            }]
        }
        None => return Vec::new(),
    };

    // Nothing to compare when the field resolved to no value.
    if value.is_none() {
        return Vec::new();
    }

    let mut errors = Vec::new();

    if let Some(number) = value.as_f64() {
        if let Some(min) = field.min_val() {
            if number < min {
                errors.push(FieldError::Range {
                    key: key.to_string(),
                    value: shown(value, field),
                    bound: Bound::Min,
                    limit: min,
                });
            }
        }
        if let Some(max) = field.max_val() {
            if number > max {
                errors.push(FieldError::Range {
                    key: key.to_string(),
                    value: shown(value, field),
                    bound: Bound::Max,
                    limit: max,
                });
            }
        }
    }

    if let Some(choices) = field.allowed_choices() {
        if !choices.contains(value) {
            errors.push(FieldError::Choice {
                key: key.to_string(),
                value: shown(value, field),
                choices: if field.is_secret() {
                    MASK.to_string()
                } else {
                    choices
                        .iter()
                        .map(Value::to_string)
                        .collect::<Vec<_>>()
                        .join(", ")
                },
            });
        }
    }

    if let Some(predicate) = field.custom_validator() {
        if !predicate(value) {
            errors.push(FieldError::Custom {
                key: key.to_string(),
                value: shown(value, field),
            });
        }
    }

    errors
}

/// Text of a value as it may appear in diagnostics.
pub(crate) fn shown(value: &Value, field: &Field) -> String {
    if field.is_secret() {
        MASK.to_string()
    } else {
        value.to_string()
    }
}

/// Warns about source keys that look like typos of declared keys.
pub fn suggest_unknown_keys<'a>(
    known: &[String],
    candidates: impl IntoIterator<Item = &'a str>,
) -> ValidationResult {
    let mut result = ValidationResult::new();

    for key in candidates {
        if known.iter().any(|k| k == key) {
            continue;
        }
        let closest = known
            .iter()
            .map(|k| (strsim::levenshtein(k, key), k))
            .filter(|(distance, _)| *distance <= 2)
            .min_by_key(|(distance, _)| *distance);

        if let Some((_, suggestion)) = closest {
            result.add(
                ValidationIssue::warning(key, format!("Unknown key '{}'", key))
                    .with_suggestion(format!("Did you mean '{}'?", suggestion)),
            );
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ConfigSchema, FieldType};

    fn built(field: Field) -> Field {
        let schema = ConfigSchema::builder("T").field(field).build().unwrap();
        schema.fields()[0].clone()
    }

    #[test]
    fn test_missing_required_short_circuits() {
        let field = built(Field::integer("PORT").min(1).validator(|_| false));
        let errors = validate(None, &field, "PORT");
        assert_eq!(
            errors,
            vec![FieldError::MissingRequired {
                key: "PORT".into()
            }]
        );
    }

    #[test]
    fn test_absent_optional_field_is_fine() {
        let field = built(Field::integer("PORT").default_none());
        assert!(validate(None, &field, "PORT").is_empty());
        assert!(validate(Some(&Value::None), &field, "PORT").is_empty());
    }

    #[test]
    fn test_bounds_messages() {
        let field = built(Field::integer("SMALL").min(10));
        let errors = validate(Some(&Value::Int(5)), &field, "SMALL");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].to_string(), "SMALL (5) < min_val 10");

        let field = built(Field::integer("LARGE").max(100));
        let errors = validate(Some(&Value::Int(150)), &field, "LARGE");
        assert_eq!(errors[0].to_string(), "LARGE (150) > max_val 100");
    }

    #[test]
    fn test_all_constraints_reported_together() {
        let field = built(
            Field::integer("EVEN")
                .max(10)
                .choices([2, 4, 6])
                .validator(|v| matches!(v, Value::Int(i) if i % 2 == 0)),
        );
        let errors = validate(Some(&Value::Int(11)), &field, "EVEN");
        assert_eq!(errors.len(), 3);
        assert!(matches!(errors[0], FieldError::Range { bound: Bound::Max, .. }));
        assert!(matches!(errors[1], FieldError::Choice { .. }));
        assert!(matches!(errors[2], FieldError::Custom { .. }));
    }

    #[test]
    fn test_choice_membership() {
        let field = built(Field::string("ENV").choices(["dev", "prod"]));
        assert!(validate(Some(&Value::from("dev")), &field, "ENV").is_empty());
        let errors = validate(Some(&Value::from("staging")), &field, "ENV");
        assert!(errors[0].to_string().contains("not in"));
    }

    #[test]
    fn test_secret_values_are_masked_in_errors() {
        let field = built(Field::string("TOKEN").secret().validator(|v| v.to_raw().len() > 20));
        let errors = validate(Some(&Value::from("short-secret")), &field, "TOKEN");
        let message = errors[0].to_string();
        assert!(!message.contains("short-secret"));
        assert!(message.contains(MASK));
    }

    #[test]
    fn test_bounds_on_optional_numeric() {
        let field = built(Field::new("LIMIT", FieldType::optional(FieldType::Float)).min(0.5));
        assert_eq!(validate(Some(&Value::Float(0.1)), &field, "LIMIT").len(), 1);
    }

    #[test]
    fn test_unknown_key_suggestion() {
        let known = vec!["DATABASE_HOST".to_string(), "PORT".to_string()];
        let result = suggest_unknown_keys(&known, ["DATABSE_HOST", "PORT", "UNRELATED"]);
        let warnings: Vec<_> = result.warnings().collect();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].path, "DATABSE_HOST");
        assert_eq!(
            warnings[0].suggestion.as_deref(),
            Some("Did you mean 'DATABASE_HOST'?")
        );
        assert!(result.is_valid());
    }
}
