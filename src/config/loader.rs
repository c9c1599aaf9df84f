//! Building configuration instances from raw sources.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, error, warn};

use super::instance::{ConfigInstance, MASK};
use crate::cast::cast;
use crate::error::{AggregateBuildError, BuildError, FieldError};
use crate::schema::{ConfigSchema, DefaultPresence, Field};
use crate::source::{
    loaded_markers, merge, ChangeMarker, EffectiveRawMap, RawSource, SourceIdentity, SourceSet,
};
use crate::validation::report::{format_brief_summary, format_build_errors};
use crate::validation::{suggest_unknown_keys, validate, ValidationResult};
use crate::value::Value;

/// Builds one instance of `schema` from `sources`, resolving keys under `prefix`.
///
/// Every field is attempted; all problems found are returned together and no partial
/// instance ever escapes.
pub fn build(
    schema: &Arc<ConfigSchema>,
    sources: &[RawSource],
    prefix: &str,
) -> Result<ConfigInstance, AggregateBuildError> {
    let effective = merge(sources, prefix);
    let mut errors = Vec::new();
    let instance = build_level(schema, &effective, &mut errors);

    warn_unknown_keys(schema, sources, prefix);

    match instance {
        Some(instance) if errors.is_empty() => {
            debug!(schema = schema.name(), prefix, "Configuration built");
            Ok(instance)
        }
        _ => {
            let result = ValidationResult::from_errors(&errors);
            debug!(schema = schema.name(), prefix, "{}", format_brief_summary(&result));
            Err(AggregateBuildError::new(errors))
        }
    }
}

fn build_level(
    schema: &Arc<ConfigSchema>,
    map: &EffectiveRawMap,
    errors: &mut Vec<FieldError>,
) -> Option<ConfigInstance> {
    let errors_before = errors.len();
    let mut values = HashMap::with_capacity(schema.fields().len());

    for field in schema.fields() {
        if let Some(nested) = field.field_type().nested_schema() {
            let child_map = map.rebase(&field.key_prefix());
            if let Some(child) = build_level(nested, &child_map, errors) {
                values.insert(field.name().to_string(), Value::Section(Arc::new(child)));
            }
            continue;
        }

        let key = field.relative_key();
        let qualified = map.qualified(&key);
        if let Some(value) = resolve(field, map.get(&key), &qualified, errors) {
            values.insert(field.name().to_string(), value);
        }
    }

    if errors.len() > errors_before {
        return None;
    }

    let instance = ConfigInstance::new(schema.clone(), map.prefix(), values);

    // Hooks only run on levels whose fields are all valid.
    if let Some(hook) = schema.hook() {
        if let Err(message) = hook(&instance) {
            errors.push(FieldError::Hook {
                scope: schema.name().to_string(),
                message,
            });
            return None;
        }
    }

    Some(instance)
}

/// Casts and validates one scalar field, falling back to its default when no source has it.
fn resolve(
    field: &Field,
    raw: Option<&str>,
    key: &str,
    errors: &mut Vec<FieldError>,
) -> Option<Value> {
    let value = match cast(raw, field) {
        Ok(Some(value)) => Some(value),
        Ok(None) => match field.default_presence() {
            DefaultPresence::Value(default) => Some(default.clone()),
            DefaultPresence::NoneValue => Some(Value::None),
            DefaultPresence::Required => None,
        },
        Err(mut e) => {
            if field.is_secret() {
                e.raw = MASK.to_string();
            }
            errors.push(FieldError::Cast {
                key: key.to_string(),
                source: e,
            });
            return None;
        }
    };

    let problems = validate(value.as_ref(), field, key);
    if problems.is_empty() {
        value
    } else {
        errors.extend(problems);
        None
    }
}

/// Fully-qualified keys of every scalar field in `schema`.
pub fn qualified_keys(schema: &ConfigSchema, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    for field in schema.fields() {
        match field.field_type().nested_schema() {
            Some(nested) => {
                keys.extend(qualified_keys(nested, &format!("{}{}", prefix, field.key_prefix())))
            }
            None => keys.push(format!("{}{}", prefix, field.relative_key())),
        }
    }
    keys
}

fn warn_unknown_keys(schema: &ConfigSchema, sources: &[RawSource], prefix: &str) {
    let known = qualified_keys(schema, prefix);
    // Environment keys are never checked.
    let candidates = sources
        .iter()
        .filter(|s| s.identity != SourceIdentity::Environment)
        .flat_map(|s| s.entries.keys().map(String::as_str));

    let result = suggest_unknown_keys(&known, candidates);
    for issue in result.warnings() {
        warn!(
            path = %issue.path,
            message = %issue.message,
            suggestion = ?issue.suggestion,
            "Config validation warning"
        );
    }
}

/// Loads every source once and builds the root instance.
pub fn build_initial(
    schema: &Arc<ConfigSchema>,
    sources: &SourceSet,
) -> Result<Arc<ConfigInstance>, BuildError> {
    build_snapshot(schema, sources)
        .map(|(instance, _)| instance)
        .map_err(|e| {
            if let BuildError::Invalid(aggregate) = &e {
                error!("{}", format_build_errors(aggregate));
            }
            e
        })
}

/// Builds the root instance along with the markers of the content it was built from.
pub(crate) fn build_snapshot(
    schema: &Arc<ConfigSchema>,
    sources: &SourceSet,
) -> Result<(Arc<ConfigInstance>, Vec<Option<ChangeMarker>>), BuildError> {
    let loaded = sources.load()?;
    let instance = build(schema, &loaded, "")?;
    Ok((Arc::new(instance), loaded_markers(&loaded)))
}
