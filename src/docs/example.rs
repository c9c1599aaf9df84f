//! `.env.example` generation.

use crate::schema::{ConfigSchema, DefaultPresence, Field};
use crate::value::Value;

/// Renders a dotenv file listing every key with its default.
///
/// Required fields are left empty and marked; secret defaults are never written out.
pub fn example(schema: &ConfigSchema) -> String {
    let mut lines = vec![format!("# {} environment variables", schema.name())];
    example_into(schema, "", &mut lines);
    lines.push(String::new());
    lines.join("\n")
}

fn example_into(schema: &ConfigSchema, prefix: &str, lines: &mut Vec<String>) {
    for field in schema.fields() {
        if let Some(nested) = field.field_type().nested_schema() {
            lines.push(String::new());
            lines.push(format!("# --- {} Configuration ---", field.name()));
            example_into(nested, &format!("{}{}", prefix, field.key_prefix()), lines);
            continue;
        }

        if let Some(description) = field.doc() {
            lines.push(format!("# {}", description));
        }
        lines.push(example_line(field, prefix));
    }
}

fn example_line(field: &Field, prefix: &str) -> String {
    let key = format!("{}{}", prefix, field.relative_key());
    let mut comment = String::new();

    let value = match field.default_presence() {
        DefaultPresence::Required => {
            comment.push_str("  # Required");
            String::new()
        }
        DefaultPresence::Value(_) if field.is_secret() => {
            comment.push_str("  # Secret");
            String::new()
        }
        DefaultPresence::Value(value) => value.to_raw(),
        DefaultPresence::NoneValue => String::new(),
    };

    if let Some(choices) = field.allowed_choices() {
        let choices: Vec<_> = choices.iter().map(Value::to_raw).collect();
        comment.push_str(&format!("  # Choices: {}", choices.join(", ")));
    }

    format!("{}={}{}", key, value, comment)
}
