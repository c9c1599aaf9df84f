//! Markdown reference tables.

use super::describe;
use crate::schema::ConfigSchema;

/// Renders one table row per field, grouped under a heading per nested section.
pub fn markdown(schema: &ConfigSchema) -> String {
    let mut out = format!("# {}\n", schema.name());
    let mut current_section: Option<String> = None;
    let mut table_open = false;

    for doc in describe(schema) {
        if !table_open || doc.section != current_section {
            if let Some(section) = &doc.section {
                out.push_str(&format!("\n## {}\n", section));
            }
            out.push_str("\n| Variable | Type | Required | Default | Secret | Description |\n");
            out.push_str("|---|---|---|---|---|---|\n");
            current_section = doc.section.clone();
            table_open = true;
        }

        let default = match &doc.default {
            Some(value) => format!("`{}`", value),
            None => "-".to_string(),
        };

        let mut description = doc.description.clone().unwrap_or_default();
        if !doc.choices.is_empty() {
            let choices: Vec<_> = doc.choices.iter().map(|c| format!("`{}`", c)).collect();
            if !description.is_empty() {
                description.push(' ');
            }
            description.push_str(&format!("One of: {}", choices.join(", ")));
        }

        out.push_str(&format!(
            "| `{}` | `{}` | {} | {} | {} | {} |\n",
            doc.key,
            doc.type_name,
            yes_no(doc.required),
            default,
            yes_no(doc.secret),
            escape(&description),
        ));
    }

    out
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "Yes"
    } else {
        "No"
    }
}

fn escape(cell: &str) -> String {
    cell.replace('|', "\\|")
}
