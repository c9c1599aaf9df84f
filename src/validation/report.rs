//! Human-readable build reports.

use super::{ValidationIssue, ValidationResult, ValidationSeverity};
use crate::error::AggregateBuildError;

/// Formats a validation result into a report listing errors before warnings.
pub fn format_report(result: &ValidationResult) -> String {
    let errors: Vec<_> = result.errors().collect();
    let warnings: Vec<_> = result.warnings().collect();

    if errors.is_empty() && warnings.is_empty() {
        return "Configuration is valid.".to_string();
    }

    let mut report = String::new();

    if !errors.is_empty() {
        report.push_str("\nConfiguration Build Failed\n");
        report.push_str("==========================\n\n");
    }

    for issue in &errors {
        report.push_str(&format_issue(issue));
        report.push('\n');
    }

    if !warnings.is_empty() {
        if !errors.is_empty() {
            report.push_str("\nWarnings:\n");
            report.push_str("---------\n\n");
        }
        for issue in &warnings {
            report.push_str(&format_issue(issue));
            report.push('\n');
        }
    }

    report.push_str("---\n");
    report.push_str(&format!(
        "{} warning(s), {} error(s)\n",
        warnings.len(),
        errors.len()
    ));

    report
}

/// Formats every entry of a failed build.
pub fn format_build_errors(error: &AggregateBuildError) -> String {
    format_report(&ValidationResult::from_errors(error.errors()))
}

fn format_issue(issue: &ValidationIssue) -> String {
    let label = match issue.severity {
        ValidationSeverity::Error => "ERROR",
        ValidationSeverity::Warning => "WARNING",
    };

    let mut output = format!("{} {}\n", label, issue.path);
    output.push_str(&format!("  └─ {}\n", issue.message));

    if let Some(suggestion) = &issue.suggestion {
        output.push_str(&format!("     {}\n", suggestion));
    }

    output
}

/// One-line summary, used in reload logs.
pub fn format_brief_summary(result: &ValidationResult) -> String {
    let error_count = result.error_count();
    let warning_count = result.warnings().count();

    if error_count == 0 && warning_count == 0 {
        "Configuration valid".to_string()
    } else if error_count == 0 {
        format!("Configuration valid with {} warning(s)", warning_count)
    } else {
        format!(
            "Configuration invalid: {} error(s), {} warning(s)",
            error_count, warning_count
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FieldError;

    #[test]
    fn test_valid_report() {
        assert_eq!(format_report(&ValidationResult::new()), "Configuration is valid.");
        assert_eq!(format_brief_summary(&ValidationResult::new()), "Configuration valid");
    }

    #[test]
    fn test_report_lists_errors_with_suggestions() {
        let errors = [
            FieldError::MissingRequired {
                key: "MYAPP_PORT".into(),
            },
            FieldError::Custom {
                key: "NAME".into(),
                value: "x".into(),
            },
        ];
        let result = ValidationResult::from_errors(&errors);
        let report = format_report(&result);

        assert!(report.contains("Configuration Build Failed"));
        assert!(report.contains("ERROR MYAPP_PORT\n  └─ Missing required variable: MYAPP_PORT"));
        assert!(report.contains("     Set MYAPP_PORT in the environment"));
        assert!(report.contains("0 warning(s), 2 error(s)"));
        assert_eq!(
            format_brief_summary(&result),
            "Configuration invalid: 2 error(s), 0 warning(s)"
        );
    }

    #[test]
    fn test_warnings_only() {
        let mut result = ValidationResult::new();
        result.add(ValidationIssue::warning("PROT", "Unknown key 'PROT'"));
        let report = format_report(&result);
        assert!(!report.contains("Build Failed"));
        assert!(report.starts_with("WARNING PROT"));
        assert_eq!(
            format_brief_summary(&result),
            "Configuration valid with 1 warning(s)"
        );
    }
}
