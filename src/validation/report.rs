//! Validation report formatting.

use super::{ValidationIssue, ValidationResult, ValidationSeverity};

/// Renders a result as a multi-line report: errors first, then warnings,
/// then a tally. `subject` names what was checked, e.g. "Config".
pub fn format_report(subject: &str, result: &ValidationResult) -> String {
    let errors: Vec<_> = result.errors().collect();
    let warnings: Vec<_> = result.warnings().collect();

    if errors.is_empty() && warnings.is_empty() {
        return format!("{} valid.", subject);
    }

    let mut report = String::new();
    if !errors.is_empty() {
        let title = format!("{} Validation Failed", subject);
        report.push_str(&format!("\n{}\n{}\n\n", title, "=".repeat(title.len())));
        report.extend(errors.iter().map(|issue| format_issue(issue)));
    }
    if !warnings.is_empty() {
        if !errors.is_empty() {
            report.push_str("\nWarnings:\n---------\n\n");
        }
        report.extend(warnings.iter().map(|issue| format_issue(issue)));
    }

    report.push_str(&format!(
        "---\n{} warning(s), {} error(s)\n",
        warnings.len(),
        errors.len()
    ));
    if !errors.is_empty() {
        report.push_str(&format!("{} rejected.\n", subject));
    }
    report
}

fn format_issue(issue: &ValidationIssue) -> String {
    let label = match issue.severity {
        ValidationSeverity::Error => "ERROR",
        ValidationSeverity::Warning => "WARNING",
    };

    let mut line = format!("{} {}\n  └─ {}\n", label, issue.path, issue.message);
    if let Some(suggestion) = &issue.suggestion {
        line.push_str(&format!("     {}\n", suggestion));
    }
    line.push('\n');
    line
}

/// Formats a one-line summary suitable for a job's failure message.
pub fn format_brief_summary(result: &ValidationResult) -> String {
    let messages: Vec<String> = result
        .errors()
        .map(|i| format!("{}: {}", i.path, i.message))
        .collect();

    if messages.is_empty() {
        "valid".to_string()
    } else {
        messages.join("; ")
    }
}
