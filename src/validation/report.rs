//! Plain-text rendering of validation findings.

use super::{Severity, ValidationIssue};

/// Renders validation findings as plain text.
#[derive(Debug, Default, Clone, Copy)]
pub struct ValidationReporter;

impl ValidationReporter {
    /// One entry per issue, with the suggestion on an indented second line.
    pub fn format_issues(&self, issues: &[ValidationIssue]) -> String {
        if issues.is_empty() {
            return "No issues found".to_string();
        }

        issues
            .iter()
            .map(|issue| {
                let field = issue
                    .field
                    .as_deref()
                    .map(|f| format!(" ({f})"))
                    .unwrap_or_default();
                let mut line = format!(
                    "{}{field}: {}",
                    issue.severity.as_str().to_uppercase(),
                    issue.message
                );
                if let Some(suggestion) = &issue.suggestion {
                    line.push_str(&format!("\n   Suggestion: {suggestion}"));
                }
                line
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Counts per severity, e.g. `Validation complete: 1 error(s), 2 warning(s)`.
    pub fn summary(&self, issues: &[ValidationIssue]) -> String {
        if issues.is_empty() {
            return "Configuration validation passed".to_string();
        }

        let count = |severity: Severity| issues.iter().filter(|i| i.severity == severity).count();
        let mut parts = Vec::new();
        let errors = count(Severity::Error);
        if errors > 0 {
            parts.push(format!("{errors} error(s)"));
        }
        let warnings = count(Severity::Warning);
        if warnings > 0 {
            parts.push(format!("{warnings} warning(s)"));
        }
        let infos = count(Severity::Info);
        if infos > 0 {
            parts.push(format!("{infos} info"));
        }

        format!("Validation complete: {}", parts.join(", "))
    }

    pub fn has_errors(&self, issues: &[ValidationIssue]) -> bool {
        issues.iter().any(ValidationIssue::is_error)
    }
}
