//! Report Builder - ordered findings with severity tallies

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::Write as _;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Suggestion,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Suggestion => "suggestion",
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FindingCode {
    MissingRequiredProperty,
    OutOfRange,
    InvalidValue,
    TypeMismatch,
    UnknownElementType,
    TooManyElements,
    ResolutionTooLow,
    InvalidColorSpace,
    NonStandardFrameRate,
    HighComplexity,
    ValidationTimeout,
    ValidationCancelled,
}

impl FindingCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FindingCode::MissingRequiredProperty => "MISSING_REQUIRED_PROPERTY",
            FindingCode::OutOfRange => "OUT_OF_RANGE",
            FindingCode::InvalidValue => "INVALID_VALUE",
            FindingCode::TypeMismatch => "TYPE_MISMATCH",
            FindingCode::UnknownElementType => "UNKNOWN_ELEMENT_TYPE",
            FindingCode::TooManyElements => "TOO_MANY_ELEMENTS",
            FindingCode::ResolutionTooLow => "RESOLUTION_TOO_LOW",
            FindingCode::InvalidColorSpace => "INVALID_COLOR_SPACE",
            FindingCode::NonStandardFrameRate => "NON_STANDARD_FRAME_RATE",
            FindingCode::HighComplexity => "HIGH_COMPLEXITY",
            FindingCode::ValidationTimeout => "VALIDATION_TIMEOUT",
            FindingCode::ValidationCancelled => "VALIDATION_CANCELLED",
        }
    }
}

impl fmt::Display for FindingCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One compliance observation. Built once, never edited by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    pub severity: Severity,
    pub code: FindingCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_id: Option<String>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
}

impl Finding {
    pub fn new(severity: Severity, code: FindingCode, message: impl Into<String>) -> Self {
        Self {
            severity,
            code,
            element_id: None,
            message: message.into(),
            remediation: None,
        }
    }

    pub fn error(code: FindingCode, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, code, message)
    }

    pub fn warning(code: FindingCode, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, code, message)
    }

    pub fn suggestion(code: FindingCode, message: impl Into<String>) -> Self {
        Self::new(Severity::Suggestion, code, message)
    }

    pub fn for_element(mut self, element_id: impl Into<String>) -> Self {
        self.element_id = Some(element_id.into());
        self
    }

    pub fn with_remediation(mut self, remediation: impl Into<String>) -> Self {
        self.remediation = Some(remediation.into());
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub error_count: usize,
    pub warning_count: usize,
    pub suggestion_count: usize,
}

impl Summary {
    pub fn total(&self) -> usize {
        self.error_count + self.warning_count + self.suggestion_count
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub findings: Vec<Finding>,
    pub summary: Summary,
    pub passed: bool,
}

impl ValidationReport {
    pub fn by_severity(&self, severity: Severity) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(move |f| f.severity == severity)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Finding> {
        self.by_severity(Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Finding> {
        self.by_severity(Severity::Warning)
    }

    pub fn suggestions(&self) -> impl Iterator<Item = &Finding> {
        self.by_severity(Severity::Suggestion)
    }

    pub fn for_element<'a>(&'a self, element_id: &'a str) -> impl Iterator<Item = &'a Finding> {
        self.findings
            .iter()
            .filter(move |f| f.element_id.as_deref() == Some(element_id))
    }

    pub fn has_code(&self, code: FindingCode) -> bool {
        self.findings.iter().any(|f| f.code == code)
    }
}

/// Tally findings into a report. Order is preserved as given.
pub fn build(findings: Vec<Finding>) -> ValidationReport {
    let mut summary = Summary::default();
    for finding in &findings {
        match finding.severity {
            Severity::Error => summary.error_count += 1,
            Severity::Warning => summary.warning_count += 1,
            Severity::Suggestion => summary.suggestion_count += 1,
        }
    }

    ValidationReport {
        passed: summary.error_count == 0,
        findings,
        summary,
    }
}

/// Human-readable rendering used by the CLI `text` format.
pub fn render_text(scene_id: &str, report: &ValidationReport) -> String {
    let mut out = String::new();
    let rule = "-".repeat(50);

    let _ = writeln!(out, "Scene Validation Results - {}", scene_id);
    let _ = writeln!(out, "{}", "=".repeat(50));
    let _ = writeln!(out, "Passed: {}", if report.passed { "Yes" } else { "No" });
    let _ = writeln!(
        out,
        "Errors: {}  Warnings: {}  Suggestions: {}",
        report.summary.error_count, report.summary.warning_count, report.summary.suggestion_count
    );

    for (title, severity) in [
        ("Errors", Severity::Error),
        ("Warnings", Severity::Warning),
        ("Suggestions", Severity::Suggestion),
    ] {
        let findings: Vec<_> = report.by_severity(severity).collect();
        if findings.is_empty() {
            continue;
        }

        let _ = writeln!(out, "\n{}:", title);
        let _ = writeln!(out, "{}", rule);
        for (i, finding) in findings.iter().enumerate() {
            let _ = writeln!(out, "{}. {}: {}", i + 1, finding.code, finding.message);
            if let Some(id) = &finding.element_id {
                let _ = writeln!(out, "   Element: {}", id);
            }
            if let Some(remediation) = &finding.remediation {
                let _ = writeln!(out, "   Suggestion: {}", remediation);
            }
        }
    }

    out
}
