//! Scene Validator - global checks, per-element dispatch, aggregation
//!
//! Stateless: every call gets its rule set and document by reference and
//! returns a fresh report. The deadline and the caller's cancel flag are
//! checked between elements, never inside one. The deadline is checked once
//! more after the last element.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::element::{validate_element, ViolationPolicy};
use crate::report::{self, Finding, FindingCode, ValidationReport};
use crate::rules::RuleSet;
use crate::scene::{Element, SceneDocument};

const FRAME_RATE_EPSILON: f64 = 0.001;
const REFERENCE_PIXELS: f64 = 1920.0 * 1080.0;
const REFERENCE_FRAME_RATE: f64 = 24.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AbortReason {
    Timeout,
    Cancelled,
}

impl AbortReason {
    fn code(&self) -> FindingCode {
        match self {
            AbortReason::Timeout => FindingCode::ValidationTimeout,
            AbortReason::Cancelled => FindingCode::ValidationCancelled,
        }
    }
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AbortReason::Timeout => "timeout",
            AbortReason::Cancelled => "cancelled",
        })
    }
}

/// A run that stopped early. The partial report is kept, marked failed.
#[derive(Debug, Error)]
#[error("Validation aborted ({reason}) after {elements_checked} of {element_count} elements")]
pub struct ValidationAborted {
    pub reason: AbortReason,
    pub elements_checked: usize,
    pub element_count: usize,
    pub report: ValidationReport,
}

impl ValidationAborted {
    pub fn into_report(self) -> ValidationReport {
        self.report
    }
}

/// Where a run may stop: a wall-clock deadline and an optional cancel flag.
#[derive(Debug, Clone, Copy, Default)]
pub struct Checkpoint<'a> {
    deadline: Option<Instant>,
    cancel: Option<&'a AtomicBool>,
}

impl<'a> Checkpoint<'a> {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            cancel: None,
        }
    }

    /// A deadline `timeout` from now. Timeouts too large to represent never fire.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Instant::now().checked_add(timeout),
            cancel: None,
        }
    }

    pub fn cancelled_by(mut self, flag: &'a AtomicBool) -> Self {
        self.cancel = Some(flag);
        self
    }

    fn check(&self) -> Option<AbortReason> {
        if self.cancel.is_some_and(|flag| flag.load(Ordering::Acquire)) {
            return Some(AbortReason::Cancelled);
        }
        self.check_deadline()
    }

    fn check_deadline(&self) -> Option<AbortReason> {
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(AbortReason::Timeout),
            _ => None,
        }
    }
}

/// Validate under the rule set's own time budget.
pub fn validate(document: &SceneDocument, rules: &RuleSet) -> Result<ValidationReport, ValidationAborted> {
    let checkpoint = Checkpoint::with_timeout(rules.performance_limits.timeout());
    validate_with(document, rules, &checkpoint)
}

pub fn validate_with(
    document: &SceneDocument,
    rules: &RuleSet,
    checkpoint: &Checkpoint<'_>,
) -> Result<ValidationReport, ValidationAborted> {
    let element_count = document.elements.len();
    tracing::debug!(scene_id = %document.scene_id, elements = element_count, "validating scene");

    let mut findings = global_findings(document, rules);

    if element_count > rules.performance_limits.max_elements {
        tracing::debug!(
            elements = element_count,
            max = rules.performance_limits.max_elements,
            "element limit exceeded, skipping per-element phase"
        );
        return Ok(report::build(findings));
    }

    let policy = rules.policy();
    for (index, element) in document.elements.iter().enumerate() {
        if let Some(reason) = checkpoint.check() {
            let message = format!(
                "Validation stopped ({}) before element '{}'; {} of {} elements checked",
                reason, element.id, index, element_count
            );
            return Err(abort(document, findings, reason, message, index));
        }
        findings.extend(element_findings(element, rules, &policy));
    }

    // Deadline only: a cancel after the final element has nothing left to stop.
    if let Some(reason) = checkpoint.check_deadline() {
        let message = format!(
            "Validation exceeded its time budget after all {} elements were checked",
            element_count
        );
        return Err(abort(document, findings, reason, message, element_count));
    }

    Ok(report::build(findings))
}

fn abort(
    document: &SceneDocument,
    mut findings: Vec<Finding>,
    reason: AbortReason,
    message: String,
    elements_checked: usize,
) -> ValidationAborted {
    findings.push(Finding::error(reason.code(), message));
    tracing::warn!(scene_id = %document.scene_id, %reason, checked = elements_checked, "validation aborted");
    ValidationAborted {
        reason,
        elements_checked,
        element_count: document.elements.len(),
        report: report::build(findings),
    }
}

fn element_findings(element: &Element, rules: &RuleSet, policy: &ViolationPolicy) -> Vec<Finding> {
    match rules.rule_for(&element.element_type) {
        Some(rule) => validate_element(element, rule, policy),
        None if rules.allow_unknown_elements => vec![],
        None => {
            let known = rules.element_types().collect::<Vec<_>>().join(", ");
            vec![Finding::error(
                FindingCode::UnknownElementType,
                format!("Element type '{}' is not allowed", element.element_type),
            )
            .for_element(&element.id)
            .with_remediation(format!("Use one of the allowed element types: {}", known))]
        }
    }
}

fn global_findings(document: &SceneDocument, rules: &RuleSet) -> Vec<Finding> {
    let mut findings = vec![];
    let limits = &rules.performance_limits;

    if document.elements.len() > limits.max_elements {
        findings.push(
            Finding::error(
                FindingCode::TooManyElements,
                format!(
                    "Scene has {} elements, more than the limit of {}",
                    document.elements.len(),
                    limits.max_elements
                ),
            )
            .with_remediation("Split the scene or raise performanceLimits.maxElements"),
        );
    }

    let min = rules.min_resolution;
    let actual = document.resolution;
    if actual.width < min.width || actual.height < min.height {
        findings.push(
            Finding::error(
                FindingCode::ResolutionTooLow,
                format!("Resolution {} is below the minimum requirement of {}", actual, min),
            )
            .with_remediation(format!("Increase resolution to at least {}", min)),
        );
    }

    // An empty allow-list accepts any color space.
    if !rules.allowed_color_spaces.is_empty() {
        let allowed = rules.allowed_color_spaces.iter().cloned().collect::<Vec<_>>().join(", ");
        let accepted = document
            .color_space
            .as_ref()
            .is_some_and(|cs| rules.allowed_color_spaces.contains(cs));
        if !accepted {
            let message = match &document.color_space {
                Some(cs) => format!("Color space '{}' is not in the allowed list: {}", cs, allowed),
                None => format!("Scene declares no color space; allowed: {}", allowed),
            };
            findings.push(
                Finding::error(FindingCode::InvalidColorSpace, message)
                    .with_remediation(format!("Use one of the allowed color spaces: {}", allowed)),
            );
        }
    }

    if let Some(rate) = document.frame_rate {
        let standard = &rules.standard_frame_rates;
        if !standard.is_empty() && !standard.iter().any(|s| (s - rate).abs() < FRAME_RATE_EPSILON) {
            let listed = standard.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ");
            findings.push(
                Finding::warning(
                    FindingCode::NonStandardFrameRate,
                    format!("Frame rate {} is not a standard frame rate", rate),
                )
                .with_remediation(format!("Consider using a standard frame rate: {}", listed)),
            );
        }
    }

    if let Some(budget) = rules.complexity_budget {
        let score = complexity_score(document);
        if score > budget {
            findings.push(
                Finding::suggestion(
                    FindingCode::HighComplexity,
                    format!("Scene complexity {:.2} exceeds the budget of {}", score, budget),
                )
                .with_remediation("Reduce element count, resolution or frame rate"),
            );
        }
    }

    findings
}

/// Element count scaled by resolution (relative to 1080p) and frame rate
/// (relative to 24 fps; assumed when the scene declares none).
pub fn complexity_score(document: &SceneDocument) -> f64 {
    let resolution_factor = document.resolution.pixels() as f64 / REFERENCE_PIXELS;
    let frame_rate_factor = document.frame_rate.unwrap_or(REFERENCE_FRAME_RATE) / REFERENCE_FRAME_RATE;
    document.elements.len() as f64 * resolution_factor * frame_rate_factor
}
