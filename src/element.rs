//! Element Validator - one element against its type's rule
//!
//! Rules produce findings; `ViolationPolicy` decides how severe a range
//! violation is.

use crate::report::{Finding, FindingCode, Severity};
use crate::rules::{Constraint, ConstraintKind, ElementRule};
use crate::scene::{Element, PropertyValue};

/// Severity policy for range violations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViolationPolicy {
    pub strict: bool,
    /// Distance outside a bound that is still only a warning in lenient mode.
    pub tolerance: f64,
}

impl ViolationPolicy {
    pub fn strict() -> Self {
        Self { strict: true, tolerance: 0.0 }
    }

    pub fn lenient(tolerance: f64) -> Self {
        Self { strict: false, tolerance }
    }

    pub fn range_severity(&self, value: f64, min: f64, max: f64, tolerance: Option<f64>) -> Severity {
        if self.strict {
            return Severity::Error;
        }
        let band = tolerance.unwrap_or(self.tolerance);
        let distance = if value < min { min - value } else { value - max };
        if distance <= band {
            Severity::Warning
        } else {
            Severity::Error
        }
    }
}

impl Default for ViolationPolicy {
    fn default() -> Self {
        Self::lenient(0.0)
    }
}

/// Validate one element. Missing required properties come first, then
/// constraint findings in declaration order.
pub fn validate_element(element: &Element, rule: &ElementRule, policy: &ViolationPolicy) -> Vec<Finding> {
    let mut findings = vec![];

    for name in &rule.required_properties {
        if element.property(name).is_none() {
            findings.push(
                Finding::error(
                    FindingCode::MissingRequiredProperty,
                    format!("Element '{}' is missing required property '{}'", element.id, name),
                )
                .for_element(&element.id)
                .with_remediation(format!("Add the '{}' property to the element", name)),
            );
        }
    }

    for constraint in &rule.constraints {
        // Absence is the required-property check's concern.
        let Some(value) = element.property(&constraint.property) else {
            continue;
        };
        if let Some(finding) = check_constraint(element, constraint, value, policy) {
            findings.push(finding);
        }
    }

    findings
}

fn check_constraint(
    element: &Element,
    constraint: &Constraint,
    value: &PropertyValue,
    policy: &ViolationPolicy,
) -> Option<Finding> {
    let property = &constraint.property;

    match &constraint.kind {
        ConstraintKind::Range { min, max } => {
            let Some(n) = value.as_number() else {
                return Some(type_mismatch(element, constraint, "number", value));
            };
            if n >= *min && n <= *max {
                return None;
            }
            let severity = policy.range_severity(n, *min, *max, constraint.tolerance);
            Some(
                Finding::new(
                    severity,
                    FindingCode::OutOfRange,
                    format!(
                        "Property '{}' value {} is outside the allowed range [{}, {}]",
                        property, n, min, max
                    ),
                )
                .for_element(&element.id)
                .with_remediation(format!("Adjust '{}' to be within range [{}, {}]", property, min, max)),
            )
        }
        ConstraintKind::OneOf(allowed) => {
            if !value.is_scalar() {
                return Some(type_mismatch(element, constraint, "string, number or bool", value));
            }
            if allowed.iter().any(|a| value.matches(a)) {
                return None;
            }
            let listed = allowed.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ");
            Some(
                Finding::error(
                    FindingCode::InvalidValue,
                    format!("Property '{}' value {} is not one of: {}", property, value, listed),
                )
                .for_element(&element.id)
                .with_remediation(format!("Use one of the allowed values for '{}': {}", property, listed)),
            )
        }
    }
}

fn type_mismatch(element: &Element, constraint: &Constraint, expected: &str, actual: &PropertyValue) -> Finding {
    Finding::error(
        FindingCode::TypeMismatch,
        format!(
            "Property '{}' must be a {} for constraint '{}', got {} {}",
            constraint.property,
            expected,
            constraint.name,
            actual.kind(),
            actual
        ),
    )
    .for_element(&element.id)
}
