//! Rule Set - Validation Contracts
//!
//! Configuration is parsed into `RuleSetConfig` and then resolved into a
//! `RuleSet`. Resolution is where every config invariant is checked, so a
//! `RuleSet` that exists is one the validator can trust.

use indexmap::IndexMap;
use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::fs;
use std::marker::PhantomData;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::element::ViolationPolicy;
use crate::scene::{PropertyValue, Resolution};
use crate::ENGINE_VERSION;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid rule set: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Failed to read rule set file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Constraint '{constraint}' for '{element_type}' has min {min} > max {max}")]
    InvertedRange {
        element_type: String,
        constraint: String,
        min: f64,
        max: f64,
    },

    #[error("Invalid constraint '{constraint}' for '{element_type}': {reason}")]
    InvalidConstraint {
        element_type: String,
        constraint: String,
        reason: String,
    },

    #[error("Required property '{property}' listed more than once for '{element_type}'")]
    DuplicateRequiredProperty { element_type: String, property: String },

    #[error("minResolution must be positive on both axes, got {width}x{height}")]
    InvalidMinResolution { width: u32, height: u32 },

    #[error("Tolerance must be a non-negative finite number, got {0}")]
    InvalidTolerance(f64),

    #[error("performanceLimits.timeoutSeconds must be positive, got {0}")]
    InvalidTimeout(f64),

    #[error("Invalid engineMinVersion '{0}'")]
    InvalidEngineVersion(String),

    #[error("Rule set requires engine >= {required}, current is {current}")]
    EngineVersionMismatch { required: String, current: String },
}

// --- Raw configuration (serde shape) ---

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSetConfig {
    #[serde(default)]
    pub strict_mode: bool,
    #[serde(default = "default_true")]
    pub allow_unknown_elements: bool,
    #[serde(default = "default_min_resolution")]
    pub min_resolution: Resolution,
    #[serde(default)]
    pub allowed_color_spaces: Vec<String>,
    #[serde(default, deserialize_with = "unique_keys")]
    pub element_rules: BTreeMap<String, ElementRuleConfig>,
    #[serde(default)]
    pub performance_limits: PerformanceLimits,
    #[serde(default)]
    pub range_tolerance: f64,
    #[serde(default = "default_frame_rates")]
    pub standard_frame_rates: Vec<f64>,
    #[serde(default)]
    pub complexity_budget: Option<f64>,
    #[serde(default)]
    pub engine_min_version: Option<String>,
}

fn default_true() -> bool { true }

fn default_min_resolution() -> Resolution { Resolution::new(1, 1) }

fn default_frame_rates() -> Vec<f64> {
    vec![23.976, 24.0, 25.0, 29.97, 30.0, 50.0, 59.94, 60.0]
}

impl Default for RuleSetConfig {
    fn default() -> Self {
        Self {
            strict_mode: false,
            allow_unknown_elements: true,
            min_resolution: default_min_resolution(),
            allowed_color_spaces: vec![],
            element_rules: BTreeMap::new(),
            performance_limits: PerformanceLimits::default(),
            range_tolerance: 0.0,
            standard_frame_rates: default_frame_rates(),
            complexity_budget: None,
            engine_min_version: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementRuleConfig {
    #[serde(default)]
    pub required_properties: Vec<String>,
    #[serde(default, deserialize_with = "unique_keys")]
    pub constraints: IndexMap<String, ConstraintConfig>,
}

/// Deserialize a JSON object into a map, failing on a repeated key instead of
/// letting the last entry win.
fn unique_keys<'de, D, V, M>(deserializer: D) -> Result<M, D::Error>
where
    D: Deserializer<'de>,
    V: Deserialize<'de>,
    M: Default + Extend<(String, V)>,
{
    struct UniqueKeys<V, M>(PhantomData<(V, M)>);

    impl<'de, V, M> Visitor<'de> for UniqueKeys<V, M>
    where
        V: Deserialize<'de>,
        M: Default + Extend<(String, V)>,
    {
        type Value = M;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("an object with unique keys")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<M, A::Error> {
            let mut seen = HashSet::new();
            let mut map = M::default();
            while let Some(key) = access.next_key::<String>()? {
                if !seen.insert(key.clone()) {
                    return Err(de::Error::custom(format!("duplicate key '{}'", key)));
                }
                let value = access.next_value::<V>()?;
                map.extend(std::iter::once((key, value)));
            }
            Ok(map)
        }
    }

    deserializer.deserialize_map(UniqueKeys(PhantomData))
}

/// A constraint as written in config.
///
/// The shorthand `"fov_range": [10, 120]` targets the property named by the
/// key minus its `_range` suffix; it is resolved once, at load time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConstraintConfig {
    Shorthand([f64; 2]),
    Explicit(ConstraintSpec),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ConstraintSpec {
    #[serde(default)]
    pub property: Option<String>,
    #[serde(default)]
    pub range: Option<[f64; 2]>,
    #[serde(default)]
    pub one_of: Option<Vec<PropertyValue>>,
    #[serde(default)]
    pub tolerance: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceLimits {
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: f64,
    #[serde(default = "default_max_elements")]
    pub max_elements: usize,
}

fn default_timeout_seconds() -> f64 { 30.0 }
fn default_max_elements() -> usize { 1000 }

impl Default for PerformanceLimits {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout_seconds(),
            max_elements: default_max_elements(),
        }
    }
}

impl PerformanceLimits {
    pub fn timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.timeout_seconds).unwrap_or(Duration::MAX)
    }
}

// --- Resolved rule set ---

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ConstraintKind {
    Range { min: f64, max: f64 },
    OneOf(Vec<PropertyValue>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Constraint {
    pub name: String,
    pub property: String,
    pub kind: ConstraintKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tolerance: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementRule {
    pub required_properties: Vec<String>,
    /// In declaration order.
    pub constraints: Vec<Constraint>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSet {
    pub strict_mode: bool,
    pub allow_unknown_elements: bool,
    pub min_resolution: Resolution,
    pub allowed_color_spaces: BTreeSet<String>,
    pub element_rules: BTreeMap<String, ElementRule>,
    pub performance_limits: PerformanceLimits,
    pub range_tolerance: f64,
    pub standard_frame_rates: Vec<f64>,
    pub complexity_budget: Option<f64>,
}

impl RuleSet {
    pub fn from_config(config: RuleSetConfig) -> Result<Self, ConfigError> {
        if let Some(required) = &config.engine_min_version {
            check_engine_version(required)?;
        }

        let min = config.min_resolution;
        if min.width == 0 || min.height == 0 {
            return Err(ConfigError::InvalidMinResolution {
                width: min.width,
                height: min.height,
            });
        }

        check_tolerance(config.range_tolerance)?;

        let timeout = config.performance_limits.timeout_seconds;
        if !(timeout > 0.0) {
            return Err(ConfigError::InvalidTimeout(timeout));
        }

        let mut element_rules = BTreeMap::new();
        for (element_type, rule) in config.element_rules {
            let resolved = resolve_element_rule(&element_type, rule)?;
            element_rules.insert(element_type, resolved);
        }

        Ok(Self {
            strict_mode: config.strict_mode,
            allow_unknown_elements: config.allow_unknown_elements,
            min_resolution: min,
            allowed_color_spaces: config.allowed_color_spaces.into_iter().collect(),
            element_rules,
            performance_limits: config.performance_limits,
            range_tolerance: config.range_tolerance,
            standard_frame_rates: config.standard_frame_rates,
            complexity_budget: config.complexity_budget,
        })
    }

    pub fn rule_for(&self, element_type: &str) -> Option<&ElementRule> {
        self.element_rules.get(element_type)
    }

    pub fn policy(&self) -> ViolationPolicy {
        ViolationPolicy {
            strict: self.strict_mode,
            tolerance: self.range_tolerance,
        }
    }

    pub fn element_types(&self) -> impl Iterator<Item = &str> {
        self.element_rules.keys().map(String::as_str)
    }
}

/// Parse and resolve a rule set from JSON.
pub fn load_rule_set(config: &str) -> Result<RuleSet, ConfigError> {
    let parsed: RuleSetConfig = serde_json::from_str(config)?;
    RuleSet::from_config(parsed)
}

pub fn load_rule_set_file(path: &Path) -> Result<RuleSet, ConfigError> {
    let content = fs::read_to_string(path)?;
    load_rule_set(&content)
}

fn resolve_element_rule(element_type: &str, config: ElementRuleConfig) -> Result<ElementRule, ConfigError> {
    let mut constraints = Vec::with_capacity(config.constraints.len());

    for (name, constraint) in config.constraints {
        let invalid = |reason: &str| ConfigError::InvalidConstraint {
            element_type: element_type.to_string(),
            constraint: name.clone(),
            reason: reason.to_string(),
        };

        let (property, kind, tolerance) = match constraint {
            ConstraintConfig::Shorthand([min, max]) => {
                let property = name
                    .strip_suffix("_range")
                    .filter(|p| !p.is_empty())
                    .ok_or_else(|| invalid("shorthand range constraints must be named '<property>_range'"))?
                    .to_string();
                (property, ConstraintKind::Range { min, max }, None)
            }
            ConstraintConfig::Explicit(spec) => {
                let property = spec
                    .property
                    .filter(|p| !p.is_empty())
                    .ok_or_else(|| invalid("missing 'property'"))?;
                let kind = match (spec.range, spec.one_of) {
                    (Some([min, max]), None) => ConstraintKind::Range { min, max },
                    (None, Some(values)) => {
                        if values.is_empty() {
                            return Err(invalid("'oneOf' must not be empty"));
                        }
                        if !values.iter().all(PropertyValue::is_scalar) {
                            return Err(invalid("'oneOf' entries must be strings, numbers or booleans"));
                        }
                        ConstraintKind::OneOf(values)
                    }
                    (Some(_), Some(_)) => return Err(invalid("set exactly one of 'range' or 'oneOf', not both")),
                    (None, None) => return Err(invalid("set exactly one of 'range' or 'oneOf'")),
                };
                if let Some(t) = spec.tolerance {
                    check_tolerance(t)?;
                }
                (property, kind, spec.tolerance)
            }
        };

        if let ConstraintKind::Range { min, max } = kind {
            if !min.is_finite() || !max.is_finite() {
                return Err(invalid("range bounds must be finite"));
            }
            if min > max {
                return Err(ConfigError::InvertedRange {
                    element_type: element_type.to_string(),
                    constraint: name,
                    min,
                    max,
                });
            }
        }

        constraints.push(Constraint {
            name,
            property,
            kind,
            tolerance,
        });
    }

    let mut seen = HashSet::new();
    for property in &config.required_properties {
        if !seen.insert(property.as_str()) {
            return Err(ConfigError::DuplicateRequiredProperty {
                element_type: element_type.to_string(),
                property: property.clone(),
            });
        }
    }

    Ok(ElementRule {
        required_properties: config.required_properties,
        constraints,
    })
}

fn check_tolerance(tolerance: f64) -> Result<(), ConfigError> {
    if tolerance.is_finite() && tolerance >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidTolerance(tolerance))
    }
}

fn check_engine_version(required: &str) -> Result<(), ConfigError> {
    let engine = semver::Version::parse(ENGINE_VERSION)
        .map_err(|_| ConfigError::InvalidEngineVersion(ENGINE_VERSION.to_string()))?;
    let min = semver::Version::parse(required)
        .map_err(|_| ConfigError::InvalidEngineVersion(required.to_string()))?;

    if engine < min {
        return Err(ConfigError::EngineVersionMismatch {
            required: required.to_string(),
            current: ENGINE_VERSION.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CAMERA_RULES: &str = r#"{
        "strictMode": true,
        "allowUnknownElements": false,
        "minResolution": {"width": 1920, "height": 1080},
        "allowedColorSpaces": ["sRGB", "Rec.709"],
        "elementRules": {
            "camera": {
                "requiredProperties": ["fov", "focalLength"],
                "constraints": {
                    "fov_range": {"property": "fov", "range": [10, 120]},
                    "lens": {"property": "lensType", "oneOf": ["prime", "zoom"]},
                    "focal_length_range": [8, 800]
                }
            }
        },
        "performanceLimits": {"timeoutSeconds": 5, "maxElements": 250}
    }"#;

    #[test]
    fn test_load_full_rule_set() {
        let rules = load_rule_set(CAMERA_RULES).unwrap();
        assert!(rules.strict_mode);
        assert!(!rules.allow_unknown_elements);
        assert_eq!(rules.min_resolution, Resolution::new(1920, 1080));
        assert!(rules.allowed_color_spaces.contains("Rec.709"));
        assert_eq!(rules.performance_limits.max_elements, 250);
        assert_eq!(rules.performance_limits.timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_constraints_keep_declaration_order() {
        let rules = load_rule_set(CAMERA_RULES).unwrap();
        let camera = rules.rule_for("camera").unwrap();
        let names: Vec<_> = camera.constraints.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["fov_range", "lens", "focal_length_range"]);
        assert_eq!(camera.required_properties, ["fov", "focalLength"]);
    }

    #[test]
    fn test_shorthand_resolves_target_property() {
        let rules = load_rule_set(CAMERA_RULES).unwrap();
        let camera = rules.rule_for("camera").unwrap();
        let focal = &camera.constraints[2];
        assert_eq!(focal.property, "focal_length");
        assert_eq!(focal.kind, ConstraintKind::Range { min: 8.0, max: 800.0 });
    }

    #[test]
    fn test_shorthand_without_suffix_rejected() {
        let err = load_rule_set(r#"{"elementRules": {"light": {"constraints": {"intensity": [0, 1]}}}}"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidConstraint { ref constraint, .. } if constraint == "intensity"));
    }

    #[test]
    fn test_defaults_are_permissive() {
        let rules = load_rule_set("{}").unwrap();
        assert!(!rules.strict_mode);
        assert!(rules.allow_unknown_elements);
        assert!(rules.allowed_color_spaces.is_empty());
        assert_eq!(rules.performance_limits.max_elements, 1000);
        assert_eq!(rules.standard_frame_rates.len(), 8);
        assert!(rules.rule_for("camera").is_none());
    }

    #[test]
    fn test_inverted_range_rejected() {
        let err = load_rule_set(
            r#"{"elementRules": {"camera": {"constraints": {"fov_range": {"property": "fov", "range": [120, 10]}}}}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvertedRange { min, max, .. } if min == 120.0 && max == 10.0));
    }

    #[test]
    fn test_zero_min_resolution_rejected() {
        let err = load_rule_set(r#"{"minResolution": {"width": 0, "height": 1080}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidMinResolution { width: 0, height: 1080 }));
    }

    #[test]
    fn test_negative_min_resolution_is_parse_error() {
        let err = load_rule_set(r#"{"minResolution": {"width": -5, "height": 1080}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_constraint_needs_exactly_one_kind() {
        let err = load_rule_set(
            r#"{"elementRules": {"light": {"constraints": {"c": {"property": "kind", "range": [0, 1], "oneOf": ["a"]}}}}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidConstraint { .. }));

        let err = load_rule_set(r#"{"elementRules": {"light": {"constraints": {"c": {"property": "kind"}}}}}"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidConstraint { .. }));
    }

    #[test]
    fn test_repeated_required_property_rejected() {
        let err = load_rule_set(r#"{"elementRules": {"camera": {"requiredProperties": ["fov", "fov"]}}}"#)
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::DuplicateRequiredProperty { ref element_type, ref property }
                if element_type == "camera" && property == "fov"
        ));
    }

    #[test]
    fn test_repeated_element_rules_key_rejected() {
        let err = load_rule_set(
            r#"{"elementRules": {"camera": {"requiredProperties": ["fov"]}, "camera": {}}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(ref e) if e.to_string().contains("duplicate key 'camera'")));
    }

    #[test]
    fn test_repeated_constraint_key_rejected() {
        let err = load_rule_set(
            r#"{"elementRules": {"camera": {"constraints": {"fov_range": [10, 120], "fov_range": [0, 1]}}}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(ref e) if e.to_string().contains("duplicate key 'fov_range'")));
    }

    #[test]
    fn test_empty_one_of_rejected() {
        let err = load_rule_set(
            r#"{"elementRules": {"light": {"constraints": {"kind": {"property": "kind", "oneOf": []}}}}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidConstraint { .. }));
    }

    #[test]
    fn test_negative_tolerance_rejected() {
        let err = load_rule_set(r#"{"rangeTolerance": -0.5}"#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidTolerance(t) if t == -0.5));
    }

    #[test]
    fn test_non_positive_timeout_rejected() {
        let err = load_rule_set(r#"{"performanceLimits": {"timeoutSeconds": 0}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidTimeout(_)));
    }

    #[test]
    fn test_engine_min_version_checked() {
        assert!(load_rule_set(r#"{"engineMinVersion": "1.0.0"}"#).is_ok());

        let err = load_rule_set(r#"{"engineMinVersion": "99.0.0"}"#).unwrap_err();
        assert!(matches!(err, ConfigError::EngineVersionMismatch { .. }));

        let err = load_rule_set(r#"{"engineMinVersion": "latest"}"#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEngineVersion(_)));
    }

    #[test]
    fn test_policy_reflects_strictness() {
        let rules = load_rule_set(r#"{"rangeTolerance": 2.5}"#).unwrap();
        let policy = rules.policy();
        assert!(!policy.strict);
        assert_eq!(policy.tolerance, 2.5);
    }

    #[test]
    fn test_load_rule_set_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.json");
        fs::write(&path, CAMERA_RULES).unwrap();

        let rules = load_rule_set_file(&path).unwrap();
        assert_eq!(rules.element_types().collect::<Vec<_>>(), ["camera"]);
    }
}
