//! Contract Invariant Tests
//!
//! End-to-end checks from raw JSON to report.

use scene_validator::{
    load, load_rule_set, validate, FindingCode, RuleSet, SceneDocument, Severity, ValidationReport,
};
use serde_json::json;

fn studio_rules() -> RuleSet {
    load_rule_set(
        r#"{
            "strictMode": true,
            "allowUnknownElements": false,
            "minResolution": {"width": 1920, "height": 1080},
            "allowedColorSpaces": ["sRGB", "Rec.709"],
            "elementRules": {
                "camera": {
                    "requiredProperties": ["fov", "focalLength"],
                    "constraints": {
                        "fov_range": {"property": "fov", "range": [10, 120]}
                    }
                },
                "light": {
                    "requiredProperties": ["intensity"],
                    "constraints": {
                        "intensity_range": [0, 10],
                        "kind": {"property": "kind", "oneOf": ["point", "spot", "area"]}
                    }
                },
                "model": {"requiredProperties": ["mesh"]}
            },
            "performanceLimits": {"timeoutSeconds": 30, "maxElements": 1000}
        }"#,
    )
    .unwrap()
}

fn scene(elements: serde_json::Value) -> SceneDocument {
    load(
        &json!({
            "sceneId": "sc-001",
            "resolution": {"width": 1920, "height": 1080},
            "colorSpace": "sRGB",
            "elements": elements
        })
        .to_string(),
    )
    .unwrap()
}

fn element_findings<'a>(report: &'a ValidationReport, id: &'a str) -> Vec<&'a scene_validator::Finding> {
    report.for_element(id).collect()
}

#[test]
fn invariant_empty_scene_has_only_global_findings() {
    let report = validate(&scene(json!([])), &studio_rules()).unwrap();
    assert!(report.passed);
    assert!(report.findings.iter().all(|f| f.element_id.is_none()));

    let low = load(r#"{"resolution": {"width": 640, "height": 480}, "colorSpace": "sRGB", "elements": []}"#).unwrap();
    let report = validate(&low, &studio_rules()).unwrap();
    assert!(!report.passed);
    assert!(report.findings.iter().all(|f| f.element_id.is_none()));
}

#[test]
fn invariant_validation_is_idempotent() {
    let doc = scene(json!([
        {"id": "cam", "type": "camera", "properties": {"fov": 200}},
        {"id": "key", "type": "light", "properties": {"intensity": 3, "kind": "laser"}}
    ]));
    let rules = studio_rules();

    assert_eq!(validate(&doc, &rules).unwrap(), validate(&doc, &rules).unwrap());
}

#[test]
fn invariant_one_missing_required_finding_per_property() {
    let doc = scene(json!([
        {"id": "cam", "type": "camera", "properties": {"fov": 50}},
        {"id": "hero", "type": "model"}
    ]));
    let report = validate(&doc, &studio_rules()).unwrap();

    for id in ["cam", "hero"] {
        let missing: Vec<_> = report
            .for_element(id)
            .filter(|f| f.code == FindingCode::MissingRequiredProperty)
            .collect();
        assert_eq!(missing.len(), 1, "element {}", id);
    }
}

#[test]
fn invariant_summary_counts_match_findings() {
    let doc = scene(json!([
        {"id": "cam", "type": "camera"},
        {"id": "key", "type": "light", "properties": {"intensity": "bright"}},
        {"id": "bird", "type": "drone"}
    ]));
    let report = validate(&doc, &studio_rules()).unwrap();

    let s = report.summary;
    assert_eq!(s.error_count + s.warning_count + s.suggestion_count, report.findings.len());
    assert_eq!(s.error_count, report.errors().count());
}

#[test]
fn scenario_camera_fov_in_range() {
    let doc = scene(json!([
        {"id": "cam", "type": "camera", "properties": {"fov": 15, "focalLength": 50}}
    ]));
    let report = validate(&doc, &studio_rules()).unwrap();

    assert!(element_findings(&report, "cam").iter().all(|f| f.severity != Severity::Error));
    assert!(report.passed);
}

#[test]
fn scenario_camera_fov_out_of_range() {
    let doc = scene(json!([
        {"id": "cam", "type": "camera", "properties": {"fov": 200, "focalLength": 50}}
    ]));
    let report = validate(&doc, &studio_rules()).unwrap();

    let findings = element_findings(&report, "cam");
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].code, FindingCode::OutOfRange);
    assert_eq!(findings[0].severity, Severity::Error);
    assert!(!report.passed);
}

#[test]
fn scenario_resolution_too_low_regardless_of_elements() {
    let doc = load(
        &json!({
            "resolution": {"width": 1280, "height": 720},
            "colorSpace": "sRGB",
            "elements": [{"id": "cam", "type": "camera", "properties": {"fov": 60, "focalLength": 35}}]
        })
        .to_string(),
    )
    .unwrap();
    let report = validate(&doc, &studio_rules()).unwrap();

    let low: Vec<_> = report.findings.iter().filter(|f| f.code == FindingCode::ResolutionTooLow).collect();
    assert_eq!(low.len(), 1);
    assert_eq!(low[0].severity, Severity::Error);
    assert!(!report.passed);
}

#[test]
fn scenario_too_many_elements_skips_element_phase() {
    let elements: Vec<_> = (0..1001)
        .map(|i| json!({"id": format!("e{}", i), "type": "drone"}))
        .collect();
    let doc = scene(json!(elements));
    let report = validate(&doc, &studio_rules()).unwrap();

    assert!(report.has_code(FindingCode::TooManyElements));
    assert_eq!(report.findings.iter().filter(|f| f.element_id.is_some()).count(), 0);
    assert!(!report.passed);
}

#[test]
fn scenario_unknown_element_type() {
    let doc = scene(json!([{"id": "bird", "type": "drone"}]));

    let report = validate(&doc, &studio_rules()).unwrap();
    let findings = element_findings(&report, "bird");
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].code, FindingCode::UnknownElementType);
    assert_eq!(findings[0].severity, Severity::Error);

    let mut permissive = studio_rules();
    permissive.allow_unknown_elements = true;
    let report = validate(&doc, &permissive).unwrap();
    assert!(element_findings(&report, "bird").is_empty());
}

#[test]
fn scenario_lenient_mode_downgrades_near_misses() {
    let rules = load_rule_set(
        r#"{
            "rangeTolerance": 5,
            "elementRules": {"camera": {"constraints": {"fov_range": [10, 120]}}}
        }"#,
    )
    .unwrap();
    let doc = scene(json!([
        {"id": "near", "type": "camera", "properties": {"fov": 122}},
        {"id": "far", "type": "camera", "properties": {"fov": 180}}
    ]));
    let report = validate(&doc, &rules).unwrap();

    assert_eq!(element_findings(&report, "near")[0].severity, Severity::Warning);
    assert_eq!(element_findings(&report, "far")[0].severity, Severity::Error);
    assert_eq!(report.summary.warning_count, 1);
    assert_eq!(report.summary.error_count, 1);
}

#[test]
fn scenario_type_mismatch_is_a_finding() {
    let doc = scene(json!([
        {"id": "key", "type": "light", "properties": {"intensity": {"value": 3}, "kind": "spot"}}
    ]));
    let report = validate(&doc, &studio_rules()).unwrap();

    let findings = element_findings(&report, "key");
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].code, FindingCode::TypeMismatch);
}

#[test]
fn scenario_report_serializes_to_contract_shape() {
    let doc = scene(json!([{"id": "cam", "type": "camera", "properties": {"fov": 200, "focalLength": 50}}]));
    let report = validate(&doc, &studio_rules()).unwrap();
    let value = serde_json::to_value(&report).unwrap();

    let finding = &value["findings"][0];
    for key in ["severity", "code", "elementId", "message"] {
        assert!(finding.get(key).is_some(), "missing {}", key);
    }
    for key in ["errorCount", "warningCount", "suggestionCount"] {
        assert!(value["summary"].get(key).is_some(), "missing {}", key);
    }
    assert_eq!(value["passed"], false);

    let back: ValidationReport = serde_json::from_value(value).unwrap();
    assert_eq!(back, report);
}
