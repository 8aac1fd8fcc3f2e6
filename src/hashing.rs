//! Hashing - SHA-256 digests over canonical JSON
//!
//! Records carry digests of the scene, the rule set and the report so a
//! stored result can be matched to the exact inputs that produced it.

use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::report::ValidationReport;
use crate::rules::RuleSet;
use crate::scene::SceneDocument;

pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Serialize with object keys sorted at every depth and no whitespace.
pub fn canonical_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let value = serde_json::to_value(value)?;
    serde_json::to_string(&canonicalize(value))
}

fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, canonicalize(v)))
                    .collect::<Map<_, _>>(),
            )
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

pub fn compute_digest<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    Ok(sha256_hex(canonical_json(value)?.as_bytes()))
}

pub fn scene_digest(document: &SceneDocument) -> Result<String, serde_json::Error> {
    compute_digest(document)
}

pub fn rules_digest(rules: &RuleSet) -> Result<String, serde_json::Error> {
    compute_digest(rules)
}

pub fn report_digest(report: &ValidationReport) -> Result<String, serde_json::Error> {
    compute_digest(report)
}

mod hex {
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        bytes.as_ref().iter().map(|b| format!("{:02x}", b)).collect()
    }
}
