//! SceneValidator Core - Scene Composition Rule Engine
//!
//! # Guarantees
//! 1. Loading Is Structural
//! 2. Rules Are Explicit
//! 3. Violations Are Findings, Not Errors
//! 4. Same Inputs, Same Report
//! 5. Deadlines Are Checked Between Elements

pub mod scene;
pub mod rules;
pub mod element;
pub mod validator;
pub mod report;
pub mod hashing;
pub mod service;

pub use scene::{load, load_file, Element, LoadError, PropertyValue, Resolution, SceneDocument};
pub use rules::{load_rule_set, load_rule_set_file, ConfigError, ElementRule, RuleSet, RuleSetConfig};
pub use element::{validate_element, ViolationPolicy};
pub use validator::{validate, validate_with, AbortReason, Checkpoint, ValidationAborted};
pub use report::{Finding, FindingCode, Severity, Summary, ValidationReport};
pub use hashing::{canonical_json, compute_digest};
pub use service::{FindingEnricher, Notifier, ReportSink, ValidationRecord, ValidationService};

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
