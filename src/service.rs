//! Validation Service - Single Entry Point
//!
//! Load, validate, stamp and hand off. Collaborators (storage, enrichment,
//! notification) plug in through the traits below and only ever see a
//! finished record.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::hashing::{report_digest, rules_digest, scene_digest};
use crate::report::{Finding, ValidationReport};
use crate::rules::RuleSet;
use crate::scene::{self, LoadError, SceneDocument};
use crate::validator::{self, complexity_score, AbortReason, Checkpoint};
use crate::ENGINE_VERSION;

pub type HookError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Persistence sink for finished records.
pub trait ReportSink: Send + Sync {
    fn name(&self) -> &str;
    fn persist(&self, record: &ValidationRecord) -> Result<(), HookError>;
}

/// Annotates findings with remediation text before delivery.
///
/// Only the remediation can be supplied; severity, code and element are
/// owned by the engine.
pub trait FindingEnricher: Send + Sync {
    fn name(&self) -> &str;
    fn remediation(&self, finding: &Finding, scene: &SceneDocument) -> Result<Option<String>, HookError>;
}

/// Told about failed validations only.
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;
    fn notify_failure(&self, record: &ValidationRecord) -> Result<(), HookError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetrics {
    pub element_count: usize,
    pub complexity_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationRecord {
    pub validation_id: String,
    pub scene_id: String,
    pub created_at: DateTime<Utc>,
    pub engine_version: String,
    pub scene_digest: String,
    pub rules_digest: String,
    pub report_digest: String,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aborted: Option<AbortReason>,
    pub metrics: PerformanceMetrics,
    pub report: ValidationReport,
}

impl ValidationRecord {
    pub fn passed(&self) -> bool {
        self.report.passed
    }
}

pub struct ValidationService {
    rules: Arc<RuleSet>,
    sinks: Vec<Box<dyn ReportSink>>,
    enrichers: Vec<Box<dyn FindingEnricher>>,
    notifiers: Vec<Box<dyn Notifier>>,
}

impl ValidationService {
    pub fn new(rules: Arc<RuleSet>) -> Self {
        Self {
            rules,
            sinks: vec![],
            enrichers: vec![],
            notifiers: vec![],
        }
    }

    pub fn with_sink(mut self, sink: impl ReportSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    pub fn with_enricher(mut self, enricher: impl FindingEnricher + 'static) -> Self {
        self.enrichers.push(Box::new(enricher));
        self
    }

    pub fn with_notifier(mut self, notifier: impl Notifier + 'static) -> Self {
        self.notifiers.push(Box::new(notifier));
        self
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn validate_scene(&self, raw: &str) -> Result<ValidationRecord, ServiceError> {
        let document = scene::load(raw)?;
        self.validate_document(&document)
    }

    pub fn validate_file(&self, path: &Path) -> Result<ValidationRecord, ServiceError> {
        let document = scene::load_file(path)?;
        self.validate_document(&document)
    }

    /// Validate a loaded scene and deliver the record to every collaborator.
    ///
    /// A timeout or cancellation still produces a record: the partial report
    /// is marked failed and `aborted` says why.
    pub fn validate_document(&self, document: &SceneDocument) -> Result<ValidationRecord, ServiceError> {
        self.validate_document_with(document, &Checkpoint::with_timeout(self.rules.performance_limits.timeout()))
    }

    pub fn validate_document_with(
        &self,
        document: &SceneDocument,
        checkpoint: &Checkpoint<'_>,
    ) -> Result<ValidationRecord, ServiceError> {
        let started = Instant::now();

        let (mut report, aborted) = match validator::validate_with(document, &self.rules, checkpoint) {
            Ok(report) => (report, None),
            Err(aborted) => (aborted.report, Some(aborted.reason)),
        };

        self.enrich(&mut report, document);

        let record = ValidationRecord {
            validation_id: Uuid::new_v4().to_string(),
            scene_id: document.scene_id.clone(),
            created_at: Utc::now(),
            engine_version: ENGINE_VERSION.to_string(),
            scene_digest: scene_digest(document)?,
            rules_digest: rules_digest(&self.rules)?,
            report_digest: report_digest(&report)?,
            duration_ms: started.elapsed().as_millis() as u64,
            aborted,
            metrics: PerformanceMetrics {
                element_count: document.elements.len(),
                complexity_score: complexity_score(document),
            },
            report,
        };

        if record.passed() {
            tracing::info!(
                scene_id = %record.scene_id,
                warnings = record.report.summary.warning_count,
                "scene validated successfully"
            );
        } else {
            tracing::warn!(
                scene_id = %record.scene_id,
                errors = record.report.summary.error_count,
                aborted = ?record.aborted,
                "scene validation failed"
            );
        }

        self.deliver(&record);
        Ok(record)
    }

    fn enrich(&self, report: &mut ValidationReport, document: &SceneDocument) {
        for enricher in &self.enrichers {
            for finding in &mut report.findings {
                match enricher.remediation(finding, document) {
                    Ok(Some(text)) => finding.remediation = Some(text),
                    Ok(None) => {}
                    Err(e) => {
                        tracing::warn!(enricher = enricher.name(), code = %finding.code, error = %e, "enrichment failed");
                    }
                }
            }
        }
    }

    fn deliver(&self, record: &ValidationRecord) {
        for sink in &self.sinks {
            if let Err(e) = sink.persist(record) {
                tracing::warn!(sink = sink.name(), validation_id = %record.validation_id, error = %e, "failed to persist record");
            }
        }

        if record.passed() {
            return;
        }
        for notifier in &self.notifiers {
            if let Err(e) = notifier.notify_failure(record) {
                tracing::warn!(notifier = notifier.name(), validation_id = %record.validation_id, error = %e, "failed to send notification");
            }
        }
    }
}
