//! Observer for schema-validation failures.
//!
//! Fetchers report every rejected response to the client's
//! [`DiagnosticSink`] before returning the error. Reporting never affects the
//! outcome of the call.

use std::sync::Mutex;

use serde::Serialize;
use serde_json::Value;
use time::OffsetDateTime;

use crate::error::{OperationMeta, ValidationError, ValidationIssue};
use crate::http_client::HttpMethod;

/// Structured record of one rejected response.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationDiagnostic {
    pub operation: String,
    pub path: String,
    pub method: HttpMethod,
    pub issues: Vec<ValidationIssue>,
    pub raw_response: Value,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl ValidationDiagnostic {
    pub fn new(operation: &OperationMeta, error: &ValidationError, raw_response: Value) -> Self {
        Self {
            operation: operation.operation.clone(),
            path: operation.path.clone(),
            method: operation.method,
            issues: error.issues().to_vec(),
            raw_response,
            timestamp: OffsetDateTime::now_utc(),
        }
    }
}

/// Receives validation diagnostics. Implementations must not block.
pub trait DiagnosticSink: Send + Sync {
    fn validation_failed(&self, diagnostic: &ValidationDiagnostic);
}

/// Emits each diagnostic as a `tracing` warning.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn validation_failed(&self, diagnostic: &ValidationDiagnostic) {
        let first_issue = diagnostic
            .issues
            .first()
            .map(ToString::to_string)
            .unwrap_or_default();
        tracing::warn!(
            operation = %diagnostic.operation,
            method = %diagnostic.method,
            path = %diagnostic.path,
            issues = diagnostic.issues.len(),
            first_issue = %first_issue,
            "response failed schema validation"
        );
    }
}

/// Discards every diagnostic.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl DiagnosticSink for NoopSink {
    fn validation_failed(&self, _diagnostic: &ValidationDiagnostic) {}
}

/// Keeps diagnostics in memory.
#[derive(Debug, Default)]
pub struct CollectingSink {
    events: Mutex<Vec<ValidationDiagnostic>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ValidationDiagnostic> {
        self.events
            .lock()
            .expect("diagnostic store should not be poisoned")
            .clone()
    }

    pub fn len(&self) -> usize {
        self.events
            .lock()
            .expect("diagnostic store should not be poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DiagnosticSink for CollectingSink {
    fn validation_failed(&self, diagnostic: &ValidationDiagnostic) {
        self.events
            .lock()
            .expect("diagnostic store should not be poisoned")
            .push(diagnostic.clone());
    }
}
