//! Queued error reports, the delivery payload, and reporting statistics.

use crate::category::{ErrorCategory, Severity};
use crate::context::ErrorContext;
use crate::error::CanonicalError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use uuid::Uuid;

/// One classified error plus its context, queued for delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    pub id: Uuid,
    pub error: CanonicalError,
    pub severity: Severity,
    pub category: ErrorCategory,
    pub context: ErrorContext,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
    pub reported_at: DateTime<Utc>,
}

impl ErrorReport {
    pub fn new(
        error: CanonicalError,
        context: ErrorContext,
        severity: Severity,
        category: ErrorCategory,
        extra: Map<String, Value>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            error,
            severity,
            category,
            context,
            extra,
            reported_at: Utc::now(),
        }
    }

    /// Service used for per-service statistics.
    pub fn service(&self) -> &str {
        self.context.service_name()
    }
}

/// Metadata attached to every delivered batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadMetadata {
    pub app_version: String,
    pub platform: String,
    pub timestamp: DateTime<Utc>,
}

/// JSON body sent to the reporting endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportPayload {
    pub reports: Vec<ErrorReport>,
    pub metadata: PayloadMetadata,
}

impl ReportPayload {
    pub fn new<V: Into<String>, P: Into<String>>(
        reports: Vec<ErrorReport>,
        app_version: V,
        platform: P,
    ) -> Self {
        Self {
            reports,
            metadata: PayloadMetadata {
                app_version: app_version.into(),
                platform: platform.into(),
                timestamp: Utc::now(),
            },
        }
    }
}

/// Running counters maintained by the dispatcher. Callers get snapshots.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportingStats {
    pub total_errors: u64,
    pub by_category: HashMap<ErrorCategory, u64>,
    pub by_severity: HashMap<Severity, u64>,
    pub by_service: HashMap<String, u64>,
    /// Last successful delivery, including no-op deliveries without endpoint.
    pub last_reported: Option<DateTime<Utc>>,
    pub last_flush_attempt: Option<DateTime<Utc>>,
    pub queue_depth: usize,
    pub delivered_reports: u64,
    pub dropped_reports: u64,
    pub failed_flushes: u64,
}

impl ReportingStats {
    pub(crate) fn record(&mut self, report: &ErrorReport) {
        self.total_errors += 1;
        *self.by_category.entry(report.category).or_insert(0) += 1;
        *self.by_severity.entry(report.severity).or_insert(0) += 1;
        *self.by_service.entry(report.service().to_string()).or_insert(0) += 1;
    }

    pub fn category_count(&self, category: ErrorCategory) -> u64 {
        self.by_category.get(&category).copied().unwrap_or(0)
    }

    pub fn severity_count(&self, severity: Severity) -> u64 {
        self.by_severity.get(&severity).copied().unwrap_or(0)
    }

    pub fn service_count(&self, service: &str) -> u64 {
        self.by_service.get(service).copied().unwrap_or(0)
    }
}
