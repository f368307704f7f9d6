//! Entry points used by application code.
//!
//! [`ErrorHandler`] ties the pieces together: it classifies a failure, logs it
//! through `tracing` at a level derived from its severity, and hands it to the
//! [`ErrorReporter`] when one is attached. All entry points return failures as
//! values and never panic on the wrapped operation's behalf.

use crate::category::Severity;
use crate::classifier::classify;
use crate::context::ErrorContext;
use crate::error::{CanonicalError, RawError};
use crate::friendly::{user_friendly_error, UserFriendlyError};
use crate::report::ReportingStats;
use crate::reporter::ErrorReporter;
use crate::retry::{self, RetryPolicy};
use serde_json::Map;
use std::borrow::Cow;
use std::future::Future;

/// Classification, logging and reporting facade.
#[derive(Debug, Clone, Default)]
pub struct ErrorHandler {
    reporter: Option<ErrorReporter>,
}

impl ErrorHandler {
    /// A handler that only classifies and logs.
    pub fn new() -> Self {
        Self::default()
    }

    /// A handler that also queues every handled error on `reporter`.
    pub fn with_reporter(reporter: ErrorReporter) -> Self {
        Self {
            reporter: Some(reporter),
        }
    }

    pub fn reporter(&self) -> Option<&ErrorReporter> {
        self.reporter.as_ref()
    }

    /// Classify, log and report a failure. Always returns the classified error.
    ///
    /// `service` fills in the context's service when given.
    pub fn handle_error<E: Into<RawError>>(
        &self,
        error: E,
        context: &ErrorContext,
        service: Option<&str>,
    ) -> CanonicalError {
        let context = with_service(context, service);
        let classified = classify(error, &context);
        log_error(&classified, &context);

        if let Some(reporter) = &self.reporter {
            reporter.report_error(&classified, &context, None, None, Map::new());
        }
        classified
    }

    /// Await `operation`, converting its failure into a handled error.
    pub async fn with_error_handling<T, E, Fut>(
        &self,
        operation: Fut,
        context: &ErrorContext,
        service: Option<&str>,
    ) -> Result<T, CanonicalError>
    where
        Fut: Future<Output = Result<T, E>>,
        E: Into<RawError>,
    {
        operation
            .await
            .map_err(|err| self.handle_error(err, context, service))
    }

    /// Run `operation` under `policy`, handling the final failure.
    pub async fn with_retry<T, E, F, Fut>(
        &self,
        operation: F,
        policy: &RetryPolicy,
        context: &ErrorContext,
        service: Option<&str>,
    ) -> Result<T, CanonicalError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<RawError>,
    {
        let context = with_service(context, service);
        retry::with_retry(operation, policy, &context)
            .await
            .map_err(|err| self.handle_error(err, &context, None))
    }

    pub fn user_friendly_error(&self, error: &CanonicalError) -> UserFriendlyError {
        user_friendly_error(error)
    }

    /// Reporting statistics, empty when no reporter is attached.
    pub fn stats(&self) -> ReportingStats {
        self.reporter
            .as_ref()
            .map(ErrorReporter::stats)
            .unwrap_or_default()
    }
}

fn with_service<'a>(context: &'a ErrorContext, service: Option<&str>) -> Cow<'a, ErrorContext> {
    match service {
        Some(service) if context.service.as_deref() != Some(service) => {
            Cow::Owned(context.clone().with_service(service))
        }
        _ => Cow::Borrowed(context),
    }
}

fn log_error(error: &CanonicalError, context: &ErrorContext) {
    let category = error.category();
    let severity = error.severity();
    let service = context.service_name();
    let operation = context.operation.as_str();

    match severity {
        Severity::Critical | Severity::High => tracing::error!(
            service,
            operation,
            code = error.code(),
            %category,
            %severity,
            "{}",
            error.message()
        ),
        Severity::Medium => tracing::warn!(
            service,
            operation,
            code = error.code(),
            %category,
            %severity,
            "{}",
            error.message()
        ),
        Severity::Low => tracing::info!(
            service,
            operation,
            code = error.code(),
            %category,
            %severity,
            "{}",
            error.message()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::ErrorCategory;
    use crate::error::Failure;
    use crate::settings::ReportingSettings;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn reporting_handler() -> ErrorHandler {
        let settings = ReportingSettings::new().with_enabled(true);
        ErrorHandler::with_reporter(ErrorReporter::new(settings).unwrap())
    }

    #[test]
    fn test_handle_error_should_classify_and_report() {
        // Given: a handler with reporting enabled
        let handler = reporting_handler();
        let context = ErrorContext::new("scan_barcode");

        // When: handling a native failure with a service name
        let error = handler.handle_error(
            Failure::new("socket closed").with_name("NetworkError"),
            &context,
            Some("food"),
        );

        // Then: it is classified, enriched and queued
        assert_eq!(error.code(), "NETWORK_ERROR");
        assert_eq!(error.detail("service"), Some(&json!("food")));
        let stats = handler.stats();
        assert_eq!(stats.total_errors, 1);
        assert_eq!(stats.service_count("food"), 1);
        assert_eq!(stats.category_count(ErrorCategory::Network), 1);
    }

    #[test]
    fn test_handle_error_without_reporter_should_still_classify() {
        let handler = ErrorHandler::new();
        let error = handler.handle_error("Validation failed", &ErrorContext::new("save"), None);

        assert_eq!(error.code(), "VALIDATION_ERROR");
        assert_eq!(handler.stats(), ReportingStats::default());
    }

    #[tokio::test]
    async fn test_with_error_handling_should_pass_success_through() {
        let handler = reporting_handler();
        let result = handler
            .with_error_handling(
                async { Ok::<_, Failure>(42) },
                &ErrorContext::new("load"),
                None,
            )
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(handler.stats().total_errors, 0);
    }

    #[tokio::test]
    async fn test_with_error_handling_should_convert_failures() {
        let handler = reporting_handler();
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "camera blocked");

        let result: Result<(), CanonicalError> = handler
            .with_error_handling(async { Err(io) }, &ErrorContext::new("open_camera"), None)
            .await;

        let error = result.unwrap_err();
        assert_eq!(error.code(), "PERMISSION_DENIED_ERROR");
        assert_eq!(error.category(), ErrorCategory::Permission);
        assert_eq!(handler.stats().total_errors, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_retry_should_report_only_final_failure() {
        let handler = reporting_handler();
        let calls = AtomicUsize::new(0);
        let policy = RetryPolicy::api_call()
            .with_max_attempts(3)
            .with_base_delay(Duration::from_millis(10));

        let result: Result<(), CanonicalError> = handler
            .with_retry(
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err(CanonicalError::timeout("meal sync timed out")) }
                },
                &policy,
                &ErrorContext::new("sync_meals"),
                Some("meals"),
            )
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(result.unwrap_err().detail("service"), Some(&json!("meals")));
        assert_eq!(handler.stats().total_errors, 1);
    }

    #[test]
    fn test_user_friendly_error_should_delegate_to_table() {
        let handler = ErrorHandler::new();
        let friendly = handler.user_friendly_error(&CanonicalError::validation("dose", "empty"));
        assert!(!friendly.can_retry);
        assert_eq!(friendly.category, ErrorCategory::Validation);
    }
}
