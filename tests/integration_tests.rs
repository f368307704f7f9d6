use async_trait::async_trait;
use gutsense_errors::{
    classify, BackoffStrategy, CanonicalError, ErrorCategory, ErrorContext, ErrorHandler,
    ErrorReporter, Failure, FlushOutcome, RawError, ReportPayload, ReportSink, ReportingError,
    ReportingSettings, RetryPolicy, Retryable, Severity,
};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Default)]
struct CollectingSink {
    payloads: Mutex<Vec<ReportPayload>>,
}

#[async_trait]
impl ReportSink for CollectingSink {
    async fn deliver(&self, payload: &ReportPayload) -> Result<(), ReportingError> {
        self.payloads.lock().unwrap().push(payload.clone());
        Ok(())
    }
}

#[test]
fn test_end_to_end_classification() {
    let context = ErrorContext::new("log_symptom")
        .with_service("symptoms")
        .with_user_id("user-7");

    let error = classify(
        Failure::new("insert failed").with_name("DatabaseError"),
        &context,
    );

    assert_eq!(error.code(), "DATABASE_ERROR");
    assert_eq!(error.category(), ErrorCategory::Database);
    assert_eq!(error.severity(), Severity::Critical);
    assert_eq!(error.detail("userId"), Some(&json!("user-7")));
}

#[test]
fn test_network_timeout_code_should_be_network() {
    let error = CanonicalError::new("NETWORK_TIMEOUT_ERROR", "request timed out");
    assert_eq!(error.category(), ErrorCategory::Network);
    assert_eq!(error.severity(), Severity::Medium);
}

#[test]
fn test_canonical_json_should_survive_reclassification() {
    let original = CanonicalError::validation("portion", "must be positive")
        .with_stack("at meals::validate");
    let json = serde_json::to_value(&original).unwrap();

    let context = ErrorContext::new("save_meal");
    let reclassified = classify(RawError::from_json(json), &context);

    assert_eq!(reclassified.code(), original.code());
    assert_eq!(reclassified.message(), original.message());
    assert_eq!(reclassified.stack(), original.stack());
    assert_eq!(reclassified.detail("field"), Some(&json!("portion")));
    assert_eq!(reclassified.detail("operation"), Some(&json!("save_meal")));
}

#[tokio::test(start_paused = true)]
async fn test_retry_scenario_should_observe_exponential_delays() {
    let policy = RetryPolicy::new()
        .with_max_attempts(3)
        .with_base_delay(Duration::from_millis(100))
        .with_backoff_multiplier(2.0)
        .with_strategy(BackoffStrategy::Exponential)
        .with_retryable(Retryable::always());
    let calls = AtomicUsize::new(0);
    let started = Instant::now();

    let result = gutsense_errors::with_retry(
        || {
            let attempt = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if attempt < 3 {
                    Err("flaky")
                } else {
                    Ok(attempt)
                }
            }
        },
        &policy,
        &ErrorContext::new("sync_diary"),
    )
    .await;

    assert_eq!(result.unwrap(), 3);
    assert_eq!(started.elapsed(), Duration::from_millis(300));
}

#[tokio::test(start_paused = true)]
async fn test_linear_and_fixed_backoff_should_sum_delays() {
    for (strategy, expected) in [
        (BackoffStrategy::Linear, Duration::from_millis(100 + 200 + 300)),
        (BackoffStrategy::Fixed, Duration::from_millis(300)),
    ] {
        let policy = RetryPolicy::new()
            .with_max_attempts(4)
            .with_base_delay(Duration::from_millis(100))
            .with_strategy(strategy);
        let started = Instant::now();

        let result: Result<(), CanonicalError> = gutsense_errors::with_retry(
            || async { Err(CanonicalError::network("down")) },
            &policy,
            &ErrorContext::new("ping"),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(started.elapsed(), expected, "{strategy:?}");
    }
}

#[tokio::test(start_paused = true)]
async fn test_reporter_should_flush_batches_through_custom_sink() {
    let sink = Arc::new(CollectingSink::default());
    let settings = ReportingSettings::new()
        .with_enabled(true)
        .with_batch_size(2)
        .with_app_version("3.1.0")
        .with_platform("android");
    let reporter = ErrorReporter::with_sink(settings, sink.clone());
    reporter.start();
    let handler = ErrorHandler::with_reporter(reporter.clone());

    handler.handle_error("Network request failed", &ErrorContext::new("a"), Some("food"));
    handler.handle_error("Network request failed", &ErrorContext::new("b"), Some("food"));
    tokio::time::sleep(Duration::from_millis(5)).await;

    let payloads = sink.payloads.lock().unwrap().clone();
    assert_eq!(payloads.len(), 1);
    assert_eq!(payloads[0].reports.len(), 2);
    assert_eq!(payloads[0].metadata.app_version, "3.1.0");
    assert_eq!(payloads[0].metadata.platform, "android");
    assert_eq!(payloads[0].reports[0].context.operation, "a");
    assert_eq!(payloads[0].reports[1].context.operation, "b");

    assert_eq!(reporter.shutdown().await, FlushOutcome::Empty);
}
