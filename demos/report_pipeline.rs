use gutsense_errors::{
    init_logging, CanonicalError, ErrorContext, ErrorHandler, ErrorReporter, Failure,
    LogLevel, LoggingConfig, ReportingSettings, RetryPolicy,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging(LoggingConfig::new().with_level(LogLevel::Debug));
    println!("GutSense Errors - Reporting Pipeline Example");

    // Without GUTSENSE_ERROR_REPORTING_ENDPOINT set, flushes are no-ops.
    let settings = ReportingSettings::from_env()
        .with_enabled(true)
        .with_batch_size(3)
        .with_flush_interval(Duration::from_secs(5));
    let reporter = ErrorReporter::new(settings)?;
    reporter.start();
    let handler = ErrorHandler::with_reporter(reporter.clone());

    println!("\n=== Retrying a flaky barcode lookup ===");
    let calls = AtomicUsize::new(0);
    let policy = RetryPolicy::api_call().with_base_delay(Duration::from_millis(200));
    let product = handler
        .with_retry(
            || {
                let attempt = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if attempt < 3 {
                        Err(Failure::new("connection reset by peer").with_name("ConnectionError"))
                    } else {
                        Ok("Oat milk, 1L")
                    }
                }
            },
            &policy,
            &ErrorContext::new("lookup_barcode"),
            Some("food"),
        )
        .await;
    println!("Result after {} attempts: {product:?}", calls.load(Ordering::SeqCst));

    println!("\n=== Handling a validation failure ===");
    let error = handler.handle_error(
        CanonicalError::validation("severity", "must be between 1 and 10"),
        &ErrorContext::new("log_symptom").with_user_id("demo-user"),
        Some("symptoms"),
    );
    let friendly = handler.user_friendly_error(&error);
    println!(
        "{} -> {}: {} (retry offered: {})",
        error, friendly.title, friendly.message, friendly.can_retry
    );

    println!("\n=== Shutting down ===");
    let outcome = reporter.shutdown().await;
    println!("Final flush: {outcome:?}");
    println!("Stats: {}", serde_json::to_string_pretty(&reporter.stats())?);
    Ok(())
}
