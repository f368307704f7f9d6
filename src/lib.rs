//! # GutSense Errors
//!
//! Error classification, retry, and reporting pipeline for the GutSense
//! symptom-tracking and food-scanning app.
//!
//! ## Features
//!
//! - **Normalization**: any failure becomes a [`CanonicalError`] with a machine-readable code
//! - **Classification**: pure, table-driven [`ErrorCategory`] and [`Severity`] derivation
//! - **Retry**: [`with_retry`] with exponential, linear and fixed backoff and pluggable predicates
//! - **Reporting**: [`ErrorReporter`] batches reports, flushes them periodically or on
//!   size, and requeues failed batches in order
//! - **Presentation**: [`user_friendly_error`] maps categories to user-facing copy
//!
//! ## Quick Start
//!
//! ```rust
//! use gutsense_errors::{classify, ErrorCategory, ErrorContext, Failure, Severity};
//!
//! let context = ErrorContext::new("scan_barcode").with_service("food");
//! let error = classify(Failure::new("socket closed").with_name("NetworkError"), &context);
//!
//! assert_eq!(error.code(), "NETWORK_ERROR");
//! assert_eq!(error.category(), ErrorCategory::Network);
//! assert_eq!(error.severity(), Severity::Medium);
//! ```
//!
//! ## Retry and Reporting
//!
//! ```rust,no_run
//! use gutsense_errors::{
//!     CanonicalError, ErrorContext, ErrorHandler, ErrorReporter, ReportingSettings, RetryPolicy,
//! };
//!
//! # async fn fetch_product(_barcode: &str) -> Result<String, CanonicalError> { Ok(String::new()) }
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let reporter = ErrorReporter::new(ReportingSettings::from_env())?;
//! reporter.start();
//! let handler = ErrorHandler::with_reporter(reporter.clone());
//!
//! let product = handler
//!     .with_retry(
//!         || fetch_product("4006381333931"),
//!         &RetryPolicy::api_call(),
//!         &ErrorContext::new("fetch_product"),
//!         Some("food"),
//!     )
//!     .await;
//!
//! if let Err(error) = product {
//!     let friendly = handler.user_friendly_error(&error);
//!     println!("{}: {}", friendly.title, friendly.message);
//! }
//!
//! reporter.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod category;
pub mod classifier;
pub mod context;
pub mod error;
pub mod friendly;
pub mod handler;
pub mod logging;
pub mod report;
pub mod reporter;
pub mod retry;
pub mod settings;
pub mod sink;

pub use category::{categorize, severity_for, ErrorCategory, Severity, CATEGORY_RULES};
pub use classifier::{classify, classify_full, derive_code, normalize, Classification, UNKNOWN_CODE};
pub use context::{EnvironmentInfo, ErrorContext};
pub use error::{CanonicalError, CanonicalResult, Failure, RawError, ReportingError};
pub use friendly::{can_retry, user_friendly_error, UserFriendlyError};
pub use handler::ErrorHandler;
pub use logging::{init_logging, LogLevel, LoggingConfig};
pub use report::{ErrorReport, PayloadMetadata, ReportPayload, ReportingStats};
pub use reporter::{ErrorReporter, FlushOutcome};
pub use retry::{with_retry, BackoffStrategy, RetryPolicy, Retryable, DEFAULT_RETRYABLE_CODES};
pub use settings::{OverflowPolicy, ReportingSettings};
pub use sink::{HttpSink, ReportSink};
