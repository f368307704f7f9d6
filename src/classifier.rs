//! Error normalization and classification.
//!
//! [`normalize`] turns any [`RawError`] into a [`CanonicalError`];
//! [`classify`] additionally merges the caller's [`ErrorContext`] into the
//! details. Neither function logs, reports, or fails.

use crate::category::{ErrorCategory, Severity};
use crate::context::ErrorContext;
use crate::error::{CanonicalError, Failure, RawError};

/// Fallback code when nothing about the failure is recognizable.
pub const UNKNOWN_CODE: &str = "UNKNOWN_ERROR";

/// Type names that carry no information about the failure.
const GENERIC_NAMES: &[&str] = &["error", "exception", "failure"];

/// Message keywords checked when the failure has no useful name.
const MESSAGE_CODES: &[(&str, &str)] = &[
    ("network", "NETWORK_ERROR"),
    ("validation", "VALIDATION_ERROR"),
    ("database", "DATABASE_ERROR"),
    ("timeout", "TIMEOUT_ERROR"),
];

/// A classified error together with its derived category and severity.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub error: CanonicalError,
    pub category: ErrorCategory,
    pub severity: Severity,
}

impl Classification {
    fn of(error: CanonicalError) -> Self {
        Self {
            category: error.category(),
            severity: error.severity(),
            error,
        }
    }
}

/// Derive the code of a native failure.
///
/// A non-generic name wins, converted to upper snake case. Otherwise the
/// message is scanned for known keywords, and [`UNKNOWN_CODE`] is the last
/// resort.
pub fn derive_code(failure: &Failure) -> String {
    if let Some(name) = failure.name.as_deref().map(str::trim) {
        if !name.is_empty() && !GENERIC_NAMES.contains(&name.to_lowercase().as_str()) {
            return to_upper_snake(name);
        }
    }

    let message = failure.message.to_lowercase();
    MESSAGE_CODES
        .iter()
        .find(|(keyword, _)| message.contains(keyword))
        .map(|(_, code)| (*code).to_string())
        .unwrap_or_else(|| UNKNOWN_CODE.to_string())
}

/// Convert a type name such as `NetworkError` into `NETWORK_ERROR`.
fn to_upper_snake(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev: Option<char> = None;

    for ch in name.chars() {
        if !ch.is_alphanumeric() {
            if !out.is_empty() && !out.ends_with('_') {
                out.push('_');
            }
            prev = None;
            continue;
        }
        if ch.is_uppercase() {
            if let Some(p) = prev {
                if p.is_lowercase() || p.is_ascii_digit() {
                    out.push('_');
                }
            }
        }
        out.extend(ch.to_uppercase());
        prev = Some(ch);
    }

    out.trim_end_matches('_').to_string()
}

/// Normalize a failure without merging any context.
///
/// Canonical inputs pass through untouched; native failures get a derived
/// code, the current timestamp and their original stack text.
pub fn normalize(raw: RawError) -> CanonicalError {
    match raw {
        RawError::Canonical(error) => error,
        RawError::Native(failure) => {
            let code = derive_code(&failure);
            let error = CanonicalError::new(code, failure.message);
            match failure.stack {
                Some(stack) => error.with_stack(stack),
                None => error,
            }
        }
    }
}

/// Normalize a failure and merge `context` into its details.
pub fn classify<E: Into<RawError>>(raw: E, context: &ErrorContext) -> CanonicalError {
    normalize(raw.into()).merge_details(context.to_details())
}

/// [`classify`] plus the derived category and severity.
pub fn classify_full<E: Into<RawError>>(raw: E, context: &ErrorContext) -> Classification {
    Classification::of(classify(raw, context))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_derive_code_should_prefer_specific_name() {
        let failure = Failure::new("anything").with_name("NetworkError");
        assert_eq!(derive_code(&failure), "NETWORK_ERROR");

        let failure = Failure::new("anything").with_name("HTTPTimeout");
        assert_eq!(derive_code(&failure), "HTTPTIMEOUT");

        let failure = Failure::new("anything").with_name("barcode-lookup failed");
        assert_eq!(derive_code(&failure), "BARCODE_LOOKUP_FAILED");
    }

    #[test]
    fn test_derive_code_should_skip_generic_names() {
        // Given: a generic name and a message mentioning the database
        let failure = Failure::new("Database is locked").with_name("Error");

        // When/Then: the message keyword decides
        assert_eq!(derive_code(&failure), "DATABASE_ERROR");
    }

    #[test]
    fn test_derive_code_should_scan_message_keywords_in_order() {
        assert_eq!(derive_code(&Failure::new("Network request failed")), "NETWORK_ERROR");
        assert_eq!(derive_code(&Failure::new("validation: bad date")), "VALIDATION_ERROR");
        assert_eq!(derive_code(&Failure::new("request TIMEOUT")), "TIMEOUT_ERROR");
        assert_eq!(
            derive_code(&Failure::new("network timeout while syncing")),
            "NETWORK_ERROR"
        );
        assert_eq!(derive_code(&Failure::new("something odd")), UNKNOWN_CODE);
    }

    #[test]
    fn test_normalize_should_keep_stack_and_message() {
        let failure = Failure::new("Network down").with_stack("at fetch_meals");
        let error = normalize(failure.into());

        assert_eq!(error.code(), "NETWORK_ERROR");
        assert_eq!(error.message(), "Network down");
        assert_eq!(error.stack(), Some("at fetch_meals"));
    }

    #[test]
    fn test_classify_should_merge_context_into_details() {
        let context = ErrorContext::new("scan_barcode")
            .with_service("food")
            .with_metadata("barcode", json!("123"));

        let error = classify("Network unreachable", &context);

        assert_eq!(error.detail("operation"), Some(&json!("scan_barcode")));
        assert_eq!(error.detail("service"), Some(&json!("food")));
        assert_eq!(error.detail("barcode"), Some(&json!("123")));
    }

    #[test]
    fn test_reclassification_should_be_idempotent_and_monotone() {
        // Given: an already classified error
        let first_context = ErrorContext::new("sync_meals").with_service("meals");
        let first = classify("Database is locked", &first_context);

        // When: classifying it again with the same and with a different context
        let second = classify(first.clone(), &first_context);
        let other_context = ErrorContext::new("retry_sync").with_user_id("u-1");
        let third = classify(second.clone(), &other_context);

        // Then: identity fields are unchanged and details only grow
        for later in [&second, &third] {
            assert_eq!(later.code(), first.code());
            assert_eq!(later.message(), first.message());
            assert_eq!(later.stack(), first.stack());
            assert_eq!(later.timestamp(), first.timestamp());
        }
        assert_eq!(second.details(), first.details());
        for (key, value) in second.details() {
            assert_eq!(third.detail(key), Some(value));
        }
        assert_eq!(third.detail("context.operation"), Some(&json!("retry_sync")));
        assert_eq!(third.detail("userId"), Some(&json!("u-1")));
    }

    #[test]
    fn test_classify_full_should_be_deterministic() {
        let context = ErrorContext::new("op");
        let a = classify_full(Failure::new("x").with_name("DatabaseError"), &context);
        let b = classify_full(Failure::new("x").with_name("DatabaseError"), &context);

        assert_eq!(a.category, ErrorCategory::Database);
        assert_eq!(a.severity, Severity::Critical);
        assert_eq!(a.category, b.category);
        assert_eq!(a.severity, b.severity);
    }

    #[test]
    fn test_classify_should_fall_back_to_unknown_low() {
        let result = classify_full("", &ErrorContext::default());
        assert_eq!(result.error.code(), UNKNOWN_CODE);
        assert_eq!(result.category, ErrorCategory::Unknown);
        assert_eq!(result.severity, Severity::Low);
    }
}
