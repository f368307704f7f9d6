//! User-facing messages for classified errors.

use crate::category::{ErrorCategory, Severity};
use crate::error::CanonicalError;
use serde::Serialize;

/// What a presentation layer shows for an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserFriendlyError {
    pub title: &'static str,
    pub message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<&'static str>,
    /// Whether to offer a retry action. Independent of severity.
    pub can_retry: bool,
    pub severity: Severity,
    pub category: ErrorCategory,
}

struct Entry {
    title: &'static str,
    message: &'static str,
    action: Option<&'static str>,
}

fn entry(category: ErrorCategory) -> Entry {
    let (title, message, action) = match category {
        ErrorCategory::Network => (
            "Connection Problem",
            "We couldn't reach our servers. Check your internet connection and try again.",
            Some("Try Again"),
        ),
        ErrorCategory::Validation => (
            "Please Check Your Entry",
            "Some of the information you entered doesn't look right.",
            Some("Review"),
        ),
        ErrorCategory::Database => (
            "Storage Problem",
            "We had trouble saving or loading your data. Your previous entries are safe.",
            Some("Try Again"),
        ),
        ErrorCategory::Service => (
            "Service Unavailable",
            "Our service is having a moment. Please try again shortly.",
            Some("Try Again"),
        ),
        ErrorCategory::Authentication => (
            "Please Sign In",
            "Your session has expired. Sign in again to continue.",
            Some("Sign In"),
        ),
        ErrorCategory::Permission => (
            "Permission Needed",
            "GutSense needs permission to do this. You can change it in Settings.",
            Some("Open Settings"),
        ),
        ErrorCategory::RateLimit => (
            "Slow Down",
            "You're doing that a bit too often. Please wait a moment and try again.",
            Some("Try Again"),
        ),
        ErrorCategory::Timeout => (
            "Taking Too Long",
            "This is taking longer than expected. Please try again.",
            Some("Try Again"),
        ),
        ErrorCategory::Unknown => (
            "Something Went Wrong",
            "An unexpected error occurred. Please try again.",
            None,
        ),
    };

    Entry {
        title,
        message,
        action,
    }
}

/// Whether a presentation layer should offer a retry for this category.
pub fn can_retry(category: ErrorCategory) -> bool {
    !matches!(
        category,
        ErrorCategory::Validation | ErrorCategory::Authentication | ErrorCategory::Permission
    )
}

/// Map a classified error to its user-facing description.
pub fn user_friendly_error(error: &CanonicalError) -> UserFriendlyError {
    let category = error.category();
    let entry = entry(category);

    UserFriendlyError {
        title: entry.title,
        message: entry.message,
        action: entry.action,
        can_retry: can_retry(category),
        severity: error.severity(),
        category,
    }
}
