//! Error categorization and severity derivation.
//!
//! Categories are derived from an error code by an ordered keyword table.
//! Both derivations are pure and perform no I/O.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Failure domain of an error, used for user messaging and statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    /// Connectivity failures, including network-level timeouts.
    Network,
    /// Rejected input.
    Validation,
    /// Local or remote storage failures.
    Database,
    /// A backend service answered with a failure.
    Service,
    /// The caller could not be identified.
    Authentication,
    /// The caller was identified but not allowed.
    Permission,
    /// Throttled by a quota or rate limiter.
    RateLimit,
    /// An operation deadline elapsed.
    Timeout,
    /// Fallback when nothing else matches.
    Unknown,
}

impl ErrorCategory {
    /// All categories, in declaration order.
    pub const ALL: [ErrorCategory; 9] = [
        ErrorCategory::Network,
        ErrorCategory::Validation,
        ErrorCategory::Database,
        ErrorCategory::Service,
        ErrorCategory::Authentication,
        ErrorCategory::Permission,
        ErrorCategory::RateLimit,
        ErrorCategory::Timeout,
        ErrorCategory::Unknown,
    ];

    /// Stable upper-case name, matching the serialized form.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Network => "NETWORK",
            ErrorCategory::Validation => "VALIDATION",
            ErrorCategory::Database => "DATABASE",
            ErrorCategory::Service => "SERVICE",
            ErrorCategory::Authentication => "AUTHENTICATION",
            ErrorCategory::Permission => "PERMISSION",
            ErrorCategory::RateLimit => "RATE_LIMIT",
            ErrorCategory::Timeout => "TIMEOUT",
            ErrorCategory::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered urgency level. Drives log level, not retry behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 4] = [
        Severity::Low,
        Severity::Medium,
        Severity::High,
        Severity::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Keyword rules evaluated top to bottom against the lower-cased code.
/// The first matching keyword decides the category.
pub const CATEGORY_RULES: &[(&str, ErrorCategory)] = &[
    ("network", ErrorCategory::Network),
    ("timeout", ErrorCategory::Network),
    ("connection", ErrorCategory::Network),
    ("offline", ErrorCategory::Network),
    ("validation", ErrorCategory::Validation),
    ("invalid", ErrorCategory::Validation),
    ("database", ErrorCategory::Database),
    ("sql", ErrorCategory::Database),
    ("storage", ErrorCategory::Database),
    ("unauthorized", ErrorCategory::Authentication),
    ("unauthenticated", ErrorCategory::Authentication),
    ("auth", ErrorCategory::Authentication),
    ("token", ErrorCategory::Authentication),
    ("permission", ErrorCategory::Permission),
    ("forbidden", ErrorCategory::Permission),
    ("denied", ErrorCategory::Permission),
    ("rate_limit", ErrorCategory::RateLimit),
    ("ratelimit", ErrorCategory::RateLimit),
    ("too_many_requests", ErrorCategory::RateLimit),
    ("throttl", ErrorCategory::RateLimit),
    ("deadline", ErrorCategory::Timeout),
    ("service", ErrorCategory::Service),
    ("server", ErrorCategory::Service),
    ("unavailable", ErrorCategory::Service),
];

/// Keywords in a code or message that force [`Severity::Critical`].
const CRITICAL_KEYWORDS: &[&str] = &["critical", "fatal"];

/// Derive the category of an error code.
pub fn categorize(code: &str) -> ErrorCategory {
    let code = code.to_lowercase();
    CATEGORY_RULES
        .iter()
        .find(|(keyword, _)| code.contains(keyword))
        .map(|(_, category)| *category)
        .unwrap_or(ErrorCategory::Unknown)
}

/// Derive severity from a category and the code/message text.
pub fn severity_for(category: ErrorCategory, code: &str, message: &str) -> Severity {
    let code = code.to_lowercase();
    let message = message.to_lowercase();
    let critical_text = CRITICAL_KEYWORDS
        .iter()
        .any(|keyword| code.contains(keyword) || message.contains(keyword));

    if category == ErrorCategory::Database || critical_text {
        return Severity::Critical;
    }

    match category {
        ErrorCategory::Authentication | ErrorCategory::Permission => Severity::High,
        ErrorCategory::Network | ErrorCategory::Service => Severity::Medium,
        _ => Severity::Low,
    }
}
