//! Canonical error value, raw failure inputs, and the pipeline's own error type.
//!
//! Every failure entering the pipeline is either already a [`CanonicalError`]
//! or a native [`Failure`]; [`RawError`] is the sum of the two and is what the
//! classifier and the retry executor accept.

use crate::category::{categorize, severity_for, ErrorCategory, Severity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// Result type alias for operations that fail with a classified error.
pub type CanonicalResult<T> = Result<T, CanonicalError>;

/// Normalized representation of any failure.
///
/// Values are immutable once built: [`CanonicalError::with_detail`] and
/// [`CanonicalError::merge_details`] consume `self` and return a new value.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct CanonicalError {
    code: String,
    message: String,
    timestamp: DateTime<Utc>,
    #[serde(default)]
    details: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    stack: Option<String>,
}

impl CanonicalError {
    /// Create a new error stamped with the current time.
    pub fn new<C: Into<String>, M: Into<String>>(code: C, message: M) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            timestamp: Utc::now(),
            details: Map::new(),
            stack: None,
        }
    }

    // === Typed Constructors ===

    pub fn network<S: Into<String>>(message: S) -> Self {
        Self::new("NETWORK_ERROR", message)
    }

    /// Create a validation error for a specific field.
    pub fn validation<F: Into<String>, M: Into<String>>(field: F, message: M) -> Self {
        Self::new("VALIDATION_ERROR", message).with_detail("field", Value::String(field.into()))
    }

    pub fn database<S: Into<String>>(message: S) -> Self {
        Self::new("DATABASE_ERROR", message)
    }

    pub fn timeout<S: Into<String>>(message: S) -> Self {
        Self::new("TIMEOUT_ERROR", message)
    }

    pub fn authentication<S: Into<String>>(message: S) -> Self {
        Self::new("AUTHENTICATION_ERROR", message)
    }

    pub fn permission<S: Into<String>>(message: S) -> Self {
        Self::new("PERMISSION_DENIED", message)
    }

    pub fn rate_limited<S: Into<String>>(message: S) -> Self {
        Self::new("RATE_LIMIT_ERROR", message)
    }

    pub fn service<S: Into<String>>(message: S) -> Self {
        Self::new("SERVICE_UNAVAILABLE_ERROR", message)
    }

    pub fn unknown<S: Into<String>>(message: S) -> Self {
        Self::new("UNKNOWN_ERROR", message)
    }

    // === Accessors ===

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn details(&self) -> &Map<String, Value> {
        &self.details
    }

    pub fn detail(&self, key: &str) -> Option<&Value> {
        self.details.get(key)
    }

    /// Raw stack text. Kept for reporting, never meant for end users.
    pub fn stack(&self) -> Option<&str> {
        self.stack.as_deref()
    }

    /// Category derived from the code.
    pub fn category(&self) -> ErrorCategory {
        categorize(&self.code)
    }

    /// Severity derived from category, code and message.
    pub fn severity(&self) -> Severity {
        severity_for(self.category(), &self.code, &self.message)
    }

    // === Derivation ===

    /// Return a copy with one detail set, replacing any previous value.
    pub fn with_detail<K: Into<String>>(mut self, key: K, value: Value) -> Self {
        self.details.insert(key.into(), value);
        self
    }

    /// Return a copy with `stack` attached.
    pub fn with_stack<S: Into<String>>(mut self, stack: S) -> Self {
        self.stack = Some(stack.into());
        self
    }

    pub(crate) fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Merge `incoming` into the details without overwriting existing keys.
    ///
    /// A key that already holds a different value is kept and the incoming
    /// value goes to the first free slot of `context.<key>`, `context.<key>.2`,
    /// `context.<key>.3`, ... Values already present in one of those slots are
    /// skipped, so merging the same map twice is a no-op.
    pub fn merge_details(mut self, incoming: Map<String, Value>) -> Self {
        for (key, value) in incoming {
            match self.details.get(&key) {
                None => {
                    self.details.insert(key, value);
                }
                Some(existing) if *existing == value => {}
                Some(_) => self.insert_namespaced(&key, value),
            }
        }
        self
    }

    fn insert_namespaced(&mut self, key: &str, value: Value) {
        let base = format!("context.{key}");
        let mut slot = base.clone();
        let mut index = 1;
        loop {
            match self.details.get(&slot) {
                None => {
                    self.details.insert(slot, value);
                    return;
                }
                Some(existing) if *existing == value => return,
                Some(_) => {
                    index += 1;
                    slot = format!("{base}.{index}");
                }
            }
        }
    }

    /// Whether a JSON value has the canonical shape (`code` and `timestamp`).
    pub fn is_canonical_shape(value: &Value) -> bool {
        value
            .as_object()
            .is_some_and(|object| object.contains_key("code") && object.contains_key("timestamp"))
    }
}

/// A native failure that has not been classified yet.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Failure {
    /// Type name of the failure, e.g. `NetworkError`. `None` or `Error` is generic.
    pub name: Option<String>,
    pub message: String,
    pub stack: Option<String>,
}

impl Failure {
    pub fn new<S: Into<String>>(message: S) -> Self {
        Self {
            name: None,
            message: message.into(),
            stack: None,
        }
    }

    pub fn with_name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_stack<S: Into<String>>(mut self, stack: S) -> Self {
        self.stack = Some(stack.into());
        self
    }

    /// Build a failure from any error, recording its source chain as stack text.
    pub fn from_error(err: &(dyn std::error::Error + 'static)) -> Self {
        let mut chain = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            chain.push(format!("caused by: {cause}"));
            source = cause.source();
        }

        Self {
            name: None,
            message: err.to_string(),
            stack: (!chain.is_empty()).then(|| chain.join("\n")),
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{name}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl From<&str> for Failure {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for Failure {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<std::io::Error> for Failure {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;

        let name = match err.kind() {
            ErrorKind::TimedOut => Some("TimeoutError"),
            ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::NotConnected => Some("ConnectionError"),
            ErrorKind::PermissionDenied => Some("PermissionDeniedError"),
            ErrorKind::InvalidInput | ErrorKind::InvalidData => Some("ValidationError"),
            _ => None,
        };

        let failure = Self::from_error(&err);
        match name {
            Some(name) => failure.with_name(name),
            None => failure,
        }
    }
}

impl From<serde_json::Error> for Failure {
    fn from(err: serde_json::Error) -> Self {
        Self::from_error(&err).with_name("SerializationError")
    }
}

impl From<reqwest::Error> for Failure {
    fn from(err: reqwest::Error) -> Self {
        ReportingError::from(err).into()
    }
}

/// Any failure accepted by the classifier.
#[derive(Debug, Clone, PartialEq)]
pub enum RawError {
    /// Already normalized; only context is merged.
    Canonical(CanonicalError),
    /// Needs code derivation.
    Native(Failure),
}

impl RawError {
    /// Interpret an arbitrary JSON value, detecting the canonical shape structurally.
    ///
    /// Objects carrying both `code` and `timestamp` are canonical. Anything
    /// else is read as a native failure from `name`, `message` and `stack`
    /// fields, falling back to the value's text.
    pub fn from_json(value: Value) -> Self {
        if CanonicalError::is_canonical_shape(&value) {
            if let Some(canonical) = canonical_from_object(&value) {
                return RawError::Canonical(canonical);
            }
        }

        let text = |key: &str| {
            value
                .get(key)
                .and_then(Value::as_str)
                .map(ToString::to_string)
        };

        let message = text("message").unwrap_or_else(|| match &value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        });

        RawError::Native(Failure {
            name: text("name"),
            message,
            stack: text("stack"),
        })
    }
}

fn canonical_from_object(value: &Value) -> Option<CanonicalError> {
    let code = value.get("code")?.as_str()?;
    let message = value
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let timestamp = value
        .get("timestamp")
        .and_then(Value::as_str)
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|parsed| parsed.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);

    let mut canonical = CanonicalError::new(code, message).with_timestamp(timestamp);
    if let Some(details) = value.get("details").and_then(Value::as_object) {
        canonical = canonical.merge_details(details.clone());
    }
    if let Some(stack) = value.get("stack").and_then(Value::as_str) {
        canonical = canonical.with_stack(stack);
    }
    Some(canonical)
}

impl From<CanonicalError> for RawError {
    fn from(err: CanonicalError) -> Self {
        RawError::Canonical(err)
    }
}

impl From<Failure> for RawError {
    fn from(failure: Failure) -> Self {
        RawError::Native(failure)
    }
}

impl From<&str> for RawError {
    fn from(message: &str) -> Self {
        RawError::Native(Failure::new(message))
    }
}

impl From<String> for RawError {
    fn from(message: String) -> Self {
        RawError::Native(Failure::new(message))
    }
}

impl From<std::io::Error> for RawError {
    fn from(err: std::io::Error) -> Self {
        RawError::Native(err.into())
    }
}

impl From<serde_json::Error> for RawError {
    fn from(err: serde_json::Error) -> Self {
        RawError::Native(err.into())
    }
}

impl From<reqwest::Error> for RawError {
    fn from(err: reqwest::Error) -> Self {
        RawError::Native(err.into())
    }
}

impl From<ReportingError> for RawError {
    fn from(err: ReportingError) -> Self {
        RawError::Native(err.into())
    }
}

/// Failures of the reporting pipeline itself.
///
/// These never reach the code that reported an error; they only drive the
/// delivery retry loop and the reporting statistics.
#[derive(Error, Debug)]
pub enum ReportingError {
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Reporting endpoint returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Report serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Reporting configuration error: {message}")]
    Configuration { message: String },
}

impl ReportingError {
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Failure name used when this error is normalized for retry decisions.
    pub fn failure_name(&self) -> &'static str {
        match self {
            ReportingError::Http(err) if err.is_timeout() => "TimeoutError",
            ReportingError::Http(err) if err.is_connect() => "ConnectionError",
            ReportingError::Http(_) => "NetworkError",
            ReportingError::Status { status: 429, .. } => "RateLimitError",
            ReportingError::Status { status, .. } if *status >= 500 => "ServiceUnavailableError",
            ReportingError::Status { .. } => "HttpStatusError",
            ReportingError::Serialization(_) => "SerializationError",
            ReportingError::Configuration { .. } => "ConfigurationError",
        }
    }
}

impl From<ReportingError> for Failure {
    fn from(err: ReportingError) -> Self {
        let name = err.failure_name();
        Failure::from_error(&err).with_name(name)
    }
}
