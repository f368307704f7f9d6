//! Caller-supplied context captured at the point of failure.
//!
//! An [`ErrorContext`] lives for one call: it is merged into the classified
//! error's details and into the outgoing report, then dropped.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Environment metadata of the client that observed the failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Context information describing where and for whom an error happened.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorContext {
    /// Name of the operation that failed.
    pub operation: String,
    /// Logical service the operation belongs to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default)]
    pub environment: EnvironmentInfo,
    /// Free-form additional data.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub additional: HashMap<String, Value>,
}

impl ErrorContext {
    /// Create a context for the named operation.
    pub fn new<S: Into<String>>(operation: S) -> Self {
        Self {
            operation: operation.into(),
            ..Self::default()
        }
    }

    /// Set the service the operation belongs to.
    pub fn with_service<S: Into<String>>(mut self, service: S) -> Self {
        self.service = Some(service.into());
        self
    }

    /// Set the user id.
    pub fn with_user_id<S: Into<String>>(mut self, user_id: S) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Set the session id.
    pub fn with_session_id<S: Into<String>>(mut self, session_id: S) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Set the client user agent.
    pub fn with_user_agent<S: Into<String>>(mut self, user_agent: S) -> Self {
        self.environment.user_agent = Some(user_agent.into());
        self
    }

    /// Set the URL or screen the error happened on.
    pub fn with_url<S: Into<String>>(mut self, url: S) -> Self {
        self.environment.url = Some(url.into());
        self
    }

    /// Add free-form data using builder pattern.
    ///
    /// # Example
    /// ```rust
    /// use gutsense_errors::ErrorContext;
    ///
    /// let context = ErrorContext::new("scan_barcode")
    ///     .with_service("food")
    ///     .with_metadata("barcode", serde_json::json!("4006381333931"));
    /// assert_eq!(context.additional.len(), 1);
    /// ```
    pub fn with_metadata<K: Into<String>>(mut self, key: K, value: Value) -> Self {
        self.additional.insert(key.into(), value);
        self
    }

    /// Get free-form data by key.
    pub fn get_metadata(&self, key: &str) -> Option<&Value> {
        self.additional.get(key)
    }

    /// Service name used for statistics, `"unknown"` when unset.
    pub fn service_name(&self) -> &str {
        self.service.as_deref().unwrap_or("unknown")
    }

    /// Flatten this context into detail entries.
    ///
    /// Named fields come first; `additional` entries are added afterwards and
    /// never replace a named field.
    pub fn to_details(&self) -> Map<String, Value> {
        let mut details = Map::new();
        if !self.operation.is_empty() {
            details.insert("operation".into(), Value::String(self.operation.clone()));
        }

        let optional = [
            ("service", &self.service),
            ("userId", &self.user_id),
            ("sessionId", &self.session_id),
            ("userAgent", &self.environment.user_agent),
            ("url", &self.environment.url),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                details.insert(key.into(), Value::String(value.clone()));
            }
        }

        for (key, value) in &self.additional {
            details
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
        details
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_context_should_support_builder_pattern() {
        // Given: context creation
        // When: adding fields with builder pattern
        let context = ErrorContext::new("log_symptom")
            .with_service("symptoms")
            .with_user_id("user-1")
            .with_session_id("session-9")
            .with_user_agent("GutSense/2.1 iOS")
            .with_url("app://symptoms/new")
            .with_metadata("symptom", json!("bloating"));

        // Then: everything is recorded
        assert_eq!(context.operation, "log_symptom");
        assert_eq!(context.service_name(), "symptoms");
        assert_eq!(context.user_id.as_deref(), Some("user-1"));
        assert_eq!(context.environment.url.as_deref(), Some("app://symptoms/new"));
        assert_eq!(context.get_metadata("symptom"), Some(&json!("bloating")));
    }

    #[test]
    fn test_service_name_should_default_to_unknown() {
        assert_eq!(ErrorContext::new("op").service_name(), "unknown");
    }

    #[test]
    fn test_to_details_should_flatten_fields_without_shadowing() {
        // Given: additional data that collides with a named field
        let context = ErrorContext::new("scan")
            .with_service("food")
            .with_metadata("operation", json!("shadow"))
            .with_metadata("barcode", json!("123"));

        // When: flattening
        let details = context.to_details();

        // Then: named fields win and extra data is kept
        assert_eq!(details["operation"], json!("scan"));
        assert_eq!(details["service"], json!("food"));
        assert_eq!(details["barcode"], json!("123"));
        assert!(!details.contains_key("userId"));
    }

    #[test]
    fn test_serialization_should_use_camel_case() {
        let context = ErrorContext::new("sync").with_session_id("s-1");
        let value = serde_json::to_value(&context).unwrap();
        assert_eq!(value["sessionId"], json!("s-1"));
        assert!(value.get("userId").is_none());
    }
}
