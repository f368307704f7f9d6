//! Delivery targets for batched error reports.
//!
//! [`ReportSink`] is the seam between the dispatcher and the outside world.
//! [`HttpSink`] posts the JSON payload to a reporting endpoint.

use crate::error::ReportingError;
use crate::report::ReportPayload;
use crate::settings::ReportingSettings;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Url};
use std::time::Duration;

/// A destination able to accept one batch of reports.
#[async_trait]
pub trait ReportSink: Send + Sync {
    /// Deliver a batch. Any error leads to retry and eventually requeue.
    async fn deliver(&self, payload: &ReportPayload) -> Result<(), ReportingError>;
}

/// HTTP sink posting `{ reports, metadata }` with a bearer token.
#[derive(Debug, Clone)]
pub struct HttpSink {
    client: Client,
    endpoint: Url,
    api_key: Option<String>,
}

impl HttpSink {
    /// Create a sink for `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns [`ReportingError::Configuration`] if `endpoint` is empty or not
    /// an absolute URL, or an HTTP error if the client cannot be built.
    pub fn new<S: Into<String>>(
        endpoint: S,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ReportingError> {
        let endpoint = endpoint.into();
        if endpoint.trim().is_empty() {
            return Err(ReportingError::configuration("reporting endpoint is empty"));
        }
        let endpoint = Url::parse(endpoint.trim()).map_err(|err| {
            ReportingError::configuration(format!("invalid reporting endpoint {endpoint:?}: {err}"))
        })?;

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(format!("gutsense-errors/{}", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            endpoint,
            api_key,
        })
    }

    /// Build a sink from settings, or `None` when no endpoint is configured.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint is invalid or the HTTP client cannot
    /// be built.
    pub fn from_settings(settings: &ReportingSettings) -> Result<Option<Self>, ReportingError> {
        settings
            .endpoint
            .as_ref()
            .map(|endpoint| {
                Self::new(
                    endpoint.clone(),
                    settings.api_key.clone(),
                    settings.request_timeout,
                )
            })
            .transpose()
    }

    pub fn endpoint(&self) -> &str {
        self.endpoint.as_str()
    }
}

#[async_trait]
impl ReportSink for HttpSink {
    async fn deliver(&self, payload: &ReportPayload) -> Result<(), ReportingError> {
        let body = serde_json::to_vec(payload)?;
        let mut request = self
            .client
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(body);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(ReportingError::Status {
            status: status.as_u16(),
            body,
        })
    }
}
