// Delivery of admitted error reports to a remote collector.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Wire shape posted to the collector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub message: String,
    pub stack: Option<String>,
    pub component_stack: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

pub trait ErrorTransport: Send + Sync {
    fn send(&self, payload: &ErrorPayload) -> impl Future<Output = anyhow::Result<()>> + Send;
}

/// JSON POST to `endpoint`. Without an endpoint reports are only logged locally.
pub struct HttpErrorTransport {
    client: reqwest::Client,
    endpoint: Option<String>,
}

impl HttpErrorTransport {
    pub fn new(endpoint: Option<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    async fn post(&self, payload: &ErrorPayload) -> anyhow::Result<()> {
        let Some(endpoint) = self.endpoint.as_deref() else {
            tracing::debug!(operation = "report_error", "no collector endpoint configured");
            return Ok(());
        };
        self.client
            .post(endpoint)
            .json(payload)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

impl ErrorTransport for HttpErrorTransport {
    fn send(&self, payload: &ErrorPayload) -> impl Future<Output = anyhow::Result<()>> + Send {
        self.post(payload)
    }
}
