// Error reporting facade: fingerprint, rate limit, then hand off to a transport.
// Reporting never fails from the caller's point of view; transport errors are logged.

mod rate_limit;
mod transport;

pub use rate_limit::{ErrorReporterStats, FingerprintLimiter, RateLimitPolicy};
pub use transport::{ErrorPayload, ErrorTransport, HttpErrorTransport};

use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const NO_STACK: &str = "no-stack";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    pub message: String,
    #[serde(default)]
    pub stack: Option<String>,
    #[serde(default)]
    pub component_stack: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    /// Free-form context; logged locally, not forwarded.
    #[serde(default)]
    pub context: Option<Value>,
}

impl ErrorReport {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    /// `message:first-stack-line`, or `message:no-stack`.
    pub fn fingerprint(&self) -> String {
        let first_line = self
            .stack
            .as_deref()
            .and_then(|s| s.lines().next())
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .unwrap_or(NO_STACK);
        format!("{}:{}", self.message, first_line)
    }

    fn into_payload(self, timestamp: DateTime<Utc>) -> ErrorPayload {
        ErrorPayload {
            message: self.message,
            stack: self.stack,
            component_stack: self.component_stack,
            timestamp,
            user_agent: self.user_agent,
            url: self.url,
        }
    }
}

pub struct ErrorReporter<T> {
    transport: T,
    limiter: Mutex<FingerprintLimiter>,
}

impl<T: ErrorTransport> ErrorReporter<T> {
    pub fn new(transport: T, policy: RateLimitPolicy) -> Self {
        Self {
            transport,
            limiter: Mutex::new(FingerprintLimiter::new(policy)),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn limiter(&self) -> MutexGuard<'_, FingerprintLimiter> {
        self.limiter.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub async fn report_error(&self, report: ErrorReport) {
        self.report_error_at(report, Utc::now()).await
    }

    /// Same as `report_error` with an explicit clock. Suppressed reports are dropped silently.
    pub async fn report_error_at(&self, report: ErrorReport, now: DateTime<Utc>) {
        let fingerprint = report.fingerprint();
        let admitted = self.limiter().try_admit(&fingerprint, now);
        if !admitted {
            return;
        }

        tracing::error!(
            operation = "report_error",
            fingerprint = %fingerprint,
            url = ?report.url,
            context = ?report.context,
            "{}",
            report.message
        );

        let payload = report.into_payload(now);
        if let Err(e) = self.transport.send(&payload).await {
            tracing::warn!(error = %e, operation = "report_error", "error report delivery failed");
        }
    }

    pub fn get_stats(&self) -> ErrorReporterStats {
        self.stats_at(Utc::now())
    }

    pub fn stats_at(&self, now: DateTime<Utc>) -> ErrorReporterStats {
        self.limiter().stats(now)
    }

    pub fn clear_rate_limit_cache(&self) {
        self.limiter().clear();
    }
}
