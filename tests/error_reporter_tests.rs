// ErrorReporter tests: fingerprint rate limiting and transport handling

use chrono::{Duration, Utc};
use opsdash::error_reporting::{
    ErrorPayload, ErrorReport, ErrorReporter, ErrorReporterStats, ErrorTransport,
    HttpErrorTransport, RateLimitPolicy,
};
use std::future::Future;
use std::sync::Mutex;

/// Records every payload it is handed; optionally fails after recording.
#[derive(Default)]
struct RecordingTransport {
    sent: Mutex<Vec<ErrorPayload>>,
    fail: bool,
}

impl RecordingTransport {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

impl ErrorTransport for RecordingTransport {
    fn send(&self, payload: &ErrorPayload) -> impl Future<Output = anyhow::Result<()>> + Send {
        self.sent.lock().unwrap().push(payload.clone());
        let result = if self.fail {
            Err(anyhow::anyhow!("collector unreachable"))
        } else {
            Ok(())
        };
        std::future::ready(result)
    }
}

fn reporter(transport: RecordingTransport) -> ErrorReporter<RecordingTransport> {
    ErrorReporter::new(transport, RateLimitPolicy::default())
}

fn boom() -> ErrorReport {
    ErrorReport::new("boom").with_stack("TypeError: boom\n    at render (app.js:10:5)")
}

#[tokio::test]
async fn tenth_report_is_admitted_eleventh_suppressed_then_window_slides() {
    let r = reporter(RecordingTransport::default());
    let t0 = Utc::now();
    for i in 0..10 {
        r.report_error_at(boom(), t0 + Duration::seconds(i)).await;
    }
    assert_eq!(r.transport().count(), 10);
    assert_eq!(
        r.stats_at(t0 + Duration::seconds(10)),
        ErrorReporterStats {
            total_tracked: 1,
            open_limited_errors: 1
        }
    );

    r.report_error_at(boom(), t0 + Duration::seconds(30)).await;
    assert_eq!(r.transport().count(), 10, "11th inside the window is dropped");

    // The first report ages out at t0 + 60s.
    r.report_error_at(boom(), t0 + Duration::seconds(61)).await;
    assert_eq!(r.transport().count(), 11);
}

#[tokio::test]
async fn different_fingerprints_are_limited_independently() {
    let r = reporter(RecordingTransport::default());
    let t0 = Utc::now();
    for _ in 0..12 {
        r.report_error_at(boom(), t0).await;
        r.report_error_at(ErrorReport::new("other"), t0).await;
    }
    assert_eq!(r.transport().count(), 20);
    let stats = r.stats_at(t0);
    assert_eq!(stats.total_tracked, 2);
    assert_eq!(stats.open_limited_errors, 2);
}

#[tokio::test]
async fn same_message_different_stack_top_is_a_different_fingerprint() {
    let r = reporter(RecordingTransport::default());
    let t0 = Utc::now();
    for _ in 0..10 {
        r.report_error_at(boom(), t0).await;
    }
    r.report_error_at(ErrorReport::new("boom").with_stack("RangeError: boom"), t0)
        .await;
    assert_eq!(r.transport().count(), 11);
}

#[tokio::test]
async fn clear_rate_limit_cache_readmits_immediately() {
    let r = reporter(RecordingTransport::default());
    let t0 = Utc::now();
    for _ in 0..11 {
        r.report_error_at(boom(), t0).await;
    }
    assert_eq!(r.transport().count(), 10);
    r.clear_rate_limit_cache();
    assert_eq!(r.stats_at(t0), ErrorReporterStats::default());
    r.report_error_at(boom(), t0).await;
    assert_eq!(r.transport().count(), 11);
}

#[tokio::test]
async fn transport_failure_is_swallowed() {
    let r = reporter(RecordingTransport::failing());
    r.report_error(boom()).await;
    r.report_error(boom()).await;
    assert_eq!(r.transport().count(), 2);
    assert_eq!(r.get_stats().total_tracked, 1);
}

#[tokio::test]
async fn payload_carries_report_fields() {
    let r = reporter(RecordingTransport::default());
    let now = Utc::now();
    let mut report = boom();
    report.component_stack = Some("in App\n in Root".to_string());
    report.url = Some("https://dash.local/services".to_string());
    report.user_agent = Some("Mozilla/5.0".to_string());
    r.report_error_at(report, now).await;

    let sent = r.transport().sent.lock().unwrap();
    let payload = &sent[0];
    assert_eq!(payload.message, "boom");
    assert_eq!(payload.timestamp, now);
    assert_eq!(payload.component_stack.as_deref(), Some("in App\n in Root"));
    let json = serde_json::to_value(payload).unwrap();
    assert!(json.get("componentStack").is_some());
    assert_eq!(json["url"], "https://dash.local/services");
    assert_eq!(json["userAgent"], "Mozilla/5.0");
}

#[tokio::test]
async fn http_transport_without_endpoint_only_logs() {
    let transport = HttpErrorTransport::new(None).unwrap();
    assert!(transport.endpoint().is_none());
    let r = ErrorReporter::new(transport, RateLimitPolicy::default());
    r.report_error(ErrorReport::new("no collector")).await;
    assert_eq!(r.get_stats().total_tracked, 1);
}

#[tokio::test]
async fn http_transport_failure_to_connect_is_swallowed() {
    // Port 9 (discard) on localhost is almost never listening.
    let transport = HttpErrorTransport::new(Some("http://127.0.0.1:9/errors".to_string())).unwrap();
    let r = ErrorReporter::new(transport, RateLimitPolicy::default());
    r.report_error(ErrorReport::new("unreachable")).await;
    assert_eq!(r.get_stats().total_tracked, 1);
}
