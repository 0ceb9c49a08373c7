use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};

/// Per-fingerprint sliding window: at most `max_reports` admitted within `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub max_reports: usize,
    pub window: Duration,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            max_reports: 10,
            window: Duration::seconds(60),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReporterStats {
    /// Fingerprints with at least one report still inside the window.
    pub total_tracked: usize,
    /// Fingerprints currently at or above the limit.
    pub open_limited_errors: usize,
}

/// Tracks admitted report timestamps per fingerprint.
///
/// Expiry is lazy: windows are trimmed when a fingerprint is reported again or when stats
/// are read, and fingerprints whose window emptied are swept at most once per window on the
/// report path, so the map stays bounded by what was admitted in the last window. Suppressed reports are not recorded, so a limited fingerprint becomes
/// reportable again as soon as its oldest admitted report leaves the window.
#[derive(Debug, Default)]
pub struct FingerprintLimiter {
    policy: RateLimitPolicy,
    recent: HashMap<String, VecDeque<DateTime<Utc>>>,
    last_sweep: Option<DateTime<Utc>>,
}

impl FingerprintLimiter {
    pub fn new(policy: RateLimitPolicy) -> Self {
        Self {
            policy,
            recent: HashMap::new(),
            last_sweep: None,
        }
    }

    pub fn policy(&self) -> RateLimitPolicy {
        self.policy
    }

    /// Returns true and records `now` if the fingerprint is under its limit.
    pub fn try_admit(&mut self, fingerprint: &str, now: DateTime<Utc>) -> bool {
        match self.last_sweep {
            Some(last) if now - last < self.policy.window => {}
            _ => self.sweep(now),
        }
        let cutoff = now - self.policy.window;
        let window = self.recent.entry(fingerprint.to_string()).or_default();
        window.retain(|&t| t > cutoff);
        if window.len() >= self.policy.max_reports {
            return false;
        }
        window.push_back(now);
        true
    }

    pub fn stats(&mut self, now: DateTime<Utc>) -> ErrorReporterStats {
        self.sweep(now);
        let max = self.policy.max_reports;
        ErrorReporterStats {
            total_tracked: self.recent.len(),
            open_limited_errors: self.recent.values().filter(|w| w.len() >= max).count(),
        }
    }

    pub fn tracked_len(&self) -> usize {
        self.recent.len()
    }

    /// Drops expired timestamps and every fingerprint left with none.
    fn sweep(&mut self, now: DateTime<Utc>) {
        let cutoff = now - self.policy.window;
        self.recent.retain(|_, window| {
            window.retain(|&t| t > cutoff);
            !window.is_empty()
        });
        self.last_sweep = Some(now);
    }

    pub fn clear(&mut self) {
        self.recent.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limiter_admits_up_to_max_then_blocks() {
        let mut limiter = FingerprintLimiter::new(RateLimitPolicy {
            max_reports: 3,
            window: Duration::seconds(60),
        });
        let now = Utc::now();
        assert!(limiter.try_admit("a", now));
        assert!(limiter.try_admit("a", now));
        assert!(limiter.try_admit("a", now));
        assert!(!limiter.try_admit("a", now));
        // Other fingerprints are independent.
        assert!(limiter.try_admit("b", now));
    }

    #[test]
    fn limiter_window_slides() {
        let mut limiter = FingerprintLimiter::new(RateLimitPolicy {
            max_reports: 2,
            window: Duration::seconds(60),
        });
        let t0 = Utc::now();
        assert!(limiter.try_admit("a", t0));
        assert!(limiter.try_admit("a", t0 + Duration::seconds(30)));
        assert!(!limiter.try_admit("a", t0 + Duration::seconds(59)));
        // Exactly one window after the first report it no longer counts.
        assert!(limiter.try_admit("a", t0 + Duration::seconds(60)));
        assert!(!limiter.try_admit("a", t0 + Duration::seconds(61)));
    }

    #[test]
    fn stats_drop_expired_fingerprints() {
        let mut limiter = FingerprintLimiter::new(RateLimitPolicy {
            max_reports: 1,
            window: Duration::seconds(60),
        });
        let t0 = Utc::now();
        limiter.try_admit("a", t0);
        limiter.try_admit("b", t0 + Duration::seconds(50));
        let stats = limiter.stats(t0 + Duration::seconds(10));
        assert_eq!(stats.total_tracked, 2);
        assert_eq!(stats.open_limited_errors, 2);
        let stats = limiter.stats(t0 + Duration::seconds(70));
        assert_eq!(stats.total_tracked, 1);
        let stats = limiter.stats(t0 + Duration::seconds(200));
        assert_eq!(stats, ErrorReporterStats::default());
    }

    #[test]
    fn expired_fingerprints_are_swept_on_report() {
        let mut limiter = FingerprintLimiter::new(RateLimitPolicy::default());
        let t0 = Utc::now();
        for i in 0..10_000 {
            assert!(limiter.try_admit(&format!("error {i}:no-stack"), t0));
        }
        assert_eq!(limiter.tracked_len(), 10_000);

        assert!(limiter.try_admit("later:no-stack", t0 + Duration::hours(1)));
        assert_eq!(limiter.tracked_len(), 1);
    }

    #[test]
    fn sweep_keeps_fingerprints_still_in_window() {
        let mut limiter = FingerprintLimiter::new(RateLimitPolicy {
            max_reports: 1,
            window: Duration::seconds(60),
        });
        let t0 = Utc::now();
        limiter.try_admit("a", t0);
        limiter.try_admit("b", t0 + Duration::seconds(30));
        // Past a's window but inside b's.
        limiter.try_admit("c", t0 + Duration::seconds(61));
        assert_eq!(limiter.tracked_len(), 2);
        assert!(!limiter.try_admit("b", t0 + Duration::seconds(62)));
    }
}
