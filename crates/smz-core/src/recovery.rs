//! Daemon-recovery protocol (client-side helper).
//!
//! A front-end that fails to reach the daemon records the URL it wanted
//! summarized. A later recovery check fires exactly once, and only when the
//! daemon is ready, idle, and still looking at the same URL. Navigating away
//! clears the pending state.

/// Network-level error substrings that count as "daemon unreachable".
/// This is a closed set; application-level errors never trigger recovery.
const UNREACHABLE_MARKERS: &[&str] = &[
    "fetch failed",
    "failed to fetch",
    "network error",
    "networkerror",
    "connection refused",
    "econnrefused",
];

/// Whether an error message indicates the daemon was unreachable.
pub fn is_unreachable_error(message: &str) -> bool {
    let lowered = message.to_lowercase();
    UNREACHABLE_MARKERS.iter().any(|m| lowered.contains(m))
}

/// A daemon status snapshot, as seen by the front-end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonStatus {
    pub is_ready: bool,
    pub is_idle: bool,
}

/// Pending-URL recovery state machine.
#[derive(Debug, Default)]
pub struct RecoveryTracker {
    pending_url: Option<String>,
}

impl RecoveryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failed submission. Only network-level failures arm recovery.
    pub fn record_failure(&mut self, url: &str, error_message: &str) {
        if is_unreachable_error(error_message) {
            self.pending_url = Some(url.to_string());
        }
    }

    /// The front-end navigated; a different URL clears the pending state.
    pub fn on_url_change(&mut self, current_url: &str) {
        if self
            .pending_url
            .as_deref()
            .map(|pending| pending != current_url)
            .unwrap_or(false)
        {
            self.pending_url = None;
        }
    }

    pub fn pending_url(&self) -> Option<&str> {
        self.pending_url.as_deref()
    }

    /// Run a recovery check. Returns `true` exactly once, when the daemon is
    /// ready and idle and the URL still matches; success consumes the
    /// pending state so later successes do not re-trigger.
    pub fn check(&mut self, current_url: &str, status: &DaemonStatus) -> bool {
        let Some(pending) = self.pending_url.as_deref() else {
            return false;
        };
        if status.is_ready && status.is_idle && pending == current_url {
            self.pending_url = None;
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "https://example.com/article";

    fn ready_idle() -> DaemonStatus {
        DaemonStatus {
            is_ready: true,
            is_idle: true,
        }
    }

    #[test]
    fn test_unreachable_matching_is_closed_set() {
        assert!(is_unreachable_error("TypeError: fetch failed"));
        assert!(is_unreachable_error("connect ECONNREFUSED 127.0.0.1:8765"));
        assert!(is_unreachable_error("NetworkError when attempting to fetch"));
        // Application-level errors do not arm recovery.
        assert!(!is_unreachable_error("HTTP 400: extractOnly requires mode=url"));
        assert!(!is_unreachable_error("empty summary"));
    }

    #[test]
    fn test_recovery_fires_once() {
        let mut tracker = RecoveryTracker::new();
        tracker.record_failure(URL, "fetch failed");
        assert_eq!(tracker.pending_url(), Some(URL));

        assert!(tracker.check(URL, &ready_idle()));
        // Second success must not re-trigger.
        assert!(!tracker.check(URL, &ready_idle()));
    }

    #[test]
    fn test_recovery_requires_ready_idle_and_match() {
        let mut tracker = RecoveryTracker::new();
        tracker.record_failure(URL, "connection refused");

        assert!(!tracker.check(
            URL,
            &DaemonStatus {
                is_ready: false,
                is_idle: true
            }
        ));
        assert!(!tracker.check(
            URL,
            &DaemonStatus {
                is_ready: true,
                is_idle: false
            }
        ));
        assert!(!tracker.check("https://other.example/", &ready_idle()));
        // Still pending after all the failed checks.
        assert!(tracker.check(URL, &ready_idle()));
    }

    #[test]
    fn test_url_change_clears_pending() {
        let mut tracker = RecoveryTracker::new();
        tracker.record_failure(URL, "fetch failed");
        tracker.on_url_change("https://elsewhere.example/");
        assert_eq!(tracker.pending_url(), None);
        assert!(!tracker.check(URL, &ready_idle()));
    }

    #[test]
    fn test_application_error_does_not_arm() {
        let mut tracker = RecoveryTracker::new();
        tracker.record_failure(URL, "HTTP 500");
        assert_eq!(tracker.pending_url(), None);
    }
}
