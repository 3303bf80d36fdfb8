use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::db::ThumbnailStore;
use crate::media::remux::Remuxer;

/// Whether incoming documents are processed. Toggled by `/start` and `/stop`.
#[derive(Debug, Clone)]
pub struct ProcessingSwitch {
    enabled: Arc<AtomicBool>,
}

impl ProcessingSwitch {
    pub fn new(enabled: bool) -> Self {
        ProcessingSwitch {
            enabled: Arc::new(AtomicBool::new(enabled)),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Returns the previous value.
    pub fn set(&self, enabled: bool) -> bool {
        self.enabled.swap(enabled, Ordering::SeqCst)
    }
}

impl Default for ProcessingSwitch {
    fn default() -> Self {
        ProcessingSwitch::new(true)
    }
}

#[derive(Debug, Clone)]
pub struct RateLimiter {
    window: Duration,
    last_seen: Arc<Mutex<HashMap<i64, Instant>>>,
}

impl RateLimiter {
    pub fn new(window: Duration) -> Self {
        RateLimiter {
            window,
            last_seen: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Checks without recording; call [`RateLimiter::record`] once the request is accepted.
    pub fn is_rate_limited(&self, user_id: i64) -> bool {
        self.check_at(user_id, Instant::now())
    }

    pub fn record(&self, user_id: i64) {
        self.record_at(user_id, Instant::now());
    }

    fn check_at(&self, user_id: i64, now: Instant) -> bool {
        if self.window.is_zero() {
            return false;
        }
        self.last_seen
            .lock()
            .get(&user_id)
            .is_some_and(|last| now.saturating_duration_since(*last) < self.window)
    }

    fn record_at(&self, user_id: i64, now: Instant) {
        if self.window.is_zero() {
            return;
        }
        let mut limits = self.last_seen.lock();
        limits.retain(|_, last| now.saturating_duration_since(*last) < self.window);
        limits.insert(user_id, now);
    }

    #[cfg(test)]
    fn tracked_users(&self) -> usize {
        self.last_seen.lock().len()
    }
}

#[derive(Clone)]
pub struct AppState {
    pub thumbnails: Arc<dyn ThumbnailStore>,
    pub remuxer: Arc<dyn Remuxer>,
    pub processing: ProcessingSwitch,
    pub rate_limiter: RateLimiter,
}

impl AppState {
    pub fn new(
        thumbnails: Arc<dyn ThumbnailStore>,
        remuxer: Arc<dyn Remuxer>,
        rate_limit: Duration,
    ) -> Self {
        AppState {
            thumbnails,
            remuxer,
            processing: ProcessingSwitch::default(),
            rate_limiter: RateLimiter::new(rate_limit),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn switch_is_shared_between_clones() {
        let switch = ProcessingSwitch::default();
        let handle = switch.clone();
        assert!(switch.is_enabled());
        assert!(handle.set(false));
        assert!(!switch.is_enabled());
        assert!(!switch.set(true));
        assert!(handle.is_enabled());
    }

    #[test]
    fn rate_limiter_blocks_within_window_only() {
        let limiter = RateLimiter::new(Duration::from_secs(10));
        let start = Instant::now();
        assert!(!limiter.check_at(1, start));
        limiter.record_at(1, start);
        assert!(limiter.check_at(1, start + Duration::from_secs(3)));
        assert!(!limiter.check_at(2, start + Duration::from_secs(3)));
        assert!(!limiter.check_at(1, start + Duration::from_secs(11)));
    }

    #[test]
    fn checking_alone_does_not_start_the_window() {
        let limiter = RateLimiter::new(Duration::from_secs(10));
        let start = Instant::now();
        assert!(!limiter.check_at(1, start));
        assert!(!limiter.check_at(1, start + Duration::from_secs(1)));
        assert_eq!(limiter.tracked_users(), 0);
    }

    #[test]
    fn expired_entries_are_evicted_on_record() {
        let limiter = RateLimiter::new(Duration::from_secs(10));
        let start = Instant::now();
        limiter.record_at(1, start);
        limiter.record_at(2, start + Duration::from_secs(5));
        assert_eq!(limiter.tracked_users(), 2);

        limiter.record_at(3, start + Duration::from_secs(12));
        assert_eq!(limiter.tracked_users(), 2);
        assert!(!limiter.check_at(1, start + Duration::from_secs(12)));
        assert!(limiter.check_at(2, start + Duration::from_secs(12)));
    }

    #[test]
    fn zero_window_disables_limiting() {
        let limiter = RateLimiter::new(Duration::ZERO);
        limiter.record(1);
        assert!(!limiter.is_rate_limited(1));
        assert_eq!(limiter.tracked_users(), 0);
    }
}
