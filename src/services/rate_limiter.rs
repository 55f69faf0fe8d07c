//! Sliding-window rate limiter
//!
//! Counts requests admitted during the last 60 seconds. Stale timestamps are
//! evicted lazily whenever the window is inspected.

use crate::utils::error::{helpers, ChatGptResult};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, warn};

/// Window length in seconds
pub const WINDOW_SECS: i64 = 60;

/// Source of the current time in whole seconds since the epoch
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> i64;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// Manually advanced clock for tests and simulations
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start: i64) -> Self {
        Self {
            now: AtomicI64::new(start),
        }
    }

    pub fn advance(&self, secs: i64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }

    pub fn set(&self, now: i64) {
        self.now.store(now, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Snapshot of the limiter state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitStatus {
    /// Requests allowed per window; 0 means unlimited
    pub limit: u32,
    /// Requests still admissible in the current window
    pub remaining: u32,
    /// When the oldest recorded request leaves the window (seconds since epoch)
    pub reset_at: i64,
}

/// Per-client request admission control
#[derive(Debug)]
pub struct RateLimiter {
    limit: u32,
    window: Mutex<VecDeque<i64>>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Create a limiter on the system clock
    pub fn new(limit: u32) -> Self {
        Self::with_clock(limit, Arc::new(SystemClock))
    }

    pub fn with_clock(limit: u32, clock: Arc<dyn Clock>) -> Self {
        Self {
            limit,
            window: Mutex::new(VecDeque::new()),
            clock,
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn is_enabled(&self) -> bool {
        self.limit > 0
    }

    fn lock_window(&self) -> MutexGuard<'_, VecDeque<i64>> {
        // The window stays consistent even if a holder panicked
        self.window.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn prune(window: &mut VecDeque<i64>, now: i64) {
        let cutoff = now - WINDOW_SECS;
        while window.front().is_some_and(|&t| t <= cutoff) {
            window.pop_front();
        }
    }

    /// Admit a request or fail with `RateLimitExceeded`
    ///
    /// An admitted request is recorded at the current time.
    pub fn admit(&self) -> ChatGptResult<()> {
        if !self.is_enabled() {
            return Ok(());
        }

        let now = self.clock.now();
        let mut window = self.lock_window();
        Self::prune(&mut window, now);

        if window.len() >= self.limit as usize {
            let reset_at = window.front().map_or(now, |&t| t + WINDOW_SECS);
            let retry_after = Duration::from_secs((reset_at - now).max(1) as u64);
            warn!(
                limit = self.limit,
                retry_after_secs = retry_after.as_secs(),
                "Local rate limit reached"
            );
            return Err(helpers::rate_limit_error(
                format!("Rate limit of {} requests per minute exceeded", self.limit),
                retry_after,
            ));
        }

        window.push_back(now);
        debug!(
            used = window.len(),
            limit = self.limit,
            "Request admitted"
        );
        Ok(())
    }

    pub fn status(&self) -> RateLimitStatus {
        let now = self.clock.now();
        let mut window = self.lock_window();
        Self::prune(&mut window, now);

        let recent = u32::try_from(window.len()).unwrap_or(u32::MAX);
        RateLimitStatus {
            limit: self.limit,
            remaining: self.limit.saturating_sub(recent),
            reset_at: window.front().map_or(now, |&t| t + WINDOW_SECS),
        }
    }

    /// Forget all recorded requests
    pub fn reset(&self) {
        self.lock_window().clear();
    }
}
