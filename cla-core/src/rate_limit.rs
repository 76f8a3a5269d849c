//! Process-wide throttle for outbound GitHub API calls.
//!
//! The limiter keeps a sliding-window log of admission times. A call is
//! admitted only while fewer than `max_calls` admissions fall inside the
//! trailing `period`; otherwise the caller sleeps until the oldest admission
//! leaves the window. Calls are delayed, never rejected, so a burst simply
//! drains at the rate the window allows.
//!
//! # Invariants
//!
//! - For any instant `t`, the number of admissions in `(t - period, t]` never
//!   exceeds `max_calls`.
//! - Every caller of [`RateLimiter::acquire`] is eventually admitted.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use reqwest::{Request, Response};
use reqwest_middleware::{Middleware, Next, Result as MiddlewareResult};
use tokio::time::{sleep_until, Instant};
use tracing::debug;

/// A quota of calls per rolling period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateWindow {
    pub max_calls: usize,
    pub period: Duration,
}

impl RateWindow {
    pub const fn per_hour(max_calls: usize) -> Self {
        Self {
            max_calls,
            period: Duration::from_secs(60 * 60),
        }
    }
}

impl Default for RateWindow {
    /// GitHub's quota for authenticated personal tokens.
    fn default() -> Self {
        Self::per_hour(5000)
    }
}

pub struct RateLimiter {
    window: RateWindow,
    admitted: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// A zero quota would never admit anything, so it is raised to one.
    pub fn new(window: RateWindow) -> Self {
        let window = RateWindow {
            max_calls: window.max_calls.max(1),
            ..window
        };
        Self {
            window,
            admitted: Mutex::new(VecDeque::with_capacity(window.max_calls.min(1024))),
        }
    }

    pub fn window(&self) -> RateWindow {
        self.window
    }

    /// Wait until the window has room, then record the admission.
    pub async fn acquire(&self) {
        loop {
            let ready_at = match self.try_admit(Instant::now()) {
                Ok(()) => return,
                Err(ready_at) => ready_at,
            };

            debug!(
                max_calls = self.window.max_calls,
                wait_ms = ready_at
                    .saturating_duration_since(Instant::now())
                    .as_millis() as u64,
                "API quota exhausted for this window, delaying call"
            );
            sleep_until(ready_at).await;
        }
    }

    /// Admit a call at `now`, or return the instant at which room frees up.
    pub fn try_admit(&self, now: Instant) -> Result<(), Instant> {
        let mut admitted = self
            .admitted
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        while let Some(&oldest) = admitted.front() {
            if now.saturating_duration_since(oldest) >= self.window.period {
                admitted.pop_front();
            } else {
                break;
            }
        }

        if admitted.len() < self.window.max_calls {
            admitted.push_back(now);
            return Ok(());
        }

        // Queue is full, so there is an oldest entry.
        let oldest = admitted.front().copied().unwrap_or(now);
        Err(oldest + self.window.period)
    }

    /// Number of admissions still inside the trailing window.
    pub fn in_flight_window(&self) -> usize {
        let now = Instant::now();
        let admitted = self
            .admitted
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        admitted
            .iter()
            .filter(|&&t| now.saturating_duration_since(t) < self.window.period)
            .count()
    }
}

/// Routes every request sent through a [`reqwest_middleware`] client via the
/// shared limiter.
pub struct RateLimitMiddleware {
    limiter: Arc<RateLimiter>,
}

impl RateLimitMiddleware {
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        Self { limiter }
    }
}

#[async_trait::async_trait]
impl Middleware for RateLimitMiddleware {
    async fn handle(
        &self,
        req: Request,
        extensions: &mut http::Extensions,
        next: Next<'_>,
    ) -> MiddlewareResult<Response> {
        self.limiter.acquire().await;
        next.run(req, extensions).await
    }
}
