//! Sliding-window admission gate shared by every outbound osu! API call.

use std::collections::VecDeque;

use tokio::sync::Mutex;
use tokio::time::{sleep_until, Duration, Instant};
use tracing::trace;

/// Grants at most `max_permits` acquisitions within any rolling `window`.
///
/// Each permit returns to the pool exactly `window` after it was granted, so
/// capacity replenishes continuously instead of resetting at fixed boundaries.
/// Waiters queue on a fair async mutex and are served in arrival order.
#[derive(Debug)]
pub struct RateLimiter {
    max_permits: usize,
    window: Duration,
    granted: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_permits: usize, window: Duration) -> Self {
        let max_permits = max_permits.max(1);
        Self {
            max_permits,
            window,
            granted: Mutex::new(VecDeque::with_capacity(max_permits)),
        }
    }

    pub fn max_permits(&self) -> usize {
        self.max_permits
    }

    /// Wait until a permit is free, then consume it. Never fails.
    pub async fn acquire(&self) {
        // Holding the lock across the sleep keeps later callers behind the
        // current head of the queue.
        let mut granted = self.granted.lock().await;
        loop {
            let now = Instant::now();
            while let Some(&oldest) = granted.front() {
                if now.duration_since(oldest) >= self.window {
                    granted.pop_front();
                } else {
                    break;
                }
            }
            if granted.len() < self.max_permits {
                granted.push_back(now);
                return;
            }
            let Some(&oldest) = granted.front() else {
                continue;
            };
            let ready_at = oldest + self.window;
            trace!(wait_ms = (ready_at - now).as_millis() as u64, "rate limiter saturated");
            sleep_until(ready_at).await;
        }
    }

    /// Permits that could be granted right now without waiting.
    pub async fn available(&self) -> usize {
        let granted = self.granted.lock().await;
        let now = Instant::now();
        let live = granted
            .iter()
            .filter(|&&t| now.duration_since(t) < self.window)
            .count();
        self.max_permits - live
    }
}
