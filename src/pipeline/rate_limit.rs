//! Shared rolling-window rate limiter for completion calls.
//!
//! Grants at most `capacity` acquisitions within any rolling `window`. One
//! instance is shared (`Arc`) by every worker of a batch; a worker without a
//! free slot sleeps until the oldest grant leaves the window.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct RateLimiter {
    grants: Mutex<VecDeque<Instant>>,
    capacity: usize,
    window: Duration,
}

impl RateLimiter {
    /// A zero capacity is raised to one.
    pub fn new(capacity: u32, window: Duration) -> Self {
        let capacity = capacity.max(1) as usize;
        Self {
            grants: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            window,
        }
    }

    /// Requests per minute, the way provider limits are usually quoted.
    pub fn per_minute(requests: u32) -> Self {
        Self::new(requests, Duration::from_secs(60))
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    // A panic while holding the lock cannot leave the queue inconsistent.
    fn lock(&self) -> MutexGuard<'_, VecDeque<Instant>> {
        self.grants.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Try to take a slot at `now`. Returns `Err(wait)` with the time until
    /// the oldest grant expires when the window is full.
    pub fn try_acquire_at(&self, now: Instant) -> Result<(), Duration> {
        let mut grants = self.lock();

        while let Some(oldest) = grants.front() {
            if now.duration_since(*oldest) >= self.window {
                grants.pop_front();
            } else {
                break;
            }
        }

        if grants.len() < self.capacity {
            grants.push_back(now);
            return Ok(());
        }

        let oldest = grants.front().copied().unwrap_or(now);
        Err(self.window.saturating_sub(now.duration_since(oldest)))
    }

    /// Block the calling thread until a slot is granted. Returns the total
    /// time spent waiting.
    pub fn acquire(&self) -> Duration {
        let mut waited = Duration::ZERO;
        loop {
            match self.try_acquire_at(Instant::now()) {
                Ok(()) => return waited,
                Err(wait) => {
                    // Never spin on a zero wait.
                    let wait = wait.max(Duration::from_millis(1));
                    tracing::debug!(
                        wait_ms = wait.as_millis() as u64,
                        capacity = self.capacity,
                        "Rate limit window full, waiting for a slot"
                    );
                    std::thread::sleep(wait);
                    waited += wait;
                }
            }
        }
    }

    /// Grants currently inside the window.
    pub fn in_flight_at(&self, now: Instant) -> usize {
        self.lock()
            .iter()
            .filter(|t| now.duration_since(**t) < self.window)
            .count()
    }
}
