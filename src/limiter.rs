//! Token-bucket rate limiter.
//!
//! The bucket holds up to `burst` tokens and refills at `rate` tokens per
//! second. [`RateLimiter::wait`] works by reservation: the caller takes a
//! token under the lock (the balance may go negative), works out when that
//! token will exist, and sleeps until then without holding the lock. Grants
//! therefore come out in reservation order and no waiter can be overtaken
//! indefinitely.
//!
//! A reservation that is cancelled or dropped before its grant vacates its
//! slot. Waiters already scheduled behind it keep their deadlines; the next
//! reservation takes over the earliest vacated slot instead of queueing at
//! the back. A vacated slot whose time has passed goes back into the balance,
//! capped at `burst`.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

#[derive(Debug)]
pub struct RateLimiter {
    rate: f64,
    burst: u32,
    bucket: Mutex<Bucket>,
}

#[derive(Debug)]
struct Bucket {
    /// Token balance as of `last`. Negative when reservations are queued.
    tokens: f64,
    last: Instant,
    /// Grant times given up by cancelled reservations, earliest first.
    vacated: BinaryHeap<Reverse<Instant>>,
}

/// A reserved grant. Vacates its slot on drop unless it was granted.
struct Reservation<'a> {
    limiter: &'a RateLimiter,
    ready_at: Instant,
    granted: bool,
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if !self.granted {
            self.limiter.vacate(self.ready_at);
        }
    }
}

impl RateLimiter {
    /// A full bucket of `burst` tokens refilled at `rate` per second.
    pub fn new(rate: f64, burst: u32) -> Result<Self> {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(Error::Config(format!(
                "rate limiter rate must be a positive number, got {rate}"
            )));
        }
        if burst == 0 {
            return Err(Error::Config("rate limiter burst must be at least 1".to_string()));
        }
        Ok(Self {
            rate,
            burst,
            bucket: Mutex::new(Bucket {
                tokens: f64::from(burst),
                last: Instant::now(),
                vacated: BinaryHeap::new(),
            }),
        })
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn burst(&self) -> u32 {
        self.burst
    }

    /// Wait for a token and consume it.
    ///
    /// Returns [`Error::Cancelled`] if `cancel` fires first, including when it
    /// is already cancelled on entry. A cancelled or dropped wait consumes
    /// nothing.
    pub async fn wait(&self, cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let mut reservation = Reservation {
            limiter: self,
            ready_at: self.reserve(),
            granted: false,
        };
        if reservation.ready_at > Instant::now() {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = tokio::time::sleep_until(reservation.ready_at) => {}
            }
        }
        reservation.granted = true;
        Ok(())
    }

    /// Take a token only if one is available right now.
    pub fn try_acquire(&self) -> bool {
        let mut bucket = self.lock();
        let now = Instant::now();
        self.refill(&mut bucket, now);
        if !bucket.vacated.is_empty() {
            return false;
        }
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Reserve the next token and return the instant it becomes available.
    fn reserve(&self) -> Instant {
        let mut bucket = self.lock();
        let now = Instant::now();
        self.refill(&mut bucket, now);
        if let Some(Reverse(slot)) = bucket.vacated.pop() {
            return slot;
        }
        bucket.tokens -= 1.0;
        if bucket.tokens >= 0.0 {
            now
        } else {
            now + Duration::from_secs_f64(-bucket.tokens / self.rate)
        }
    }

    /// Give up the slot granted at `ready_at`.
    fn vacate(&self, ready_at: Instant) {
        let mut bucket = self.lock();
        bucket.vacated.push(Reverse(ready_at));
        let now = Instant::now();
        self.refill(&mut bucket, now);
    }

    /// Bring the balance up to `now` and return expired vacated slots to it.
    fn refill(&self, bucket: &mut Bucket, now: Instant) {
        let burst = f64::from(self.burst);
        let elapsed = now.saturating_duration_since(bucket.last).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.rate).min(burst);
        bucket.last = now;
        while bucket.vacated.peek().is_some_and(|Reverse(slot)| *slot <= now) {
            bucket.vacated.pop();
            bucket.tokens = (bucket.tokens + 1.0).min(burst);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Bucket> {
        self.bucket.lock().unwrap_or_else(|e| e.into_inner())
    }
}
