//! Minimum spacing between requests to the metadata source.
//!
//! The limiter belongs to one client instance. A caller acquires a
//! [`RatePermit`] before each network call and holds it for the duration of
//! the call; dropping the permit records the completion time, and the next
//! acquisition waits until `min_interval` has passed since then. Every wait
//! is cancellable.

use std::sync::{Mutex, MutexGuard, TryLockError};
use std::time::{Duration, Instant};

use crate::cancel::{CancelToken, POLL_INTERVAL};
use crate::client::error::{ClientError, ClientResult};

/// Enforces a minimum interval between successive requests.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

/// Proof that the caller may issue one request now.
///
/// Exclusive: while a permit is alive no other request on the same limiter
/// can start.
#[must_use = "the request must be issued while the permit is held"]
pub struct RatePermit<'a> {
    last_call: MutexGuard<'a, Option<Instant>>,
}

impl Drop for RatePermit<'_> {
    fn drop(&mut self) {
        *self.last_call = Some(Instant::now());
    }
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_call: Mutex::new(None),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait for the slot and the spacing interval, then hand out a permit.
    ///
    /// Returns [`ClientError::Cancelled`] if `cancel` fires while waiting.
    pub fn acquire(&self, cancel: &CancelToken) -> ClientResult<RatePermit<'_>> {
        let guard = loop {
            match self.last_call.try_lock() {
                Ok(guard) => break guard,
                Err(TryLockError::Poisoned(poisoned)) => break poisoned.into_inner(),
                Err(TryLockError::WouldBlock) => {
                    if !cancel.sleep(POLL_INTERVAL) {
                        return Err(ClientError::Cancelled);
                    }
                }
            }
        };

        if let Some(last) = *guard {
            let elapsed = last.elapsed();
            if elapsed < self.min_interval {
                let wait = self.min_interval - elapsed;
                tracing::debug!(wait_ms = wait.as_millis() as u64, "rate limiter: waiting");
                if !cancel.sleep(wait) {
                    return Err(ClientError::Cancelled);
                }
            }
        }
        if cancel.is_cancelled() {
            return Err(ClientError::Cancelled);
        }

        Ok(RatePermit { last_call: guard })
    }
}
