//! Time sources and bounded polling
//!
//! Hardware that signals completion through a status bit has to be polled.
//! The interval and deadline of every poll loop are explicit [`Poll`]
//! values, and the passage of time comes from a [`Clock`], so tests can
//! drive loops with a [`VirtualClock`] instead of sleeping.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::Result;

/// Monotonic time source
pub trait Clock {
    /// Time elapsed since an arbitrary fixed origin
    fn now(&self) -> Duration;
    /// Block the caller for `duration`
    fn sleep(&self, duration: Duration);
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> Duration {
        (**self).now()
    }

    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}

/// Wall clock backed by [`Instant`] and [`std::thread::sleep`]
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Simulated clock: time only moves when someone sleeps or calls `advance`
///
/// Clones share the same time line.
#[derive(Debug, Clone, Default)]
pub struct VirtualClock {
    nanos: Arc<AtomicU64>,
}

impl VirtualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, duration: Duration) {
        self.nanos
            .fetch_add(duration.as_nanos() as u64, Ordering::SeqCst);
    }
}

impl Clock for VirtualClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

/// Interval and deadline of a poll loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Poll {
    /// Pause between attempts; zero means busy-loop
    pub interval: Duration,
    /// Give up once this much time has passed since the first attempt
    pub deadline: Duration,
}

/// Result of [`Poll::until`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polled<T> {
    /// The condition held for this value
    Ready(T),
    /// The deadline passed; `last` is the final value observed
    Expired { last: T, elapsed: Duration },
}

impl Poll {
    pub const fn new(interval: Duration, deadline: Duration) -> Self {
        Self { interval, deadline }
    }

    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub const fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// Repeatedly `read` a value until `ready` accepts it or the deadline passes
    ///
    /// `read` runs at least once. Errors from `read` end the loop
    /// immediately. With a zero interval against a [`VirtualClock`] nothing
    /// advances time, so callers under test must use a non-zero interval.
    pub fn until<C, T>(
        &self,
        clock: &C,
        mut read: impl FnMut() -> Result<T>,
        mut ready: impl FnMut(&T) -> bool,
    ) -> Result<Polled<T>>
    where
        C: Clock + ?Sized,
    {
        let start = clock.now();
        loop {
            let value = read()?;
            if ready(&value) {
                return Ok(Polled::Ready(value));
            }
            let elapsed = clock.now().saturating_sub(start);
            if elapsed >= self.deadline {
                return Ok(Polled::Expired {
                    last: value,
                    elapsed,
                });
            }
            if !self.interval.is_zero() {
                clock.sleep(self.interval);
            }
        }
    }
}
