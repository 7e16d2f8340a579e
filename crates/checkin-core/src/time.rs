//! Monotonic time source and deadline racing
//!
//! The pipeline never calls `Instant::now()` or `Timer` directly. Everything
//! goes through a [`Clock`] so host tests can run on virtual time.

use core::future::Future;

use embassy_futures::select::{Either, select};
use embassy_time::{Duration, Instant, Timer};

/// Monotonic clock with an async sleep.
pub trait Clock {
    /// Current monotonic time.
    fn now(&self) -> Instant;

    /// Suspend until `at`. Returns immediately if `at` has passed.
    fn sleep_until(&self, at: Instant) -> impl Future<Output = ()>;
}

/// [`Clock`] backed by the embassy-time driver of the running platform.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep_until(&self, at: Instant) -> impl Future<Output = ()> {
        Timer::at(at)
    }
}

/// The deadline passed before the raced future completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeadlineElapsed;

/// Run `fut` until it completes or `deadline` is reached, whichever is first.
///
/// On timeout the future is dropped, which cancels the in-flight operation.
/// A deadline already in the past never polls `fut`.
pub async fn with_deadline<C, F>(
    clock: &C,
    deadline: Instant,
    fut: F,
) -> Result<F::Output, DeadlineElapsed>
where
    C: Clock,
    F: Future,
{
    if clock.now() >= deadline {
        return Err(DeadlineElapsed);
    }

    match select(fut, clock.sleep_until(deadline)).await {
        Either::First(output) => Ok(output),
        Either::Second(()) => Err(DeadlineElapsed),
    }
}

/// `now + after`, clamped so it never exceeds `limit`.
pub fn deadline_within(now: Instant, after: Duration, limit: Instant) -> Instant {
    let wanted = now.checked_add(after).unwrap_or(limit);
    wanted.min(limit)
}
