//! The synchronization primitives.
//!
//! [`SpinLock`] is the leaf. [`Condvar`] keeps its waiter queue under a
//! private `SpinLock` and cooperates with a caller-supplied one.
//! [`BoundedQueue`] is one `SpinLock` and two `Condvar`s around a ring
//! buffer.

mod condvar;
mod queue;
mod spinlock;

pub(crate) mod loom_compat;

#[cfg(all(any(test, syncmeister_lock_stress), not(loom), not(shuttle)))]
pub mod stress;

pub use condvar::{Condvar, MAX_WAITERS};
pub use queue::{BoundedQueue, DEFAULT_QUEUE_CAPACITY};
pub use spinlock::{SpinLock, SpinLockGuard};

/// Injection point for [`stress`] delays; free when stress is compiled out.
#[inline]
pub(crate) fn stress_point() {
    #[cfg(all(any(test, syncmeister_lock_stress), not(loom), not(shuttle)))]
    stress::stress_delay();
}
