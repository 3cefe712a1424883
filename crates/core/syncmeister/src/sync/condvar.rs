//! Condition variable over [`SpinLock`].
//!
//! Waiters are queued by [`ContextId`] in a fixed ring, so a signal names
//! exactly one context and wake order is the order of entry into the queue.
//! The ring has its own lock; the caller's lock only guards the predicate.
//!
//! The sleep itself is the context's futex park. `wait` arms the wake word
//! and publishes the handle *before* releasing the caller's lock, so a
//! signal that arrives anywhere between that release and the futex call
//! leaves a token the park will see.

use planck_noalloc::ringbuf::RingBuf;

use super::{SpinLock, SpinLockGuard};
use crate::assert_contract;
use crate::context::{Context, ContextId};
use crate::error::{QueueFull, SignalError};
use crate::static_assert;

/// Maximum number of contexts blocked on one condition variable.
pub const MAX_WAITERS: usize = 64;

static_assert!(MAX_WAITERS > 0);

/// `RingBuf` keeps one slot empty, so this holds exactly `MAX_WAITERS`.
type WaiterRing = RingBuf<ContextId, { MAX_WAITERS + 1 }>;

struct Waiters {
    queue: WaiterRing,
    /// Address of the waiters' [`ContextTable`](crate::ContextTable) relative to the condvar.
    /// Only meaningful while `queue` is non-empty; neither can move then.
    table: usize,
}

/// A condition variable.
///
/// Callers hold a [`SpinLock`], check a predicate, and call
/// [`wait`](Condvar::wait) while it is false; another context changes the
/// state and calls [`signal`](Condvar::signal) or
/// [`broadcast`](Condvar::broadcast). Always recheck the predicate after
/// waking: another context may have taken the lock first.
///
/// # Example
///
/// ```ignore
/// let mut ready = state.lock(&cx);
/// while !*ready {
///     cond.wait(&cx, &mut ready)?;
/// }
///
/// // Elsewhere:
/// *state.lock(&other) = true;
/// let _ = cond.signal(&other);
/// ```
///
/// A [`ContextId`] only means something to the table that issued it, so
/// every context that waits on or signals one `Condvar` must come from the
/// same [`ContextTable`](crate::ContextTable). Debug and hardened builds
/// check this.
pub struct Condvar {
    waiters: SpinLock<Waiters>,
}

impl Condvar {
    /// Creates a condition variable with no waiters.
    pub fn new() -> Self {
        Self {
            waiters: SpinLock::new(Waiters {
                queue: RingBuf::new(),
                table: 0,
            }),
        }
    }

    /// Releases the lock held by `guard`, sleeps until signalled, and
    /// re-acquires the lock before returning.
    ///
    /// Wakes are not spurious in the normal course, but the predicate must
    /// still be rechecked in a loop:
    /// ```ignore
    /// while !condition(&guard) {
    ///     condvar.wait(&cx, &mut guard)?;
    /// }
    /// ```
    ///
    /// # Errors
    ///
    /// [`QueueFull`] if [`MAX_WAITERS`] contexts are already waiting. The
    /// lock is still held and nothing was queued.
    pub fn wait<T>(&self, cx: &Context<'_>, guard: &mut SpinLockGuard<'_, T>) -> Result<(), QueueFull> {
        {
            let mut waiters = self.waiters.lock(cx);
            let table = self.table_offset(cx);
            if waiters.queue.is_empty() {
                waiters.table = table;
            } else {
                assert_contract!(
                    waiters.table == table,
                    "Condvar waited on from two different context tables"
                );
            }
            cx.arm();
            if waiters.queue.try_push(cx.id()).is_err() {
                crate::sync_debug!("condvar waiter queue full, rejecting {}", cx.id());
                return Err(QueueFull);
            }
        }

        let lock = guard.lock_ref();
        // SAFETY: `guard` proves the caller holds `lock`, and it is
        // re-acquired below before the guard can be used or dropped again.
        unsafe { lock.release() };
        super::stress_point();
        cx.park();
        lock.acquire(cx);
        Ok(())
    }

    /// Wakes the longest-waiting context.
    ///
    /// The waiter is removed from the queue before the wake is delivered,
    /// so a failed delivery never leaves the queue inconsistent.
    ///
    /// # Errors
    ///
    /// - [`SignalError::NoWaiters`] if nobody is waiting.
    /// - [`SignalError::Undeliverable`] if the dequeued waiter has left its
    ///   context table. Nobody was woken.
    pub fn signal(&self, cx: &Context<'_>) -> Result<(), SignalError> {
        let id = {
            let mut waiters = self.waiters.lock(cx);
            assert_contract!(
                waiters.queue.is_empty() || waiters.table == self.table_offset(cx),
                "Condvar signalled from a different context table than its waiters"
            );
            waiters.queue.pop().ok_or(SignalError::NoWaiters)?
        };
        cx.table().unpark(id)?;
        crate::sync_trace!("{} woke {id}", cx.id());
        Ok(())
    }

    /// Wakes the longest-waiting context that is still present, discarding
    /// departed ones. Returns `false` if the queue ran dry first.
    pub fn notify_one(&self, cx: &Context<'_>) -> bool {
        loop {
            match self.signal(cx) {
                Ok(()) => return true,
                Err(SignalError::NoWaiters) => return false,
                Err(SignalError::Undeliverable(id)) => {
                    crate::sync_warn!("dropping departed waiter {id}");
                }
            }
        }
    }

    /// Wakes every queued context. Returns how many wakes were delivered.
    ///
    /// Signals until the queue reports empty; departed waiters are logged
    /// and skipped.
    pub fn broadcast(&self, cx: &Context<'_>) -> usize {
        let mut woken = 0;
        loop {
            match self.signal(cx) {
                Ok(()) => woken += 1,
                Err(SignalError::NoWaiters) => return woken,
                Err(SignalError::Undeliverable(id)) => {
                    crate::sync_warn!("broadcast: waiter {id} is gone");
                }
            }
        }
    }

    /// Number of queued waiters.
    pub fn waiters(&self, cx: &Context<'_>) -> usize {
        self.waiters.lock(cx).queue.len()
    }

    /// Where `cx`'s table sits relative to `self`. Both live in the same
    /// shared memory, so this agrees across every process mapping it.
    fn table_offset(&self, cx: &Context<'_>) -> usize {
        core::ptr::from_ref(cx.table())
            .addr()
            .wrapping_sub(core::ptr::from_ref(self).addr())
    }
}

impl Default for Condvar {
    fn default() -> Self {
        Self::new()
    }
}


#[cfg(all(test, loom))]
mod loom_tests {
    use super::*;
    use crate::ContextTable;
    use loom::sync::Arc;

    struct Shared {
        table: ContextTable,
        flag: SpinLock<bool>,
        cv: Condvar,
    }

    #[test]
    fn signal_after_unlock_always_wakes() {
        let mut builder = loom::model::Builder::new();
        builder.preemption_bound = Some(2);
        builder.check(|| {
            let shared = Arc::new(Shared {
                table: ContextTable::new(),
                flag: SpinLock::new(false),
                cv: Condvar::new(),
            });

            let waiter = {
                let shared = Arc::clone(&shared);
                loom::thread::spawn(move || {
                    let cx = shared.table.join().unwrap();
                    let mut guard = shared.flag.lock(&cx);
                    while !*guard {
                        shared.cv.wait(&cx, &mut guard).unwrap();
                    }
                })
            };

            let cx = shared.table.join().unwrap();
            *shared.flag.lock(&cx) = true;
            let _ = shared.cv.signal(&cx);
            drop(cx);

            waiter.join().unwrap();
        });
    }
}
