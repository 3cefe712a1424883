//! Spin-based mutual exclusion lock.
//!
//! Uses test-and-test-and-set (TTAS): the lock is only ever taken by a
//! single compare-and-swap, and contenders spin on a plain load so the
//! cache line stays shared until the holder releases it.

use core::cell::UnsafeCell;
use core::marker::PhantomData;
use core::ops::{Deref, DerefMut};

use super::loom_compat::{AtomicBool, AtomicU32, Ordering};
use crate::assert_contract;
use crate::context::{Context, ContextId};

/// A spin-based mutual exclusion lock.
///
/// The lock word and the protected value live inline, so a `SpinLock`
/// placed in shared memory works across processes as long as `T` does.
/// Besides the guard API there is a raw [`acquire`](Self::acquire) /
/// [`release`](Self::release) pair for callers that manage the critical
/// section themselves.
pub struct SpinLock<T> {
    locked: AtomicBool,
    /// Raw [`ContextId`] of the holder, 0 when free. Diagnostic only.
    owner: AtomicU32,
    data: UnsafeCell<T>,
}

// SAFETY: The SpinLock ensures exclusive access to `T` via atomic operations.
// `T: Send` is required because the data may be accessed from different contexts.
unsafe impl<T: Send> Send for SpinLock<T> {}
unsafe impl<T: Send> Sync for SpinLock<T> {}

impl<T> SpinLock<T> {
    /// Creates a new unlocked `SpinLock` wrapping `value`.
    pub fn new(value: T) -> Self {
        Self {
            locked: AtomicBool::new(false),
            owner: AtomicU32::new(0),
            data: UnsafeCell::new(value),
        }
    }

    /// Acquires the lock, spinning until it becomes available.
    ///
    /// Returns a [`SpinLockGuard`] that releases the lock when dropped.
    pub fn lock<'a>(&'a self, cx: &Context<'_>) -> SpinLockGuard<'a, T> {
        self.acquire(cx);
        SpinLockGuard::new(self)
    }

    /// Attempts to acquire the lock without spinning.
    ///
    /// Returns `None` if it is already held.
    pub fn try_lock<'a>(&'a self, cx: &Context<'_>) -> Option<SpinLockGuard<'a, T>> {
        if self
            .locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            self.owner.store(cx.id().into_raw(), Ordering::Relaxed);
            Some(SpinLockGuard::new(self))
        } else {
            None
        }
    }

    /// Acquires the lock without producing a guard.
    ///
    /// The caller must eventually call [`release`](Self::release) exactly
    /// once.
    pub fn acquire(&self, cx: &Context<'_>) {
        loop {
            // Fast path: try to acquire directly.
            if self
                .locked
                .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                self.owner.store(cx.id().into_raw(), Ordering::Relaxed);
                super::stress_point();
                return;
            }

            // TTAS: spin on a read until it looks free.
            while self.locked.load(Ordering::Relaxed) {
                super::loom_compat::spin_loop();
            }
        }
    }

    /// Releases a lock taken with [`acquire`](Self::acquire).
    ///
    /// # Safety
    ///
    /// The caller must hold the lock and must not hold a [`SpinLockGuard`]
    /// for it (the guard would release it a second time).
    pub unsafe fn release(&self) {
        assert_contract!(
            self.locked.load(Ordering::Relaxed),
            "release of an unheld SpinLock"
        );
        super::stress_point();
        self.owner.store(0, Ordering::Relaxed);
        self.locked.store(false, Ordering::Release);
    }

    /// Returns `true` if some context holds the lock right now.
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }

    /// The context that last acquired the lock, if it is still held.
    ///
    /// Racy by nature; use it for diagnostics only.
    pub fn owner(&self) -> Option<ContextId> {
        ContextId::from_raw(self.owner.load(Ordering::Relaxed))
    }

    /// Returns a mutable reference to the data. No locking is needed since
    /// the borrow is exclusive.
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    /// Consumes the lock, returning the data.
    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: Default> Default for SpinLock<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

/// RAII guard that releases the [`SpinLock`] when dropped.
///
/// Never `Send`, and `Sync` only when `T: Sync`: a shared guard hands out
/// `&T` to whoever holds a reference to it.
pub struct SpinLockGuard<'a, T> {
    lock: &'a SpinLock<T>,
    _not_send: PhantomData<*const ()>,
}

// SAFETY: Sharing the guard only shares `&T`.
unsafe impl<T: Sync> Sync for SpinLockGuard<'_, T> {}

impl<'a, T> SpinLockGuard<'a, T> {
    fn new(lock: &'a SpinLock<T>) -> Self {
        Self {
            lock,
            _not_send: PhantomData,
        }
    }

    /// Returns a reference to the underlying [`SpinLock`].
    ///
    /// Used by [`Condvar::wait`](super::Condvar::wait) to release and
    /// re-acquire around the sleep.
    pub fn lock_ref(&self) -> &'a SpinLock<T> {
        self.lock
    }
}

impl<T> Deref for SpinLockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: The guard guarantees exclusive access while it exists.
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> DerefMut for SpinLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: The guard guarantees exclusive access while it exists.
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T> Drop for SpinLockGuard<'_, T> {
    fn drop(&mut self) {
        // SAFETY: The guard exists only while the lock is held.
        unsafe { self.lock.release() };
    }
}

#[cfg(all(test, not(loom), not(shuttle)))]
mod tests {
    use super::*;
    use crate::ContextTable;
    use core::cell::Cell;

    #[test]
    fn lock_unlock() {
        let table = ContextTable::new();
        let cx = table.join().unwrap();
        let lock = SpinLock::new(42);
        {
            let guard = lock.lock(&cx);
            assert_eq!(*guard, 42);
        }
        assert!(!lock.is_locked());
        assert!(lock.try_lock(&cx).is_some());
    }

    #[test]
    fn try_lock_fails_when_held() {
        let table = ContextTable::new();
        let cx = table.join().unwrap();
        let lock = SpinLock::new(10);
        let _guard = lock.lock(&cx);
        assert!(lock.try_lock(&cx).is_none());
    }

    #[test]
    fn mutate_through_guard() {
        let table = ContextTable::new();
        let cx = table.join().unwrap();
        let lock = SpinLock::new(0);
        *lock.lock(&cx) = 99;
        assert_eq!(*lock.lock(&cx), 99);
    }

    #[test]
    fn owner_is_recorded_and_cleared() {
        let table = ContextTable::new();
        let cx = table.join().unwrap();
        let lock = SpinLock::new(());
        assert_eq!(lock.owner(), None);
        let guard = lock.lock(&cx);
        assert_eq!(lock.owner(), Some(cx.id()));
        drop(guard);
        assert_eq!(lock.owner(), None);
    }

    #[test]
    fn raw_acquire_release() {
        let table = ContextTable::new();
        let cx = table.join().unwrap();
        let lock = SpinLock::new(());
        lock.acquire(&cx);
        assert!(lock.is_locked());
        assert!(lock.try_lock(&cx).is_none());
        // SAFETY: Acquired above, no guard outstanding.
        unsafe { lock.release() };
        assert!(!lock.is_locked());
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "release of an unheld SpinLock")]
    fn release_unheld_panics_in_debug() {
        let lock = SpinLock::new(());
        // SAFETY: Deliberately violated; the contract check fires first.
        unsafe { lock.release() };
    }

    /// `Check::<T>::SYNC` resolves to the inherent const when `T: Sync` and
    /// to the blanket trait's otherwise.
    #[allow(dead_code)]
    struct Check<T: ?Sized>(PhantomData<T>);

    trait NotSync {
        const SYNC: bool = false;
    }

    impl<T: ?Sized> NotSync for T {}

    impl<T: ?Sized + Sync> Check<T> {
        const SYNC: bool = true;
    }

    #[test]
    fn guard_is_sync_only_for_sync_data() {
        const { assert!(Check::<SpinLockGuard<'static, u32>>::SYNC) };
        const { assert!(!Check::<SpinLockGuard<'static, Cell<u32>>>::SYNC) };
        const { assert!(!Check::<SpinLockGuard<'static, UnsafeCell<u32>>>::SYNC) };
    }

    #[test]
    fn into_inner_and_get_mut() {
        let mut lock = SpinLock::new(String::from("hello"));
        lock.get_mut().push_str(" world");
        assert_eq!(lock.into_inner(), "hello world");
    }

    #[test]
    fn no_lost_updates_under_contention() {
        const CONTEXTS: usize = 8;
        const INCREMENTS: usize = 10_000;

        let table = ContextTable::new();
        let counter = SpinLock::new(0usize);
        std::thread::scope(|s| {
            for _ in 0..CONTEXTS {
                s.spawn(|| {
                    let cx = table.join().unwrap();
                    for _ in 0..INCREMENTS {
                        *counter.lock(&cx) += 1;
                    }
                });
            }
        });
        assert_eq!(counter.into_inner(), CONTEXTS * INCREMENTS);
    }

    #[test]
    fn raw_pair_excludes_plain_memory() {
        const CONTEXTS: usize = 4;
        const INCREMENTS: usize = 5_000;

        struct Shared {
            lock: SpinLock<()>,
            counter: UnsafeCell<usize>,
        }
        // SAFETY: `counter` is only touched between acquire and release.
        unsafe impl Sync for Shared {}

        let table = ContextTable::new();
        let shared = Shared {
            lock: SpinLock::new(()),
            counter: UnsafeCell::new(0),
        };
        std::thread::scope(|s| {
            let (shared, table) = (&shared, &table);
            for _ in 0..CONTEXTS {
                s.spawn(move || {
                    let cx = table.join().unwrap();
                    for _ in 0..INCREMENTS {
                        shared.lock.acquire(&cx);
                        // SAFETY: Inside the critical section.
                        unsafe { *shared.counter.get() += 1 };
                        // SAFETY: Acquired above.
                        unsafe { shared.lock.release() };
                    }
                });
            }
        });
        assert_eq!(shared.counter.into_inner(), CONTEXTS * INCREMENTS);
    }
}

#[cfg(all(test, loom))]
mod loom_tests {
    use super::*;
    use crate::ContextTable;
    use loom::sync::Arc;

    #[test]
    fn two_contexts_never_overlap() {
        loom::model(|| {
            let shared = Arc::new((ContextTable::new(), SpinLock::new(0u32)));
            let handles: Vec<_> = (0..2)
                .map(|_| {
                    let shared = Arc::clone(&shared);
                    loom::thread::spawn(move || {
                        let (table, lock) = &*shared;
                        let cx = table.join().unwrap();
                        *lock.lock(&cx) += 1;
                    })
                })
                .collect();
            for h in handles {
                h.join().unwrap();
            }
            let (table, lock) = &*shared;
            let cx = table.join().unwrap();
            assert_eq!(*lock.lock(&cx), 2);
        });
    }
}
