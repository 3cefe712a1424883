//! Model-checker compatibility shim.
//!
//! Under `cfg(loom)` or `cfg(shuttle)` the atomics and the spin hint come
//! from the checker so it can schedule every interleaving; otherwise they
//! are the `core` ones. The primitives import from here, never from
//! `core::sync::atomic` directly.
//!
//! The checkers also get a `Mutex`/`Condvar` pair. The futex has no model,
//! so `sys` sleeps on these instead and the checker sees a blocked thread
//! rather than an endless yield loop.

// ---------------------------------------------------------------------------
// Loom mode
// ---------------------------------------------------------------------------

#[cfg(loom)]
pub(crate) use loom::sync::atomic::{AtomicBool, AtomicU32, Ordering};
#[cfg(loom)]
pub(crate) use loom::sync::{Condvar, Mutex};

#[cfg(loom)]
#[inline]
pub(crate) fn spin_loop() {
    loom::thread::yield_now();
}

// ---------------------------------------------------------------------------
// Shuttle mode
// ---------------------------------------------------------------------------

#[cfg(all(shuttle, not(loom)))]
pub(crate) use shuttle::sync::atomic::{AtomicBool, AtomicU32, Ordering};
#[cfg(all(shuttle, not(loom)))]
pub(crate) use shuttle::sync::{Condvar, Mutex};

#[cfg(all(shuttle, not(loom)))]
#[inline]
pub(crate) fn spin_loop() {
    shuttle::thread::yield_now();
}

// ---------------------------------------------------------------------------
// Normal mode
// ---------------------------------------------------------------------------

#[cfg(not(any(loom, shuttle)))]
pub(crate) use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

#[cfg(not(any(loom, shuttle)))]
#[inline]
pub(crate) fn spin_loop() {
    core::hint::spin_loop();
}
