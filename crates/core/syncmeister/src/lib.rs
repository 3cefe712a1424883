//! Spin locks, condition variables and a bounded queue for cooperating
//! processes.
//!
//! Everything in this crate is built from atomics and a per-context wake
//! word. Nothing relies on a host mutex or condition variable, and every
//! type is position independent, so a [`SharedRegion`](shm::SharedRegion)
//! created before `fork` can hold the primitives for all the children.
//!
//! The layering is strict:
//!
//! - [`SpinLock`](sync::SpinLock) spins on a single compare-and-swap.
//! - [`Condvar`](sync::Condvar) keeps a bounded FIFO of [`ContextId`]s under
//!   its own spin lock and suspends callers on their wake word.
//! - [`BoundedQueue`](sync::BoundedQueue) composes one lock and two
//!   condition variables.
//!
//! Every operation takes the caller's [`Context`], obtained by joining a
//! [`ContextTable`] that lives in the same shared memory.

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

pub mod context;
pub mod error;
pub mod log;
pub mod safety;
#[cfg(target_os = "linux")]
pub mod shm;
pub mod static_assert;
pub mod sync;

mod sys;

pub use context::{Context, ContextId, ContextTable, MAX_CONTEXTS};
pub use error::{JoinError, QueueFull, SignalError, Undeliverable};
