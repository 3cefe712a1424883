//! Error types returned by the primitives.
//!
//! None of these are fatal. [`QueueFull`] asks the caller to back off,
//! [`SignalError::NoWaiters`] is the ordinary result of signalling an empty
//! condition variable, and delivery failures leave every queue consistent
//! because the waiter entry is removed before the wake is sent.

use core::fmt;

use crate::ContextId;

/// A condition variable's waiter queue is at capacity.
///
/// Returned by [`Condvar::wait`](crate::sync::Condvar::wait) and propagated
/// by [`BoundedQueue::enqueue`](crate::sync::BoundedQueue::enqueue). The
/// caller still holds its lock and should retry later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFull;

impl fmt::Display for QueueFull {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("condition variable waiter queue is full")
    }
}

impl core::error::Error for QueueFull {}

/// A wake could not be delivered because the target context has left its
/// [`ContextTable`](crate::ContextTable).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Undeliverable(pub ContextId);

impl fmt::Display for Undeliverable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "context {} is no longer present", self.0)
    }
}

impl core::error::Error for Undeliverable {}

/// Outcome of a [`Condvar::signal`](crate::sync::Condvar::signal) that did
/// not wake anybody.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalError {
    /// The waiter queue was empty.
    NoWaiters,
    /// A waiter was dequeued but its context is gone.
    Undeliverable(ContextId),
}

impl fmt::Display for SignalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoWaiters => f.write_str("no waiters to signal"),
            Self::Undeliverable(id) => write!(f, "wake to context {id} could not be delivered"),
        }
    }
}

impl core::error::Error for SignalError {}

impl From<Undeliverable> for SignalError {
    fn from(err: Undeliverable) -> Self {
        Self::Undeliverable(err.0)
    }
}

/// Errors from [`ContextTable::join`](crate::ContextTable::join).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinError {
    /// Every slot is occupied by a live context.
    TableFull,
}

impl fmt::Display for JoinError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TableFull => f.write_str("context table is full"),
        }
    }
}

impl core::error::Error for JoinError {}
