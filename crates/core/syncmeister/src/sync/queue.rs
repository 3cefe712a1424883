//! Blocking bounded FIFO.
//!
//! One [`SpinLock`] guards a power-of-two ring; producers sleep on
//! `not_full`, consumers on `not_empty`. Every wake re-checks its predicate,
//! since a third context can take the lock between the signal and the
//! woken context getting it back.

use core::mem::MaybeUninit;

use super::{Condvar, SpinLock};
use crate::context::Context;
use crate::error::QueueFull;

/// Capacity used when none is given.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Spin iterations a consumer backs off for when `not_empty` is saturated.
const SATURATED_BACKOFF_SPINS: usize = 256;

/// Fixed ring with an explicit element count.
///
/// `head` is the next slot to read, `tail` the next to write; both advance
/// modulo `N`. Slots in `[head, head + count)` are initialized.
struct Ring<T, const N: usize> {
    buf: [MaybeUninit<T>; N],
    head: usize,
    tail: usize,
    count: usize,
}

impl<T: Copy, const N: usize> Ring<T, N> {
    const MASK: usize = N - 1;

    const fn new() -> Self {
        Self {
            buf: [const { MaybeUninit::uninit() }; N],
            head: 0,
            tail: 0,
            count: 0,
        }
    }

    fn is_full(&self) -> bool {
        self.count == N
    }

    fn is_empty(&self) -> bool {
        self.count == 0
    }

    fn check_invariant(&self) {
        debug_assert!(self.count <= N);
        debug_assert_eq!(self.count & Self::MASK, self.tail.wrapping_sub(self.head) & Self::MASK);
    }

    fn push(&mut self, value: T) {
        debug_assert!(!self.is_full());
        self.buf[self.tail].write(value);
        self.tail = (self.tail + 1) & Self::MASK;
        self.count += 1;
        self.check_invariant();
    }

    fn pop(&mut self) -> Option<T> {
        if self.is_empty() {
            return None;
        }
        // SAFETY: `count > 0`, so the slot at `head` was written by `push`
        // and has not been read since.
        let value = unsafe { self.buf[self.head].assume_init_read() };
        self.head = (self.head + 1) & Self::MASK;
        self.count -= 1;
        self.check_invariant();
        Some(value)
    }
}

/// A fixed-capacity blocking queue.
///
/// `T: Copy` keeps the buffer free of owned resources, so the queue can sit
/// in memory shared between processes. `N` must be a power of two.
///
/// # Example
///
/// ```ignore
/// let queue: BoundedQueue<u64, 4> = BoundedQueue::new();
///
/// // Producer:
/// queue.enqueue(&cx, 1)?;
///
/// // Consumer:
/// let value = queue.dequeue(&cx);
/// ```
pub struct BoundedQueue<T, const N: usize = DEFAULT_QUEUE_CAPACITY> {
    guard: SpinLock<Ring<T, N>>,
    not_full: Condvar,
    not_empty: Condvar,
}

impl<T: Copy, const N: usize> BoundedQueue<T, N> {
    const CAPACITY_IS_POWER_OF_TWO: () = assert!(
        N.is_power_of_two(),
        "BoundedQueue capacity must be a power of two"
    );

    /// Creates an empty queue.
    pub fn new() -> Self {
        let () = Self::CAPACITY_IS_POWER_OF_TWO;
        Self {
            guard: SpinLock::new(Ring::new()),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
        }
    }

    /// Appends `value`, sleeping while the queue is full.
    ///
    /// # Errors
    ///
    /// [`QueueFull`] if the queue is full and [`MAX_WAITERS`] producers are
    /// already asleep on it. Nothing was enqueued; back off and retry.
    ///
    /// [`MAX_WAITERS`]: super::MAX_WAITERS
    pub fn enqueue(&self, cx: &Context<'_>, value: T) -> Result<(), QueueFull> {
        let mut ring = self.guard.lock(cx);
        while ring.is_full() {
            self.not_full.wait(cx, &mut ring)?;
        }
        ring.push(value);
        self.not_empty.notify_one(cx);
        Ok(())
    }

    /// Removes the oldest value, sleeping while the queue is empty.
    ///
    /// If [`MAX_WAITERS`](super::MAX_WAITERS) consumers are already asleep,
    /// this spins briefly with the lock released and tries again rather than
    /// failing.
    pub fn dequeue(&self, cx: &Context<'_>) -> T {
        loop {
            let mut ring = self.guard.lock(cx);
            loop {
                if let Some(value) = ring.pop() {
                    self.not_full.notify_one(cx);
                    return value;
                }
                if self.not_empty.wait(cx, &mut ring).is_err() {
                    break;
                }
            }
            drop(ring);
            crate::sync_debug!("{}: not_empty saturated, backing off", cx.id());
            for _ in 0..SATURATED_BACKOFF_SPINS {
                super::loom_compat::spin_loop();
            }
        }
    }

    /// Appends `value` if there is room, without sleeping.
    ///
    /// # Errors
    ///
    /// Hands `value` back if the queue is full.
    pub fn try_enqueue(&self, cx: &Context<'_>, value: T) -> Result<(), T> {
        let mut ring = self.guard.lock(cx);
        if ring.is_full() {
            return Err(value);
        }
        ring.push(value);
        self.not_empty.notify_one(cx);
        Ok(())
    }

    /// Removes the oldest value if there is one, without sleeping.
    pub fn try_dequeue(&self, cx: &Context<'_>) -> Option<T> {
        let mut ring = self.guard.lock(cx);
        let value = ring.pop()?;
        self.not_full.notify_one(cx);
        Some(value)
    }

    /// Number of queued values.
    pub fn len(&self, cx: &Context<'_>) -> usize {
        self.guard.lock(cx).count
    }

    /// Returns `true` if nothing is queued.
    pub fn is_empty(&self, cx: &Context<'_>) -> bool {
        self.guard.lock(cx).is_empty()
    }

    /// The fixed capacity `N`.
    pub const fn capacity(&self) -> usize {
        N
    }
}

impl<T: Copy, const N: usize> Default for BoundedQueue<T, N> {
    fn default() -> Self {
        Self::new()
    }
}


#[cfg(all(test, shuttle))]
mod shuttle_tests {
    use super::*;
    use crate::ContextTable;
    use std::sync::Arc;

    struct Shared {
        table: ContextTable,
        queue: BoundedQueue<u32, 2>,
    }

    #[test]
    fn two_producers_one_consumer() {
        shuttle::check_random(
            || {
                let shared = Arc::new(Shared {
                    table: ContextTable::new(),
                    queue: BoundedQueue::new(),
                });

                let producers: Vec<_> = (0..2u32)
                    .map(|p| {
                        let shared = Arc::clone(&shared);
                        shuttle::thread::spawn(move || {
                            let cx = shared.table.join().unwrap();
                            for seq in 0..3 {
                                shared.queue.enqueue(&cx, p * 10 + seq).unwrap();
                            }
                        })
                    })
                    .collect();

                let cx = shared.table.join().unwrap();
                let mut last = [None::<u32>; 2];
                for _ in 0..6 {
                    let v = shared.queue.dequeue(&cx);
                    let p = (v / 10) as usize;
                    assert!(last[p].is_none_or(|prev| prev < v));
                    last[p] = Some(v);
                }
                drop(cx);

                for h in producers {
                    h.join().unwrap();
                }
            },
            200,
        );
    }
}
