//! Participating contexts and their wake words.
//!
//! A *context* is anything that can block independently: a forked process
//! or a thread. Each one claims a slot in a [`ContextTable`] that lives in
//! the same shared memory as the primitives, and receives a [`Context`]
//! for the duration of its participation. The slot's wake word is the only
//! channel through which a context is ever woken, which is what lets a
//! [`Condvar`](crate::sync::Condvar) address exactly one waiter.
//!
//! ## Wake protocol
//!
//! The wake word is `EMPTY` or `NOTIFIED`. A waker stores `NOTIFIED` and then
//! issues a futex wake; the sleeper consumes the token with a swap and, if
//! there was none, futex-waits *on the value it just saw*. Because the
//! kernel compares and sleeps atomically, a token that lands between the
//! swap and the sleep makes the wait return at once. There is no window in
//! which a wake can be dropped.
//!
//! ## Handles
//!
//! A [`ContextId`] packs the slot index with the slot's generation. Leaving
//! the table bumps the generation, so a handle left behind in some waiter
//! queue becomes undeliverable rather than waking the slot's next occupant.

use core::cell::Cell;
use core::fmt;
use core::marker::PhantomData;

use crate::error::{JoinError, Undeliverable};
use crate::sync::loom_compat::{AtomicU32, Ordering};
use crate::static_assert;
use crate::sys::{self, WaitWord};

/// Number of slots in a [`ContextTable`].
#[cfg(not(loom))]
pub const MAX_CONTEXTS: usize = 128;

/// Number of slots in a [`ContextTable`].
#[cfg(loom)]
pub const MAX_CONTEXTS: usize = 4;

static_assert!(MAX_CONTEXTS < u16::MAX as usize, "slot index must fit in a ContextId");

const EMPTY: u32 = 0;
const NOTIFIED: u32 = 1;

const OCCUPIED: u32 = 1;

/// Stable handle naming one occupancy of one table slot.
///
/// The raw value is never zero, so `0` can stand for "no context" wherever a
/// handle is stored in an atomic word.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(u32);

impl ContextId {
    fn new(index: usize, generation: u16) -> Self {
        // `index < MAX_CONTEXTS < u16::MAX`, checked at compile time.
        #[allow(clippy::cast_possible_truncation)]
        let low = (index + 1) as u32;
        Self((u32::from(generation) << 16) | low)
    }

    /// Rebuilds a handle from [`into_raw`](Self::into_raw).
    ///
    /// Returns `None` for `0` and for values whose slot index is out of
    /// range.
    pub fn from_raw(raw: u32) -> Option<Self> {
        let low = raw & 0xFFFF;
        if low == 0 || low as usize > MAX_CONTEXTS {
            None
        } else {
            Some(Self(raw))
        }
    }

    /// Returns the raw, non-zero encoding.
    pub const fn into_raw(self) -> u32 {
        self.0
    }

    /// Index of the table slot.
    pub const fn slot(self) -> usize {
        (self.0 & 0xFFFF) as usize - 1
    }

    /// Occupancy generation of the slot when this handle was issued.
    #[allow(clippy::cast_possible_truncation)]
    pub const fn generation(self) -> u16 {
        (self.0 >> 16) as u16
    }

    /// The slot state word this handle expects to find while it is live.
    fn live_state(self) -> u32 {
        (u32::from(self.generation()) << 1) | OCCUPIED
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.slot(), self.generation())
    }
}

impl fmt::Debug for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContextId({self})")
    }
}

struct Slot {
    /// `(generation << 1) | OCCUPIED`.
    state: AtomicU32,
    /// `EMPTY` or `NOTIFIED`; the futex word.
    wake: WaitWord,
}

impl Slot {
    fn new() -> Self {
        Self {
            state: AtomicU32::new(0),
            wake: WaitWord::new(EMPTY),
        }
    }
}

/// Fixed registry of participating contexts.
///
/// Must be constructed, and placed where every participant can see it,
/// before any participant calls [`join`](Self::join).
pub struct ContextTable {
    slots: [Slot; MAX_CONTEXTS],
}

impl ContextTable {
    /// Creates a table with every slot free.
    pub fn new() -> Self {
        Self {
            slots: core::array::from_fn(|_| Slot::new()),
        }
    }

    /// Claims a free slot for the caller.
    ///
    /// # Errors
    ///
    /// [`JoinError::TableFull`] if all [`MAX_CONTEXTS`] slots are occupied.
    pub fn join(&self) -> Result<Context<'_>, JoinError> {
        for (index, slot) in self.slots.iter().enumerate() {
            let state = slot.state.load(Ordering::Relaxed);
            if state & OCCUPIED != 0 {
                continue;
            }
            if slot
                .state
                .compare_exchange(state, state | OCCUPIED, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                slot.wake.store(EMPTY, Ordering::Relaxed);
                #[allow(clippy::cast_possible_truncation)]
                let id = ContextId::new(index, (state >> 1) as u16);
                crate::sync_trace!("context {id} joined");
                return Ok(Context {
                    table: self,
                    id,
                    _not_sync: PhantomData,
                });
            }
        }
        crate::sync_debug!("context table full ({MAX_CONTEXTS} slots)");
        Err(JoinError::TableFull)
    }

    /// Returns `true` if `id` still names the current occupant of its slot.
    pub fn is_live(&self, id: ContextId) -> bool {
        self.slots[id.slot()].state.load(Ordering::Acquire) == id.live_state()
    }

    /// Number of occupied slots.
    pub fn occupied(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.state.load(Ordering::Relaxed) & OCCUPIED != 0)
            .count()
    }

    /// Delivers one wake to `id`.
    ///
    /// The token is stored before the futex wake, so it is observed whether
    /// the target is already asleep or has not got there yet.
    pub(crate) fn unpark(&self, id: ContextId) -> Result<(), Undeliverable> {
        let slot = &self.slots[id.slot()];
        if slot.state.load(Ordering::Acquire) != id.live_state() {
            return Err(Undeliverable(id));
        }
        slot.wake.store(NOTIFIED, Ordering::Release);
        sys::wake(&slot.wake, 1);
        Ok(())
    }

    fn leave(&self, id: ContextId) {
        let next = id.generation().wrapping_add(1);
        self.slots[id.slot()]
            .state
            .store(u32::from(next) << 1, Ordering::Release);
        crate::sync_trace!("context {id} left");
    }
}

impl Default for ContextTable {
    fn default() -> Self {
        Self::new()
    }
}

/// A joined participant.
///
/// Every lock, wait, signal and queue operation takes the caller's
/// `Context`: it names the caller (for lock ownership and waiter queues) and
/// reaches the table that owns every wake word. A context may move to
/// another thread but may not be shared, since two callers parking on one
/// wake word would steal each other's wakes.
///
/// Dropping the context frees its slot.
pub struct Context<'a> {
    table: &'a ContextTable,
    id: ContextId,
    _not_sync: PhantomData<Cell<()>>,
}

impl<'a> Context<'a> {
    /// This context's handle.
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// The table this context belongs to.
    pub fn table(&self) -> &'a ContextTable {
        self.table
    }

    /// Leaves the table. Equivalent to dropping the context.
    pub fn leave(self) {
        drop(self);
    }

    fn wake_word(&self) -> &WaitWord {
        &self.table.slots[self.id.slot()].wake
    }

    /// Discards any stale token so the next [`park`](Self::park) only
    /// returns for a wake issued after this call.
    ///
    /// Must happen before the context's handle becomes visible to wakers.
    pub(crate) fn arm(&self) {
        self.wake_word().store(EMPTY, Ordering::Relaxed);
    }

    /// Blocks until a wake token is available, then consumes it.
    pub(crate) fn park(&self) {
        let word = self.wake_word();
        loop {
            if word.swap(EMPTY, Ordering::Acquire) == NOTIFIED {
                return;
            }
            sys::wait(word, EMPTY);
        }
    }
}

impl Drop for Context<'_> {
    fn drop(&mut self) {
        self.table.leave(self.id);
    }
}

impl fmt::Debug for Context<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context").field("id", &self.id).finish()
    }
}

#[cfg(all(test, not(loom), not(shuttle)))]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn join_assigns_distinct_slots() {
        let table = ContextTable::new();
        let a = table.join().unwrap();
        let b = table.join().unwrap();
        assert_ne!(a.id(), b.id());
        assert_eq!(table.occupied(), 2);
    }

    #[test]
    fn raw_round_trip_and_zero_rejected() {
        let table = ContextTable::new();
        let cx = table.join().unwrap();
        let raw = cx.id().into_raw();
        assert_ne!(raw, 0);
        assert_eq!(ContextId::from_raw(raw), Some(cx.id()));
        assert_eq!(ContextId::from_raw(0), None);
        assert_eq!(ContextId::from_raw(0x0000_FFFF), None);
    }

    #[test]
    fn leaving_bumps_generation() {
        let table = ContextTable::new();
        let first = table.join().unwrap();
        let old = first.id();
        first.leave();
        assert!(!table.is_live(old));

        let second = table.join().unwrap();
        assert_eq!(second.id().slot(), old.slot());
        assert_eq!(second.id().generation(), old.generation() + 1);
        assert!(table.is_live(second.id()));
    }

    #[test]
    fn stale_handle_is_undeliverable() {
        let table = ContextTable::new();
        let cx = table.join().unwrap();
        let id = cx.id();
        drop(cx);
        assert_eq!(table.unpark(id), Err(Undeliverable(id)));
    }

    #[test]
    fn table_full() {
        let table = ContextTable::new();
        let held: Vec<_> = (0..MAX_CONTEXTS).map(|_| table.join().unwrap()).collect();
        assert_eq!(table.join().unwrap_err(), JoinError::TableFull);
        drop(held);
        assert!(table.join().is_ok());
    }

    #[test]
    fn wake_before_park_is_not_lost() {
        let table = ContextTable::new();
        let cx = table.join().unwrap();
        cx.arm();
        table.unpark(cx.id()).unwrap();
        // Returns immediately: the token was stored before we got here.
        cx.park();
    }

    #[test]
    fn arm_discards_stale_token() {
        let table = ContextTable::new();
        let cx = table.join().unwrap();
        table.unpark(cx.id()).unwrap();
        cx.arm();
        assert_eq!(cx.wake_word().load(Ordering::Relaxed), EMPTY);
    }

    #[test]
    fn park_sleeps_until_unparked() {
        let table = ContextTable::new();
        let sleeper = table.join().unwrap();
        let id = sleeper.id();
        sleeper.arm();
        std::thread::scope(|s| {
            s.spawn(move || sleeper.park());
            std::thread::sleep(Duration::from_millis(20));
            table.unpark(id).unwrap();
        });
    }
}
