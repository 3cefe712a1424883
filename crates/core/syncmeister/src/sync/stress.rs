//! Contention stress delays.
//!
//! Injects random spin delays at the points where a race would hurt: right
//! after a lock is taken, right before it is released, and in the gap
//! between a waiter releasing its lock and parking. Widening those windows
//! makes lost-wakeup and mutual-exclusion bugs show up in ordinary test
//! runs. Compiled into tests and into builds with
//! `cfg(syncmeister_lock_stress)`; a no-op until [`init`] sets a non-zero
//! bound.
//!
//! The PRNG is a single shared xorshift64 word. Contexts racing on it only
//! perturb the sequence, which is fine for jitter.

use core::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Maximum delay in spin iterations. Zero disables delays.
static MAX_SPINS: AtomicU32 = AtomicU32::new(0);

static PRNG_STATE: AtomicU64 = AtomicU64::new(0xDEAD_BEEF_CAFE_BABE);

/// Enables stress delays of up to `max_spins` iterations.
///
/// A zero `seed` is replaced by a fixed constant, since zero is the
/// xorshift fixed point.
pub fn init(max_spins: u32, seed: u64) {
    let seed = if seed == 0 { 0xDEAD_BEEF_CAFE_BABE } else { seed };
    PRNG_STATE.store(seed, Ordering::Relaxed);
    MAX_SPINS.store(max_spins, Ordering::Relaxed);
}

/// Disables stress delays.
pub fn disable() {
    MAX_SPINS.store(0, Ordering::Relaxed);
}

#[inline]
fn next_random() -> u64 {
    let mut x = PRNG_STATE.load(Ordering::Relaxed);
    if x == 0 {
        x = 0xDEAD_BEEF_CAFE_BABE;
    }
    x ^= x << 13;
    x ^= x >> 7;
    x ^= x << 17;
    PRNG_STATE.store(x, Ordering::Relaxed);
    x
}

/// Spins for a random number of iterations in `[0, max_spins)`.
///
/// Must not take any lock: it runs inside the lock paths themselves.
#[inline]
pub fn stress_delay() {
    let max = MAX_SPINS.load(Ordering::Relaxed);
    if max == 0 {
        return;
    }
    let spins = next_random() % u64::from(max);
    for _ in 0..spins {
        core::hint::spin_loop();
    }
}
