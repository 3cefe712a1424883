//! Wait/wake on a 32-bit word.
//!
//! On Linux this is the futex syscall. The private flag is deliberately not
//! set: the kernel then keys waiters by physical page, so a word inside a
//! `MAP_SHARED` region is the same futex in every process that maps it.
//!
//! Under the model checkers the word carries a mutex and condition variable
//! from the checker, so a sleeping context is a blocked thread the checker
//! can reason about. On other targets `wait` degrades to a single spin hint.
//! Callers always re-check the word in a loop, so an early return is
//! indistinguishable from a spurious wakeup.

use core::ops::Deref;

use crate::sync::loom_compat::AtomicU32;
#[cfg(any(loom, shuttle))]
use crate::sync::loom_compat::{Condvar, Mutex, Ordering};

/// A 32-bit word contexts can sleep on.
///
/// Derefs to the atomic itself; `wait` and `wake` are the only ways to
/// block on it.
pub(crate) struct WaitWord {
    word: AtomicU32,
    #[cfg(any(loom, shuttle))]
    sleepers: Mutex<()>,
    #[cfg(any(loom, shuttle))]
    changed: Condvar,
}

impl WaitWord {
    pub(crate) fn new(value: u32) -> Self {
        Self {
            word: AtomicU32::new(value),
            #[cfg(any(loom, shuttle))]
            sleepers: Mutex::new(()),
            #[cfg(any(loom, shuttle))]
            changed: Condvar::new(),
        }
    }
}

impl Deref for WaitWord {
    type Target = AtomicU32;

    fn deref(&self) -> &AtomicU32 {
        &self.word
    }
}

/// Sleeps while `*word == expected`.
///
/// The comparison and the sleep are one atomic step in the kernel: if
/// another context changes the word and calls [`wake`] at any point after
/// the caller last looked at it, this returns instead of sleeping.
#[cfg(all(target_os = "linux", not(loom), not(shuttle)))]
pub(crate) fn wait(word: &WaitWord, expected: u32) {
    // SAFETY: `word` is a live, aligned u32 for the duration of the call and
    // a null timeout means "no timeout".
    let ret = unsafe {
        libc::syscall(
            libc::SYS_futex,
            word.as_ptr(),
            libc::FUTEX_WAIT,
            expected,
            core::ptr::null::<libc::timespec>(),
        )
    };
    // EAGAIN (value changed) and EINTR are both ordinary; the caller re-checks.
    let _ = ret;
}

/// Wakes at most `count` contexts sleeping on `word`. Returns how many woke.
#[cfg(all(target_os = "linux", not(loom), not(shuttle)))]
pub(crate) fn wake(word: &WaitWord, count: u32) -> usize {
    let count = i32::try_from(count).unwrap_or(i32::MAX);
    // SAFETY: `word` is a live, aligned u32; FUTEX_WAKE does not dereference
    // beyond it.
    let ret = unsafe { libc::syscall(libc::SYS_futex, word.as_ptr(), libc::FUTEX_WAKE, count) };
    usize::try_from(ret).unwrap_or(0)
}

/// Model-checker `wait`: the word is re-read under `sleepers`, which every
/// `wake` takes after the store, so the check-then-sleep cannot miss it.
#[cfg(any(loom, shuttle))]
pub(crate) fn wait(word: &WaitWord, expected: u32) {
    use std::sync::PoisonError;

    let mut guard = word.sleepers.lock().unwrap_or_else(PoisonError::into_inner);
    while word.load(Ordering::Acquire) == expected {
        guard = word.changed.wait(guard).unwrap_or_else(PoisonError::into_inner);
    }
}

/// Model-checker `wake`. The checker does not report how many threads a
/// notify released, so this returns 0.
#[cfg(any(loom, shuttle))]
pub(crate) fn wake(word: &WaitWord, count: u32) -> usize {
    use std::sync::PoisonError;

    let _guard = word.sleepers.lock().unwrap_or_else(PoisonError::into_inner);
    if count == 1 {
        word.changed.notify_one();
    } else {
        word.changed.notify_all();
    }
    0
}

#[cfg(not(any(target_os = "linux", loom, shuttle)))]
pub(crate) fn wait(word: &WaitWord, expected: u32) {
    use crate::sync::loom_compat::Ordering;

    if word.load(Ordering::Acquire) == expected {
        crate::sync::loom_compat::spin_loop();
    }
}

#[cfg(not(any(target_os = "linux", loom, shuttle)))]
pub(crate) fn wake(_word: &WaitWord, _count: u32) -> usize {
    0
}

#[cfg(all(test, target_os = "linux", not(loom), not(shuttle)))]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    #[test]
    fn wait_returns_immediately_on_mismatch() {
        let word = WaitWord::new(1);
        wait(&word, 0);
    }

    #[test]
    fn wake_without_sleepers_wakes_nobody() {
        let word = WaitWord::new(0);
        assert_eq!(wake(&word, 1), 0);
    }

    #[test]
    fn wake_releases_a_sleeper() {
        let word = WaitWord::new(0);
        std::thread::scope(|s| {
            s.spawn(|| {
                while word.load(Ordering::Acquire) == 0 {
                    wait(&word, 0);
                }
            });
            std::thread::sleep(Duration::from_millis(20));
            word.store(1, Ordering::Release);
            wake(&word, 1);
        });
    }
}

#[cfg(all(test, loom))]
mod loom_tests {
    use super::*;
    use loom::sync::Arc;

    #[test]
    fn store_then_wake_releases_sleeper() {
        loom::model(|| {
            let word = Arc::new(WaitWord::new(0));
            let sleeper = {
                let word = Arc::clone(&word);
                loom::thread::spawn(move || {
                    while word.load(Ordering::Acquire) == 0 {
                        wait(&word, 0);
                    }
                })
            };
            word.store(1, Ordering::Release);
            wake(&word, 1);
            sleeper.join().unwrap();
        });
    }
}
