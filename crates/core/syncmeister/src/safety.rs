//! Checks for the usage contracts the primitives cannot enforce in types.
//!
//! Releasing a lock the caller does not hold, or waiting without holding the
//! paired lock, is undefined behavior by contract. [`assert_contract!`]
//! catches the detectable cases.
//!
//! | Build configuration | Result |
//! |---------------------|--------|
//! | Debug (`debug_assertions`) | Panics on failure |
//! | Release + `syncmeister_hardened` cfg | Panics on failure |
//! | Release (default) | Compiled away (condition still type-checked) |

/// Checks a usage contract whose violation would corrupt shared state.
///
/// Compiles away in plain release builds, but the condition is still
/// type-checked so it cannot rot.
///
/// ```ignore
/// assert_contract!(self.is_locked(), "release of an unheld SpinLock");
/// ```
#[macro_export]
macro_rules! assert_contract {
    ($cond:expr $(,)?) => {
        #[cfg(any(debug_assertions, syncmeister_hardened))]
        {
            if !$cond {
                panic!("usage contract violated: {}", stringify!($cond));
            }
        }
        #[cfg(not(any(debug_assertions, syncmeister_hardened)))]
        {
            if false {
                let _ = $cond;
            }
        }
    };
    ($cond:expr, $($arg:tt)+) => {
        #[cfg(any(debug_assertions, syncmeister_hardened))]
        {
            if !$cond {
                panic!($($arg)+);
            }
        }
        #[cfg(not(any(debug_assertions, syncmeister_hardened)))]
        {
            if false {
                let _ = $cond;
            }
        }
    };
}
