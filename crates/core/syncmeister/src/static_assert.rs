//! Compile-time assertions on the crate's sizing constants.

/// Asserts a condition at compile time.
///
/// ```ignore
/// static_assert!(MAX_WAITERS < MAX_CONTEXTS);
/// ```
#[macro_export]
macro_rules! static_assert {
    ($cond:expr $(,)?) => {
        const _: () = assert!($cond);
    };
    ($cond:expr, $msg:expr $(,)?) => {
        const _: () = assert!($cond, $msg);
    };
}
