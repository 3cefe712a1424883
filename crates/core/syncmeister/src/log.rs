//! Leveled logging hook.
//!
//! The library never writes anywhere by itself. A host registers a sink with
//! [`set_log_fn`] and the `sync_*!` macros forward to it; before that,
//! messages are discarded. The sink is a plain function pointer held in an
//! atomic, so it can be called from any context without taking a lock.

use core::fmt;
use core::sync::atomic::{AtomicPtr, Ordering};

/// Log severity, lower is more severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    /// Something failed; the caller will see an error.
    Error = 0,
    /// Unexpected condition the primitives recovered from.
    Warn = 1,
    /// High-level progress messages.
    Info = 2,
    /// Contention and back-off diagnostics.
    Debug = 3,
    /// Per-operation tracing.
    Trace = 4,
}

impl LogLevel {
    /// Returns the fixed-width name used as a line prefix.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Error => "ERROR",
            Self::Warn => "WARN ",
            Self::Info => "INFO ",
            Self::Debug => "DEBUG",
            Self::Trace => "TRACE",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name().trim_end())
    }
}

/// The signature of the registered log sink.
pub type LogFn = fn(LogLevel, fmt::Arguments<'_>);

fn null_log(_level: LogLevel, _args: fmt::Arguments<'_>) {}

static LOG_FN: AtomicPtr<()> = AtomicPtr::new(null_log as *mut ());

/// Registers the log sink.
///
/// May be called more than once; later calls replace the sink. The sink is
/// called from inside lock and wait paths, so it must not use any primitive
/// from this crate.
pub fn set_log_fn(f: LogFn) {
    LOG_FN.store(f as *mut (), Ordering::Release);
}

#[inline]
fn load_log_fn() -> LogFn {
    let ptr = LOG_FN.load(Ordering::Acquire);
    // SAFETY: Only `LogFn` pointers (or `null_log`) are ever stored in LOG_FN.
    unsafe { core::mem::transmute::<*mut (), LogFn>(ptr) }
}

/// Implementation detail for [`sync_log!`]. Not public API.
#[doc(hidden)]
pub fn _log(level: LogLevel, args: fmt::Arguments<'_>) {
    load_log_fn()(level, args);
}

/// Logs a message at the given level.
#[macro_export]
macro_rules! sync_log {
    ($level:expr, $($arg:tt)*) => {
        $crate::log::_log($level, format_args!($($arg)*))
    };
}

/// Logs an error-level message.
#[macro_export]
macro_rules! sync_error {
    ($($arg:tt)*) => { $crate::sync_log!($crate::log::LogLevel::Error, $($arg)*) };
}

/// Logs a warning-level message.
#[macro_export]
macro_rules! sync_warn {
    ($($arg:tt)*) => { $crate::sync_log!($crate::log::LogLevel::Warn, $($arg)*) };
}

/// Logs an info-level message.
#[macro_export]
macro_rules! sync_info {
    ($($arg:tt)*) => { $crate::sync_log!($crate::log::LogLevel::Info, $($arg)*) };
}

/// Logs a debug-level message.
#[macro_export]
macro_rules! sync_debug {
    ($($arg:tt)*) => { $crate::sync_log!($crate::log::LogLevel::Debug, $($arg)*) };
}

/// Logs a trace-level message.
#[macro_export]
macro_rules! sync_trace {
    ($($arg:tt)*) => { $crate::sync_log!($crate::log::LogLevel::Trace, $($arg)*) };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static CAPTURED: Mutex<Vec<(LogLevel, String)>> = Mutex::new(Vec::new());

    fn capture(level: LogLevel, args: fmt::Arguments<'_>) {
        CAPTURED.lock().unwrap().push((level, args.to_string()));
    }

    #[test]
    fn level_names_are_fixed_width() {
        for level in [
            LogLevel::Error,
            LogLevel::Warn,
            LogLevel::Info,
            LogLevel::Debug,
            LogLevel::Trace,
        ] {
            assert_eq!(level.name().len(), 5);
        }
        assert_eq!(LogLevel::Warn.to_string(), "WARN");
    }

    #[test]
    fn levels_order_by_severity() {
        assert!(LogLevel::Error < LogLevel::Warn);
        assert!(LogLevel::Debug < LogLevel::Trace);
    }

    #[test]
    fn registered_sink_receives_messages() {
        set_log_fn(capture);
        sync_info!("hello {}", 42);
        let captured = CAPTURED.lock().unwrap();
        assert!(
            captured
                .iter()
                .any(|(level, msg)| *level == LogLevel::Info && msg == "hello 42")
        );
    }
}
