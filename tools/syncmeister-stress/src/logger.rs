//! Stderr sink for the library's log hook.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use syncmeister::log::{self, LogLevel};

static MAX_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Warn as u8);

fn stderr_log(level: LogLevel, args: fmt::Arguments<'_>) {
    if level as u8 <= MAX_LEVEL.load(Ordering::Relaxed) {
        // SAFETY: getpid has no preconditions.
        let pid = unsafe { libc::getpid() };
        eprintln!("[{pid:>7}] {} {args}", level.name());
    }
}

/// Maps `-v` occurrences to a level and registers the sink.
pub fn init(verbosity: u8) {
    let level = match verbosity {
        0 => LogLevel::Warn,
        1 => LogLevel::Info,
        2 => LogLevel::Debug,
        _ => LogLevel::Trace,
    };
    MAX_LEVEL.store(level as u8, Ordering::Relaxed);
    log::set_log_fn(stderr_log);
}
