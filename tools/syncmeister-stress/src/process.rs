//! Forking worker processes.
//!
//! Children run a closure and leave with `_exit`, so no destructor or
//! atexit handler of the parent runs twice. Everything they share with the
//! parent must already live in a `SharedRegion` when [`spawn`] is called.

use std::io::Write;

use anyhow::{Context, Result, bail};

/// A forked child.
pub struct Child {
    /// Position among the children spawned together.
    pub index: usize,
    /// The child's process id.
    pub pid: libc::pid_t,
}

/// Forks `count` children, each running `body(index)` and exiting with its
/// return value.
///
/// If a fork fails, the children already started are waited for before the
/// error is returned.
pub fn spawn<F>(count: usize, body: F) -> Result<Vec<Child>>
where
    F: Fn(usize) -> i32,
{
    // Anything buffered now would be flushed once per child.
    std::io::stdout().flush().context("failed to flush stdout before fork")?;

    let mut children = Vec::with_capacity(count);
    for index in 0..count {
        // SAFETY: The parent is single-threaded here, so the child gets a
        // consistent copy of every lock it may touch.
        let pid = unsafe { libc::fork() };
        if pid < 0 {
            let err = std::io::Error::last_os_error();
            reap(&children);
            return Err(err).context(format!("failed to fork child {index}"));
        }
        if pid == 0 {
            let code = body(index);
            let _ = std::io::stdout().flush();
            // SAFETY: Terminates the child without unwinding into the
            // parent's stack frames.
            unsafe { libc::_exit(code) };
        }
        children.push(Child { index, pid });
    }
    Ok(children)
}

/// Waits for every child and fails if any exited abnormally.
pub fn wait_all(children: &[Child]) -> Result<()> {
    let mut failures = Vec::new();
    for child in children {
        let status = wait_one(child.pid)
            .with_context(|| format!("waitpid on child {} (pid {})", child.index, child.pid))?;
        if !(libc::WIFEXITED(status) && libc::WEXITSTATUS(status) == 0) {
            failures.push(format!("child {} (pid {}): {}", child.index, child.pid, describe(status)));
        }
    }
    if !failures.is_empty() {
        bail!("{} child process(es) failed:\n  {}", failures.len(), failures.join("\n  "));
    }
    Ok(())
}

fn wait_one(pid: libc::pid_t) -> std::io::Result<i32> {
    let mut status = 0;
    loop {
        // SAFETY: `status` is a valid out-pointer for the call.
        let ret = unsafe { libc::waitpid(pid, &raw mut status, 0) };
        if ret == pid {
            return Ok(status);
        }
        let err = std::io::Error::last_os_error();
        if err.kind() != std::io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

fn reap(children: &[Child]) {
    for child in children {
        let _ = wait_one(child.pid);
    }
}

fn describe(status: i32) -> String {
    if libc::WIFEXITED(status) {
        format!("exit status {}", libc::WEXITSTATUS(status))
    } else if libc::WIFSIGNALED(status) {
        format!("killed by signal {}", libc::WTERMSIG(status))
    } else {
        format!("wait status {status:#x}")
    }
}
