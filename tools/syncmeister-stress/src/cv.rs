//! `cv`: children sleep on a condition variable until the parent signals.

use std::time::Duration;

use anyhow::{Context, Result, ensure};
use syncmeister::shm::{ProcessShared, SharedRegion};
use syncmeister::sync::{Condvar, MAX_WAITERS, SpinLock};
use syncmeister::{ContextTable, MAX_CONTEXTS, sync_info};

use crate::cli::CvArgs;
use crate::process;

struct Rendezvous {
    table: ContextTable,
    ready: SpinLock<bool>,
    cond: Condvar,
}

// SAFETY: A context table, a spin lock around a flag, and a condvar.
unsafe impl ProcessShared for Rendezvous {}

pub fn run(args: &CvArgs) -> Result<()> {
    ensure!(
        args.waiters < MAX_CONTEXTS,
        "at most {} children fit in the context table",
        MAX_CONTEXTS - 1
    );
    ensure!(
        args.waiters <= MAX_WAITERS,
        "at most {MAX_WAITERS} waiters fit on one condition variable"
    );

    let region = SharedRegion::new(Rendezvous {
        table: ContextTable::new(),
        ready: SpinLock::new(false),
        cond: Condvar::new(),
    })
    .context("failed to map shared condition variable")?;

    let children = process::spawn(args.waiters, |index| {
        let Ok(cx) = region.table.join() else {
            eprintln!("child {index}: context table full");
            return 1;
        };
        let mut ready = region.ready.lock(&cx);
        while !*ready {
            if let Err(err) = region.cond.wait(&cx, &mut ready) {
                eprintln!("child {index}: {err}");
                return 1;
            }
        }
        drop(ready);
        println!("received cv signal");
        0
    })?;

    println!("sleeping for {}ms", args.delay_ms);
    std::thread::sleep(Duration::from_millis(args.delay_ms));

    let cx = region.table.join().context("parent could not join context table")?;
    println!("sending cv signal");
    *region.ready.lock(&cx) = true;
    let woken = region.cond.broadcast(&cx);
    sync_info!("broadcast woke {woken} of {} waiter(s)", args.waiters);
    ensure!(
        woken <= args.waiters,
        "broadcast reported {woken} wakes for {} waiters",
        args.waiters
    );

    process::wait_all(&children)
}
