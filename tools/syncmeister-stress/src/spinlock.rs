//! `spinlock`: shared counter under contention.

use anyhow::{Context, Result, ensure};
use syncmeister::shm::{ProcessShared, SharedRegion};
use syncmeister::sync::SpinLock;
use syncmeister::{ContextTable, MAX_CONTEXTS, sync_info};

use crate::cli::SpinlockArgs;
use crate::process;

struct Counter {
    table: ContextTable,
    value: SpinLock<u64>,
}

// SAFETY: A context table and a spin lock around a plain integer.
unsafe impl ProcessShared for Counter {}

pub fn run(args: &SpinlockArgs) -> Result<()> {
    ensure!(
        args.children < MAX_CONTEXTS,
        "at most {} children fit in the context table",
        MAX_CONTEXTS - 1
    );

    let region = SharedRegion::new(Counter {
        table: ContextTable::new(),
        value: SpinLock::new(0),
    })
    .context("failed to map shared counter")?;

    let children = process::spawn(args.children, |index| {
        let Ok(cx) = region.table.join() else {
            eprintln!("child {index}: context table full");
            return 1;
        };
        for _ in 0..args.increments {
            *region.value.lock(&cx) += 1;
        }
        sync_info!("child {index} done");
        0
    })?;
    process::wait_all(&children)?;

    let expected = args.children as u64 * args.increments;
    let cx = region.table.join().context("parent could not join context table")?;
    let got = *region.value.lock(&cx);

    println!("expected: {expected}");
    println!("got:      {got}");
    ensure!(got == expected, "lost {} increment(s)", expected.abs_diff(got));
    Ok(())
}
