//! `fifo`: many producers, one consumer, per-producer ordering check.
//!
//! Each value is `(pid << 32) | seq`. Producers interleave arbitrarily, but
//! the values of any one producer must come out in `seq` order.

use std::collections::HashMap;

use anyhow::{Context, Result, bail, ensure};
use syncmeister::shm::{ProcessShared, SharedRegion};
use syncmeister::sync::BoundedQueue;
use syncmeister::{ContextTable, MAX_CONTEXTS, QueueFull, sync_debug};

use crate::cli::FifoArgs;
use crate::process;

struct Pipe {
    table: ContextTable,
    queue: BoundedQueue<u64>,
}

// SAFETY: A context table and a queue of plain integers.
unsafe impl ProcessShared for Pipe {}

pub fn run(args: &FifoArgs) -> Result<()> {
    ensure!(
        args.children < MAX_CONTEXTS,
        "at most {} children fit in the context table",
        MAX_CONTEXTS - 1
    );

    let region = SharedRegion::new(Pipe {
        table: ContextTable::new(),
        queue: BoundedQueue::new(),
    })
    .context("failed to map shared queue")?;

    let children = process::spawn(args.children, |index| {
        let Ok(cx) = region.table.join() else {
            eprintln!("child {index}: context table full");
            return 1;
        };
        // SAFETY: getpid has no preconditions.
        let pid = u64::from(unsafe { libc::getpid() }.unsigned_abs());
        for seq in 0..args.writes {
            let value = (pid << 32) | u64::from(seq);
            while let Err(QueueFull) = region.queue.enqueue(&cx, value) {
                sync_debug!("child {index}: producers saturated, retrying");
                std::thread::yield_now();
            }
        }
        0
    })?;

    let mut expected: HashMap<u32, u32> = children
        .iter()
        .map(|child| (child.pid.unsigned_abs(), 0))
        .collect();

    let cx = region.table.join().context("parent could not join context table")?;
    let total = args.children as u64 * u64::from(args.writes);
    for _ in 0..total {
        let raw = region.queue.dequeue(&cx);
        let (pid, seq) = split(raw);
        if args.print {
            println!("pid: {pid}, val: {seq}");
        }
        let Some(next) = expected.get_mut(&pid) else {
            bail!("value {raw:#x} from unknown pid {pid}");
        };
        if seq != *next {
            bail!("pid {pid}: expected seq {next}, got {seq}");
        }
        *next += 1;
    }
    drop(cx);

    process::wait_all(&children)?;
    println!("TEST PASSED");
    Ok(())
}

#[allow(clippy::cast_possible_truncation)]
fn split(raw: u64) -> (u32, u32) {
    ((raw >> 32) as u32, raw as u32)
}
