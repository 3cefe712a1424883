//! Command-line interface definitions for syncmeister-stress.

use clap::{ArgAction, Parser, Subcommand};

/// Fork worker processes over shared memory and hammer one primitive.
#[derive(Parser)]
#[command(name = "syncmeister-stress", version, about)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Raise log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(long, short = 'v', global = true, action = ArgAction::Count)]
    pub verbose: u8,
}

/// Available subcommands.
#[derive(Subcommand)]
pub enum Command {
    /// Children increment a shared counter under the spin lock.
    Spinlock(SpinlockArgs),
    /// Children wait on a condition variable until the parent signals.
    Cv(CvArgs),
    /// Children enqueue tagged values; the parent checks per-child order.
    Fifo(FifoArgs),
}

/// Arguments for the `spinlock` subcommand.
#[derive(Parser)]
pub struct SpinlockArgs {
    /// Number of child processes.
    #[arg(long, short = 'c', default_value_t = 4)]
    pub children: usize,

    /// Increments per child.
    #[arg(long, short = 'i', default_value_t = 100_000)]
    pub increments: u64,
}

/// Arguments for the `cv` subcommand.
#[derive(Parser)]
pub struct CvArgs {
    /// Number of waiting child processes.
    #[arg(long, short = 'w', default_value_t = 1)]
    pub waiters: usize,

    /// How long the parent sleeps before signalling, in milliseconds.
    #[arg(long, default_value_t = 1000)]
    pub delay_ms: u64,
}

/// Arguments for the `fifo` subcommand.
#[derive(Parser)]
pub struct FifoArgs {
    /// Number of producer processes.
    #[arg(long, short = 'c', default_value_t = 4)]
    pub children: usize,

    /// Values written by each producer.
    #[arg(long, short = 'w', default_value_t = 10_000)]
    pub writes: u32,

    /// Print every value as it is read.
    #[arg(long)]
    pub print: bool,
}
