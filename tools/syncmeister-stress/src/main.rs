//! Multi-process stress drivers for syncmeister.
//!
//! Each subcommand maps its shared state with `SharedRegion`, forks worker
//! processes that join the region's context table, and checks the outcome
//! in the parent. A failed check exits non-zero.

mod cli;
mod cv;
mod fifo;
mod logger;
mod process;
mod spinlock;

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    logger::init(cli.verbose);

    match cli.command {
        cli::Command::Spinlock(ref args) => spinlock::run(args),
        cli::Command::Cv(ref args) => cv::run(args),
        cli::Command::Fifo(ref args) => fifo::run(args),
    }
}
