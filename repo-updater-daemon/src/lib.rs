//! Daemon runtime: periodic reconciliation + diff subscriber + signal handling.

mod error;
mod runtime;
pub mod scheduler;

pub use error::DaemonError;
pub use runtime::{build_reconciler, init_tracing, run, start_blocking};
pub use scheduler::{Scheduler, SchedulerState};
