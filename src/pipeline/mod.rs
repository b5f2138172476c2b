//! Change detection and the watch pipeline.
//!
//! - `compare`: diff two snapshots of a site
//! - `initial_pass`: search, load, report and persist at start-up
//! - `Watcher`: refresh, diff, notify and persist on a fixed period

pub mod diff;
pub mod status;
#[cfg(test)]
pub(crate) mod testing;
pub mod watch;

pub use diff::compare;
pub use status::{StatusReporter, initial_pass};
pub use watch::{Tick, TickReport, WatchSummary, Watcher};
