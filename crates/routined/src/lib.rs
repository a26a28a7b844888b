//! Routine reminder daemon: fires scheduled routines on a small display,
//! waits for a button outcome and reports finished groups.

pub mod aggregator;
pub mod clock;
pub mod daemon_loop;
pub mod execution;
pub mod hardware;
pub mod ledger;
pub mod logging;
pub mod persistence;
pub mod timer_mode;
pub mod trigger;

#[cfg(test)]
pub(crate) mod testing;

pub use aggregator::*;
pub use clock::*;
pub use daemon_loop::*;
pub use execution::*;
pub use hardware::*;
pub use ledger::*;
pub use persistence::*;
pub use timer_mode::*;
pub use trigger::*;
