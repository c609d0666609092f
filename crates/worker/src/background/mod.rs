//! Long-running loops spawned by the daemon.

pub mod history_reaper;
pub mod scheduler;
