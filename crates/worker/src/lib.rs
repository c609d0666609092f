//! helmsman daemon: wires the execution pipeline, hook notifier, periodic
//! scheduler and history reaper together.

pub mod background;
pub mod config;
pub mod seed;
