//! Subprocess execution.
//!
//! Pure process management with no storage access: hook scripts run through
//! [`binary::BinaryExecutor`], ansible runs through
//! [`subprocess::run_supervised`].

pub mod binary;
pub mod executor;
pub mod subprocess;
