pub mod arguments;
pub mod error;
pub mod execution;
pub mod history;
pub mod hooks;
pub mod hosts;
pub mod inventory;
pub mod paths;
pub mod project;
pub mod schedule;
pub mod scripting;
pub mod template;
pub mod types;
pub mod variables;
