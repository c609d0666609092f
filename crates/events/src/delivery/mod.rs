//! Hook delivery channels.

pub mod script;
pub mod webhook;
