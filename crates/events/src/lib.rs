//! Lifecycle events and hook notification.
//!
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`LifecycleEvent`]: the event envelope (execution start/finish,
//!   object add/update/delete).
//! - [`HookNotifier`]: background service that fans every event out to the
//!   enabled hooks subscribed to it.
//! - [`delivery`]: HTTP and script delivery channels.

pub mod bus;
pub mod delivery;
pub mod notifier;

pub use bus::{EventBus, LifecycleEvent};
pub use delivery::script::ScriptDelivery;
pub use delivery::webhook::WebhookDelivery;
pub use notifier::HookNotifier;
