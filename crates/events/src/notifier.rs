//! Event-to-hook routing.
//!
//! [`HookNotifier`] consumes the event bus and, for each event, delivers it
//! to every recipient of every enabled hook subscribed to the event. Each
//! recipient is attempted independently and the outcome is recorded as a
//! [`HookDelivery`](helmsman_db::models::hook::HookDelivery) row. Delivery
//! failures are logged and recorded, never propagated to the publisher.

use std::sync::Arc;

use futures::future::join_all;
use helmsman_core::hooks::HookType;
use helmsman_db::models::hook::{CreateHookDelivery, Hook};
use helmsman_db::repositories::{HookDeliveryRepo, HookRepo};
use helmsman_db::DbPool;
use tokio::sync::broadcast;

use crate::bus::LifecycleEvent;
use crate::delivery::script::ScriptDelivery;
use crate::delivery::webhook::WebhookDelivery;

pub struct HookNotifier {
    pool: DbPool,
    webhook: WebhookDelivery,
    script: ScriptDelivery,
}

impl HookNotifier {
    pub fn new(pool: DbPool, webhook: WebhookDelivery, script: ScriptDelivery) -> Self {
        Self {
            pool,
            webhook,
            script,
        }
    }

    /// Run the notification loop until the bus is dropped.
    ///
    /// Every event is handled on its own task so a slow recipient does not
    /// hold back later events.
    pub async fn run(self, mut receiver: broadcast::Receiver<LifecycleEvent>) {
        let notifier = Arc::new(self);
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    let notifier = Arc::clone(&notifier);
                    tokio::spawn(async move {
                        notifier.notify(&event).await;
                    });
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Hook notifier lagged, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Event bus closed, hook notifier shutting down");
                    break;
                }
            }
        }
    }

    /// Deliver one event to all subscribed recipients and wait for every
    /// attempt to finish. Returns the number of successful deliveries.
    pub async fn notify(&self, event: &LifecycleEvent) -> usize {
        let hooks = match HookRepo::list_enabled_for(&self.pool, event.when).await {
            Ok(hooks) => hooks,
            Err(e) => {
                tracing::error!(error = %e, event = %event.when, "Failed to load hooks");
                return 0;
            }
        };

        let attempts = hooks.iter().flat_map(move |hook| {
            hook.recipients
                .iter()
                .map(move |recipient| self.deliver_one(hook, recipient, event))
        });
        join_all(attempts)
            .await
            .into_iter()
            .filter(|delivered| *delivered)
            .count()
    }

    async fn deliver_one(&self, hook: &Hook, recipient: &str, event: &LifecycleEvent) -> bool {
        let result = match hook.hook_type {
            HookType::Http => self
                .webhook
                .deliver(recipient, event)
                .await
                .map_err(|e| e.to_string()),
            HookType::Script => self
                .script
                .deliver(recipient, event)
                .await
                .map_err(|e| e.to_string()),
        };

        let success = result.is_ok();
        let error = result.err();
        if let Some(err) = &error {
            tracing::warn!(
                hook_id = hook.id,
                recipient,
                event = %event.when,
                error = %err,
                "Hook delivery failed"
            );
        }

        let record = CreateHookDelivery {
            hook_id: hook.id,
            event: event.when,
            recipient: recipient.to_string(),
            success,
            error,
        };
        if let Err(e) = HookDeliveryRepo::record(&self.pool, &record).await {
            tracing::error!(hook_id = hook.id, error = %e, "Failed to record hook delivery");
        }
        success
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
