//! Cancellation tokens of running executions, keyed by history id.

use std::collections::HashMap;
use std::sync::Mutex;

use helmsman_core::types::DbId;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
pub struct CancellationRegistry {
    tokens: Mutex<HashMap<DbId, CancellationToken>>,
}

impl CancellationRegistry {
    pub fn register(&self, history_id: DbId) -> CancellationToken {
        let token = CancellationToken::new();
        self.lock().insert(history_id, token.clone());
        token
    }

    /// Signal the execution of `history_id`. Returns `false` when nothing is
    /// registered under that id.
    pub fn cancel(&self, history_id: DbId) -> bool {
        match self.lock().get(&history_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, history_id: DbId) {
        self.lock().remove(&history_id);
    }

    /// Signal every registered execution.
    pub fn cancel_all(&self) -> usize {
        let tokens = self.lock();
        for token in tokens.values() {
            token.cancel();
        }
        tokens.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<DbId, CancellationToken>> {
        self.tokens.lock().unwrap_or_else(|p| p.into_inner())
    }
}
