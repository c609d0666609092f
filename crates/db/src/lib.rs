//! Entity storage for helmsman.
//!
//! Durable persistence lives outside this workspace; this crate keeps every
//! entity in a process-local [`Store`] behind the same repository API the
//! services are written against. Each repository is a zero-sized struct
//! whose async methods take `&DbPool` as the first argument.

use std::sync::Arc;

pub mod error;
pub mod models;
pub mod repositories;
mod store;

pub use error::DbError;
pub use store::Store;

pub type DbPool = Arc<Store>;

/// Create an empty store.
pub fn create_pool() -> DbPool {
    Arc::new(Store::default())
}
