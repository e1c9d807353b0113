use std::sync::Arc;

use cartguard_db::store::RuleSetStore;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable: everything is behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Rule-set document storage (PostgreSQL or in-memory).
    pub store: Arc<dyn RuleSetStore>,
}
