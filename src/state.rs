//! Shared application state for all routes.

use crate::registry::Registry;
use crate::store::RecordStore;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
    pub store: Arc<dyn RecordStore>,
}

impl AppState {
    pub fn new(registry: Registry, store: impl RecordStore + 'static) -> Self {
        AppState {
            registry: Arc::new(registry),
            store: Arc::new(store),
        }
    }
}
