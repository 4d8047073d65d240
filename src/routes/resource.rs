//! Resource routes. Every method is routed to the handlers; the dispatcher decides which ones a
//! resource answers.

use crate::handlers::resource::{collection, detail};
use crate::routes::common::common_routes_with_ready;
use crate::state::AppState;
use axum::{routing::any, Router};
use tower_http::limit::RequestBodyLimitLayer;

pub fn resource_routes(state: AppState) -> Router {
    Router::new()
        .route("/:app/:slug", any(collection))
        .route("/:app/:slug/:id", any(detail))
        .with_state(state)
}

/// Common routes at the root, resources under the registry's mount path, request bodies capped
/// at `max_body_bytes`.
pub fn app_router(state: AppState, max_body_bytes: usize) -> Router {
    let mount = state.registry.mount_path().to_string();
    let resources = resource_routes(state.clone());
    let common = common_routes_with_ready(state);
    let router = if mount.is_empty() {
        common.merge(resources)
    } else {
        common.nest(&mount, resources)
    };
    router.layer(RequestBodyLimitLayer::new(max_body_bytes))
}
