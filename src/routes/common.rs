//! Service routes mounted beside the resources: liveness, readiness of the record store, and the
//! package version.

use crate::state::AppState;
use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;

#[derive(Serialize)]
struct Liveness {
    status: &'static str,
}

/// `/ready` answers 503 with `degraded` while the record store cannot be reached.
#[derive(Serialize)]
struct Readiness {
    status: &'static str,
    store: &'static str,
    resources: usize,
}

async fn health() -> Json<Liveness> {
    Json(Liveness { status: "ok" })
}

async fn ready(State(state): State<AppState>) -> (StatusCode, Json<Readiness>) {
    let resources = state.registry.resources().count();
    match state.store.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(Readiness {
                status: "ok",
                store: "ok",
                resources,
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "record store unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(Readiness {
                    status: "degraded",
                    store: "unavailable",
                    resources,
                }),
            )
        }
    }
}

async fn version() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// `/health` and `/version`, for hosts that mount resources without a store check.
pub fn common_routes() -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/version", get(version))
}

/// [`common_routes`] plus `/ready`, which pings the state's record store.
pub fn common_routes_with_ready(state: AppState) -> Router {
    common_routes().merge(Router::new().route("/ready", get(ready)).with_state(state))
}
