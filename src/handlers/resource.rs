//! Resource handlers: resolve `{app}/{slug}` against the registry and hand the request to the
//! dispatcher.

use crate::dispatcher::{ApiRequest, Dispatcher};
use crate::error::{ApiError, DispatchError};
use crate::extractors::CurrentRequestor;
use crate::resource::RequestContext;
use crate::state::AppState;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::Method,
    response::{IntoResponse, Response},
};
use std::collections::BTreeMap;

/// Record ids in URLs are plain decimal digits.
fn parse_id(raw: &str) -> Option<i64> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse().ok()
}

#[allow(clippy::too_many_arguments)]
async fn handle(
    state: &AppState,
    app: &str,
    slug: &str,
    id: Option<i64>,
    method: Method,
    query: BTreeMap<String, String>,
    requestor: CurrentRequestor,
    body: Bytes,
) -> Response {
    let Some(resource) = state.registry.resource(app, slug) else {
        return ApiError::NotFound.into_response();
    };
    let context = RequestContext::new(requestor.0).with_query(query);
    let request = ApiRequest::new(method, id, context).with_body(body);
    let dispatcher = Dispatcher::new(&state.registry, resource, state.store.as_ref());
    match dispatcher.dispatch(&request).await {
        Ok(response) => response.into_response(),
        Err(DispatchError::Store(e)) => {
            tracing::error!(resource = %resource.name(), error = %e, "store failure");
            e.into_response()
        }
        Err(DispatchError::Configuration(fault)) => {
            tracing::error!(resource = %resource.name(), error = %fault, "configuration fault");
            panic!("{}", fault)
        }
    }
}

/// `GET|POST /{app}/{slug}`
pub async fn collection(
    State(state): State<AppState>,
    method: Method,
    Path((app, slug)): Path<(String, String)>,
    Query(query): Query<BTreeMap<String, String>>,
    requestor: CurrentRequestor,
    body: Bytes,
) -> Response {
    handle(&state, &app, &slug, None, method, query, requestor, body).await
}

/// `GET|PUT|DELETE /{app}/{slug}/{id}`
pub async fn detail(
    State(state): State<AppState>,
    method: Method,
    Path((app, slug, id)): Path<(String, String, String)>,
    Query(query): Query<BTreeMap<String, String>>,
    requestor: CurrentRequestor,
    body: Bytes,
) -> Response {
    let Some(id) = parse_id(&id) else {
        return ApiError::NotFound.into_response();
    };
    handle(&state, &app, &slug, Some(id), method, query, requestor, body).await
}
