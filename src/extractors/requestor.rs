//! Who issued the request. Authentication is the host's job: middleware inserts either an
//! `Arc<dyn Capabilities>` or a plain [`Requestor`] into the request extensions.

use crate::resource::{Capabilities, Requestor};
use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};
use std::sync::Arc;

/// Requestor from request extensions; anonymous when none was inserted.
#[derive(Clone)]
pub struct CurrentRequestor(pub Arc<dyn Capabilities>);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentRequestor
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(caps) = parts.extensions.get::<Arc<dyn Capabilities>>() {
            return Ok(CurrentRequestor(caps.clone()));
        }
        let requestor = parts
            .extensions
            .get::<Requestor>()
            .cloned()
            .unwrap_or_else(Requestor::anonymous);
        Ok(CurrentRequestor(Arc::new(requestor)))
    }
}
