//! HTTP-shaped responses and their canonical rendering.

use axum::{
    body::Body,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde_json::Value;

pub const JSON_CONTENT_TYPE: &str = "application/json";
pub const TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

#[derive(Clone, Debug, PartialEq)]
pub enum ResponseBody {
    Empty,
    Text(String),
    Json(Value),
}

/// Status, optional `Location`, and body. What the dispatcher returns and the router sends.
#[derive(Clone, Debug, PartialEq)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub location: Option<String>,
    pub body: ResponseBody,
}

impl ApiResponse {
    pub fn json(status: StatusCode, body: Value) -> Self {
        ApiResponse {
            status,
            location: None,
            body: ResponseBody::Json(body),
        }
    }

    pub fn text(status: StatusCode, body: impl Into<String>) -> Self {
        ApiResponse {
            status,
            location: None,
            body: ResponseBody::Text(body.into()),
        }
    }

    pub fn empty(status: StatusCode) -> Self {
        ApiResponse {
            status,
            location: None,
            body: ResponseBody::Empty,
        }
    }

    pub fn with_location(mut self, url: impl Into<String>) -> Self {
        self.location = Some(url.into());
        self
    }

    pub fn content_type(&self) -> Option<&'static str> {
        match self.body {
            ResponseBody::Empty => None,
            ResponseBody::Text(_) => Some(TEXT_CONTENT_TYPE),
            ResponseBody::Json(_) => Some(JSON_CONTENT_TYPE),
        }
    }

    /// Body bytes. JSON is 2-space indented with object keys in sorted order, so equal values
    /// always render to identical bytes.
    pub fn render(&self) -> Vec<u8> {
        match &self.body {
            ResponseBody::Empty => Vec::new(),
            ResponseBody::Text(s) => s.clone().into_bytes(),
            ResponseBody::Json(v) => serde_json::to_vec_pretty(v).unwrap_or_default(),
        }
    }
}

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        let mut res = Response::new(Body::from(self.render()));
        *res.status_mut() = self.status;
        let headers = res.headers_mut();
        if let Some(ct) = self.content_type() {
            headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(ct));
        }
        if let Some(location) = &self.location {
            match HeaderValue::from_str(location) {
                Ok(v) => {
                    headers.insert(header::LOCATION, v);
                }
                Err(_) => tracing::warn!(location = %location, "location is not a valid header value"),
            }
        }
        res
    }
}

pub fn error_body(code: &str, message: String, details: Option<Value>) -> Value {
    serde_json::json!({
        "error": {
            "code": code,
            "message": message,
            "details": details
        }
    })
}
