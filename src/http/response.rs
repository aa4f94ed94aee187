//! Response assembly.
//!
//! # Responsibilities
//! - Decide whether a response can carry a body at all
//! - Rebuild the client response from sanitized upstream parts

use axum::body::Body;
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::Response;

use crate::error::ProxyError;

/// HEAD responses and 1xx/204/304 never carry a body, whatever their headers say.
pub fn is_bodiless(method: &Method, status: StatusCode) -> bool {
    method == Method::HEAD
        || status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED
}

/// Build the outbound response with the original status and sanitized headers.
pub fn assemble(status: StatusCode, headers: HeaderMap, body: Body) -> Result<Response, ProxyError> {
    let mut response = Response::builder().status(status).body(body)?;
    *response.headers_mut() = headers;
    Ok(response)
}
