//! HTTP handler for `GET /feed`.
//!
//! Collects the query flags, hands them to `FeedService` and turns the
//! outcome into a response. All failures come back as plain-text 500s.

use crate::{
    errors::AppError,
    models::object::ObjectHead,
    services::feed_service::{FeedRequest, FeedResponse},
    state::AppState,
};
use axum::{
    body::Body,
    extract::{Query, State},
    http::{HeaderMap, HeaderValue, Method, StatusCode, Uri, header},
    response::Response,
};
use serde_json::json;
use std::collections::HashMap;

/// `GET /feed?filename=<name>[&md5]`
pub async fn get_feed(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, AppError> {
    if state.debug {
        log_event(&method, &uri, &headers, &params);
    }

    let request = FeedRequest {
        filename: params.get("filename").cloned(),
        md5: params.contains_key("md5"),
    };

    match state.feed.fetch(&request).await? {
        FeedResponse::ETag(e_tag) => {
            let mut response = Response::new(Body::from(e_tag));
            *response.status_mut() = StatusCode::OK;
            response
                .headers_mut()
                .insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
            Ok(response)
        }
        FeedResponse::Object(object) => {
            let len = object.bytes.len() as u64;
            let mut response = Response::new(Body::from(object.bytes));
            *response.status_mut() = StatusCode::OK;
            set_object_headers(response.headers_mut(), &object.head, len);
            Ok(response)
        }
    }
}

fn log_event(
    method: &Method,
    uri: &Uri,
    headers: &HeaderMap,
    params: &HashMap<String, String>,
) {
    let header_map: HashMap<&str, &str> = headers
        .iter()
        .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str(), v)))
        .collect();
    let event = json!({
        "httpMethod": method.as_str(),
        "path": uri.path(),
        "queryStringParameters": params,
        "headers": header_map,
    });
    tracing::info!(event = %event, "received request");
}

fn set_object_headers(headers: &mut HeaderMap, meta: &ObjectHead, length: u64) {
    let content_type = meta
        .content_type
        .as_deref()
        .unwrap_or("application/octet-stream");
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );

    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));

    if let Some(value) = meta
        .e_tag
        .as_deref()
        .and_then(|etag| HeaderValue::from_str(etag).ok())
    {
        headers.insert(header::ETAG, value);
    }

    if let Some(value) = meta.last_modified.and_then(|ts| {
        HeaderValue::from_str(&ts.format("%a, %d %b %Y %H:%M:%S GMT").to_string()).ok()
    }) {
        headers.insert(header::LAST_MODIFIED, value);
    }
}
