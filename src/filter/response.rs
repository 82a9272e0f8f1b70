//! Response-path filtering.
//!
//! Applies a [`FilterChain`] to JSON response bodies:
//! - single objects and lists are buffered, filtered and re-encoded
//! - watch streams are filtered line by line as events arrive
//!
//! Anything that is not a successful JSON response passes through untouched,
//! and so does any object the chain leaves unchanged.

use axum::{
    body::{Body, Bytes},
    http::{header, HeaderMap},
    response::Response,
};
use futures_util::{StreamExt, TryStreamExt};
use serde_json::Value;
use tokio_util::codec::{FramedRead, LinesCodec};
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;

use super::{FilterChain, FilterError, Object};
use crate::http::request::{RequestDescriptor, Verb};
use crate::http::response::service_unavailable;

/// Watch event types that carry an object to filter.
const OBJECT_EVENTS: [&str; 3] = ["ADDED", "MODIFIED", "DELETED"];

/// Filter a response from the remote server.
pub async fn filter_response(
    response: Response,
    info: &RequestDescriptor,
    chain: FilterChain,
    cancel: CancellationToken,
) -> Response {
    if chain.is_empty() || !response.status().is_success() || !is_json(response.headers()) {
        return response;
    }

    if info.verb == Verb::Watch {
        return filter_watch(response, chain, cancel);
    }

    match filter_buffered(response, &chain, &cancel).await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(request = %info, error = %e, "Failed to filter response");
            service_unavailable(&e.to_string())
        }
    }
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .is_some_and(|essence| essence.trim().eq_ignore_ascii_case("application/json"))
}

async fn filter_buffered(
    response: Response,
    chain: &FilterChain,
    cancel: &CancellationToken,
) -> Result<Response, FilterError> {
    let (mut parts, body) = response.into_parts();
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .map_err(|e| FilterError::Body(e.to_string()))?;

    let body = match filter_document(&bytes, chain, cancel)? {
        Some(filtered) => {
            parts.headers.remove(header::CONTENT_LENGTH);
            Body::from(filtered)
        }
        None => Body::from(bytes),
    };
    Ok(Response::from_parts(parts, body))
}

/// Filter a single object or a list. `None` means the document is unchanged
/// or not something filters understand.
pub fn filter_document(
    bytes: &[u8],
    chain: &FilterChain,
    cancel: &CancellationToken,
) -> Result<Option<Vec<u8>>, FilterError> {
    let Ok(document) = serde_json::from_slice::<Value>(bytes) else {
        return Ok(None);
    };

    let filtered = match list_item_kind(&document) {
        Some(item_kind) => filter_list(document.clone(), &item_kind, chain, cancel)?,
        None => chain.apply(Object::from_value(document.clone(), None), cancel).into_value()?,
    };

    if filtered == document {
        Ok(None)
    } else {
        Ok(Some(serde_json::to_vec(&filtered)?))
    }
}

/// Kind of the items of a list document, e.g. `Pod` for a `PodList`.
fn list_item_kind(document: &Value) -> Option<String> {
    let kind = document.get("kind")?.as_str()?;
    if !document.get("items").is_some_and(Value::is_array) {
        return None;
    }
    kind.strip_suffix("List").map(str::to_string)
}

fn filter_list(
    mut document: Value,
    item_kind: &str,
    chain: &FilterChain,
    cancel: &CancellationToken,
) -> Result<Value, FilterError> {
    if let Some(items) = document.get_mut("items").and_then(Value::as_array_mut) {
        for item in items.iter_mut() {
            let object = Object::from_value(std::mem::take(item), Some(item_kind));
            *item = chain.apply(object, cancel).into_value()?;
        }
    }
    Ok(document)
}

/// Filter one watch event line, returning it unchanged when nothing applies.
pub fn filter_event_line(line: String, chain: &FilterChain, cancel: &CancellationToken) -> String {
    let Ok(mut event) = serde_json::from_str::<Value>(&line) else {
        return line;
    };

    let is_object_event = event
        .get("type")
        .and_then(Value::as_str)
        .is_some_and(|t| OBJECT_EVENTS.contains(&t));
    if !is_object_event {
        return line;
    }

    let Some(slot) = event.get_mut("object") else {
        return line;
    };
    let original = std::mem::take(slot);
    let filtered = match chain.apply(Object::from_value(original.clone(), None), cancel).into_value() {
        Ok(filtered) => filtered,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to encode filtered watch object");
            return line;
        }
    };

    if filtered == original {
        return line;
    }
    *slot = filtered;
    serde_json::to_string(&event).unwrap_or(line)
}

fn filter_watch(response: Response, chain: FilterChain, cancel: CancellationToken) -> Response {
    let (mut parts, body) = response.into_parts();
    parts.headers.remove(header::CONTENT_LENGTH);

    let reader = StreamReader::new(body.into_data_stream().map_err(std::io::Error::other));
    let events = FramedRead::new(reader, LinesCodec::new())
        .take_until(cancel.clone().cancelled_owned())
        .map(move |line| match line {
            Ok(line) => {
                let mut line = filter_event_line(line, &chain, &cancel);
                line.push('\n');
                Ok(Bytes::from(line))
            }
            Err(e) => {
                tracing::warn!(error = %e, "Watch stream from remote server ended with error");
                Err(std::io::Error::other(e))
            }
        });

    Response::from_parts(parts, Body::from_stream(events))
}
