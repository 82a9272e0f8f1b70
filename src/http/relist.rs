//! Watch re-list signal.
//!
//! When a watch asks for a resource version that can no longer be served,
//! the client is sent one terminal `ERROR` watch event. Its watch loop reacts
//! by starting over with a fresh list.
//!
//! Protobuf streams are framed with a 4-byte big-endian length prefix; JSON
//! streams are newline delimited.

use axum::{
    body::Body,
    http::{header, HeaderValue, StatusCode},
    response::Response,
};
use bytes::{Bytes, BytesMut};
use prost::Message;
use thiserror::Error;
use tokio_util::codec::{Encoder, LengthDelimitedCodec, LinesCodec};

use crate::http::context::RequestContext;
use crate::http::request::RequestDescriptor;

pub const PROTOBUF_MEDIA_TYPE: &str = "application/vnd.kubernetes.protobuf";
pub const JSON_MEDIA_TYPE: &str = "application/json";

/// Event type that terminates a watch.
pub const ERROR_EVENT: &str = "ERROR";

#[derive(Debug, Error)]
pub enum RelistError {
    #[error("no stream serializer for media type {0:?}")]
    UnsupportedMediaType(String),

    #[error("failed to encode watch event: {0}")]
    Encode(String),
}

/// Wire form of an embedded object.
#[derive(Clone, PartialEq, Message)]
pub struct RawExtension {
    #[prost(bytes = "vec", optional, tag = "1")]
    pub raw: Option<Vec<u8>>,
}

/// Wire form of a watch event.
#[derive(Clone, PartialEq, Message)]
pub struct WatchEvent {
    #[prost(string, optional, tag = "1")]
    pub r#type: Option<String>,
    #[prost(message, optional, tag = "2")]
    pub object: Option<RawExtension>,
}

impl WatchEvent {
    pub fn error() -> Self {
        Self {
            r#type: Some(ERROR_EVENT.to_string()),
            object: Some(RawExtension::default()),
        }
    }
}

/// Streaming format negotiated for a watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamFormat {
    Protobuf,
    Json,
}

impl StreamFormat {
    /// Pick the stream format for the media type the client asked for.
    pub fn negotiate(media_type: Option<&str>) -> Result<Self, RelistError> {
        let media_type = media_type.unwrap_or(PROTOBUF_MEDIA_TYPE);
        let essence = media_type.split(';').next().unwrap_or_default().trim();
        match essence {
            PROTOBUF_MEDIA_TYPE | "*/*" | "application/*" | "" => Ok(StreamFormat::Protobuf),
            JSON_MEDIA_TYPE => Ok(StreamFormat::Json),
            other => Err(RelistError::UnsupportedMediaType(other.to_string())),
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            StreamFormat::Protobuf => "application/vnd.kubernetes.protobuf;stream=watch",
            StreamFormat::Json => "application/json",
        }
    }

    /// Encode one framed event.
    pub fn encode(&self, event: &WatchEvent) -> Result<Bytes, RelistError> {
        let mut frame = BytesMut::new();
        match self {
            StreamFormat::Protobuf => {
                LengthDelimitedCodec::new()
                    .encode(Bytes::from(event.encode_to_vec()), &mut frame)
                    .map_err(|e| RelistError::Encode(e.to_string()))?;
            }
            StreamFormat::Json => {
                let line = serde_json::json!({
                    "type": event.r#type.as_deref().unwrap_or_default(),
                    "object": serde_json::Value::Null,
                })
                .to_string();
                LinesCodec::new()
                    .encode(line, &mut frame)
                    .map_err(|e| RelistError::Encode(e.to_string()))?;
            }
        }
        Ok(frame.freeze())
    }
}

/// Response carrying a single terminal error event.
pub fn relist_response(media_type: Option<&str>) -> Result<Response, RelistError> {
    let format = StreamFormat::negotiate(media_type)?;
    let frame = format.encode(&WatchEvent::error())?;

    let mut response = Response::new(Body::from(frame));
    *response.status_mut() = StatusCode::OK;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(format.content_type()));
    Ok(response)
}

/// Tell the client to re-list, or leave the stream empty if that fails.
pub fn relist_watch(info: &RequestDescriptor, context: &RequestContext, resource_version: Option<&str>) -> Response {
    tracing::info!(
        client = context.client_component().unwrap_or_default(),
        request = %info,
        resource_version = resource_version.unwrap_or_default(),
        "Watch rejected, expecting re-list"
    );

    match relist_response(context.content_type()) {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(request = %info, error = %e, "Failed to send re-list signal");
            Response::new(Body::empty())
        }
    }
}
