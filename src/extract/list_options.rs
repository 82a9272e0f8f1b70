//! Decoding of list/watch query parameters.

use axum::extract::Query;
use axum::http::Uri;
use serde::Deserialize;

use crate::extract::selector::{FieldSelector, LabelSelector};
use crate::extract::DecodeError;

/// Query parameters exactly as they appear on the wire.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawListOptions {
    label_selector: Option<String>,
    field_selector: Option<String>,
    watch: Option<String>,
    allow_watch_bookmarks: Option<String>,
    resource_version: Option<String>,
    timeout_seconds: Option<String>,
    limit: Option<String>,
    #[serde(rename = "continue")]
    continue_token: Option<String>,
}

/// Typed list/watch options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    pub label_selector: Option<LabelSelector>,
    pub field_selector: Option<FieldSelector>,
    pub watch: bool,
    pub allow_watch_bookmarks: bool,
    pub resource_version: Option<String>,
    pub timeout_seconds: Option<i64>,
    pub limit: Option<i64>,
    pub continue_token: Option<String>,
}

impl ListOptions {
    /// Decode list options from the request URI's query string.
    ///
    /// Unrelated parameters are ignored; malformed known parameters fail.
    pub fn from_uri(uri: &Uri) -> Result<Self, DecodeError> {
        let Query(raw) = Query::<RawListOptions>::try_from_uri(uri)
            .map_err(|e| DecodeError::Query(e.body_text()))?;

        Ok(Self {
            label_selector: raw.label_selector.as_deref().map(str::parse::<LabelSelector>).transpose()?,
            field_selector: raw.field_selector.as_deref().map(str::parse::<FieldSelector>).transpose()?,
            watch: raw.watch.as_deref().map(parse_bool).unwrap_or(false),
            allow_watch_bookmarks: raw.allow_watch_bookmarks.as_deref().map(parse_bool).unwrap_or(false),
            resource_version: raw.resource_version,
            timeout_seconds: raw
                .timeout_seconds
                .as_deref()
                .map(|v| parse_int("timeoutSeconds", v))
                .transpose()?,
            limit: raw.limit.as_deref().map(|v| parse_int("limit", v)).transpose()?,
            continue_token: raw.continue_token,
        })
    }
}

/// Boolean query values: "0" and "false" are false, anything else is true.
pub(crate) fn parse_bool(value: &str) -> bool {
    !(value == "0" || value.eq_ignore_ascii_case("false"))
}

fn parse_int(name: &'static str, value: &str) -> Result<i64, DecodeError> {
    value.trim().parse().map_err(|_| DecodeError::Integer {
        name,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(uri: &str) -> Result<ListOptions, DecodeError> {
        ListOptions::from_uri(&uri.parse::<Uri>().unwrap())
    }

    #[test]
    fn decodes_known_parameters() {
        let opts = decode(
            "/api/v1/pods?labelSelector=app%3Dweb&fieldSelector=spec.nodeName%3Dn1&watch=1&timeoutSeconds=300&resourceVersion=42&pretty=true",
        )
        .unwrap();

        assert_eq!(opts.label_selector.unwrap().to_string(), "app=web");
        assert_eq!(opts.field_selector.unwrap().to_string(), "spec.nodeName=n1");
        assert!(opts.watch);
        assert_eq!(opts.timeout_seconds, Some(300));
        assert_eq!(opts.resource_version.as_deref(), Some("42"));
    }

    #[test]
    fn empty_query_is_default() {
        assert_eq!(decode("/api/v1/pods").unwrap(), ListOptions::default());
    }

    #[test]
    fn watch_false_values() {
        assert!(!decode("/api/v1/pods?watch=false").unwrap().watch);
        assert!(!decode("/api/v1/pods?watch=0").unwrap().watch);
        assert!(decode("/api/v1/pods?watch=true").unwrap().watch);
    }

    #[test]
    fn malformed_timeout_fails() {
        let err = decode("/api/v1/pods?timeoutSeconds=soon").unwrap_err();
        assert!(matches!(err, DecodeError::Integer { name: "timeoutSeconds", .. }));
    }

    #[test]
    fn malformed_selector_fails() {
        assert!(decode("/api/v1/pods?labelSelector=app+in+%28a").is_err());
    }
}
