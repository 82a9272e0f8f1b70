//! Accept header negotiation.

use std::collections::BTreeMap;

use crate::extract::DecodeError;
use crate::http::request::GroupVersionKind;

/// Canonical group of the partial object metadata kinds.
pub const META_GROUP: &str = "meta.k8s.io";

/// Versions a partial object metadata request may ask for, most specific first.
const META_VERSIONS: [&str; 2] = ["v1beta1", "v1"];

const PARTIAL_KINDS: [&str; 2] = ["PartialObjectMetadata", "PartialObjectMetadataList"];

/// One clause of an Accept header.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaRange {
    pub media_type: String,
    pub subtype: String,
    pub q: f32,
    pub params: BTreeMap<String, String>,
}

impl MediaRange {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }
}

/// Parse an Accept header into clauses ordered by preference.
///
/// Higher `q` wins; at equal `q`, concrete types come before wildcards.
/// Clauses that are not `type/subtype` (or a bare `*`) are skipped.
pub fn parse_accept(header: &str) -> Vec<MediaRange> {
    let mut clauses = Vec::new();

    for part in header.split(',') {
        let mut pieces = part.trim().split(';');
        let range = pieces.next().unwrap_or_default();
        let mut sp = range.split('/');
        let media_type = sp.next().unwrap_or_default().trim().to_string();
        let subtype = match (sp.next(), sp.next()) {
            (None, None) if media_type == "*" => "*".to_string(),
            (Some(sub), None) => sub.trim().to_string(),
            _ => continue,
        };

        let mut q = 1.0;
        let mut params = BTreeMap::new();
        for param in pieces {
            let Some((token, value)) = param.split_once('=') else {
                continue;
            };
            let token = token.trim();
            if token == "q" {
                q = value.trim().parse().unwrap_or(0.0);
            } else {
                params.insert(token.to_string(), value.trim().to_string());
            }
        }

        clauses.push(MediaRange { media_type, subtype, q, params });
    }

    clauses.sort_by(|a, b| {
        b.q.total_cmp(&a.q)
            .then_with(|| (a.media_type == "*").cmp(&(b.media_type == "*")))
            .then_with(|| (a.subtype == "*").cmp(&(b.subtype == "*")))
    });
    clauses
}

/// Resource type override requested by a partial object metadata Accept header.
///
/// Returns `Ok(None)` when the preferred clause does not ask for partial
/// metadata, and an error when it does but names an unknown group or version.
pub fn partial_object_metadata(header: &str) -> Result<Option<GroupVersionKind>, DecodeError> {
    let clauses = parse_accept(header);
    let Some(first) = clauses.first() else {
        return Ok(None);
    };

    let kind = first.param("as").unwrap_or_default();
    if !PARTIAL_KINDS.contains(&kind) {
        return Ok(None);
    }

    let raw_group = first.param("g").unwrap_or_default();
    if !raw_group.contains(META_GROUP) {
        return Err(DecodeError::UnknownGroup(raw_group.to_string()));
    }

    let raw_version = first.param("v").unwrap_or_default();
    let version = META_VERSIONS
        .iter()
        .find(|v| raw_version.contains(*v))
        .ok_or_else(|| DecodeError::UnknownVersion(raw_version.to_string()))?;

    Ok(Some(GroupVersionKind::new(META_GROUP, *version, kind)))
}

/// Media type of the first raw Accept clause.
///
/// Parameters are dropped when one of them carries an `as=` conversion marker.
pub fn requested_content_type(header: &str) -> Option<String> {
    let first = header.split(',').next().unwrap_or_default();

    let content_type = if first.split(';').any(|p| p.contains("as=")) {
        first.split(';').next().unwrap_or_default()
    } else {
        first
    };

    let content_type = content_type.trim();
    (!content_type.is_empty()).then(|| content_type.to_string())
}
