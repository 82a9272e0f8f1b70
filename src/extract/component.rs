//! Client component identity derived from the User-Agent header.

use crate::config::WorkingMode;
use crate::http::request::GroupVersionKind;

/// Marker segment for partial object metadata traffic.
const PARTIAL_METADATA_MARKER: &str = "partialobjectmetadatas";

/// Derive the client component from a User-Agent value.
///
/// In edge mode only the product token before the first `/` is kept, since the
/// component names a cache directory. Partial object metadata requests get a
/// distinct suffix so their cached objects never mix with full objects.
pub fn client_component(
    user_agent: &str,
    mode: WorkingMode,
    partial: Option<&GroupVersionKind>,
) -> Option<String> {
    let mut component = user_agent.to_lowercase();
    if mode == WorkingMode::Edge {
        if let Some((head, _)) = component.split_once('/') {
            component = head.to_string();
        }
    }

    if component.is_empty() {
        return None;
    }

    if let Some(gvk) = partial {
        component = format!(
            "{}/{}.{}.{}",
            component, PARTIAL_METADATA_MARKER, gvk.version, gvk.group
        );
    }
    Some(component)
}
