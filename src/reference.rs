//! Reference detection and classification.

use serde_json::Value;
use url::Url;

use crate::types::{RefTarget, Scheme, REF_KEY};

/// Return the `$ref` string if `node` is exactly `{"$ref": "<string>"}`.
///
/// Objects carrying `$ref` next to other keys are ordinary objects.
pub fn ref_value(node: &Value) -> Option<&str> {
    let map = node.as_object()?;
    if map.len() != 1 {
        return None;
    }
    map.get(REF_KEY)?.as_str()
}

/// Classify a reference node using the built-in schemes only.
pub fn classify(node: &Value) -> Option<RefTarget> {
    classify_with(node, |_| false)
}

/// Classify a reference node.
///
/// `has_loader` reports whether a custom scheme name has a registered
/// loader; `<name>:...` strings are routed to it only when it does.
pub fn classify_with(node: &Value, has_loader: impl Fn(&str) -> bool) -> Option<RefTarget> {
    let raw = ref_value(node)?;
    Some(classify_str(raw, has_loader))
}

/// Classify a raw `$ref` string.
pub fn classify_str(raw: &str, has_loader: impl Fn(&str) -> bool) -> RefTarget {
    if let Some(pointer) = raw.strip_prefix('#') {
        return RefTarget {
            scheme: Scheme::Local,
            locator: String::new(),
            pointer: Some(pointer.to_string()),
            raw: raw.to_string(),
        };
    }

    let (scheme, rest) = if is_web_url(raw) {
        (Scheme::Web, raw)
    } else if let Some(name) = custom_scheme(raw).filter(|name| has_loader(name)) {
        (Scheme::Custom(name.to_string()), raw)
    } else {
        (Scheme::File, strip_file_prefix(raw))
    };

    let (locator, pointer) = match rest.split_once('#') {
        Some((locator, pointer)) => (locator, Some(pointer.to_string())),
        None => (rest, None),
    };

    RefTarget {
        scheme,
        locator: locator.to_string(),
        pointer,
        raw: raw.to_string(),
    }
}

/// Absolute `http`/`https` URL with a host.
pub fn is_web_url(s: &str) -> bool {
    Url::parse(s)
        .map(|url| matches!(url.scheme(), "http" | "https") && url.has_host())
        .unwrap_or(false)
}

fn strip_file_prefix(raw: &str) -> &str {
    if let Some(rest) = raw.strip_prefix("file://") {
        if rest.starts_with('/') {
            return rest;
        }
    }
    raw.strip_prefix("file:").unwrap_or(raw)
}

/// Scheme name of a `<name>:...` string.
///
/// Single letters are drive letters, not schemes.
fn custom_scheme(raw: &str) -> Option<&str> {
    let (name, _) = raw.split_once(':')?;
    let mut chars = name.chars();
    let valid = name.len() > 1
        && chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    if !valid || matches!(name, "file" | "http" | "https") {
        return None;
    }
    Some(name)
}
