//! JSON Pointer lookup.

use serde_json::Value;

/// Get the value at a JSON Pointer (e.g. "#/definitions/id" or "/a/0").
///
/// A single leading `#` is optional and empty segments are skipped, so `""`,
/// `"#"` and `"/"` all address the root. Segments are unescaped
/// (`~1` = `/`, `~0` = `~`, `%7B`/`%7D` = `{`/`}`). Arrays are indexed by
/// decimal position.
///
/// Returns `None` when any step is missing. Falsy values (`null`, `false`,
/// `0`, `""`) are found like any other value.
pub fn get_at_pointer<'a>(root: &'a Value, pointer: &str) -> Option<&'a Value> {
    let path = pointer.strip_prefix('#').unwrap_or(pointer);

    path.split('/')
        .filter(|segment| !segment.is_empty())
        .try_fold(root, |current, segment| {
            let key = unescape_segment(segment);
            match current {
                Value::Object(map) => map.get(key.as_str()),
                Value::Array(items) => array_index(&key).and_then(|i| items.get(i)),
                _ => None,
            }
        })
}

/// Plain decimal index: no sign, no leading zero.
fn array_index(segment: &str) -> Option<usize> {
    let digits = !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit());
    if !digits || (segment.len() > 1 && segment.starts_with('0')) {
        return None;
    }
    segment.parse().ok()
}

/// Undo pointer escaping for one segment.
pub fn unescape_segment(segment: &str) -> String {
    segment
        .replace("~1", "/")
        .replace("~0", "~")
        .replace("%7B", "{")
        .replace("%7b", "{")
        .replace("%7D", "}")
        .replace("%7d", "}")
}
