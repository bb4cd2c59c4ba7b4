// JSON document helpers over serde_json::Value.
// - Parse/serialize the NUL-terminated document text of a data file.
// - RFC 6901 JSON Pointer get/set/remove used by the typed container accessors.
// Key order is preserved (serde_json `preserve_order`).

use serde_json::Value;

use crate::error::{Error, Result};
use crate::paths::unescape_token;

/// Document text as stored before compression: compact JSON plus one NUL.
pub fn serialize_document(value: &Value) -> Result<Vec<u8>> {
    let mut out = serde_json::to_vec(value)?;
    out.push(0);
    Ok(out)
}

/// Strips the trailing NUL terminator(s) and whitespace.
pub fn trim_document(plain: &[u8]) -> &[u8] {
    let end = plain
        .iter()
        .rposition(|b| *b != 0 && !b.is_ascii_whitespace())
        .map_or(0, |i| i + 1);
    &plain[..end]
}

/// Parses document text. `Ok(None)` when the text parsed to something that
/// is not an object.
pub fn parse_document(plain: &[u8]) -> Result<Option<Value>> {
    let value: Value = serde_json::from_slice(trim_document(plain))?;
    Ok(value.is_object().then_some(value))
}

pub fn get_by_pointer<'a>(value: &'a Value, pointer: &str) -> Option<&'a Value> {
    value.pointer(pointer)
}

fn parent_pointer(ptr: &str) -> Option<(&str, &str)> {
    if ptr.is_empty() || ptr == "/" {
        return None;
    }
    let pos = ptr.rfind('/')?;
    Some((&ptr[..pos], &ptr[pos + 1..]))
}

/// Replaces the value at `pointer`. The last key is inserted when missing as
/// long as its parent object exists.
pub fn set_raw_by_pointer(root: &mut Value, pointer: &str, new_value: Value) -> Result<()> {
    if let Some(slot) = root.pointer_mut(pointer) {
        *slot = new_value;
        return Ok(());
    }
    let (parent_ptr, last) =
        parent_pointer(pointer).ok_or_else(|| Error::InvalidPath(pointer.to_string()))?;
    let parent = root
        .pointer_mut(parent_ptr)
        .ok_or_else(|| Error::InvalidPath(pointer.to_string()))?;
    match parent {
        Value::Object(map) => {
            map.insert(unescape_token(last), new_value);
            Ok(())
        }
        _ => Err(Error::InvalidPath(pointer.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nul_terminated_roundtrip() {
        let doc = json!({"b": 1, "a": [1, 2]});
        let bytes = serialize_document(&doc).unwrap();
        assert_eq!(bytes.last(), Some(&0));
        assert_eq!(parse_document(&bytes).unwrap(), Some(doc));
    }

    #[test]
    fn non_object_is_no_document() {
        assert_eq!(parse_document(b"null\0").unwrap(), None);
        assert!(parse_document(b"{broken").is_err());
    }

    #[test]
    fn pointer_edits() {
        let mut v = json!({"a": {"b": [1, 2, 3]}});
        set_raw_by_pointer(&mut v, "/a/c", json!("new")).unwrap();
        assert_eq!(get_by_pointer(&v, "/a/c"), Some(&json!("new")));
        assert!(set_raw_by_pointer(&mut v, "/x/y", json!(1)).is_err());
        assert_eq!(get_by_pointer(&v, "/a/b/1"), Some(&json!(2)));
    }
}
