//! Deterministic cache key derivation
//!
//! Every identifier (a URL string or any serializable value) maps to a
//! 32-character lower-case hex key: the first 16 bytes of the BLAKE3 digest
//! of the identifier's canonical form. Strings are used as-is; other values
//! are rendered as compact JSON with object keys sorted recursively, so two
//! structurally equal identifiers always produce the same key.

use serde::Serialize;
use serde_json::{Map, Value};
use tiercache_domain::{CacheError, HttpMethod, Result};

const KEY_BYTES: usize = 16;

/// Derives the cache key for an arbitrary serializable identifier.
///
/// Returns [`CacheError::InvalidKeyInput`] when the identifier cannot be
/// represented as JSON (for example a map with non-string keys).
pub fn derive_key<T: Serialize + ?Sized>(identifier: &T) -> Result<String> {
    let value = serde_json::to_value(identifier)
        .map_err(|e| CacheError::InvalidKeyInput(e.to_string()))?;
    Ok(derive_key_from_value(&value))
}

/// Derives the cache key for a string identifier such as a URL.
pub fn derive_key_str(identifier: &str) -> String {
    digest_hex(identifier.as_bytes())
}

/// Key derivation for an already-built JSON value.
pub fn derive_key_from_value(value: &Value) -> String {
    match value {
        Value::String(s) => derive_key_str(s),
        other => digest_hex(canonical_json(other).as_bytes()),
    }
}

/// Identity used for request coalescing and response caching.
///
/// GET requests are identified by their URL alone. Other methods include the
/// method and a digest of the body so distinct payloads never share a slot.
pub fn request_identity(method: HttpMethod, url: &str, body: Option<&[u8]>) -> Value {
    if method == HttpMethod::Get {
        return Value::String(url.to_string());
    }
    let mut identity = Map::new();
    identity.insert("method".into(), Value::String(method.as_str().into()));
    identity.insert("url".into(), Value::String(url.to_string()));
    identity.insert(
        "body".into(),
        body.map_or(Value::Null, |bytes| Value::String(blake3::hash(bytes).to_hex().to_string())),
    );
    Value::Object(identity)
}

/// Cache key for a request, see [`request_identity`].
pub fn request_key(method: HttpMethod, url: &str, body: Option<&[u8]>) -> String {
    derive_key_from_value(&request_identity(method, url, body))
}

fn digest_hex(bytes: &[u8]) -> String {
    let digest = blake3::hash(bytes);
    hex::encode(&digest.as_bytes()[..KEY_BYTES])
}

/// Compact JSON with object keys sorted at every depth.
fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                if let Some(inner) = map.get(key) {
                    write_canonical(inner, out);
                }
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
