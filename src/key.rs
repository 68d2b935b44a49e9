//! Request key derivation.
//!
//! A request key is the canonical string identity of a logical request: the
//! path plus its parameters with names sorted lexicographically and values in
//! compact JSON encoding. Two calls that mean the same request produce the
//! same key no matter what order their parameters were supplied in; the
//! deduplicator and the cancellation registry both key on it.

use serde_json::Value;

/// Derive the canonical key for `path` with `params`.
///
/// Pure and infallible: values are serialized best-effort via their JSON
/// representation, and an empty parameter list yields the bare path.
pub fn request_key(path: &str, params: &[(&str, Value)]) -> String {
    if params.is_empty() {
        return path.to_string();
    }
    let mut pairs: Vec<(&str, &Value)> =
        params.iter().map(|(name, value)| (*name, value)).collect();
    pairs.sort_by_key(|&(name, _)| name);
    let query = pairs
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join("&");
    format!("{path}?{query}")
}
