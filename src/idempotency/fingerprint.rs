//! Request fingerprinting.
//!
//! A fingerprint identifies the logical request an idempotency key was
//! used for: the HTTP method, the route template, the concrete path (which
//! carries the path parameters, i.e. the target resource) and the
//! canonicalized body. Reusing a key against a different resource or with a
//! different body therefore yields a different fingerprint.

use std::fmt;

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 digest of a canonical request.
///
/// # Example
///
/// ```
/// use payroll_core::idempotency::RequestFingerprint;
///
/// let a = RequestFingerprint::compute(
///     "POST",
///     "/payroll/periods/:id/finalize",
///     "/payroll/periods/1/finalize",
///     br#"{"b":1,"a":2}"#,
/// );
/// let b = RequestFingerprint::compute(
///     "POST",
///     "/payroll/periods/:id/finalize",
///     "/payroll/periods/1/finalize/",
///     br#"{ "a": 2, "b": 1 }"#,
/// );
/// assert_eq!(a, b);
/// assert_eq!(a.as_str().len(), 64);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestFingerprint(String);

impl RequestFingerprint {
    /// Computes the fingerprint of a request.
    pub fn compute(method: &str, route_template: &str, path: &str, body: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(method.to_ascii_uppercase().as_bytes());
        hasher.update(b"\n");
        hasher.update(route_template.as_bytes());
        hasher.update(b"\n");
        hasher.update(normalize_path(path).as_bytes());
        hasher.update(b"\n");
        hasher.update(canonical_body(body));

        let digest = hasher.finalize();
        Self(digest.iter().map(|b| format!("{:02x}", b)).collect())
    }

    /// Returns the hex digest.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn normalize_path(path: &str) -> &str {
    match path.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    }
}

/// Re-encodes a JSON body with sorted keys and no whitespace.
///
/// An empty body is treated as `null`; a body that is not JSON is hashed
/// as-is.
fn canonical_body(body: &[u8]) -> Vec<u8> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return b"null".to_vec();
    }
    match serde_json::from_slice::<Value>(body) {
        Ok(value) => sort_keys(value).to_string().into_bytes(),
        Err(_) => body.to_vec(),
    }
}

fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, sort_keys(v)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}
