//! Deterministic cache-key derivation.
//!
//! Geometries are canonicalized (recursively sorted object keys, no
//! whitespace) before hashing so that the same logical input always yields
//! the same key regardless of how the JSON was assembled. Series
//! fingerprints hash the exact bit patterns of the values in order, so a
//! single changed observation changes the fingerprint.

use serde_json::Value;
use sha2::{Digest, Sha256};

use common::types::Geometry;

use crate::CacheDomain;

/// Canonical JSON text: object keys sorted at every level, compact
/// separators. Uses serde_json's shortest round-trip float formatting,
/// which is stable for bit-identical inputs.
pub fn canonical_json(value: &Value) -> String {
    fn write(value: &Value, out: &mut String) {
        match value {
            Value::Object(map) => {
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                out.push('{');
                for (i, key) in keys.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    out.push_str(&serde_json::to_string(key).expect("string serializes"));
                    out.push(':');
                    write(&map[*key], out);
                }
                out.push('}');
            }
            Value::Array(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    write(item, out);
                }
                out.push(']');
            }
            other => {
                out.push_str(&serde_json::to_string(other).expect("scalar serializes"));
            }
        }
    }

    let mut out = String::new();
    write(value, &mut out);
    out
}

/// Stable fingerprint of a region of interest.
pub fn spatial_key(geometry: &Geometry) -> String {
    let value = serde_json::to_value(geometry).expect("geometry serializes");
    let canonical = canonical_json(&value);
    hex_digest(canonical.as_bytes())
}

/// Order-sensitive fingerprint of a numeric series. Used to detect that
/// the data behind a cached model has changed.
pub fn series_fingerprint(values: &[f64]) -> String {
    let mut hasher = Sha256::new();
    for v in values {
        hasher.update(v.to_le_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Full cache key: `domain:spatial:dim1:dim2:...`.
pub fn compose_key(domain: CacheDomain, spatial: &str, dims: &[&str]) -> String {
    let mut key = format!("{}:{}", domain.as_str(), spatial);
    for dim in dims {
        key.push(':');
        key.push_str(dim);
    }
    key
}

fn hex_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
