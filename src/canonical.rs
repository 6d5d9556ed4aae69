// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Canonical metadata encoding (RFC 8785 / JCS).
//!
//! Hashing and storage share this routine: keys sorted by UTF-16 code
//! units, numbers in ECMAScript shortest form, no insignificant whitespace.

use crate::config::{MAX_METADATA_BYTES, MAX_METADATA_DEPTH};
use crate::error::{CoreError, CoreResult};
use crate::event::Metadata;
use serde_json::Value;

/// Admission limits applied before canonicalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetadataLimits {
    pub max_bytes: usize,
    pub max_depth: usize,
}

impl Default for MetadataLimits {
    fn default() -> Self {
        Self {
            max_bytes: MAX_METADATA_BYTES,
            max_depth: MAX_METADATA_DEPTH,
        }
    }
}

/// Canonical bytes without admission limits. Used when re-verifying
/// events that were already admitted.
pub fn canonical_bytes(metadata: &Metadata) -> CoreResult<Vec<u8>> {
    serde_jcs::to_vec(metadata)
        .map_err(|e| CoreError::Validation(format!("metadata is not canonicalizable: {}", e)))
}

/// Validate and canonicalize metadata for admission.
pub fn canonicalize(metadata: &Metadata, limits: &MetadataLimits) -> CoreResult<Vec<u8>> {
    for (key, value) in metadata {
        if key.trim().is_empty() {
            return Err(CoreError::Validation("metadata keys must not be blank".into()));
        }
        let depth = value_depth(value);
        if depth > limits.max_depth {
            return Err(CoreError::Validation(format!(
                "metadata key '{}' nests {} levels (max {})",
                key, depth, limits.max_depth
            )));
        }
    }

    let bytes = canonical_bytes(metadata)?;
    if bytes.len() > limits.max_bytes {
        return Err(CoreError::Validation(format!(
            "metadata is {} bytes canonical (max {})",
            bytes.len(),
            limits.max_bytes
        )));
    }
    Ok(bytes)
}

fn value_depth(value: &Value) -> usize {
    match value {
        Value::Array(items) => 1 + items.iter().map(value_depth).max().unwrap_or(0),
        Value::Object(map) => 1 + map.values().map(value_depth).max().unwrap_or(0),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_depth() {
        assert_eq!(value_depth(&json!(1)), 0);
        assert_eq!(value_depth(&json!([1, 2])), 1);
        assert_eq!(value_depth(&json!({"a": {"b": [1]}})), 3);
    }
}
