//! Shared utilities for the resource cache.

use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::StoreError;

/// Build a resource key from an endpoint path and serializable parameters.
///
/// Format: `{path}::{json-encoded params}`. Keys are opaque strings; two
/// call sites asking for the same path with structurally equal parameters
/// share one logical resource.
pub fn resource_key<P: Serialize>(path: &str, params: &P) -> Result<String, StoreError> {
    let encoded = serde_json::to_string(params)
        .map_err(|e| StoreError::Serialization(format!("key params failed to encode: {}", e)))?;
    Ok(format!("{}::{}", path, encoded))
}

/// Get the current time in milliseconds since UNIX epoch.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis() as i64
}

/// Simple pseudo-random number generator (0.0 to 1.0).
/// This avoids adding a dependency on rand crate.
pub fn rand_simple() -> f64 {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};

    let state = RandomState::new();
    let mut hasher = state.build_hasher();
    hasher.write_u64(
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos() as u64,
    );
    (hasher.finish() as f64) / (u64::MAX as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Serialize)]
    struct Params {
        id: u64,
        verbose: bool,
    }

    #[test]
    fn test_resource_key_format() {
        let key = resource_key(
            "/api/users",
            &Params {
                id: 7,
                verbose: true,
            },
        )
        .unwrap();
        assert_eq!(key, "/api/users::{\"id\":7,\"verbose\":true}");
    }

    #[test]
    fn test_resource_key_equal_params_equal_keys() {
        let a = resource_key("/api/users", &(1, "x")).unwrap();
        let b = resource_key("/api/users", &(1, "x")).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_now_ms_is_positive() {
        assert!(now_ms() > 0);
    }

    #[test]
    fn test_rand_simple_in_range() {
        for _ in 0..100 {
            let r = rand_simple();
            assert!((0.0..=1.0).contains(&r));
        }
    }
}
