//! Shared utilities for the cache library.

use std::time::{SystemTime, UNIX_EPOCH};

/// Canonicalize a logical resource path into a cache key.
///
/// Collapses any run of `/` separators into a single one and removes a
/// single trailing separator. Two raw paths that differ only by
/// separator repetition or a trailing separator normalize to the same
/// key.
///
/// # Example
/// - `"hr//employees/"` -> `"hr/employees"`
/// - `"hr/employees"` -> `"hr/employees"`
pub fn normalize_path(raw: &str) -> String {
    let mut key = String::with_capacity(raw.len());
    let mut prev_sep = false;

    for ch in raw.chars() {
        if ch == '/' {
            if !prev_sep {
                key.push('/');
            }
            prev_sep = true;
        } else {
            key.push(ch);
            prev_sep = false;
        }
    }

    if key.ends_with('/') {
        key.pop();
    }

    key
}

/// Get the current time in milliseconds since UNIX epoch.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis() as i64
}
