//! Environment variable helpers used by the `from_env` constructors.
//!
//! All helpers treat an unset or unparsable variable the same way: the
//! caller's default wins.
//!
//! ```ignore
//! use dgram_core::env::{env_get, env_get_bool};
//!
//! let workers: usize = env_get("DGRAM_WORKERS", 0);
//! let reuse = env_get_bool("DGRAM_REUSE_PORT", false);
//! ```

use std::str::FromStr;
use std::time::Duration;

/// Parse `key` as `T`, or return `default`.
#[inline]
pub fn env_get<T: FromStr>(key: &str, default: T) -> T {
    env_get_opt(key).unwrap_or(default)
}

/// Parse `key` as `T` if it is set and well-formed.
#[inline]
pub fn env_get_opt<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Boolean flag: "1", "true", "yes", "on" (any case) are true, "0",
/// "false", "no", "off" are false. Anything else yields `default`.
pub fn env_get_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(v) => parse_bool(&v).unwrap_or(default),
        Err(_) => default,
    }
}

/// Milliseconds in `key` as a `Duration`. Unset, unparsable or 0 yield
/// `None`.
pub fn env_get_duration_ms(key: &str) -> Option<Duration> {
    match env_get_opt::<u64>(key) {
        Some(0) | None => None,
        Some(ms) => Some(Duration::from_millis(ms)),
    }
}

#[inline]
pub fn env_is_set(key: &str) -> bool {
    std::env::var_os(key).is_some()
}

fn parse_bool(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
