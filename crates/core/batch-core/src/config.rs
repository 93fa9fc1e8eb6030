//! Environment-driven configuration helpers and default knobs for `OperationOptions`.

use crate::error::{BatchCoreError, Result};
use std::env;

/// Load environment variables from a `.env` file, if present.
///
/// Safe to call multiple times; a missing file is not an error.
pub fn load_env() -> Result<()> {
    match dotenvy::dotenv() {
        Ok(path) => {
            tracing::info!("loaded environment from {}", path.display());
            Ok(())
        }
        Err(dotenvy::Error::LineParse(line, pos)) => Err(BatchCoreError::invalid_options(format!(
            "failed to parse .env file at line {line}, position {pos}"
        ))),
        Err(dotenvy::Error::Io(_)) => {
            tracing::debug!("no .env file found; using process environment only");
            Ok(())
        }
        Err(e) => Err(BatchCoreError::invalid_options(format!(
            "failed to load .env file: {e}"
        ))),
    }
}

/// Get an optional environment variable, falling back to `default`.
pub fn get_env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Get an environment variable as a boolean (`true`/`1`/`yes`/`on` and their negations).
pub fn get_env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .and_then(|v| match v.to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Some(true),
            "false" | "0" | "no" | "off" => Some(false),
            _ => None,
        })
        .unwrap_or(default)
}

/// Get an environment variable parsed as `T`, falling back to `default` on absence or parse failure.
pub fn get_env_int<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr,
{
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

/// Default initial batch size (`BATCH_CORE_BATCH_SIZE`, default `100`).
pub fn default_batch_size() -> usize {
    get_env_int("BATCH_CORE_BATCH_SIZE", 100)
}

/// Default concurrency bound (`BATCH_CORE_MAX_CONCURRENCY`, default `1`).
pub fn default_max_concurrent_batches() -> usize {
    get_env_int("BATCH_CORE_MAX_CONCURRENCY", 1)
}

/// Default for `adaptive_batch_size` (`BATCH_CORE_ADAPTIVE`, default `true`).
pub fn default_adaptive_batch_size() -> bool {
    get_env_bool("BATCH_CORE_ADAPTIVE", true)
}
