//! Environment variable helpers
//!
//! Configuration structs across the workspace are filled from the process
//! environment. These helpers treat an unset or blank variable as "use the
//! default" and report malformed values instead of silently ignoring them.

use std::str::FromStr;

use crate::error::{CommonError, Result};

/// Read a variable, treating blank values as unset
pub fn var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Read a variable or fall back to `default`
pub fn string_or(key: &str, default: &str) -> String {
    var(key).unwrap_or_else(|| default.to_string())
}

/// Parse a variable into `T`, falling back to `default` when it is unset
pub fn parse_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match var(key) {
        Some(raw) => raw
            .parse()
            .map_err(|err| CommonError::invalid_value(key, raw.clone(), err)),
        None => Ok(default),
    }
}

/// Parse an optional variable into `T`
pub fn parse_opt<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    var(key)
        .map(|raw| {
            raw.parse()
                .map_err(|err| CommonError::invalid_value(key, raw.clone(), err))
        })
        .transpose()
}
