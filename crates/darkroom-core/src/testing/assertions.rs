//! Assertion macros and helpers for darkroom tests.

use serde_json::Value;

use crate::error::DarkroomError;

/// Assert that a result is `Ok` and evaluate to the contained value.
///
/// ```ignore
/// let config = assert_ok!(AppConfig::from_documents(shared, frontend, dir));
/// let store = assert_ok!(FileStore::default_location(), "data dir should resolve");
/// ```
#[macro_export]
macro_rules! assert_ok {
    ($expr:expr) => {
        match $expr {
            Ok(value) => value,
            Err(e) => panic!("assertion failed: expected Ok, got Err({:?})", e),
        }
    };
    ($expr:expr, $($arg:tt)+) => {
        match $expr {
            Ok(value) => value,
            Err(e) => panic!(
                "assertion failed: {}: expected Ok, got Err({:?})",
                format_args!($($arg)+),
                e
            ),
        }
    };
}

/// Assert that a result is `Err` and evaluate to the error.
#[macro_export]
macro_rules! assert_err {
    ($expr:expr) => {
        match $expr {
            Err(e) => e,
            Ok(v) => panic!("assertion failed: expected Err, got Ok({:?})", v),
        }
    };
    ($expr:expr, $($arg:tt)+) => {
        match $expr {
            Err(e) => e,
            Ok(v) => panic!(
                "assertion failed: {}: expected Err, got Ok({:?})",
                format_args!($($arg)+),
                v
            ),
        }
    };
}

/// Assert that a result is an error matching a pattern.
///
/// ```ignore
/// assert_err_variant!(registry.push(modal), DarkroomError::DuplicateModal(_));
/// ```
#[macro_export]
macro_rules! assert_err_variant {
    ($expr:expr, $variant:pat) => {
        match &$expr {
            Err($variant) => (),
            Err(e) => panic!(
                "assertion failed: expected {}, got {:?}",
                stringify!($variant),
                e
            ),
            Ok(v) => panic!(
                "assertion failed: expected Err({}), got Ok({:?})",
                stringify!($variant),
                v
            ),
        }
    };
}

/// Whether the rendered error mentions `needle`.
pub fn error_contains(error: &DarkroomError, needle: &str) -> bool {
    error.to_string().contains(needle)
}

/// Whether `error` is a configuration error naming `key`.
pub fn config_error_for_key(error: &DarkroomError, key: &str) -> bool {
    matches!(error, DarkroomError::Config(msg) if msg.contains(key))
}

/// Partial JSON match: objects in `pattern` only need a subset of the keys
/// in `actual`; arrays must match element by element; scalars must be equal.
pub fn json_matches(actual: &Value, pattern: &Value) -> bool {
    match (actual, pattern) {
        (Value::Object(actual), Value::Object(pattern)) => {
            pattern.iter().all(|(key, expected)| {
                actual
                    .get(key)
                    .is_some_and(|value| json_matches(value, expected))
            })
        }
        (Value::Array(actual), Value::Array(pattern)) => {
            actual.len() == pattern.len()
                && actual.iter().zip(pattern).all(|(a, p)| json_matches(a, p))
        }
        _ => actual == pattern,
    }
}
