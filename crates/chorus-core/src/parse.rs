//! Typed parsing of loosely-typed source fields.
//!
//! Source payloads carry timestamps as floats and counters as whatever
//! the upstream happened to emit. Every consumer goes through these
//! functions instead of normalising inline, so a bad field drops one
//! item with a stated reason rather than poisoning the batch.

use chrono::{DateTime, Utc};

/// Result of parsing one field: usable value, or a reason to skip the item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parsed<T> {
    Ok(T),
    Skip(&'static str),
}

impl<T> Parsed<T> {
    pub fn ok(self) -> Option<T> {
        match self {
            Parsed::Ok(v) => Some(v),
            Parsed::Skip(_) => None,
        }
    }
}

/// Parse an epoch-seconds float into a UTC timestamp.
pub fn epoch_secs(raw: f64) -> Parsed<DateTime<Utc>> {
    if !raw.is_finite() {
        return Parsed::Skip("timestamp is not a finite number");
    }
    if raw < 0.0 {
        return Parsed::Skip("timestamp is negative");
    }
    match DateTime::from_timestamp(raw as i64, 0) {
        Some(ts) => Parsed::Ok(ts),
        None => Parsed::Skip("timestamp out of range"),
    }
}

/// Parse a sentiment value, which must lie in [-1, +1].
pub fn sentiment(raw: f64) -> Parsed<f64> {
    if !raw.is_finite() {
        return Parsed::Skip("sentiment is not a finite number");
    }
    if !(-1.0..=1.0).contains(&raw) {
        return Parsed::Skip("sentiment outside [-1, 1]");
    }
    Parsed::Ok(raw)
}
