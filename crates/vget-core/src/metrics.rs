//! Engagement-count normalization for catalog metrics.
//!
//! The catalog service delivers counts either as JSON numbers or as
//! human-readable strings ("1.2K", "3M", "1,234"). Filtering needs
//! comparable magnitudes, and malformed upstream data must not break it,
//! so parsing always yields a number and never an error.

use serde::{Deserialize, Serialize};

/// A count as delivered on the wire: plain number or suffixed string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Metric {
    Number(f64),
    Text(String),
}

impl Default for Metric {
    fn default() -> Self {
        Metric::Number(0.0)
    }
}

impl Metric {
    /// Numeric magnitude of this metric. Unparseable or negative input is 0.
    pub fn value(&self) -> u64 {
        match self {
            Metric::Number(n) if n.is_finite() && *n > 0.0 => n.round() as u64,
            Metric::Number(_) => 0,
            Metric::Text(s) => parse_metric(s),
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Metric::Number(n) => write!(f, "{}", n),
            Metric::Text(s) => write!(f, "{}", s),
        }
    }
}

/// Parses a human-readable count into a magnitude.
///
/// Case-insensitive K/M/B suffixes multiply by 1e3/1e6/1e9; thousands
/// separators are stripped. Empty or unparseable input yields 0.
pub fn parse_metric(raw: &str) -> u64 {
    let clean = raw.trim().replace(',', "").to_ascii_uppercase();
    if clean.is_empty() {
        return 0;
    }

    let (digits, multiplier) = match clean.as_bytes().last() {
        Some(b'K') => (&clean[..clean.len() - 1], 1_000.0),
        Some(b'M') => (&clean[..clean.len() - 1], 1_000_000.0),
        Some(b'B') => (&clean[..clean.len() - 1], 1_000_000_000.0),
        _ => (clean.as_str(), 1.0),
    };

    match digits.trim().parse::<f64>() {
        Ok(n) if n.is_finite() && n > 0.0 => (n * multiplier).round() as u64,
        _ => 0,
    }
}
