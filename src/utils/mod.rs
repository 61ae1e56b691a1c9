//! Utilities module for logging, errors, and helper functions
//!
//! This module provides:
//! - Structured logging with tracing
//! - The crate error type
//! - Small formatting helpers used by the CLI

use std::time::Duration;

pub mod error;
pub mod logging;

// Re-export main types for convenience
pub use error::{CelestialError, Result};
pub use logging::init_logging;

/// Render a wall-clock duration as `12.3s`, `4m 05s` or `2h 07m`
pub fn format_duration(elapsed: Duration) -> String {
    let tenths = elapsed.as_millis() / 100;
    if tenths < 600 {
        return format!("{}.{}s", tenths / 10, tenths % 10);
    }

    let secs = elapsed.as_secs();
    if secs < 3600 {
        format!("{}m {:02}s", secs / 60, secs % 60)
    } else {
        format!("{}h {:02}m", secs / 3600, secs % 3600 / 60)
    }
}

/// Group decimal digits in threes: `1234567` becomes `1,234,567`
pub fn format_number(n: usize) -> String {
    let digits = n.to_string();
    let head = match digits.len() % 3 {
        0 => 3,
        r => r,
    };

    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    out.push_str(&digits[..head]);
    for start in (head..digits.len()).step_by(3) {
        out.push(',');
        out.push_str(&digits[start..start + 3]);
    }
    out
}
