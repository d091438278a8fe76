//! Sensor readings parsed from serial lines

use std::fmt;

/// One integer value received from the board
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reading(pub i64);

impl Reading {
    /// Payload published to the broker (decimal string form)
    pub fn payload(&self) -> String {
        self.0.to_string()
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Parse a serial line into a reading
///
/// Surrounding whitespace (including the `\r\n` terminator) is ignored.
/// Returns `None` for empty lines and anything that is not a plain decimal
/// integer that fits in an `i64`.
pub fn parse_reading(line: &str) -> Option<Reading> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<i64>().ok().map(Reading)
}
