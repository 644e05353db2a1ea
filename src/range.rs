//! Range token parsing for partial downloads and uploads.
//!
//! Clients request sub-ranges with a path segment of the form `0-N`, where
//! `N` is the inclusive end offset. The byte count is therefore `N + 1`,
//! except that `0-0` is a latency probe and transfers nothing.

use std::fmt;

/// Token used by clients for a pure round-trip probe.
pub const PROBE_TOKEN: &str = "0-0";

/// Decoded range token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeSpec {
    /// `0-0`: respond without transferring any data
    Probe,
    /// `0-N`: transfer `N + 1` bytes
    Bytes(u64),
}

impl RangeSpec {
    /// Parse `token` and check the resulting byte count against `max_bytes`.
    ///
    /// A byte count equal to `max_bytes` is accepted.
    pub fn parse(token: &str, max_bytes: u64) -> Result<Self, RangeError> {
        if token == PROBE_TOKEN {
            return Ok(RangeSpec::Probe);
        }

        let mut parts = token.split('-');
        let (start, end) = match (parts.next(), parts.next(), parts.next()) {
            (Some(start), Some(end), None) => (start, end),
            _ => return Err(RangeError::Syntax(token.to_string())),
        };
        if start != "0" {
            return Err(RangeError::Syntax(token.to_string()));
        }
        // u64::from_str accepts a leading '+', the wire format does not
        if end.is_empty() || !end.bytes().all(|b| b.is_ascii_digit()) {
            return Err(RangeError::Syntax(token.to_string()));
        }
        let end: u64 = end
            .parse()
            .map_err(|_| RangeError::Syntax(token.to_string()))?;

        let count = end.checked_add(1).ok_or(RangeError::TooLarge {
            requested: None,
            max: max_bytes,
        })?;
        if count > max_bytes {
            return Err(RangeError::TooLarge {
                requested: Some(count),
                max: max_bytes,
            });
        }

        Ok(RangeSpec::Bytes(count))
    }

    /// Number of bytes this range transfers.
    pub fn byte_count(&self) -> u64 {
        match self {
            RangeSpec::Probe => 0,
            RangeSpec::Bytes(count) => *count,
        }
    }
}

/// Range validation errors. Both variants surface to clients as a 400.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RangeError {
    /// Token is not of the form `0-N`
    Syntax(String),
    /// `N + 1` exceeds the configured maximum (`None` when it overflows u64)
    TooLarge { requested: Option<u64>, max: u64 },
}

impl fmt::Display for RangeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RangeError::Syntax(token) => {
                write!(f, "Invalid range format '{}', expected 0-{{N}}", token)
            }
            RangeError::TooLarge {
                requested: Some(requested),
                max,
            } => write!(f, "Range of {} bytes exceeds maximum of {}", requested, max),
            RangeError::TooLarge {
                requested: None,
                max,
            } => write!(f, "Range overflows, maximum is {} bytes", max),
        }
    }
}

impl std::error::Error for RangeError {}
