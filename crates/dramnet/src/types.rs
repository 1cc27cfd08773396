//! Result types surfaced to the host framework.

use std::time::{SystemTime, UNIX_EPOCH};

/// Opaque storage generation token.
///
/// Client writes stamp a fresh token on success; server-local operations
/// stamp a nanosecond timestamp. The empty token marks "no value".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation(String);

impl Generation {
    /// A fresh opaque token.
    #[must_use]
    pub fn token() -> Self {
        Self(ulid::Ulid::new().to_string())
    }

    /// A token derived from the current time, for server-local stamps.
    #[must_use]
    pub fn from_nanos(nanos: u128) -> Self {
        Self(nanos.to_string())
    }

    /// The "no value" generation carried by missing reads.
    #[must_use]
    pub fn no_value() -> Self {
        Self(String::new())
    }

    /// Whether this is the "no value" generation.
    #[must_use]
    pub fn is_no_value(&self) -> bool {
        self.0.is_empty()
    }

    /// The token text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Generation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A generation with the wall-clock time it was stamped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampedGeneration {
    pub generation: Generation,
    pub time: SystemTime,
}

impl TimestampedGeneration {
    /// Stamps `generation` with the current time.
    #[must_use]
    pub fn new(generation: Generation) -> Self {
        Self {
            generation,
            time: SystemTime::now(),
        }
    }
}

/// Nanoseconds since the Unix epoch, for server-local generation stamps.
#[must_use]
pub(crate) fn now_nanos() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0)
}

/// Outcome of a read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadState {
    /// The key was present with this value.
    Value(Vec<u8>),
    /// The key was absent (or the response could not be trusted).
    Missing,
}

/// A read outcome with its generation stamp.
#[derive(Debug, Clone)]
pub struct ReadResult {
    pub state: ReadState,
    pub stamp: TimestampedGeneration,
}

impl ReadResult {
    /// A successful read carrying `value`.
    #[must_use]
    pub fn with_value(value: Vec<u8>) -> Self {
        Self {
            state: ReadState::Value(value),
            stamp: TimestampedGeneration::new(Generation::token()),
        }
    }

    /// A missing-key result.
    #[must_use]
    pub fn missing() -> Self {
        Self {
            state: ReadState::Missing,
            stamp: TimestampedGeneration::new(Generation::no_value()),
        }
    }

    /// Whether the key was absent.
    #[must_use]
    pub fn is_missing(&self) -> bool {
        matches!(self.state, ReadState::Missing)
    }

    /// The value, if present.
    #[must_use]
    pub fn value(&self) -> Option<&[u8]> {
        match &self.state {
            ReadState::Value(value) => Some(value),
            ReadState::Missing => None,
        }
    }

    /// Consumes the result, returning the value if present.
    #[must_use]
    pub fn into_value(self) -> Option<Vec<u8>> {
        match self.state {
            ReadState::Value(value) => Some(value),
            ReadState::Missing => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_tokens_are_distinct() {
        assert_ne!(Generation::token(), Generation::token());
    }

    #[test]
    fn no_value_generation() {
        assert!(Generation::no_value().is_no_value());
        assert!(!Generation::token().is_no_value());
    }

    #[test]
    fn read_result_accessors() {
        let hit = ReadResult::with_value(b"v".to_vec());
        assert!(!hit.is_missing());
        assert_eq!(hit.value(), Some(&b"v"[..]));
        assert!(!hit.stamp.generation.is_no_value());

        let miss = ReadResult::missing();
        assert!(miss.is_missing());
        assert_eq!(miss.value(), None);
        assert!(miss.stamp.generation.is_no_value());
        assert_eq!(miss.into_value(), None);
    }
}
