//! Error types for hdsflow-media.

use crate::boxes::BoxType;
use thiserror::Error;

/// Result type for hdsflow-media operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for hdsflow-media operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A read or skip would run past the end of the available bytes.
    #[error("Buffer underflow: need {need} bytes, have {have}")]
    BufferUnderflow { need: usize, have: usize },

    /// A box declares more bytes than the enclosing buffer holds.
    #[error("Box {box_type} declares {declared} bytes but only {available} remain")]
    BoxOverrun {
        box_type: BoxType,
        declared: u64,
        available: usize,
    },

    /// A box length smaller than its own header.
    #[error("Box {box_type} has invalid length {declared}")]
    BoxTooShort { box_type: BoxType, declared: u64 },

    /// The box at this position carries an unexpected tag.
    #[error("Expected {expected} box, found {found}")]
    UnexpectedBox { expected: BoxType, found: BoxType },

    /// A NUL-terminated string ran off the end of its box.
    #[error("Unterminated {0} string")]
    UnterminatedString(&'static str),

    /// A table holds more entries than the fixed limit allows.
    #[error("Too many {what}: {count} (max: {max})")]
    LimitExceeded {
        what: &'static str,
        count: usize,
        max: usize,
    },

    /// Structurally valid but semantically unusable bootstrap.
    #[error("Invalid bootstrap: {0}")]
    InvalidBootstrap(String),

    /// No fragment-run entry covers the requested fragment.
    #[error("No fragment run covers fragment {fragment}")]
    FragmentRunNotFound { fragment: u32 },

    /// A discontinuity entry is the last entry of the fragment-run table.
    #[error("Discontinuity at end of fragment run table (entry {entry})")]
    DiscontinuityAtEnd { entry: usize },

    /// The downloaded fragment has no `mdat` box.
    #[error("No mdat payload in fragment")]
    PayloadNotFound,
}

impl Error {
    /// Create an invalid bootstrap error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidBootstrap(msg.into())
    }

    /// Whether this error makes a bootstrap (and its stream variant) unusable.
    pub fn is_parse_error(&self) -> bool {
        matches!(
            self,
            Self::BufferUnderflow { .. }
                | Self::BoxOverrun { .. }
                | Self::BoxTooShort { .. }
                | Self::UnexpectedBox { .. }
                | Self::UnterminatedString(_)
                | Self::LimitExceeded { .. }
                | Self::InvalidBootstrap(_)
        )
    }

    /// Whether this error came from fragment numbering.
    pub fn is_scheduling_error(&self) -> bool {
        matches!(
            self,
            Self::FragmentRunNotFound { .. } | Self::DiscontinuityAtEnd { .. }
        )
    }
}
