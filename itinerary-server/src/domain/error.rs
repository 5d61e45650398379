//! Domain error types.
//!
//! These errors represent validation failures when building schedule
//! entities. They are distinct from provider/IO errors.

/// Domain-level errors for validation and data consistency.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    /// Time-of-day string could not be parsed
    #[error("invalid time {value:?}: {reason}")]
    InvalidTime { value: String, reason: &'static str },

    /// Service date string could not be parsed
    #[error("invalid service date {0:?}: expected YYYYMMDD")]
    InvalidDate(String),

    /// Two schedule entries in one trip share a sequence number
    #[error("trip {trip} has duplicate stop sequence {sequence}")]
    DuplicateSequence { trip: String, sequence: u32 },
}
