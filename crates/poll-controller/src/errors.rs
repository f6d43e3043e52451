//! Poll Controller error types.
//!
//! Error types map to numeric client error codes for transport responses.
//! Internal details are logged server-side but not exposed to clients.

use thiserror::Error;

/// Poll Controller error type.
///
/// Maps to client `ErrorCode` values:
/// - validation errors: `INVALID_ARGUMENT` (1)
/// - not-found errors: `NOT_FOUND` (4)
/// - state-conflict errors: `CONFLICT` (5)
/// - `Internal`: `INTERNAL_ERROR` (6)
/// - `SessionFull`, `Draining`: `CAPACITY_EXCEEDED` (7)
#[derive(Debug, Error)]
pub enum PcError {
    /// Session not found.
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Participant not found.
    #[error("Participant not found: {0}")]
    ParticipantNotFound(String),

    /// Moderator already owns an active session.
    #[error("Moderator already has an active session")]
    AlreadyModerating,

    /// Participant identity is already registered in a session.
    #[error("Participant already in a session")]
    AlreadyJoined,

    /// Session is at its participant limit.
    #[error("Session is full (limit {limit})")]
    SessionFull { limit: usize },

    /// Display name is already taken within the session (case-insensitive).
    #[error("Display name already taken: {0}")]
    DuplicateName(String),

    /// A question is already open on the session.
    #[error("A question is already active")]
    QuestionAlreadyActive,

    /// The session has no open question.
    #[error("No active question")]
    NoActiveQuestion,

    /// Supplied question id does not name the active question.
    #[error("Question id does not match the active question")]
    QuestionMismatch,

    /// Participant has already answered the active question.
    #[error("Participant has already answered")]
    AlreadyAnswered,

    /// Option id does not name an option of the active question.
    #[error("Option not found: {0}")]
    InvalidOption(String),

    /// A question needs at least two options.
    #[error("A question needs at least {min} options, got {got}")]
    TooFewOptions { min: usize, got: usize },

    /// Too many options for one question.
    #[error("Too many options, got {got} (limit {limit})")]
    TooManyOptions { limit: usize, got: usize },

    /// Two options share the same text.
    #[error("Duplicate option text: {0}")]
    DuplicateOption(String),

    /// Deadline outside the configured range.
    #[error("Deadline out of range: {got}s (allowed {min}..={max})")]
    DeadlineOutOfRange { got: u64, min: u64, max: u64 },

    /// Registry is draining (graceful shutdown).
    #[error("Registry is draining")]
    Draining,

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PcError {
    /// Returns the numeric client `ErrorCode` value for this error.
    #[must_use]
    pub fn error_code(&self) -> i32 {
        match self {
            PcError::TooFewOptions { .. }
            | PcError::TooManyOptions { .. }
            | PcError::DuplicateOption(_)
            | PcError::DeadlineOutOfRange { .. } => 1, // INVALID_ARGUMENT
            PcError::SessionNotFound(_)
            | PcError::ParticipantNotFound(_)
            | PcError::InvalidOption(_) => 4, // NOT_FOUND
            PcError::AlreadyModerating
            | PcError::AlreadyJoined
            | PcError::DuplicateName(_)
            | PcError::QuestionAlreadyActive
            | PcError::NoActiveQuestion
            | PcError::QuestionMismatch
            | PcError::AlreadyAnswered => 5, // CONFLICT
            PcError::Internal(_) => 6,       // INTERNAL_ERROR
            PcError::SessionFull { .. } | PcError::Draining => 7, // CAPACITY_EXCEEDED
        }
    }

    /// Returns a client-safe error message (no internal details, no raw ids).
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            PcError::Internal(_) => "An internal error occurred".to_string(),
            PcError::SessionNotFound(_) => "Session not found".to_string(),
            PcError::ParticipantNotFound(_) => "Participant not found".to_string(),
            PcError::InvalidOption(_) => "Option not found".to_string(),
            PcError::DuplicateName(_) => "Display name already taken".to_string(),
            other => other.to_string(),
        }
    }
}
