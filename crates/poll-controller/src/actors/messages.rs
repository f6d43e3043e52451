//! Message types for actor communication.
//!
//! All inter-actor communication uses strongly-typed message passing via
//! `tokio::sync::mpsc`. Response patterns use `tokio::sync::oneshot` for
//! request-reply semantics. The public projection types (infos, results,
//! stats) are serializable so the read-only HTTP surface can return them
//! without re-mapping.

use crate::errors::PcError;
use crate::results::{QuestionResult, QuestionResults};

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use tokio::sync::oneshot;

use super::session::SessionActorHandle;

/// Messages sent to `SessionRegistryActor`.
#[derive(Debug)]
pub enum RegistryMessage {
    /// Create a new session owned by the given moderator.
    CreateSession {
        moderator_id: String,
        /// Response channel for the session actor handle or error.
        respond_to: oneshot::Sender<Result<SessionActorHandle, PcError>>,
    },

    /// Resolve a session actor handle by one of the identity maps.
    Resolve {
        key: SessionKey,
        /// Response channel for the session actor handle or error.
        respond_to: oneshot::Sender<Result<SessionActorHandle, PcError>>,
    },

    /// Admit a participant into a session.
    Join {
        session_id: String,
        participant_id: String,
        display_name: String,
        /// Response channel for the join result.
        respond_to: oneshot::Sender<Result<JoinResult, PcError>>,
    },

    /// Remove a participant (explicit leave or transport disconnect).
    Leave {
        participant_id: String,
        reason: LeaveReason,
        /// Response channel for confirmation.
        respond_to: oneshot::Sender<Result<(), PcError>>,
    },

    /// The moderator's transport connection dropped (notification-only).
    ModeratorDisconnected {
        moderator_id: String,
        /// Response channel for confirmation.
        respond_to: oneshot::Sender<Result<(), PcError>>,
    },

    /// Delete a session, cancelling any pending deadline timer first.
    DeleteSession {
        session_id: String,
        /// Response channel for confirmation.
        respond_to: oneshot::Sender<Result<(), PcError>>,
    },

    /// Get aggregate statistics across all sessions.
    GetStats {
        /// Response channel for registry statistics.
        respond_to: oneshot::Sender<RegistryStats>,
    },

    /// Initiate graceful shutdown (SIGTERM received).
    Shutdown {
        /// Response channel for confirmation.
        respond_to: oneshot::Sender<Result<(), PcError>>,
    },
}

/// Identity key for resolving a session.
#[derive(Debug, Clone)]
pub enum SessionKey {
    /// Look up by session id.
    ById(String),
    /// Look up by the owning moderator's id.
    ByModerator(String),
    /// Look up by a member participant's id.
    ByParticipant(String),
}

/// Messages sent to `SessionActor`.
#[derive(Debug)]
pub enum SessionMessage {
    /// Admit a participant (registry-routed; admission checks happen here).
    Join {
        participant_id: String,
        display_name: String,
        /// Response channel for the join result.
        respond_to: oneshot::Sender<Result<JoinResult, PcError>>,
    },

    /// Remove a participant from the session.
    Leave {
        participant_id: String,
        reason: LeaveReason,
        /// Response channel for confirmation.
        respond_to: oneshot::Sender<Result<(), PcError>>,
    },

    /// Open a new question with a deadline.
    OpenQuestion {
        text: String,
        options: Vec<String>,
        deadline: Duration,
        /// Response channel for the opened question projection.
        respond_to: oneshot::Sender<Result<QuestionInfo, PcError>>,
    },

    /// Record one participant's answer to the active question.
    SubmitAnswer {
        participant_id: String,
        question_id: String,
        option_id: String,
        /// Response channel for the submit outcome.
        respond_to: oneshot::Sender<Result<SubmitOutcome, PcError>>,
    },

    /// Close whatever question is active (moderator's "end early").
    EndQuestion {
        /// Response channel for the close snapshot.
        respond_to: oneshot::Sender<Result<QuestionResult, PcError>>,
    },

    /// Request a close of the named question.
    ///
    /// Fired by the deadline timer and by duplicate-trigger races; a stale
    /// question id makes this a silent no-op, so no response channel.
    RequestClose {
        question_id: String,
        reason: CloseReason,
    },

    /// The moderator's connection dropped (broadcast only, state untouched).
    ModeratorLost,

    /// Get the full session projection (for the inspection API).
    GetDetail {
        /// Response channel for the session detail.
        respond_to: oneshot::Sender<SessionDetail>,
    },

    /// Get the live aggregation of the active question.
    GetResults {
        /// Response channel for the aggregation or error.
        respond_to: oneshot::Sender<Result<QuestionResults, PcError>>,
    },

    /// Get the append-only history of closed questions.
    GetHistory {
        /// Response channel for the history.
        respond_to: oneshot::Sender<Vec<QuestionResult>>,
    },
}

// ----------------------------------------------------------------------------
// Supporting Types
// ----------------------------------------------------------------------------

/// Session lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// No question open; waiting for the moderator.
    Waiting,
    /// A question is open and accepting answers.
    Active,
    /// Session has been shut down.
    Ended,
}

/// Why a question closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// The deadline timer fired.
    Deadline,
    /// Every current participant had answered.
    AllAnswered,
    /// The moderator ended the question early.
    Manual,
}

impl CloseReason {
    /// Returns the reason as a string for metric labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            CloseReason::Deadline => "deadline",
            CloseReason::AllAnswered => "all_answered",
            CloseReason::Manual => "manual",
        }
    }
}

/// Why a participant left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaveReason {
    /// Participant chose to leave.
    Voluntary,
    /// Transport connection dropped.
    Disconnected,
    /// Removed by the moderator.
    Removed,
}

/// Projection of one participant.
#[derive(Debug, Clone, Serialize)]
pub struct ParticipantInfo {
    /// Participant id.
    pub participant_id: String,
    /// Display name (unique within the session, case-insensitive).
    pub display_name: String,
    /// Join timestamp.
    pub joined_at: DateTime<Utc>,
    /// Whether this participant has answered the active question.
    pub has_answered: bool,
}

/// Projection of one answer option (no tallies; see `OptionCount`).
#[derive(Debug, Clone, Serialize)]
pub struct OptionInfo {
    /// Option id.
    pub option_id: String,
    /// Option text.
    pub text: String,
}

/// Projection of an open question.
#[derive(Debug, Clone, Serialize)]
pub struct QuestionInfo {
    /// Question id.
    pub question_id: String,
    /// Question text.
    pub text: String,
    /// Options in display order.
    pub options: Vec<OptionInfo>,
    /// When the question opened.
    pub opened_at: DateTime<Utc>,
    /// Deadline in seconds from `opened_at`.
    pub deadline_seconds: u64,
}

/// Result of a successful join.
#[derive(Debug, Clone)]
pub struct JoinResult {
    /// The admitted participant.
    pub participant: ParticipantInfo,
    /// Everyone currently in the session, the new participant included.
    pub participants: Vec<ParticipantInfo>,
    /// The open question, if one is in flight when the participant joins.
    pub active_question: Option<QuestionInfo>,
}

/// Result of a successful answer submission.
#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    /// Id of the question answered.
    pub question_id: String,
    /// Participants answered so far.
    pub answered: usize,
    /// Current participant count.
    pub total: usize,
    /// Set when this submission was the one that closed the question.
    pub closed: Option<QuestionResult>,
}

/// Full session projection (for the inspection API).
#[derive(Debug, Clone, Serialize)]
pub struct SessionDetail {
    /// Session id.
    pub session_id: String,
    /// Owning moderator id.
    pub moderator_id: String,
    /// Lifecycle status.
    pub status: SessionStatus,
    /// Session creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Current participants.
    pub participants: Vec<ParticipantInfo>,
    /// The open question, if any.
    pub active_question: Option<QuestionInfo>,
    /// Number of questions already closed.
    pub questions_asked: usize,
}

/// Aggregate statistics across all sessions.
#[derive(Debug, Clone, Serialize)]
pub struct RegistryStats {
    /// Active session count.
    pub session_count: usize,
    /// Participants across all sessions.
    pub participant_count: usize,
    /// Questions currently open across all sessions.
    pub open_questions: usize,
    /// Whether the registry is draining.
    pub is_draining: bool,
    /// Current registry mailbox depth.
    pub mailbox_depth: usize,
}

/// Event fanned out on a session's broadcast channel.
///
/// The transport layer subscribes per session and maps these onto its own
/// wire messages; a lagging subscriber never blocks the session actor.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A participant was admitted.
    ParticipantJoined(ParticipantInfo),
    /// A participant left or was removed.
    ParticipantLeft {
        participant_id: String,
        display_name: String,
        reason: LeaveReason,
    },
    /// A new question opened.
    QuestionOpened(QuestionInfo),
    /// Answer tally progressed.
    AnswerProgress {
        question_id: String,
        answered: usize,
        total: usize,
    },
    /// The question closed; snapshot attached.
    QuestionClosed(QuestionResult),
    /// The moderator's connection dropped (session stays alive).
    ModeratorLost,
    /// The session was deleted or the controller is shutting down.
    SessionEnded,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_session_status_equality() {
        assert_eq!(SessionStatus::Waiting, SessionStatus::Waiting);
        assert_ne!(SessionStatus::Waiting, SessionStatus::Active);
        assert_ne!(SessionStatus::Active, SessionStatus::Ended);
    }

    #[test]
    fn test_close_reason_serializes_snake_case() {
        let json = serde_json::to_string(&CloseReason::AllAnswered).unwrap();
        assert_eq!(json, "\"all_answered\"");
        let json = serde_json::to_string(&CloseReason::Deadline).unwrap();
        assert_eq!(json, "\"deadline\"");
    }

    #[test]
    fn test_leave_reason_equality() {
        assert_eq!(LeaveReason::Voluntary, LeaveReason::Voluntary);
        assert_ne!(LeaveReason::Voluntary, LeaveReason::Disconnected);
    }

    #[test]
    fn test_participant_info_clone() {
        let info = ParticipantInfo {
            participant_id: "p1".to_string(),
            display_name: "Ada".to_string(),
            joined_at: Utc::now(),
            has_answered: false,
        };
        let cloned = info.clone();
        assert_eq!(info.participant_id, cloned.participant_id);
        assert_eq!(info.display_name, cloned.display_name);
    }

    #[test]
    fn test_session_event_variants() {
        let progress = SessionEvent::AnswerProgress {
            question_id: "q1".to_string(),
            answered: 1,
            total: 3,
        };
        assert!(matches!(progress, SessionEvent::AnswerProgress { .. }));

        let lost = SessionEvent::ModeratorLost;
        assert!(matches!(lost, SessionEvent::ModeratorLost));
    }
}
