//! Question state and the deadline timer.
//!
//! A `Question` is plain data: id, text, options in display order, open
//! timestamp and deadline duration. The pending deadline timer is NOT part
//! of the question record; the session actor owns a separate
//! [`DeadlineTimer`] and close requests are matched by question id, so a
//! timer outliving its question can never act on the wrong state.

use super::messages::{CloseReason, OptionInfo, QuestionInfo, SessionMessage};

use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// One answer option with its vote counter.
///
/// The counter is mutated only by the answer-submission handler, exactly
/// once per participant per question (minus retractions on leave).
#[derive(Debug)]
pub struct AnswerOption {
    /// Option id.
    pub option_id: String,
    /// Option text.
    pub text: String,
    /// Votes recorded so far.
    pub votes: u32,
}

/// The active question of a session.
#[derive(Debug)]
pub struct Question {
    /// Question id.
    pub question_id: String,
    /// Question text.
    pub text: String,
    /// Options in display order, immutable after creation (counters aside).
    pub options: Vec<AnswerOption>,
    /// When the question opened.
    pub opened_at: DateTime<Utc>,
    /// Deadline duration from `opened_at`.
    pub deadline: Duration,
}

impl Question {
    /// Build a question with zero-vote options from the given texts.
    #[must_use]
    pub fn new(text: String, option_texts: Vec<String>, deadline: Duration) -> Self {
        let options = option_texts
            .into_iter()
            .map(|text| AnswerOption {
                option_id: uuid::Uuid::new_v4().to_string(),
                text,
                votes: 0,
            })
            .collect();

        Self {
            question_id: uuid::Uuid::new_v4().to_string(),
            text,
            options,
            opened_at: Utc::now(),
            deadline,
        }
    }

    /// Mutable access to an option by id.
    pub fn option_mut(&mut self, option_id: &str) -> Option<&mut AnswerOption> {
        self.options.iter_mut().find(|o| o.option_id == option_id)
    }

    /// Public projection of this question (no tallies).
    #[must_use]
    pub fn to_info(&self) -> QuestionInfo {
        QuestionInfo {
            question_id: self.question_id.clone(),
            text: self.text.clone(),
            options: self
                .options
                .iter()
                .map(|o| OptionInfo {
                    option_id: o.option_id.clone(),
                    text: o.text.clone(),
                })
                .collect(),
            opened_at: self.opened_at,
            deadline_seconds: self.deadline.as_secs(),
        }
    }
}

/// A pending deadline timer for one question.
///
/// Armed when a question opens; posts a `RequestClose` back into the
/// session's own mailbox when the deadline elapses, so the callback is just
/// another serialized operation. Cancellation is an opaque token: cancelling
/// is synchronous, and a callback already in flight is caught by the close
/// handler's question-id guard.
#[derive(Debug)]
pub struct DeadlineTimer {
    cancel: CancellationToken,
}

impl DeadlineTimer {
    /// Arm a timer that requests a deadline close for `question_id`.
    ///
    /// The token is a child of the session's token, so session shutdown
    /// cancels pending timers without extra bookkeeping.
    pub fn arm(
        session_tx: mpsc::Sender<SessionMessage>,
        session_id: &str,
        question_id: String,
        deadline: Duration,
        parent: &CancellationToken,
    ) -> Self {
        let cancel = parent.child_token();
        let token = cancel.clone();
        let session_id = session_id.to_string();

        tokio::spawn(async move {
            tokio::select! {
                () = token.cancelled() => {
                    debug!(
                        target: "pc.actor.timer",
                        session_id = %session_id,
                        question_id = %question_id,
                        "Deadline timer cancelled"
                    );
                }
                () = tokio::time::sleep(deadline) => {
                    debug!(
                        target: "pc.actor.timer",
                        session_id = %session_id,
                        question_id = %question_id,
                        "Deadline elapsed, requesting close"
                    );
                    // The session may already be gone; a dead mailbox is fine.
                    let _ = session_tx
                        .send(SessionMessage::RequestClose {
                            question_id,
                            reason: CloseReason::Deadline,
                        })
                        .await;
                }
            }
        });

        Self { cancel }
    }

    /// Cancel the pending timer.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Check whether the timer has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
