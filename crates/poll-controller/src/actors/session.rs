//! `SessionActor` - per-session actor that owns all session state.
//!
//! Each `SessionActor`:
//! - Owns one session's participants, active question and result history
//! - Runs the question open/close state machine, including the deadline race
//! - Fans events out on a per-session broadcast channel for the transport
//!
//! # Close semantics
//!
//! A question closes exactly once no matter how many triggers fire. The
//! deadline timer, the all-answered check and the moderator's manual end all
//! funnel into `close_question`, which matches the trigger against the
//! active question id and then `take`s the active question. Taking the
//! question is the linearization point: the second trigger finds it empty
//! and exits without touching anything.

use crate::config::SessionLimits;
use crate::errors::PcError;
use crate::results::{self, QuestionResult, QuestionResults};

use super::messages::{
    CloseReason, JoinResult, LeaveReason, ParticipantInfo, QuestionInfo, SessionDetail,
    SessionEvent, SessionMessage, SessionStatus, SubmitOutcome,
};
use super::metrics::{ActorMetrics, ActorType, MailboxMonitor};
use super::question::{DeadlineTimer, Question};

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Default channel buffer size for the session mailbox.
const SESSION_CHANNEL_BUFFER: usize = 200;

/// Buffer size for the per-session event fan-out channel.
const EVENT_CHANNEL_BUFFER: usize = 256;

/// Minimum options a question must carry.
const MIN_OPTIONS: usize = 2;

/// One participant's state within a session.
///
/// Created on join, destroyed on leave/removal/disconnect; never shared
/// across sessions. `has_answered` is a one-way flag reset only when a new
/// question opens.
#[derive(Debug)]
pub struct Participant {
    /// Participant id.
    pub participant_id: String,
    /// Display name, unique within the session (case-insensitive).
    pub display_name: String,
    /// Join timestamp.
    pub joined_at: DateTime<Utc>,
    /// Whether this participant has answered the active question.
    pub has_answered: bool,
    /// The chosen option id, if answered.
    pub answer: Option<String>,
}

impl Participant {
    fn to_info(&self) -> ParticipantInfo {
        ParticipantInfo {
            participant_id: self.participant_id.clone(),
            display_name: self.display_name.clone(),
            joined_at: self.joined_at,
            has_answered: self.has_answered,
        }
    }
}

/// Handle to a `SessionActor`.
#[derive(Clone, Debug)]
pub struct SessionActorHandle {
    sender: mpsc::Sender<SessionMessage>,
    events: broadcast::Sender<SessionEvent>,
    cancel_token: CancellationToken,
    session_id: String,
    moderator_id: String,
}

impl SessionActorHandle {
    /// Get the session ID.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Get the owning moderator's ID.
    #[must_use]
    pub fn moderator_id(&self) -> &str {
        &self.moderator_id
    }

    /// Subscribe to this session's event stream.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Admit a participant into the session.
    pub async fn join(
        &self,
        participant_id: String,
        display_name: String,
    ) -> Result<JoinResult, PcError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SessionMessage::Join {
                participant_id,
                display_name,
                respond_to: tx,
            })
            .await
            .map_err(|e| PcError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| PcError::Internal(format!("response receive failed: {e}")))?
    }

    /// Remove a participant from the session.
    pub async fn leave(
        &self,
        participant_id: String,
        reason: LeaveReason,
    ) -> Result<(), PcError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SessionMessage::Leave {
                participant_id,
                reason,
                respond_to: tx,
            })
            .await
            .map_err(|e| PcError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| PcError::Internal(format!("response receive failed: {e}")))?
    }

    /// Open a new question with a deadline.
    pub async fn open_question(
        &self,
        text: String,
        options: Vec<String>,
        deadline: Duration,
    ) -> Result<QuestionInfo, PcError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SessionMessage::OpenQuestion {
                text,
                options,
                deadline,
                respond_to: tx,
            })
            .await
            .map_err(|e| PcError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| PcError::Internal(format!("response receive failed: {e}")))?
    }

    /// Record one participant's answer to the active question.
    pub async fn submit_answer(
        &self,
        participant_id: String,
        question_id: String,
        option_id: String,
    ) -> Result<SubmitOutcome, PcError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SessionMessage::SubmitAnswer {
                participant_id,
                question_id,
                option_id,
                respond_to: tx,
            })
            .await
            .map_err(|e| PcError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| PcError::Internal(format!("response receive failed: {e}")))?
    }

    /// End the active question early (moderator action).
    pub async fn end_question(&self) -> Result<QuestionResult, PcError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SessionMessage::EndQuestion { respond_to: tx })
            .await
            .map_err(|e| PcError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| PcError::Internal(format!("response receive failed: {e}")))?
    }

    /// Request a close of the named question (stale triggers are no-ops).
    pub async fn request_close(
        &self,
        question_id: String,
        reason: CloseReason,
    ) -> Result<(), PcError> {
        self.sender
            .send(SessionMessage::RequestClose {
                question_id,
                reason,
            })
            .await
            .map_err(|e| PcError::Internal(format!("channel send failed: {e}")))
    }

    /// Notify the session that its moderator's connection dropped.
    pub async fn moderator_lost(&self) -> Result<(), PcError> {
        self.sender
            .send(SessionMessage::ModeratorLost)
            .await
            .map_err(|e| PcError::Internal(format!("channel send failed: {e}")))
    }

    /// Get the full session projection.
    pub async fn get_detail(&self) -> Result<SessionDetail, PcError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SessionMessage::GetDetail { respond_to: tx })
            .await
            .map_err(|e| PcError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| PcError::Internal(format!("response receive failed: {e}")))
    }

    /// Get the live aggregation of the active question.
    pub async fn get_results(&self) -> Result<QuestionResults, PcError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SessionMessage::GetResults { respond_to: tx })
            .await
            .map_err(|e| PcError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| PcError::Internal(format!("response receive failed: {e}")))?
    }

    /// Get the append-only history of closed questions.
    pub async fn get_history(&self) -> Result<Vec<QuestionResult>, PcError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SessionMessage::GetHistory { respond_to: tx })
            .await
            .map_err(|e| PcError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| PcError::Internal(format!("response receive failed: {e}")))
    }

    /// Cancel the session actor (cancels any pending deadline timer too).
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Check if the actor is cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

/// The `SessionActor` implementation.
pub struct SessionActor {
    /// Session ID.
    session_id: String,
    /// Owning moderator's ID.
    moderator_id: String,
    /// Message receiver.
    receiver: mpsc::Receiver<SessionMessage>,
    /// Sender into our own mailbox, cloned into deadline timers.
    self_sender: mpsc::Sender<SessionMessage>,
    /// Cancellation token (child of the registry's token).
    cancel_token: CancellationToken,
    /// Admission and question limits.
    limits: SessionLimits,
    /// Participants by ID.
    participants: HashMap<String, Participant>,
    /// Lowercased display name -> participant ID, for admission checks.
    name_index: HashMap<String, String>,
    /// The open question, if any. `Some` iff status is `Active`.
    active_question: Option<Question>,
    /// Pending deadline timer for the active question.
    deadline_timer: Option<DeadlineTimer>,
    /// Append-only history of closed questions.
    history: Vec<QuestionResult>,
    /// Lifecycle status.
    status: SessionStatus,
    /// Session creation timestamp.
    created_at: DateTime<Utc>,
    /// Event fan-out channel.
    events: broadcast::Sender<SessionEvent>,
    /// Shared actor metrics.
    metrics: Arc<ActorMetrics>,
    /// Mailbox monitor.
    mailbox: MailboxMonitor,
}

impl SessionActor {
    /// Spawn a new session actor.
    ///
    /// Returns a handle and the task join handle.
    pub fn spawn(
        session_id: String,
        moderator_id: String,
        limits: SessionLimits,
        cancel_token: CancellationToken,
        metrics: Arc<ActorMetrics>,
    ) -> (SessionActorHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(SESSION_CHANNEL_BUFFER);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_BUFFER);

        let actor = Self {
            session_id: session_id.clone(),
            moderator_id: moderator_id.clone(),
            receiver,
            self_sender: sender.clone(),
            cancel_token: cancel_token.clone(),
            limits,
            participants: HashMap::new(),
            name_index: HashMap::new(),
            active_question: None,
            deadline_timer: None,
            history: Vec::new(),
            status: SessionStatus::Waiting,
            created_at: Utc::now(),
            events: events.clone(),
            metrics,
            mailbox: MailboxMonitor::new(ActorType::Session, &session_id),
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = SessionActorHandle {
            sender,
            events,
            cancel_token,
            session_id,
            moderator_id,
        };

        (handle, task_handle)
    }

    /// Run the actor message loop.
    #[instrument(skip_all, name = "pc.actor.session", fields(session_id = %self.session_id))]
    async fn run(mut self) {
        info!(
            target: "pc.actor.session",
            session_id = %self.session_id,
            moderator_id = %self.moderator_id,
            "SessionActor started"
        );

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "pc.actor.session",
                        session_id = %self.session_id,
                        "SessionActor received cancellation signal"
                    );
                    self.graceful_shutdown();
                    break;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => {
                            self.mailbox.record_enqueue();
                            self.handle_message(message);
                            self.mailbox.record_dequeue();
                            self.metrics.record_message_processed();
                        }
                        None => {
                            info!(
                                target: "pc.actor.session",
                                session_id = %self.session_id,
                                "SessionActor channel closed, exiting"
                            );
                            break;
                        }
                    }
                }
            }
        }

        info!(
            target: "pc.actor.session",
            session_id = %self.session_id,
            participants = self.participants.len(),
            questions_asked = self.history.len(),
            messages_processed = self.mailbox.messages_processed(),
            "SessionActor stopped"
        );
    }

    /// Handle a single message.
    fn handle_message(&mut self, message: SessionMessage) {
        match message {
            SessionMessage::Join {
                participant_id,
                display_name,
                respond_to,
            } => {
                let result = self.handle_join(participant_id, display_name);
                let _ = respond_to.send(result);
            }

            SessionMessage::Leave {
                participant_id,
                reason,
                respond_to,
            } => {
                let result = self.handle_leave(&participant_id, reason);
                let _ = respond_to.send(result);
            }

            SessionMessage::OpenQuestion {
                text,
                options,
                deadline,
                respond_to,
            } => {
                let result = self.handle_open_question(text, options, deadline);
                let _ = respond_to.send(result);
            }

            SessionMessage::SubmitAnswer {
                participant_id,
                question_id,
                option_id,
                respond_to,
            } => {
                let result = self.handle_submit_answer(&participant_id, &question_id, &option_id);
                let _ = respond_to.send(result);
            }

            SessionMessage::EndQuestion { respond_to } => {
                let result = self.handle_end_question();
                let _ = respond_to.send(result);
            }

            SessionMessage::RequestClose {
                question_id,
                reason,
            } => {
                // Stale triggers exit inside close_question
                let _ = self.close_question(&question_id, reason);
            }

            SessionMessage::ModeratorLost => {
                self.handle_moderator_lost();
            }

            SessionMessage::GetDetail { respond_to } => {
                let _ = respond_to.send(self.get_detail());
            }

            SessionMessage::GetResults { respond_to } => {
                let _ = respond_to.send(self.get_results());
            }

            SessionMessage::GetHistory { respond_to } => {
                let _ = respond_to.send(self.history.clone());
            }
        }
    }

    /// Handle a participant joining.
    #[instrument(skip_all, fields(session_id = %self.session_id))]
    fn handle_join(
        &mut self,
        participant_id: String,
        display_name: String,
    ) -> Result<JoinResult, PcError> {
        if self.participants.contains_key(&participant_id) {
            return Err(PcError::AlreadyJoined);
        }

        if self.participants.len() >= self.limits.max_participants {
            return Err(PcError::SessionFull {
                limit: self.limits.max_participants,
            });
        }

        let display_name = display_name.trim().to_string();
        let name_key = display_name.to_lowercase();
        if self.name_index.contains_key(&name_key) {
            return Err(PcError::DuplicateName(display_name));
        }

        let participant = Participant {
            participant_id: participant_id.clone(),
            display_name,
            joined_at: Utc::now(),
            has_answered: false,
            answer: None,
        };
        let info = participant.to_info();

        self.name_index.insert(name_key, participant_id.clone());
        self.participants.insert(participant_id, participant);

        self.metrics.participant_joined();
        self.publish(SessionEvent::ParticipantJoined(info.clone()));

        info!(
            target: "pc.actor.session",
            total_participants = self.participants.len(),
            "Participant joined"
        );

        Ok(JoinResult {
            participant: info,
            participants: self.participant_infos(),
            active_question: self.active_question.as_ref().map(Question::to_info),
        })
    }

    /// Handle a participant leaving.
    ///
    /// If the participant had answered the open question, their vote is
    /// retracted so the tally always matches the answered participants
    /// actually present. Their departure may also leave everyone remaining
    /// answered, which closes the question.
    #[instrument(skip_all, fields(session_id = %self.session_id))]
    fn handle_leave(
        &mut self,
        participant_id: &str,
        reason: LeaveReason,
    ) -> Result<(), PcError> {
        let Some(participant) = self.participants.remove(participant_id) else {
            return Err(PcError::ParticipantNotFound(participant_id.to_string()));
        };

        self.name_index
            .remove(&participant.display_name.to_lowercase());

        if participant.has_answered {
            if let (Some(question), Some(option_id)) =
                (self.active_question.as_mut(), participant.answer.as_ref())
            {
                if let Some(option) = question.option_mut(option_id) {
                    option.votes = option.votes.saturating_sub(1);
                }
            }
        }

        self.metrics.participant_left();
        self.publish(SessionEvent::ParticipantLeft {
            participant_id: participant.participant_id.clone(),
            display_name: participant.display_name.clone(),
            reason,
        });

        info!(
            target: "pc.actor.session",
            remaining_participants = self.participants.len(),
            reason = ?reason,
            "Participant left"
        );

        // The departed participant may have been the last one still to answer
        if let Some(question_id) = self.all_answered_question_id() {
            let _ = self.close_question(&question_id, CloseReason::AllAnswered);
        }

        Ok(())
    }

    /// Open a new question.
    #[instrument(skip_all, fields(session_id = %self.session_id))]
    fn handle_open_question(
        &mut self,
        text: String,
        options: Vec<String>,
        deadline: Duration,
    ) -> Result<QuestionInfo, PcError> {
        if self.active_question.is_some() {
            return Err(PcError::QuestionAlreadyActive);
        }

        let got = options.len();
        if got < MIN_OPTIONS {
            return Err(PcError::TooFewOptions {
                min: MIN_OPTIONS,
                got,
            });
        }
        if got > self.limits.max_options {
            return Err(PcError::TooManyOptions {
                limit: self.limits.max_options,
                got,
            });
        }

        let mut seen = HashSet::new();
        for option in &options {
            if !seen.insert(option.trim().to_string()) {
                return Err(PcError::DuplicateOption(option.clone()));
            }
        }

        let deadline_seconds = deadline.as_secs();
        if !self.limits.deadline_in_range(deadline_seconds) {
            return Err(PcError::DeadlineOutOfRange {
                got: deadline_seconds,
                min: self.limits.min_deadline_seconds,
                max: self.limits.max_deadline_seconds,
            });
        }

        // Fresh round: every participant starts unanswered
        for participant in self.participants.values_mut() {
            participant.has_answered = false;
            participant.answer = None;
        }

        let question = Question::new(text, options, deadline);
        let info = question.to_info();

        self.deadline_timer = Some(DeadlineTimer::arm(
            self.self_sender.clone(),
            &self.session_id,
            question.question_id.clone(),
            deadline,
            &self.cancel_token,
        ));
        self.active_question = Some(question);
        self.status = SessionStatus::Active;

        self.metrics.question_opened();
        self.publish(SessionEvent::QuestionOpened(info.clone()));

        info!(
            target: "pc.actor.session",
            question_id = %info.question_id,
            options = info.options.len(),
            deadline_seconds,
            participants = self.participants.len(),
            "Question opened"
        );

        Ok(info)
    }

    /// Record one participant's answer.
    ///
    /// Validation order: active question, question id match, participant
    /// exists, not already answered, option exists. No state changes until
    /// every check has passed.
    #[instrument(skip_all, fields(session_id = %self.session_id))]
    fn handle_submit_answer(
        &mut self,
        participant_id: &str,
        question_id: &str,
        option_id: &str,
    ) -> Result<SubmitOutcome, PcError> {
        {
            let question = self
                .active_question
                .as_mut()
                .ok_or(PcError::NoActiveQuestion)?;
            if question.question_id != question_id {
                return Err(PcError::QuestionMismatch);
            }

            let participant = self
                .participants
                .get_mut(participant_id)
                .ok_or_else(|| PcError::ParticipantNotFound(participant_id.to_string()))?;
            if participant.has_answered {
                return Err(PcError::AlreadyAnswered);
            }

            let option = question
                .option_mut(option_id)
                .ok_or_else(|| PcError::InvalidOption(option_id.to_string()))?;

            // The vote counter and the answered flag move together; the
            // single-writer mailbox makes the pair atomic.
            option.votes += 1;
            participant.has_answered = true;
            participant.answer = Some(option_id.to_string());
        }

        let answered = self
            .participants
            .values()
            .filter(|p| p.has_answered)
            .count();
        let total = self.participants.len();

        self.metrics.answer_recorded();
        self.publish(SessionEvent::AnswerProgress {
            question_id: question_id.to_string(),
            answered,
            total,
        });

        debug!(
            target: "pc.actor.session",
            question_id = %question_id,
            answered,
            total,
            "Answer recorded"
        );

        let closed = if answered == total {
            self.close_question(question_id, CloseReason::AllAnswered)
        } else {
            None
        };

        Ok(SubmitOutcome {
            question_id: question_id.to_string(),
            answered,
            total,
            closed,
        })
    }

    /// Close the active question at the moderator's request.
    fn handle_end_question(&mut self) -> Result<QuestionResult, PcError> {
        let question_id = match &self.active_question {
            Some(question) => question.question_id.clone(),
            None => return Err(PcError::NoActiveQuestion),
        };

        self.close_question(&question_id, CloseReason::Manual)
            .ok_or(PcError::NoActiveQuestion)
    }

    /// The moderator's connection dropped: notify, leave state untouched.
    ///
    /// Any open question still closes on its own deadline; reclaiming the
    /// session is the registry caller's delete decision.
    fn handle_moderator_lost(&mut self) {
        warn!(
            target: "pc.actor.session",
            session_id = %self.session_id,
            moderator_id = %self.moderator_id,
            "Moderator connection lost"
        );
        self.publish(SessionEvent::ModeratorLost);
    }

    /// Close the question named by `question_id`, exactly once.
    ///
    /// Returns the snapshot, or `None` for stale triggers: a timer firing
    /// after the question already closed, a duplicate close request, or a
    /// close for a superseded question. Those are expected races, absorbed
    /// silently.
    fn close_question(
        &mut self,
        question_id: &str,
        reason: CloseReason,
    ) -> Option<QuestionResult> {
        match &self.active_question {
            Some(question) if question.question_id == question_id => {}
            _ => {
                debug!(
                    target: "pc.actor.session",
                    session_id = %self.session_id,
                    question_id = %question_id,
                    reason = ?reason,
                    "Stale close trigger ignored"
                );
                return None;
            }
        }

        // Linearization point: whichever trigger takes the question first
        // wins; the loser sees None and exits above on its turn.
        let question = self.active_question.take()?;
        if let Some(timer) = self.deadline_timer.take() {
            timer.cancel();
        }

        let results = results::aggregate(&question, self.participants.values());
        let result = QuestionResult {
            results,
            closed_at: Utc::now(),
            reason,
        };

        self.history.push(result.clone());
        self.status = SessionStatus::Waiting;

        self.metrics.question_closed(reason);
        self.publish(SessionEvent::QuestionClosed(result.clone()));

        info!(
            target: "pc.actor.session",
            session_id = %self.session_id,
            question_id = %question.question_id,
            reason = ?reason,
            responses = result.results.total_responses,
            "Question closed"
        );

        Some(result)
    }

    /// Get the full session projection.
    fn get_detail(&self) -> SessionDetail {
        SessionDetail {
            session_id: self.session_id.clone(),
            moderator_id: self.moderator_id.clone(),
            status: self.status,
            created_at: self.created_at,
            participants: self.participant_infos(),
            active_question: self.active_question.as_ref().map(Question::to_info),
            questions_asked: self.history.len(),
        }
    }

    /// Get the live aggregation of the active question.
    fn get_results(&self) -> Result<QuestionResults, PcError> {
        match &self.active_question {
            Some(question) => Ok(results::aggregate(question, self.participants.values())),
            None => Err(PcError::NoActiveQuestion),
        }
    }

    /// Current participants as projections, in join order.
    fn participant_infos(&self) -> Vec<ParticipantInfo> {
        let mut infos: Vec<ParticipantInfo> = self
            .participants
            .values()
            .map(Participant::to_info)
            .collect();
        infos.sort_by(|a, b| {
            a.joined_at
                .cmp(&b.joined_at)
                .then_with(|| a.participant_id.cmp(&b.participant_id))
        });
        infos
    }

    /// Active question id if every current participant has answered.
    ///
    /// An empty session never qualifies; a question on an empty session only
    /// closes on its deadline.
    fn all_answered_question_id(&self) -> Option<String> {
        let question = self.active_question.as_ref()?;
        if !self.participants.is_empty()
            && self.participants.values().all(|p| p.has_answered)
        {
            Some(question.question_id.clone())
        } else {
            None
        }
    }

    /// Fan an event out to subscribers, if any.
    fn publish(&self, event: SessionEvent) {
        // No subscribers is fine; the transport may not have attached yet
        let _ = self.events.send(event);
    }

    /// Perform graceful shutdown.
    fn graceful_shutdown(&mut self) {
        if let Some(timer) = self.deadline_timer.take() {
            timer.cancel();
        }
        self.active_question = None;
        self.status = SessionStatus::Ended;
        self.publish(SessionEvent::SessionEnded);

        info!(
            target: "pc.actor.session",
            session_id = %self.session_id,
            participants = self.participants.len(),
            "Session shut down"
        );
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn test_limits() -> SessionLimits {
        SessionLimits::default()
    }

    fn spawn_session(limits: SessionLimits) -> SessionActorHandle {
        let metrics = ActorMetrics::new();
        let cancel_token = CancellationToken::new();
        let (handle, _task) = SessionActor::spawn(
            "session-test".to_string(),
            "moderator-1".to_string(),
            limits,
            cancel_token,
            metrics,
        );
        handle
    }

    async fn join_two(handle: &SessionActorHandle) {
        handle
            .join("p1".to_string(), "Ada".to_string())
            .await
            .unwrap();
        handle
            .join("p2".to_string(), "Grace".to_string())
            .await
            .unwrap();
    }

    fn option_id(info: &QuestionInfo, text: &str) -> String {
        info.options
            .iter()
            .find(|o| o.text == text)
            .map(|o| o.option_id.clone())
            .unwrap()
    }

    #[tokio::test]
    async fn test_join_and_duplicate_name() {
        let handle = spawn_session(test_limits());

        let result = handle.join("p1".to_string(), "Ada".to_string()).await;
        assert!(result.is_ok());

        // Same name, different case
        let result = handle.join("p2".to_string(), "ADA".to_string()).await;
        assert!(matches!(result, Err(PcError::DuplicateName(_))));

        // Same participant id
        let result = handle.join("p1".to_string(), "Other".to_string()).await;
        assert!(matches!(result, Err(PcError::AlreadyJoined)));
    }

    #[tokio::test]
    async fn test_join_session_full() {
        let limits = SessionLimits {
            max_participants: 2,
            ..SessionLimits::default()
        };
        let handle = spawn_session(limits);
        join_two(&handle).await;

        let result = handle.join("p3".to_string(), "Linus".to_string()).await;
        assert!(matches!(result, Err(PcError::SessionFull { limit: 2 })));
    }

    #[tokio::test]
    async fn test_open_question_validations() {
        let handle = spawn_session(test_limits());

        let result = handle
            .open_question(
                "Only one option".to_string(),
                vec!["A".to_string()],
                Duration::from_secs(10),
            )
            .await;
        assert!(matches!(result, Err(PcError::TooFewOptions { .. })));

        let result = handle
            .open_question(
                "Dup options".to_string(),
                vec!["A".to_string(), "A".to_string()],
                Duration::from_secs(10),
            )
            .await;
        assert!(matches!(result, Err(PcError::DuplicateOption(_))));

        let result = handle
            .open_question(
                "Too fast".to_string(),
                vec!["A".to_string(), "B".to_string()],
                Duration::from_secs(1),
            )
            .await;
        assert!(matches!(result, Err(PcError::DeadlineOutOfRange { .. })));

        // Failed opens leave the session without an active question
        let detail = handle.get_detail().await.unwrap();
        assert!(detail.active_question.is_none());
        assert_eq!(detail.status, SessionStatus::Waiting);
    }

    #[tokio::test]
    async fn test_second_question_while_active_fails() {
        let handle = spawn_session(test_limits());
        join_two(&handle).await;

        let first = handle
            .open_question(
                "First?".to_string(),
                vec!["A".to_string(), "B".to_string()],
                Duration::from_secs(10),
            )
            .await
            .unwrap();

        let result = handle
            .open_question(
                "Second?".to_string(),
                vec!["X".to_string(), "Y".to_string()],
                Duration::from_secs(10),
            )
            .await;
        assert!(matches!(result, Err(PcError::QuestionAlreadyActive)));

        // First question untouched
        let detail = handle.get_detail().await.unwrap();
        let active = detail.active_question.unwrap();
        assert_eq!(active.question_id, first.question_id);
        assert_eq!(active.text, "First?");
    }

    #[tokio::test]
    async fn test_all_answered_closes_early() {
        let handle = spawn_session(test_limits());
        join_two(&handle).await;

        let info = handle
            .open_question(
                "A or B?".to_string(),
                vec!["A".to_string(), "B".to_string()],
                Duration::from_secs(10),
            )
            .await
            .unwrap();
        let option_a = option_id(&info, "A");
        let option_b = option_id(&info, "B");

        let outcome = handle
            .submit_answer("p1".to_string(), info.question_id.clone(), option_a)
            .await
            .unwrap();
        assert_eq!(outcome.answered, 1);
        assert_eq!(outcome.total, 2);
        assert!(outcome.closed.is_none());

        let outcome = handle
            .submit_answer("p2".to_string(), info.question_id.clone(), option_b)
            .await
            .unwrap();
        assert_eq!(outcome.answered, 2);

        // Second answer closed the question before the deadline
        let result = outcome.closed.expect("final answer should close");
        assert_eq!(result.reason, CloseReason::AllAnswered);
        assert_eq!(result.results.total_responses, 2);
        assert!(result.results.options.iter().all(|o| o.votes == 1));

        let detail = handle.get_detail().await.unwrap();
        assert!(detail.active_question.is_none());
        assert_eq!(detail.status, SessionStatus::Waiting);
        assert_eq!(detail.questions_asked, 1);
    }

    #[tokio::test]
    async fn test_submit_is_idempotent_guarded() {
        let handle = spawn_session(test_limits());
        join_two(&handle).await;

        let info = handle
            .open_question(
                "A or B?".to_string(),
                vec!["A".to_string(), "B".to_string()],
                Duration::from_secs(10),
            )
            .await
            .unwrap();
        let option_a = option_id(&info, "A");

        handle
            .submit_answer("p1".to_string(), info.question_id.clone(), option_a.clone())
            .await
            .unwrap();

        let result = handle
            .submit_answer("p1".to_string(), info.question_id.clone(), option_a)
            .await;
        assert!(matches!(result, Err(PcError::AlreadyAnswered)));

        // Tally unchanged from after the first submission
        let results = handle.get_results().await.unwrap();
        let votes: u32 = results.options.iter().map(|o| o.votes).sum();
        assert_eq!(votes, 1);
        assert_eq!(results.total_responses, 1);
    }

    #[tokio::test]
    async fn test_invalid_option_no_mutation() {
        let handle = spawn_session(test_limits());
        join_two(&handle).await;

        let info = handle
            .open_question(
                "A or B?".to_string(),
                vec!["A".to_string(), "B".to_string()],
                Duration::from_secs(10),
            )
            .await
            .unwrap();

        let result = handle
            .submit_answer(
                "p1".to_string(),
                info.question_id.clone(),
                "not-an-option".to_string(),
            )
            .await;
        assert!(matches!(result, Err(PcError::InvalidOption(_))));

        let results = handle.get_results().await.unwrap();
        assert_eq!(results.total_responses, 0);
        assert!(results.options.iter().all(|o| o.votes == 0));

        // The same participant can still vote properly afterwards
        let option_a = option_id(&info, "A");
        let outcome = handle
            .submit_answer("p1".to_string(), info.question_id.clone(), option_a)
            .await
            .unwrap();
        assert_eq!(outcome.answered, 1);
    }

    #[tokio::test]
    async fn test_question_mismatch_and_no_active() {
        let handle = spawn_session(test_limits());
        join_two(&handle).await;

        let result = handle
            .submit_answer(
                "p1".to_string(),
                "stale-question".to_string(),
                "opt".to_string(),
            )
            .await;
        assert!(matches!(result, Err(PcError::NoActiveQuestion)));

        let info = handle
            .open_question(
                "A or B?".to_string(),
                vec!["A".to_string(), "B".to_string()],
                Duration::from_secs(10),
            )
            .await
            .unwrap();
        let option_a = option_id(&info, "A");

        let result = handle
            .submit_answer("p1".to_string(), "stale-question".to_string(), option_a)
            .await;
        assert!(matches!(result, Err(PcError::QuestionMismatch)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_closes_empty_session() {
        let handle = spawn_session(test_limits());

        let info = handle
            .open_question(
                "Anyone there?".to_string(),
                vec!["Yes".to_string(), "No".to_string()],
                Duration::from_secs(10),
            )
            .await
            .unwrap();

        // Let the timer task arm itself, then run past the deadline
        tokio::time::sleep(Duration::from_millis(10)).await;
        tokio::time::advance(Duration::from_secs(11)).await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        let history = handle.get_history().await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].results.question_id, info.question_id);
        assert_eq!(history[0].reason, CloseReason::Deadline);
        assert_eq!(history[0].results.total_responses, 0);
        assert!(history[0].results.options.iter().all(|o| o.votes == 0));

        let detail = handle.get_detail().await.unwrap();
        assert_eq!(detail.status, SessionStatus::Waiting);
    }

    #[tokio::test]
    async fn test_duplicate_close_triggers_close_once() {
        let handle = spawn_session(test_limits());
        join_two(&handle).await;

        let info = handle
            .open_question(
                "Race?".to_string(),
                vec!["A".to_string(), "B".to_string()],
                Duration::from_secs(10),
            )
            .await
            .unwrap();

        // Force both trigger paths against the same question id
        handle
            .request_close(info.question_id.clone(), CloseReason::Manual)
            .await
            .unwrap();
        handle
            .request_close(info.question_id.clone(), CloseReason::Deadline)
            .await
            .unwrap();

        // Mailbox is FIFO, so history reflects both triggers once processed
        let history = handle.get_history().await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].reason, CloseReason::Manual);
    }

    #[tokio::test]
    async fn test_close_race_submission_vs_stale_timer() {
        let handle = spawn_session(test_limits());
        handle
            .join("p1".to_string(), "Ada".to_string())
            .await
            .unwrap();

        let info = handle
            .open_question(
                "Race?".to_string(),
                vec!["A".to_string(), "B".to_string()],
                Duration::from_secs(10),
            )
            .await
            .unwrap();
        let option_a = option_id(&info, "A");

        // The only participant answers: closes with reason AllAnswered
        let outcome = handle
            .submit_answer("p1".to_string(), info.question_id.clone(), option_a)
            .await
            .unwrap();
        assert!(outcome.closed.is_some());

        // A late deadline trigger for the same question is a no-op
        handle
            .request_close(info.question_id.clone(), CloseReason::Deadline)
            .await
            .unwrap();

        let history = handle.get_history().await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].reason, CloseReason::AllAnswered);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_timer_does_not_touch_next_question() {
        let handle = spawn_session(test_limits());
        join_two(&handle).await;

        let first = handle
            .open_question(
                "First?".to_string(),
                vec!["A".to_string(), "B".to_string()],
                Duration::from_secs(10),
            )
            .await
            .unwrap();

        // Close manually, then open a long-deadline follow-up
        handle.end_question().await.unwrap();
        let second = handle
            .open_question(
                "Second?".to_string(),
                vec!["X".to_string(), "Y".to_string()],
                Duration::from_secs(100),
            )
            .await
            .unwrap();
        assert_ne!(first.question_id, second.question_id);

        // Run past the first question's deadline; its timer must not fire
        // against the second question
        tokio::time::sleep(Duration::from_millis(10)).await;
        tokio::time::advance(Duration::from_secs(15)).await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        let detail = handle.get_detail().await.unwrap();
        let active = detail.active_question.unwrap();
        assert_eq!(active.question_id, second.question_id);

        let history = handle.get_history().await.unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn test_end_question_manual_close() {
        let handle = spawn_session(test_limits());
        join_two(&handle).await;

        let result = handle.end_question().await;
        assert!(matches!(result, Err(PcError::NoActiveQuestion)));

        let info = handle
            .open_question(
                "End me".to_string(),
                vec!["A".to_string(), "B".to_string()],
                Duration::from_secs(10),
            )
            .await
            .unwrap();
        let option_a = option_id(&info, "A");
        handle
            .submit_answer("p1".to_string(), info.question_id.clone(), option_a)
            .await
            .unwrap();

        let result = handle.end_question().await.unwrap();
        assert_eq!(result.reason, CloseReason::Manual);
        assert_eq!(result.results.total_responses, 1);
        assert_eq!(result.results.respondents, vec!["Ada"]);
    }

    #[tokio::test]
    async fn test_leave_retracts_vote() {
        let handle = spawn_session(test_limits());
        join_two(&handle).await;
        handle
            .join("p3".to_string(), "Linus".to_string())
            .await
            .unwrap();

        let info = handle
            .open_question(
                "A or B?".to_string(),
                vec!["A".to_string(), "B".to_string()],
                Duration::from_secs(10),
            )
            .await
            .unwrap();
        let option_a = option_id(&info, "A");

        handle
            .submit_answer("p1".to_string(), info.question_id.clone(), option_a.clone())
            .await
            .unwrap();

        // The answered participant leaves: vote retracted, question stays open
        handle
            .leave("p1".to_string(), LeaveReason::Voluntary)
            .await
            .unwrap();

        let results = handle.get_results().await.unwrap();
        assert_eq!(results.total_responses, 0);
        assert!(results.options.iter().all(|o| o.votes == 0));
        assert!(results.respondents.is_empty());
    }

    #[tokio::test]
    async fn test_leave_of_last_holdout_closes_question() {
        let handle = spawn_session(test_limits());
        join_two(&handle).await;

        let info = handle
            .open_question(
                "A or B?".to_string(),
                vec!["A".to_string(), "B".to_string()],
                Duration::from_secs(10),
            )
            .await
            .unwrap();
        let option_a = option_id(&info, "A");

        handle
            .submit_answer("p1".to_string(), info.question_id.clone(), option_a)
            .await
            .unwrap();

        // The unanswered participant leaves: everyone remaining has answered
        handle
            .leave("p2".to_string(), LeaveReason::Disconnected)
            .await
            .unwrap();

        let history = handle.get_history().await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].reason, CloseReason::AllAnswered);
        assert_eq!(history[0].results.total_responses, 1);
    }

    #[tokio::test]
    async fn test_late_joiner_raises_all_answered_bar() {
        let handle = spawn_session(test_limits());
        join_two(&handle).await;

        let info = handle
            .open_question(
                "A or B?".to_string(),
                vec!["A".to_string(), "B".to_string()],
                Duration::from_secs(10),
            )
            .await
            .unwrap();
        let option_a = option_id(&info, "A");
        let option_b = option_id(&info, "B");

        handle
            .submit_answer("p1".to_string(), info.question_id.clone(), option_a.clone())
            .await
            .unwrap();

        // A third participant joins mid-question
        let join = handle
            .join("p3".to_string(), "Linus".to_string())
            .await
            .unwrap();
        assert!(join.active_question.is_some());

        // p2 answers; question must stay open because p3 has not
        let outcome = handle
            .submit_answer("p2".to_string(), info.question_id.clone(), option_b)
            .await
            .unwrap();
        assert!(outcome.closed.is_none());
        assert_eq!(outcome.answered, 2);
        assert_eq!(outcome.total, 3);

        let outcome = handle
            .submit_answer("p3".to_string(), info.question_id.clone(), option_a)
            .await
            .unwrap();
        let result = outcome.closed.expect("last answer closes");
        assert_eq!(result.results.total_responses, 3);
    }

    #[tokio::test]
    async fn test_vote_sum_matches_answered_after_each_submission() {
        let handle = spawn_session(test_limits());
        join_two(&handle).await;
        handle
            .join("p3".to_string(), "Linus".to_string())
            .await
            .unwrap();

        let info = handle
            .open_question(
                "A or B?".to_string(),
                vec!["A".to_string(), "B".to_string()],
                Duration::from_secs(10),
            )
            .await
            .unwrap();
        let option_a = option_id(&info, "A");
        let option_b = option_id(&info, "B");

        for (participant, option) in [("p1", &option_a), ("p2", &option_b)] {
            handle
                .submit_answer(
                    participant.to_string(),
                    info.question_id.clone(),
                    option.clone(),
                )
                .await
                .unwrap();

            let results = handle.get_results().await.unwrap();
            let vote_sum: u32 = results.options.iter().map(|o| o.votes).sum();
            assert_eq!(vote_sum as usize, results.total_responses);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_suppresses_pending_deadline() {
        let handle = spawn_session(test_limits());
        let mut events = handle.subscribe();

        handle
            .open_question(
                "Goodbye".to_string(),
                vec!["A".to_string(), "B".to_string()],
                Duration::from_secs(10),
            )
            .await
            .unwrap();

        // Drain the open event
        let event = events.recv().await.unwrap();
        assert!(matches!(event, SessionEvent::QuestionOpened(_)));

        handle.cancel();
        tokio::time::sleep(Duration::from_millis(10)).await;
        tokio::time::advance(Duration::from_secs(20)).await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        // Shutdown event arrives; no close snapshot ever does
        let event = events.recv().await.unwrap();
        assert!(matches!(event, SessionEvent::SessionEnded));
        assert!(matches!(
            events.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_moderator_lost_broadcasts_only() {
        let handle = spawn_session(test_limits());
        join_two(&handle).await;
        let mut events = handle.subscribe();

        handle.moderator_lost().await.unwrap();

        let event = events.recv().await.unwrap();
        assert!(matches!(event, SessionEvent::ModeratorLost));

        // Session state untouched
        let detail = handle.get_detail().await.unwrap();
        assert_eq!(detail.status, SessionStatus::Waiting);
        assert_eq!(detail.participants.len(), 2);
    }

    #[tokio::test]
    async fn test_event_stream_for_full_round() {
        let handle = spawn_session(test_limits());
        let mut events = handle.subscribe();
        join_two(&handle).await;

        let info = handle
            .open_question(
                "A or B?".to_string(),
                vec!["A".to_string(), "B".to_string()],
                Duration::from_secs(10),
            )
            .await
            .unwrap();
        let option_a = option_id(&info, "A");
        let option_b = option_id(&info, "B");

        handle
            .submit_answer("p1".to_string(), info.question_id.clone(), option_a)
            .await
            .unwrap();
        handle
            .submit_answer("p2".to_string(), info.question_id.clone(), option_b)
            .await
            .unwrap();

        let mut kinds = Vec::new();
        while let Ok(event) = events.try_recv() {
            kinds.push(match event {
                SessionEvent::ParticipantJoined(_) => "joined",
                SessionEvent::ParticipantLeft { .. } => "left",
                SessionEvent::QuestionOpened(_) => "opened",
                SessionEvent::AnswerProgress { .. } => "progress",
                SessionEvent::QuestionClosed(_) => "closed",
                SessionEvent::ModeratorLost => "moderator_lost",
                SessionEvent::SessionEnded => "ended",
            });
        }

        assert_eq!(
            kinds,
            vec![
                "joined", "joined", "opened", "progress", "progress", "closed"
            ]
        );
    }
}
