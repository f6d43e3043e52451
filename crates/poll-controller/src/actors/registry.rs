//! `SessionRegistryActor` - singleton supervisor that owns the session maps.
//!
//! The registry is the top-level actor:
//!
//! - Owns the set of active sessions and the identity maps
//!   (moderator -> session, participant -> session)
//! - Supervises N `SessionActor` instances
//! - Owns the root `CancellationToken` for graceful shutdown
//! - Monitors child actor health (panic detection via `JoinHandle`)
//!
//! Map mutations are serialized in the registry's mailbox; everything that
//! only touches one session's state goes through that session's own handle,
//! so independent sessions never contend with each other.
//!
//! # Graceful Shutdown
//!
//! On SIGTERM, the registry:
//! 1. Sets `accepting_new = false`
//! 2. Cancels the root `CancellationToken` (propagates to all sessions and
//!    their pending deadline timers)
//! 3. Waits for session actors to drain

use crate::config::SessionLimits;
use crate::errors::PcError;

use super::messages::{
    JoinResult, LeaveReason, RegistryMessage, RegistryStats, SessionKey,
};
use super::metrics::{ActorMetrics, ActorType, MailboxMonitor};
use super::session::{SessionActor, SessionActorHandle};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Default channel buffer size for the registry mailbox.
const REGISTRY_CHANNEL_BUFFER: usize = 1000;

/// Handle to the `SessionRegistryActor`.
///
/// This is the public interface for interacting with the registry. All
/// methods are async and return results via oneshot channels.
#[derive(Clone)]
pub struct SessionRegistryActorHandle {
    sender: mpsc::Sender<RegistryMessage>,
    cancel_token: CancellationToken,
}

impl SessionRegistryActorHandle {
    /// Create a new `SessionRegistryActor` and return a handle to it.
    ///
    /// This spawns the actor task and returns immediately.
    #[must_use]
    pub fn new(
        instance_id: String,
        limits: SessionLimits,
        metrics: Arc<ActorMetrics>,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(REGISTRY_CHANNEL_BUFFER);
        let cancel_token = CancellationToken::new();

        let actor = SessionRegistryActor::new(
            instance_id,
            receiver,
            cancel_token.clone(),
            limits,
            metrics,
        );

        tokio::spawn(actor.run());

        Self {
            sender,
            cancel_token,
        }
    }

    /// Create a new session owned by the given moderator.
    pub async fn create_session(
        &self,
        moderator_id: String,
    ) -> Result<SessionActorHandle, PcError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(RegistryMessage::CreateSession {
                moderator_id,
                respond_to: tx,
            })
            .await
            .map_err(|e| PcError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| PcError::Internal(format!("response receive failed: {e}")))?
    }

    /// Resolve a session handle by session id.
    pub async fn resolve(&self, session_id: String) -> Result<SessionActorHandle, PcError> {
        self.resolve_key(SessionKey::ById(session_id)).await
    }

    /// Resolve a session handle by the owning moderator's id.
    pub async fn resolve_by_moderator(
        &self,
        moderator_id: String,
    ) -> Result<SessionActorHandle, PcError> {
        self.resolve_key(SessionKey::ByModerator(moderator_id)).await
    }

    /// Resolve a session handle by a member participant's id.
    pub async fn resolve_by_participant(
        &self,
        participant_id: String,
    ) -> Result<SessionActorHandle, PcError> {
        self.resolve_key(SessionKey::ByParticipant(participant_id))
            .await
    }

    async fn resolve_key(&self, key: SessionKey) -> Result<SessionActorHandle, PcError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(RegistryMessage::Resolve {
                key,
                respond_to: tx,
            })
            .await
            .map_err(|e| PcError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| PcError::Internal(format!("response receive failed: {e}")))?
    }

    /// Admit a participant into a session.
    pub async fn join(
        &self,
        session_id: String,
        participant_id: String,
        display_name: String,
    ) -> Result<JoinResult, PcError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(RegistryMessage::Join {
                session_id,
                participant_id,
                display_name,
                respond_to: tx,
            })
            .await
            .map_err(|e| PcError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| PcError::Internal(format!("response receive failed: {e}")))?
    }

    /// Remove a participant (explicit leave or transport disconnect).
    pub async fn leave(
        &self,
        participant_id: String,
        reason: LeaveReason,
    ) -> Result<(), PcError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(RegistryMessage::Leave {
                participant_id,
                reason,
                respond_to: tx,
            })
            .await
            .map_err(|e| PcError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| PcError::Internal(format!("response receive failed: {e}")))?
    }

    /// Notify a session that its moderator's connection dropped.
    pub async fn moderator_disconnected(&self, moderator_id: String) -> Result<(), PcError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(RegistryMessage::ModeratorDisconnected {
                moderator_id,
                respond_to: tx,
            })
            .await
            .map_err(|e| PcError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| PcError::Internal(format!("response receive failed: {e}")))?
    }

    /// Delete a session, cancelling any pending deadline timer first.
    pub async fn delete_session(&self, session_id: String) -> Result<(), PcError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(RegistryMessage::DeleteSession {
                session_id,
                respond_to: tx,
            })
            .await
            .map_err(|e| PcError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| PcError::Internal(format!("response receive failed: {e}")))?
    }

    /// Get aggregate statistics across all sessions.
    pub async fn stats(&self) -> Result<RegistryStats, PcError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(RegistryMessage::GetStats { respond_to: tx })
            .await
            .map_err(|e| PcError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| PcError::Internal(format!("response receive failed: {e}")))
    }

    /// Initiate graceful shutdown.
    pub async fn shutdown(&self) -> Result<(), PcError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(RegistryMessage::Shutdown { respond_to: tx })
            .await
            .map_err(|e| PcError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| PcError::Internal(format!("response receive failed: {e}")))?
    }

    /// Cancel the actor (for immediate shutdown).
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Check if the actor is cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Get a child token tied to the registry's lifetime.
    #[must_use]
    pub fn child_token(&self) -> CancellationToken {
        self.cancel_token.child_token()
    }
}

/// Internal state for a managed session.
struct ManagedSession {
    /// Handle to the session actor.
    handle: SessionActorHandle,
    /// Join handle for monitoring the actor task.
    task_handle: JoinHandle<()>,
}

/// The `SessionRegistryActor` implementation.
pub struct SessionRegistryActor {
    /// Controller instance ID.
    instance_id: String,
    /// Message receiver.
    receiver: mpsc::Receiver<RegistryMessage>,
    /// Cancellation token (root).
    cancel_token: CancellationToken,
    /// Per-session limits handed to every spawned session.
    limits: SessionLimits,
    /// Managed sessions by ID.
    sessions: HashMap<String, ManagedSession>,
    /// Moderator ID -> session ID. A moderator owns at most one session.
    moderators: HashMap<String, String>,
    /// Participant ID -> session ID. A participant is in at most one session.
    participants: HashMap<String, String>,
    /// Whether the registry is accepting new sessions.
    accepting_new: bool,
    /// Shared metrics.
    metrics: Arc<ActorMetrics>,
    /// Mailbox monitor.
    mailbox: MailboxMonitor,
}

impl SessionRegistryActor {
    /// Create a new registry actor (not started).
    fn new(
        instance_id: String,
        receiver: mpsc::Receiver<RegistryMessage>,
        cancel_token: CancellationToken,
        limits: SessionLimits,
        metrics: Arc<ActorMetrics>,
    ) -> Self {
        let mailbox = MailboxMonitor::new(ActorType::Registry, &instance_id);

        Self {
            instance_id,
            receiver,
            cancel_token,
            limits,
            sessions: HashMap::new(),
            moderators: HashMap::new(),
            participants: HashMap::new(),
            accepting_new: true,
            metrics,
            mailbox,
        }
    }

    /// Run the actor message loop.
    #[instrument(skip_all, name = "pc.actor.registry", fields(instance_id = %self.instance_id))]
    async fn run(mut self) {
        info!(
            target: "pc.actor.registry",
            instance_id = %self.instance_id,
            "SessionRegistryActor started"
        );

        loop {
            // Reap session actors whose tasks ended outside delete_session
            self.check_session_health().await;

            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "pc.actor.registry",
                        instance_id = %self.instance_id,
                        "SessionRegistryActor received cancellation signal"
                    );
                    self.graceful_shutdown().await;
                    break;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => {
                            self.mailbox.record_enqueue();
                            self.handle_message(message).await;
                            self.mailbox.record_dequeue();
                            self.metrics.record_message_processed();
                        }
                        None => {
                            info!(
                                target: "pc.actor.registry",
                                instance_id = %self.instance_id,
                                "SessionRegistryActor channel closed, exiting"
                            );
                            break;
                        }
                    }
                }
            }
        }

        info!(
            target: "pc.actor.registry",
            instance_id = %self.instance_id,
            sessions_remaining = self.sessions.len(),
            messages_processed = self.mailbox.messages_processed(),
            "SessionRegistryActor stopped"
        );
    }

    /// Handle a single message.
    async fn handle_message(&mut self, message: RegistryMessage) {
        match message {
            RegistryMessage::CreateSession {
                moderator_id,
                respond_to,
            } => {
                let result = self.create_session(moderator_id);
                let _ = respond_to.send(result);
            }

            RegistryMessage::Resolve { key, respond_to } => {
                let result = self.resolve(&key);
                let _ = respond_to.send(result);
            }

            RegistryMessage::Join {
                session_id,
                participant_id,
                display_name,
                respond_to,
            } => {
                let result = self
                    .handle_join(session_id, participant_id, display_name)
                    .await;
                let _ = respond_to.send(result);
            }

            RegistryMessage::Leave {
                participant_id,
                reason,
                respond_to,
            } => {
                let result = self.handle_leave(&participant_id, reason).await;
                let _ = respond_to.send(result);
            }

            RegistryMessage::ModeratorDisconnected {
                moderator_id,
                respond_to,
            } => {
                let result = self.handle_moderator_disconnected(&moderator_id).await;
                let _ = respond_to.send(result);
            }

            RegistryMessage::DeleteSession {
                session_id,
                respond_to,
            } => {
                let result = self.delete_session(&session_id);
                let _ = respond_to.send(result);
            }

            RegistryMessage::GetStats { respond_to } => {
                let _ = respond_to.send(self.get_stats());
            }

            RegistryMessage::Shutdown { respond_to } => {
                let result = self.initiate_shutdown();
                let _ = respond_to.send(result);
            }
        }
    }

    /// Create a new session actor for the given moderator.
    fn create_session(&mut self, moderator_id: String) -> Result<SessionActorHandle, PcError> {
        if !self.accepting_new {
            return Err(PcError::Draining);
        }

        if self.moderators.contains_key(&moderator_id) {
            return Err(PcError::AlreadyModerating);
        }

        let session_id = uuid::Uuid::new_v4().to_string();

        debug!(
            target: "pc.actor.registry",
            instance_id = %self.instance_id,
            session_id = %session_id,
            "Creating new session actor"
        );

        let session_token = self.cancel_token.child_token();
        let (handle, task_handle) = SessionActor::spawn(
            session_id.clone(),
            moderator_id.clone(),
            self.limits,
            session_token,
            Arc::clone(&self.metrics),
        );

        self.sessions.insert(
            session_id.clone(),
            ManagedSession {
                handle: handle.clone(),
                task_handle,
            },
        );
        self.moderators.insert(moderator_id, session_id.clone());

        self.metrics.session_created();

        info!(
            target: "pc.actor.registry",
            instance_id = %self.instance_id,
            session_id = %session_id,
            total_sessions = self.sessions.len(),
            "Session actor created"
        );

        Ok(handle)
    }

    /// Resolve a session handle through one of the identity maps.
    fn resolve(&self, key: &SessionKey) -> Result<SessionActorHandle, PcError> {
        let session_id = match key {
            SessionKey::ById(session_id) => session_id.clone(),
            SessionKey::ByModerator(moderator_id) => self
                .moderators
                .get(moderator_id)
                .cloned()
                .ok_or_else(|| PcError::SessionNotFound(moderator_id.clone()))?,
            SessionKey::ByParticipant(participant_id) => self
                .participants
                .get(participant_id)
                .cloned()
                .ok_or_else(|| PcError::ParticipantNotFound(participant_id.clone()))?,
        };

        self.sessions
            .get(&session_id)
            .map(|managed| managed.handle.clone())
            .ok_or(PcError::SessionNotFound(session_id))
    }

    /// Admit a participant: global identity check here, per-session
    /// admission checks (capacity, name uniqueness) in the session actor.
    async fn handle_join(
        &mut self,
        session_id: String,
        participant_id: String,
        display_name: String,
    ) -> Result<JoinResult, PcError> {
        if self.participants.contains_key(&participant_id) {
            return Err(PcError::AlreadyJoined);
        }

        let handle = self.resolve(&SessionKey::ById(session_id.clone()))?;
        let result = handle.join(participant_id.clone(), display_name).await?;

        // Index only after the session accepted the participant
        self.participants.insert(participant_id, session_id);

        Ok(result)
    }

    /// Remove a participant from whichever session holds it.
    async fn handle_leave(
        &mut self,
        participant_id: &str,
        reason: LeaveReason,
    ) -> Result<(), PcError> {
        let Some(session_id) = self.participants.remove(participant_id) else {
            return Err(PcError::ParticipantNotFound(participant_id.to_string()));
        };

        if let Some(managed) = self.sessions.get(&session_id) {
            managed
                .handle
                .leave(participant_id.to_string(), reason)
                .await?;
        }

        Ok(())
    }

    /// Moderator connection dropped: notify the session, keep it alive.
    async fn handle_moderator_disconnected(
        &mut self,
        moderator_id: &str,
    ) -> Result<(), PcError> {
        let handle = self.resolve(&SessionKey::ByModerator(moderator_id.to_string()))?;
        handle.moderator_lost().await
    }

    /// Delete a session.
    ///
    /// Cancelling the session's token also cancels any pending deadline
    /// timer (the timer holds a child token), so a stale close can never
    /// fire against a freed session. Waiting for the actor task itself is
    /// pushed to a background task to keep the registry loop responsive.
    fn delete_session(&mut self, session_id: &str) -> Result<(), PcError> {
        match self.sessions.remove(session_id) {
            Some(managed) => {
                self.moderators.retain(|_, sid| sid != session_id);
                self.participants.retain(|_, sid| sid != session_id);

                managed.handle.cancel();

                let session_id_owned = session_id.to_string();
                let instance_id = self.instance_id.clone();
                tokio::spawn(async move {
                    match tokio::time::timeout(Duration::from_secs(5), managed.task_handle).await
                    {
                        Ok(Ok(())) => {
                            debug!(
                                target: "pc.actor.registry",
                                instance_id = %instance_id,
                                session_id = %session_id_owned,
                                "Session actor task completed cleanly"
                            );
                        }
                        Ok(Err(e)) => {
                            warn!(
                                target: "pc.actor.registry",
                                instance_id = %instance_id,
                                session_id = %session_id_owned,
                                error = ?e,
                                "Session actor task panicked during removal"
                            );
                        }
                        Err(_) => {
                            warn!(
                                target: "pc.actor.registry",
                                instance_id = %instance_id,
                                session_id = %session_id_owned,
                                "Session actor task cleanup timed out"
                            );
                        }
                    }
                });

                self.metrics.session_removed();

                info!(
                    target: "pc.actor.registry",
                    instance_id = %self.instance_id,
                    session_id = %session_id,
                    total_sessions = self.sessions.len(),
                    "Session deleted"
                );

                Ok(())
            }
            None => Err(PcError::SessionNotFound(session_id.to_string())),
        }
    }

    /// Get current registry statistics.
    fn get_stats(&self) -> RegistryStats {
        RegistryStats {
            session_count: self.sessions.len(),
            participant_count: self.participants.len(),
            open_questions: self.metrics.open_question_count(),
            is_draining: !self.accepting_new,
            mailbox_depth: self.mailbox.current_depth(),
        }
    }

    /// Initiate graceful shutdown.
    fn initiate_shutdown(&mut self) -> Result<(), PcError> {
        info!(
            target: "pc.actor.registry",
            instance_id = %self.instance_id,
            session_count = self.sessions.len(),
            "Initiating graceful shutdown"
        );

        self.accepting_new = false;
        self.cancel_token.cancel();

        Ok(())
    }

    /// Perform graceful shutdown.
    async fn graceful_shutdown(&mut self) {
        info!(
            target: "pc.actor.registry",
            instance_id = %self.instance_id,
            session_count = self.sessions.len(),
            "Performing graceful shutdown"
        );

        self.accepting_new = false;

        // Already cancelled via the root token, but be explicit
        for (session_id, managed) in &self.sessions {
            debug!(
                target: "pc.actor.registry",
                instance_id = %self.instance_id,
                session_id = %session_id,
                "Cancelling session actor"
            );
            managed.handle.cancel();
        }

        for (session_id, managed) in self.sessions.drain() {
            match tokio::time::timeout(Duration::from_secs(30), managed.task_handle).await {
                Ok(Ok(())) => {
                    debug!(
                        target: "pc.actor.registry",
                        instance_id = %self.instance_id,
                        session_id = %session_id,
                        "Session actor completed cleanly"
                    );
                }
                Ok(Err(e)) => {
                    warn!(
                        target: "pc.actor.registry",
                        instance_id = %self.instance_id,
                        session_id = %session_id,
                        error = ?e,
                        "Session actor task panicked during shutdown"
                    );
                }
                Err(_) => {
                    warn!(
                        target: "pc.actor.registry",
                        instance_id = %self.instance_id,
                        session_id = %session_id,
                        "Session actor shutdown timed out"
                    );
                }
            }
        }

        self.moderators.clear();
        self.participants.clear();

        info!(
            target: "pc.actor.registry",
            instance_id = %self.instance_id,
            "Graceful shutdown complete"
        );
    }

    /// Reap session actors whose tasks finished outside `delete_session`.
    async fn check_session_health(&mut self) {
        let mut finished = Vec::new();

        for (session_id, managed) in &self.sessions {
            if managed.task_handle.is_finished() {
                warn!(
                    target: "pc.actor.registry",
                    instance_id = %self.instance_id,
                    session_id = %session_id,
                    "Session actor task finished unexpectedly"
                );
                finished.push(session_id.clone());
            }
        }

        for session_id in finished {
            if let Some(managed) = self.sessions.remove(&session_id) {
                self.moderators.retain(|_, sid| sid != &session_id);
                self.participants.retain(|_, sid| sid != &session_id);

                match managed.task_handle.await {
                    Ok(()) => {
                        info!(
                            target: "pc.actor.registry",
                            instance_id = %self.instance_id,
                            session_id = %session_id,
                            "Session actor exited cleanly"
                        );
                    }
                    Err(join_error) => {
                        if join_error.is_panic() {
                            error!(
                                target: "pc.actor.registry",
                                instance_id = %self.instance_id,
                                session_id = %session_id,
                                error = ?join_error,
                                "Session actor panicked"
                            );
                            self.metrics.record_panic(ActorType::Session);
                        }
                    }
                }

                self.metrics.session_removed();
            }
        }
    }
}
