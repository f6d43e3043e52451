//! Actor metrics and mailbox monitoring.
//!
//! Shared atomic counters back the `/stats` projection and the Prometheus
//! gauges; mailbox depth monitoring warns before an actor falls behind:
//!
//! | Actor Type | Normal | Warning  | Critical |
//! |------------|--------|----------|----------|
//! | Registry   | < 200  | 200-1000 | > 1000   |
//! | Session    | < 100  | 100-500  | > 500    |
//!
//! All exported metrics carry the `pc_` prefix.

use crate::observability::metrics as prom;

use super::messages::CloseReason;

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Mailbox depth thresholds for the registry actor.
pub const REGISTRY_MAILBOX_NORMAL: usize = 200;
pub const REGISTRY_MAILBOX_WARNING: usize = 1000;

/// Mailbox depth thresholds for session actors.
pub const SESSION_MAILBOX_NORMAL: usize = 100;
pub const SESSION_MAILBOX_WARNING: usize = 500;

/// Actor type for metrics labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorType {
    /// `SessionRegistryActor` (singleton).
    Registry,
    /// `SessionActor` (one per session).
    Session,
}

impl ActorType {
    /// Returns the actor type as a string for metric labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ActorType::Registry => "registry",
            ActorType::Session => "session",
        }
    }

    /// Returns the warning threshold for this actor type.
    #[must_use]
    pub const fn warning_threshold(&self) -> usize {
        match self {
            ActorType::Registry => REGISTRY_MAILBOX_WARNING,
            ActorType::Session => SESSION_MAILBOX_WARNING,
        }
    }

    /// Returns the normal threshold for this actor type.
    #[must_use]
    pub const fn normal_threshold(&self) -> usize {
        match self {
            ActorType::Registry => REGISTRY_MAILBOX_NORMAL,
            ActorType::Session => SESSION_MAILBOX_NORMAL,
        }
    }
}

/// Mailbox depth level for alerting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailboxLevel {
    /// Below normal threshold.
    Normal,
    /// Between normal and warning thresholds.
    Warning,
    /// Above warning threshold.
    Critical,
}

/// Mailbox monitor for tracking queue depth.
#[derive(Debug)]
pub struct MailboxMonitor {
    /// Actor type for labeling.
    actor_type: ActorType,
    /// Actor identifier (session id or instance id).
    actor_id: String,
    /// Current mailbox depth.
    depth: AtomicUsize,
    /// Peak mailbox depth.
    peak_depth: AtomicUsize,
    /// Total messages processed.
    messages_processed: AtomicU64,
}

impl MailboxMonitor {
    /// Create a new mailbox monitor for the given actor.
    #[must_use]
    pub fn new(actor_type: ActorType, actor_id: impl Into<String>) -> Self {
        Self {
            actor_type,
            actor_id: actor_id.into(),
            depth: AtomicUsize::new(0),
            peak_depth: AtomicUsize::new(0),
            messages_processed: AtomicU64::new(0),
        }
    }

    /// Record a message entering the mailbox.
    pub fn record_enqueue(&self) {
        let new_depth = self.depth.fetch_add(1, Ordering::Relaxed) + 1;

        let mut current_peak = self.peak_depth.load(Ordering::Relaxed);
        while new_depth > current_peak {
            match self.peak_depth.compare_exchange_weak(
                current_peak,
                new_depth,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(actual) => current_peak = actual,
            }
        }

        match self.level_for_depth(new_depth) {
            MailboxLevel::Critical => {
                warn!(
                    target: "pc.actor.mailbox",
                    actor_type = self.actor_type.as_str(),
                    actor_id = %self.actor_id,
                    depth = new_depth,
                    threshold = self.actor_type.warning_threshold(),
                    "Mailbox depth critical"
                );
            }
            MailboxLevel::Warning if new_depth == self.actor_type.normal_threshold() + 1 => {
                // Log once when crossing the warning threshold
                debug!(
                    target: "pc.actor.mailbox",
                    actor_type = self.actor_type.as_str(),
                    actor_id = %self.actor_id,
                    depth = new_depth,
                    "Mailbox depth elevated"
                );
            }
            _ => {}
        }
    }

    /// Record a message leaving the mailbox (processed).
    pub fn record_dequeue(&self) {
        self.depth.fetch_sub(1, Ordering::Relaxed);
        self.messages_processed.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the current mailbox depth.
    #[must_use]
    pub fn current_depth(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }

    /// Get the peak mailbox depth.
    #[must_use]
    pub fn peak_depth(&self) -> usize {
        self.peak_depth.load(Ordering::Relaxed)
    }

    /// Get total messages processed.
    #[must_use]
    pub fn messages_processed(&self) -> u64 {
        self.messages_processed.load(Ordering::Relaxed)
    }

    /// Get the current mailbox level.
    #[must_use]
    pub fn current_level(&self) -> MailboxLevel {
        self.level_for_depth(self.current_depth())
    }

    /// Determine mailbox level for a given depth.
    fn level_for_depth(&self, depth: usize) -> MailboxLevel {
        if depth > self.actor_type.warning_threshold() {
            MailboxLevel::Critical
        } else if depth > self.actor_type.normal_threshold() {
            MailboxLevel::Warning
        } else {
            MailboxLevel::Normal
        }
    }
}

/// Aggregated metrics for the actor system.
///
/// Counters live here as atomics for the `/stats` projection; each mutator
/// also pushes the matching Prometheus series so both views agree.
#[derive(Debug, Default)]
pub struct ActorMetrics {
    /// Sessions currently active.
    active_sessions: AtomicUsize,
    /// Participants across all sessions.
    active_participants: AtomicUsize,
    /// Questions currently open across all sessions.
    open_questions: AtomicUsize,
    /// Total answers recorded.
    answers_recorded: AtomicU64,
    /// Total questions closed.
    questions_closed: AtomicU64,
    /// Total actor panics (indicates bugs).
    actor_panics: AtomicU64,
    /// Total messages processed across all actors.
    total_messages_processed: AtomicU64,
}

impl ActorMetrics {
    /// Create a new shared metrics instance.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Increment active session count.
    pub fn session_created(&self) {
        let count = self.active_sessions.fetch_add(1, Ordering::Relaxed) + 1;
        prom::set_sessions_active(count as u64);
    }

    /// Decrement active session count.
    pub fn session_removed(&self) {
        let count = self
            .active_sessions
            .fetch_sub(1, Ordering::Relaxed)
            .saturating_sub(1);
        prom::set_sessions_active(count as u64);
    }

    /// Increment active participant count.
    pub fn participant_joined(&self) {
        let count = self.active_participants.fetch_add(1, Ordering::Relaxed) + 1;
        prom::set_participants_active(count as u64);
    }

    /// Decrement active participant count.
    pub fn participant_left(&self) {
        let count = self
            .active_participants
            .fetch_sub(1, Ordering::Relaxed)
            .saturating_sub(1);
        prom::set_participants_active(count as u64);
    }

    /// Record a question opening.
    pub fn question_opened(&self) {
        let open = self.open_questions.fetch_add(1, Ordering::Relaxed) + 1;
        prom::set_questions_open(open as u64);
        prom::record_question_opened();
    }

    /// Record a question closing.
    pub fn question_closed(&self, reason: CloseReason) {
        let open = self
            .open_questions
            .fetch_sub(1, Ordering::Relaxed)
            .saturating_sub(1);
        self.questions_closed.fetch_add(1, Ordering::Relaxed);
        prom::set_questions_open(open as u64);
        prom::record_question_closed(reason.as_str());
    }

    /// Record an accepted answer.
    pub fn answer_recorded(&self) {
        self.answers_recorded.fetch_add(1, Ordering::Relaxed);
        prom::record_answer();
    }

    /// Record an actor panic.
    pub fn record_panic(&self, actor_type: ActorType) {
        self.actor_panics.fetch_add(1, Ordering::Relaxed);
        prom::record_actor_panic(actor_type.as_str());
        tracing::error!(
            target: "pc.actor.panic",
            actor_type = actor_type.as_str(),
            total_panics = self.actor_panics.load(Ordering::Relaxed),
            "Actor panic detected - indicates bug, investigation required"
        );
    }

    /// Record a message being processed.
    pub fn record_message_processed(&self) {
        self.total_messages_processed
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Get current session count.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.active_sessions.load(Ordering::Relaxed)
    }

    /// Get current participant count.
    #[must_use]
    pub fn participant_count(&self) -> usize {
        self.active_participants.load(Ordering::Relaxed)
    }

    /// Get current open question count.
    #[must_use]
    pub fn open_question_count(&self) -> usize {
        self.open_questions.load(Ordering::Relaxed)
    }

    /// Get total answers recorded.
    #[must_use]
    pub fn answers_recorded(&self) -> u64 {
        self.answers_recorded.load(Ordering::Relaxed)
    }

    /// Get total questions closed.
    #[must_use]
    pub fn questions_closed(&self) -> u64 {
        self.questions_closed.load(Ordering::Relaxed)
    }

    /// Get total actor panics.
    #[must_use]
    pub fn panic_count(&self) -> u64 {
        self.actor_panics.load(Ordering::Relaxed)
    }
}
