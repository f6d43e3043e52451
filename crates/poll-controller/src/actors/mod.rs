//! Actor model implementation.
//!
//! The actor hierarchy:
//!
//! ```text
//! SessionRegistryActor (singleton)
//! ├── owns the identity maps (session / moderator / participant)
//! └── supervises N SessionActors
//!     └── SessionActor (one per session)
//!         ├── owns participants, active question, result history
//!         ├── arms/cancels the question deadline timer
//!         └── fans events out on a per-session broadcast channel
//! ```
//!
//! All mutations of one session's state run on that session's single
//! mailbox-consumer task; the deadline timer callback is just a message
//! posted back into the same mailbox, so timer fires, answer submissions
//! and manual closes interleave safely.

pub mod messages;
pub mod metrics;
pub mod question;
pub mod registry;
pub mod session;

pub use metrics::{ActorMetrics, ActorType, MailboxLevel, MailboxMonitor};
pub use registry::SessionRegistryActorHandle;
pub use session::SessionActorHandle;
