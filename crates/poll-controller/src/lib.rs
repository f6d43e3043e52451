//! Poll Controller Library
//!
//! This library provides the core functionality for the Poll Controller -
//! a coordinator for single-moderator, many-participant live question/answer
//! sessions:
//!
//! - Session registry with moderator and participant identity maps
//! - Question lifecycle with a deadline timer racing participant-driven
//!   early close, with exactly-once close semantics
//! - Idempotent answer acceptance with atomic tally updates
//! - Result aggregation shared by the live read API and close snapshots
//! - Per-session event fan-out for the transport layer
//!
//! # Architecture
//!
//! The controller uses an actor model hierarchy:
//!
//! ```text
//! SessionRegistryActor (singleton per instance)
//! ├── owns the identity maps (session / moderator / participant)
//! └── supervises N SessionActors
//!     └── SessionActor (one per session)
//!         ├── owns all session state
//!         └── arms/cancels the question deadline timer
//! ```
//!
//! # Key Design Decisions
//!
//! - **Single writer per session**: every mutation of one session's state
//!   runs on that session's mailbox-consumer task; the deadline timer posts
//!   a close request into the same mailbox instead of acting directly
//! - **Exactly-once close**: taking the active question out of its slot is
//!   the linearization point; the losing trigger finds it empty and exits
//! - **Opaque timer ownership**: the timer handle lives beside the question,
//!   not inside it, and close requests are matched by question id
//!
//! # Modules
//!
//! - [`actors`] - Actor model implementation
//! - [`config`] - Service configuration from environment
//! - [`errors`] - Error types with client error codes
//! - [`results`] - Pure result aggregation
//! - [`http`] - Read-only inspection API
//! - [`observability`] - Health endpoints and Prometheus metrics

pub mod actors;
pub mod config;
pub mod errors;
pub mod http;
pub mod observability;
pub mod results;
