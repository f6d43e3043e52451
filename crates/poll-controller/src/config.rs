//! Poll Controller configuration.
//!
//! Configuration is loaded from environment variables with sensible defaults.
//! The per-session limits are bundled into [`SessionLimits`] so actors carry
//! one small value instead of the whole config.

use std::collections::HashMap;
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Default HTTP bind address (health, metrics, inspection API).
pub const DEFAULT_HTTP_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Default maximum participants per session.
pub const DEFAULT_MAX_PARTICIPANTS: usize = 100;

/// Default maximum options per question.
pub const DEFAULT_MAX_OPTIONS: usize = 10;

/// Default minimum question deadline in seconds.
pub const DEFAULT_MIN_DEADLINE_SECONDS: u64 = 5;

/// Default maximum question deadline in seconds.
pub const DEFAULT_MAX_DEADLINE_SECONDS: u64 = 300;

/// Default instance ID prefix.
pub const DEFAULT_INSTANCE_ID_PREFIX: &str = "pc";

/// Per-session admission and question limits.
///
/// Owned by every `SessionActor`; enforced at admission time and when a
/// question is opened.
#[derive(Debug, Clone, Copy)]
pub struct SessionLimits {
    /// Maximum participants admitted to one session.
    pub max_participants: usize,
    /// Maximum options on one question.
    pub max_options: usize,
    /// Minimum question deadline in seconds.
    pub min_deadline_seconds: u64,
    /// Maximum question deadline in seconds.
    pub max_deadline_seconds: u64,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            max_participants: DEFAULT_MAX_PARTICIPANTS,
            max_options: DEFAULT_MAX_OPTIONS,
            min_deadline_seconds: DEFAULT_MIN_DEADLINE_SECONDS,
            max_deadline_seconds: DEFAULT_MAX_DEADLINE_SECONDS,
        }
    }
}

impl SessionLimits {
    /// Check a requested deadline against the configured range.
    #[must_use]
    pub fn deadline_in_range(&self, seconds: u64) -> bool {
        (self.min_deadline_seconds..=self.max_deadline_seconds).contains(&seconds)
    }

    /// The minimum deadline as a `Duration`.
    #[must_use]
    pub fn min_deadline(&self) -> Duration {
        Duration::from_secs(self.min_deadline_seconds)
    }

    /// The maximum deadline as a `Duration`.
    #[must_use]
    pub fn max_deadline(&self) -> Duration {
        Duration::from_secs(self.max_deadline_seconds)
    }
}

/// Poll Controller configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP bind address for health, metrics and the inspection API
    /// (default: "0.0.0.0:8080").
    pub http_bind_address: String,

    /// Unique identifier for this controller instance.
    pub instance_id: String,

    /// Maximum participants per session.
    pub max_participants: usize,

    /// Maximum options per question.
    pub max_options: usize,

    /// Minimum question deadline in seconds.
    pub min_deadline_seconds: u64,

    /// Maximum question deadline in seconds.
    pub max_deadline_seconds: u64,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let http_bind_address = vars
            .get("POLL_HTTP_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_HTTP_BIND_ADDRESS.to_string());

        let max_participants = vars
            .get("POLL_MAX_PARTICIPANTS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_MAX_PARTICIPANTS);

        let max_options = vars
            .get("POLL_MAX_OPTIONS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_MAX_OPTIONS);

        let min_deadline_seconds = vars
            .get("POLL_MIN_DEADLINE_SECONDS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_MIN_DEADLINE_SECONDS);

        let max_deadline_seconds = vars
            .get("POLL_MAX_DEADLINE_SECONDS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_MAX_DEADLINE_SECONDS);

        if max_participants == 0 {
            return Err(ConfigError::InvalidValue(
                "POLL_MAX_PARTICIPANTS must be at least 1".to_string(),
            ));
        }

        if max_options < 2 {
            return Err(ConfigError::InvalidValue(
                "POLL_MAX_OPTIONS must be at least 2".to_string(),
            ));
        }

        if min_deadline_seconds == 0 || min_deadline_seconds > max_deadline_seconds {
            return Err(ConfigError::InvalidValue(format!(
                "deadline range {min_deadline_seconds}..={max_deadline_seconds} is empty or zero"
            )));
        }

        // Generate instance ID when not pinned by the environment
        let instance_id = vars.get("POLL_INSTANCE_ID").cloned().unwrap_or_else(|| {
            let hostname = std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string());
            let uuid_suffix = uuid::Uuid::new_v4().to_string();
            let short_suffix = uuid_suffix.get(..8).unwrap_or("00000000");
            format!("{DEFAULT_INSTANCE_ID_PREFIX}-{hostname}-{short_suffix}")
        });

        Ok(Config {
            http_bind_address,
            instance_id,
            max_participants,
            max_options,
            min_deadline_seconds,
            max_deadline_seconds,
        })
    }

    /// The per-session limits derived from this configuration.
    #[must_use]
    pub fn limits(&self) -> SessionLimits {
        SessionLimits {
            max_participants: self.max_participants,
            max_options: self.max_options,
            min_deadline_seconds: self.min_deadline_seconds,
            max_deadline_seconds: self.max_deadline_seconds,
        }
    }
}
