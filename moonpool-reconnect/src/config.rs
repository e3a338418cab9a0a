//! User-facing socket options.
//!
//! Options accept the loose shapes users write by hand and are resolved once,
//! at construction, into concrete policy and queue objects:
//!
//! ```json
//! {
//!   "protocols": "chat.v2",
//!   "reconnect": { "type": "interval", "maxAttempts": 5, "interval": 250 },
//!   "queueMessages": true
//! }
//! ```
//!
//! `reconnect` also accepts `false`, `true` or a policy name, and
//! `queueMessages` accepts `false`, `true`, a queue name or `{ "type": .. }`.
//! Unknown names fail with a [`ConfigError`] immediately.

use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::error::ConfigError;
use crate::providers::Providers;
use crate::queue::{MessageQueue, SimpleQueue};
use crate::retry::{IntervalRetryPolicy, RetryPolicy};
use crate::transport::ConnectionOptions;

/// Name of the fixed-interval retry policy.
pub const INTERVAL_POLICY: &str = "interval";

/// Name of the unbounded FIFO queue.
pub const SIMPLE_QUEUE: &str = "simple";

/// Options for building a [`RetrySocket`](crate::RetrySocket).
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SocketOptions {
    /// Sub-protocols, given as one string or a list
    #[serde(deserialize_with = "one_or_many")]
    pub protocols: Vec<String>,

    /// Opaque options handed to the transport factory
    pub connection: ConnectionOptions,

    /// Retry policy selection
    pub reconnect: ReconnectOption,

    /// Message queue selection
    pub queue_messages: QueueOption,
}

impl SocketOptions {
    /// Parse options from a JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] on malformed JSON or mistyped fields.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Set the sub-protocols.
    pub fn with_protocols(mut self, protocols: Vec<String>) -> Self {
        self.protocols = protocols;
        self
    }

    /// Set the opaque connection options.
    pub fn with_connection(mut self, connection: ConnectionOptions) -> Self {
        self.connection = connection;
        self
    }

    /// Set the retry policy selection.
    pub fn with_reconnect(mut self, reconnect: ReconnectOption) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Set the message queue selection.
    pub fn with_queue_messages(mut self, queue_messages: QueueOption) -> Self {
        self.queue_messages = queue_messages;
        self
    }
}

/// Accepted shapes of the `reconnect` option.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ReconnectOption {
    /// `false` disables retries, `true` selects the default policy
    Enabled(bool),
    /// Policy selected by name, with default settings
    Named(String),
    /// Policy selected and parameterized
    Settings(RetrySettings),
}

impl Default for ReconnectOption {
    fn default() -> Self {
        ReconnectOption::Enabled(false)
    }
}

/// Object form of the `reconnect` option.
///
/// Unknown keys are rejected, so a misplaced option fails at construction.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct RetrySettings {
    /// Policy name; the interval policy when absent
    #[serde(rename = "type")]
    pub kind: Option<String>,

    /// Consecutive retries before giving up, 0 for unlimited
    pub max_attempts: u32,

    /// Delay between retries in milliseconds, 0 for the default
    pub interval: u64,
}

impl ReconnectOption {
    /// Resolve into a retry policy, or `None` when retries are disabled.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownRetryPolicy`] for an unrecognized type.
    pub fn build<P: Providers>(
        &self,
        providers: P,
    ) -> Result<Option<Box<dyn RetryPolicy>>, ConfigError> {
        let settings = match self {
            ReconnectOption::Enabled(false) => return Ok(None),
            ReconnectOption::Enabled(true) => RetrySettings::default(),
            ReconnectOption::Named(name) => RetrySettings {
                kind: Some(name.clone()),
                ..RetrySettings::default()
            },
            ReconnectOption::Settings(settings) => settings.clone(),
        };

        match settings.kind.as_deref() {
            None | Some(INTERVAL_POLICY) => {
                let policy: Box<dyn RetryPolicy> = Box::new(IntervalRetryPolicy::new(
                    providers,
                    settings.max_attempts,
                    Duration::from_millis(settings.interval),
                ));
                Ok(Some(policy))
            }
            Some(other) => Err(ConfigError::UnknownRetryPolicy(other.to_string())),
        }
    }
}

/// Accepted shapes of the `queueMessages` option.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum QueueOption {
    /// `false` disables buffering, `true` selects the default queue
    Enabled(bool),
    /// Queue selected by name
    Named(String),
    /// Object form
    Settings(QueueSettings),
}

impl Default for QueueOption {
    fn default() -> Self {
        QueueOption::Enabled(false)
    }
}

/// Object form of the `queueMessages` option.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QueueSettings {
    /// Queue name; the simple queue when absent
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

impl QueueOption {
    /// Resolve into a message queue, or `None` when buffering is disabled.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownMessageQueue`] for an unrecognized type.
    pub fn build(&self) -> Result<Option<Box<dyn MessageQueue>>, ConfigError> {
        let kind = match self {
            QueueOption::Enabled(false) => return Ok(None),
            QueueOption::Enabled(true) => None,
            QueueOption::Named(name) => Some(name.as_str()),
            QueueOption::Settings(settings) => settings.kind.as_deref(),
        };

        match kind {
            None | Some(SIMPLE_QUEUE) => {
                let queue: Box<dyn MessageQueue> = Box::new(SimpleQueue::new());
                Ok(Some(queue))
            }
            Some(other) => Err(ConfigError::UnknownMessageQueue(other.to_string())),
        }
    }
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(protocol) => vec![protocol],
        OneOrMany::Many(protocols) => protocols,
    })
}
