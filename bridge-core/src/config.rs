//! Bridge-wide and per-link configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the sink endpoint's Kafka consumer and flow-control
/// defaults.
///
/// This type only describes validated, in-memory configuration; loading it
/// from a file or environment is left to the embedding application.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BridgeConfig {
    /// Comma-separated Kafka bootstrap server list, e.g. `"broker:9092"`.
    pub bootstrap_servers: String,

    /// Deserializer identifier applied to record keys before they reach the
    /// [`crate::converter::MessageConverter`]. Opaque to this crate.
    pub key_deserializer: String,

    /// Deserializer identifier applied to record values.
    pub value_deserializer: String,

    /// Whether the underlying consumer auto-commits offsets on its own
    /// schedule. The sink endpoint otherwise commits explicitly from the
    /// offset tracker, so this is normally `false`.
    pub enable_auto_commit: bool,

    /// Where to start consuming when no committed offset exists for a
    /// partition: `"earliest"` or `"latest"`.
    pub auto_offset_reset: String,

    /// How long the consumer worker's poll call blocks before returning
    /// control to check for pause/resume/shutdown directives.
    #[serde(with = "duration_millis")]
    pub poll_timeout: Duration,

    /// Upper bound on records drained from a single poll before yielding
    /// back to the worker's directive-check loop.
    pub max_poll_batch_size: usize,

    /// The link credit window granted by default when a receiver does not
    /// specify one explicitly.
    pub default_credit_window: u32,

    /// Number of consecutive Kafka poll failures before the worker escalates
    /// to an `error` channel message instead of retrying silently.
    pub poll_failure_escalation_threshold: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            bootstrap_servers: "localhost:9092".to_string(),
            key_deserializer: "bytes".to_string(),
            value_deserializer: "bytes".to_string(),
            enable_auto_commit: false,
            auto_offset_reset: "latest".to_string(),
            poll_timeout: Duration::from_millis(250),
            max_poll_batch_size: 500,
            default_credit_window: 100,
            poll_failure_escalation_threshold: 5,
        }
    }
}

impl BridgeConfig {
    /// Validate the configuration, rejecting values that would make the
    /// consumer worker or offset tracker unable to operate.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid field encountered.
    pub fn validate(&self) -> Result<(), String> {
        if self.bootstrap_servers.trim().is_empty() {
            return Err("bootstrap_servers must not be empty".to_string());
        }
        if self.max_poll_batch_size == 0 {
            return Err("max_poll_batch_size must be greater than zero".to_string());
        }
        if self.default_credit_window == 0 {
            return Err("default_credit_window must be greater than zero".to_string());
        }
        if self.auto_offset_reset != "earliest" && self.auto_offset_reset != "latest" {
            return Err("auto_offset_reset must be \"earliest\" or \"latest\"".to_string());
        }
        Ok(())
    }
}

mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(d)?;
        Ok(Duration::from_millis(millis))
    }
}
