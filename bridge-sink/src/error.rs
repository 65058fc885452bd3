//! The sink endpoint's error taxonomy and its mapping onto the bridge-wide
//! [`BridgeError`].

use bridge_core::error::{AmqpErrorSymbol, BridgeError};
use bridge_kafka::WorkerError;
use thiserror::Error;

/// An AMQP error condition attached to a link detach, combining the fixed
/// [`AmqpErrorSymbol`] namespace with a human-readable description.
#[derive(Debug, Clone)]
pub struct ErrorCondition {
    /// The wire condition symbol.
    pub condition: &'static str,
    /// Free-text description sent alongside the condition.
    pub description: String,
}

impl ErrorCondition {
    /// Build a condition from one of the bridge's own named symbols.
    #[must_use]
    pub fn from_symbol(symbol: AmqpErrorSymbol, description: impl Into<String>) -> Self {
        Self {
            condition: symbol.as_str(),
            description: description.into(),
        }
    }
}

/// Errors the sink endpoint can raise, at attach time or during its running
/// lifetime.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The link's address or source filters failed validation; the link is
    /// closed with this symbol and no worker is ever started.
    #[error("attach rejected: {0}")]
    Attach(#[from] AmqpErrorSymbol),

    /// The Kafka consumer worker could not be started.
    #[error("consumer worker failed: {0}")]
    Worker(#[source] WorkerError),

    /// The endpoint was asked to perform work after it had already closed.
    #[error("endpoint is closed")]
    Closed,
}

impl SinkError {
    /// The AMQP condition this error should close the link with, if any.
    /// Worker failures not already classified with a symbol (e.g. a
    /// transient Kafka client error) have no single condition to report and
    /// are surfaced only through logging.
    #[must_use]
    pub fn amqp_condition(&self) -> Option<AmqpErrorSymbol> {
        match self {
            Self::Attach(symbol) => Some(*symbol),
            Self::Worker(_) | Self::Closed => None,
        }
    }
}

impl From<WorkerError> for SinkError {
    fn from(err: WorkerError) -> Self {
        let symbol: Option<AmqpErrorSymbol> = (&err).into();
        match symbol {
            Some(symbol) => Self::Attach(symbol),
            None => Self::Worker(err),
        }
    }
}

impl From<SinkError> for BridgeError {
    fn from(err: SinkError) -> Self {
        match err {
            SinkError::Attach(symbol) => Self::InvalidAddress(symbol),
            SinkError::Closed => Self::Closed,
            SinkError::Worker(worker) => Self::Conversion(worker.to_string()),
        }
    }
}
