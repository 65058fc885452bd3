//! Error taxonomy shared across the bridge crates.

use thiserror::Error;

/// The closed set of AMQP error condition symbols the sink endpoint can
/// raise against a link, independent of any particular AMQP crate's error
/// type. `as_str` is the single source of truth for the wire string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AmqpErrorSymbol {
    /// The source address did not contain a `/group.id/` component.
    NoGroupId,
    /// A partition filter was present but malformed.
    WrongPartitionFilter,
    /// An offset filter was present but malformed.
    WrongOffsetFilter,
    /// An offset filter was present without an accompanying partition filter.
    NoPartitionFilter,
    /// A filter of unrecognized shape was present.
    WrongFilter,
    /// The requested partition(s) do not exist on the topic.
    PartitionsNotExist,
}

impl AmqpErrorSymbol {
    /// The wire string for this condition, as it appears in an AMQP
    /// `error-condition` field.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NoGroupId => "no-groupid",
            Self::WrongPartitionFilter => "wrong-partition-filter",
            Self::WrongOffsetFilter => "wrong-offset-filter",
            Self::NoPartitionFilter => "no-partition-filter",
            Self::WrongFilter => "wrong-filter",
            Self::PartitionsNotExist => "partitions-not-exists",
        }
    }
}

impl std::fmt::Display for AmqpErrorSymbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::error::Error for AmqpErrorSymbol {}

/// Errors shared across the bridge's crates that are not specific to any
/// single subsystem (Kafka worker, link controller, offset tracker).
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The link's source address failed validation; carries the AMQP
    /// condition that should be sent back to the peer in the `Detach`.
    #[error("invalid link address: {0}")]
    InvalidAddress(#[from] AmqpErrorSymbol),

    /// A message conversion between the Kafka record and AMQP message
    /// formats failed.
    #[error("message conversion failed: {0}")]
    Conversion(String),

    /// The endpoint was asked to operate on a link that is not attached.
    #[error("link is not attached")]
    NotAttached,

    /// The endpoint was asked to perform work after it had already closed.
    #[error("endpoint is closed")]
    Closed,
}
