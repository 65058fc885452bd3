//! Record and delivery-token types that flow from the Kafka consumer worker
//! through the inter-thread channel to the link controller.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// A single Kafka record, lifted out of `rdkafka`'s borrowed message types
/// into an owned form suitable for crossing the channel to the event loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordEnvelope {
    /// Source topic.
    pub topic: String,
    /// Source partition.
    pub partition: i32,
    /// Offset within the partition.
    pub offset: i64,
    /// Record key, if present.
    pub key: Option<Vec<u8>>,
    /// Record value, if present (tombstones carry `None`).
    pub value: Option<Vec<u8>>,
    /// Record headers, preserved in order.
    pub headers: Vec<(String, Vec<u8>)>,
}

impl RecordEnvelope {
    /// The `(partition, offset)` pair this record occupies, used as the key
    /// into the offset tracker's per-partition sequences.
    #[must_use]
    pub const fn position(&self) -> (i32, i64) {
        (self.partition, self.offset)
    }
}

/// An opaque, link-unique identifier handed out by the channel for each
/// record delivered to the event loop, so that a later disposition (settled
/// accept/reject/release) can be matched back to the record it concerns
/// without retaining the record itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeliveryToken(String);

impl DeliveryToken {
    /// Mint a new, process-unique token.
    #[must_use]
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(format!("tok-{n}"))
    }

    /// Borrow the token's wire representation, used as the AMQP delivery
    /// tag and as the channel message body.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for DeliveryToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DeliveryToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for DeliveryToken {
    fn from(s: String) -> Self {
        Self(s)
    }
}
