//! The sink endpoint: the per-link subsystem that drains records from a
//! Kafka consumer and emits them as AMQP transfers, honoring credit-based
//! flow control, settled/unsettled QoS, and per-partition offset commit
//! semantics.
//!
//! This crate is the Link Controller of the bridge's sink side. It composes
//! [`bridge_kafka`]'s consumer worker, [`bridge_channel`]'s inter-thread
//! handoff, and [`bridge_offsets`]'s frontier tracker behind
//! [`bridge_core::BridgeEndpoint`], the contract the out-of-scope AMQP
//! acceptor depends on.

pub mod endpoint;
pub mod error;
pub mod filters;
pub mod sender;

pub use endpoint::SinkEndpoint;
pub use error::{ErrorCondition, SinkError};
pub use filters::{FilterValue, ParsedFilters};
pub use sender::{Fe2o3SenderLink, SenderLink};
