//! # Bridge Core
//!
//! Shared domain types for the AMQP 1.0 ↔ Kafka sink endpoint: the per-link
//! subsystem that drains records from a Kafka consumer and emits them as AMQP
//! transfers while honoring credit-based flow control, settled/unsettled QoS,
//! and per-partition offset commit semantics.
//!
//! This crate defines only the types and traits shared across the bridge's
//! other crates — the link address grammar, the record/token types, the
//! error taxonomy, and the two collaborator traits (`MessageConverter`,
//! `BridgeConfig`) that the rest of the bridge is built against.

pub mod address;
pub mod config;
pub mod converter;
pub mod endpoint;
pub mod error;
pub mod qos;
pub mod record;

pub use address::LinkAddress;
pub use config::BridgeConfig;
pub use converter::MessageConverter;
pub use endpoint::BridgeEndpoint;
pub use error::{AmqpErrorSymbol, BridgeError};
pub use qos::{Disposition, Qos};
pub use record::{DeliveryToken, RecordEnvelope};
