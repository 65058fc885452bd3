//! The inter-thread channel carrying delivery notifications from the Kafka
//! consumer worker thread to the bridge's tokio event loop, plus the keyed
//! store that lets the event loop recover the `RecordEnvelope` behind a
//! `DeliveryToken` without shipping the record itself across the channel.
//!
//! The worker thread is the single publisher; the event loop is the single,
//! strictly serialized consumer. Publishing never blocks the worker thread on
//! the event loop keeping up — a full channel applies backpressure to the
//! poll loop instead, which is what drives pause/resume of Kafka partitions.

use std::sync::Arc;

use bridge_core::record::RecordEnvelope;
use bridge_core::DeliveryToken;
use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::mpsc;

/// What the publisher is asking the event loop to do with the token it
/// names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelRequest {
    /// A record is ready to be sent as an AMQP transfer.
    Send,
    /// The worker hit an unrecoverable error and the link should be torn
    /// down with the attached condition.
    Error,
}

/// A single message crossing the channel. The body is always a delivery
/// token; the record itself lives in the paired [`RecordStore`].
#[derive(Debug, Clone)]
pub struct ChannelMessage {
    /// What the event loop should do in response.
    pub request: ChannelRequest,
    /// The token this message concerns, or the token under which an error
    /// occurred (for [`ChannelRequest::Error`], this may be a sentinel with
    /// no corresponding store entry).
    pub token: DeliveryToken,
    /// AMQP error condition symbol, set only for [`ChannelRequest::Error`].
    pub error_amqp: Option<&'static str>,
    /// Human-readable error description, set only for
    /// [`ChannelRequest::Error`].
    pub error_desc: Option<String>,
}

impl ChannelMessage {
    /// Build a `send` message for a record already placed in the store.
    #[must_use]
    pub fn send(token: DeliveryToken) -> Self {
        Self {
            request: ChannelRequest::Send,
            token,
            error_amqp: None,
            error_desc: None,
        }
    }

    /// Build an `error` message carrying the AMQP condition to detach the
    /// link with.
    #[must_use]
    pub fn error(token: DeliveryToken, error_amqp: &'static str, error_desc: String) -> Self {
        Self {
            request: ChannelRequest::Error,
            token,
            error_amqp: Some(error_amqp),
            error_desc: Some(error_desc),
        }
    }
}

/// Errors raised by the channel itself, distinct from the `error` message
/// that the channel carries for the worker's own domain errors.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The event loop's receiving half has been dropped; the worker should
    /// shut down.
    #[error("channel closed: no receiver")]
    Closed,
}

/// Keyed store of records awaiting delivery, addressed by the same token
/// carried in the corresponding [`ChannelMessage`].
///
/// Backed by a concurrent map so the worker thread can insert while the
/// event loop concurrently removes entries for tokens it has already
/// delivered or settled.
#[derive(Debug, Default)]
pub struct RecordStore {
    records: DashMap<DeliveryToken, RecordEnvelope>,
}

impl RecordStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
        }
    }

    /// Insert a record under a freshly minted token.
    pub fn insert(&self, token: DeliveryToken, record: RecordEnvelope) {
        self.records.insert(token, record);
    }

    /// Remove and return the record for a token, if still present.
    #[must_use]
    pub fn take(&self, token: &DeliveryToken) -> Option<RecordEnvelope> {
        self.records.remove(token).map(|(_, record)| record)
    }

    /// Number of records currently held, awaiting delivery or disposition.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store currently holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// The worker-thread side of the channel: publishes messages and inserts
/// records into the shared store.
#[derive(Debug, Clone)]
pub struct ChannelSender {
    tx: mpsc::Sender<ChannelMessage>,
    store: Arc<RecordStore>,
}

impl ChannelSender {
    /// Insert a record under a new token and publish a `send` message for
    /// it. Blocks (from the worker's perspective, on its own thread, not the
    /// event loop's) until the channel has capacity, which is how a slow
    /// event loop applies backpressure back to the poll loop.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Closed`] if the event loop has dropped its
    /// receiver.
    pub async fn publish(&self, record: RecordEnvelope) -> Result<DeliveryToken, ChannelError> {
        let token = DeliveryToken::new();
        self.store.insert(token.clone(), record);
        self.tx
            .send(ChannelMessage::send(token.clone()))
            .await
            .map_err(|_| ChannelError::Closed)?;
        Ok(token)
    }

    /// Publish an error message, escalating a worker failure to the event
    /// loop without an accompanying record.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Closed`] if the event loop has dropped its
    /// receiver.
    pub async fn publish_error(
        &self,
        error_amqp: &'static str,
        error_desc: String,
    ) -> Result<(), ChannelError> {
        let token = DeliveryToken::new();
        self.tx
            .send(ChannelMessage::error(token, error_amqp, error_desc))
            .await
            .map_err(|_| ChannelError::Closed)
    }

    /// Try to publish without waiting for channel capacity, used by
    /// non-blocking call sites that would rather fail fast than stall.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Closed`] if the channel is full or the
    /// receiver has been dropped.
    pub fn try_publish(&self, record: RecordEnvelope) -> Result<DeliveryToken, ChannelError> {
        let token = DeliveryToken::new();
        self.store.insert(token.clone(), record);
        self.tx
            .try_send(ChannelMessage::send(token.clone()))
            .map_err(|_| ChannelError::Closed)?;
        Ok(token)
    }
}

/// The event-loop side of the channel: a single, strictly serialized
/// consumer, plus a handle onto the shared store.
#[derive(Debug)]
pub struct ChannelReceiver {
    rx: mpsc::Receiver<ChannelMessage>,
    store: Arc<RecordStore>,
}

impl ChannelReceiver {
    /// Receive the next message, or `None` once the sender has been dropped
    /// and all buffered messages drained.
    pub async fn recv(&mut self) -> Option<ChannelMessage> {
        self.rx.recv().await
    }

    /// Look up the record behind a token without removing it.
    #[must_use]
    pub fn peek(&self, token: &DeliveryToken) -> Option<RecordEnvelope> {
        self.store.records.get(token).map(|r| r.value().clone())
    }

    /// Remove and return the record behind a token, once it has been fully
    /// delivered and (for unsettled links) disposed of.
    #[must_use]
    pub fn take(&self, token: &DeliveryToken) -> Option<RecordEnvelope> {
        self.store.take(token)
    }
}

/// Construct a bound channel sender/receiver pair backed by a shared store,
/// with a bounded capacity that determines how far the worker can run ahead
/// of the event loop before blocking.
#[must_use]
pub fn channel(capacity: usize) -> (ChannelSender, ChannelReceiver) {
    let (tx, rx) = mpsc::channel(capacity);
    let store = Arc::new(RecordStore::new());
    (
        ChannelSender {
            tx,
            store: Arc::clone(&store),
        },
        ChannelReceiver { rx, store },
    )
}
