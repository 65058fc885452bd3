//! The contract a concrete bridge endpoint (sink, and eventually source)
//! presents to the bridge's link-acceptance layer.

use std::future::Future;
use std::pin::Pin;

use crate::error::BridgeError;

/// A boxed future, used in place of `async fn` on this trait so that
/// endpoints can be held as `Arc<dyn BridgeEndpoint>`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Lifecycle contract for a bridge endpoint bound to a single AMQP link.
///
/// An endpoint is opened once a link's source address has been parsed and
/// validated, runs for the lifetime of the link, and is closed either by
/// the remote peer detaching or by the bridge shutting down.
pub trait BridgeEndpoint: Send + Sync {
    /// Start the endpoint's background work (for a sink, this spawns the
    /// Kafka consumer worker thread and begins draining records).
    ///
    /// # Errors
    ///
    /// Returns a [`BridgeError`] if the endpoint cannot be started, for
    /// example because the link address failed validation.
    fn open(&self) -> BoxFuture<'_, Result<(), BridgeError>>;

    /// Stop the endpoint's background work and release its resources.
    ///
    /// Idempotent: closing an already-closed endpoint is not an error.
    fn close(&self) -> BoxFuture<'_, Result<(), BridgeError>>;

    /// Register a callback invoked once the endpoint has finished closing,
    /// whether closed explicitly or because the underlying worker exited.
    fn on_close(&self, callback: Box<dyn FnOnce() + Send>);
}
