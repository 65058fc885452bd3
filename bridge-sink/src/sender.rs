//! The AMQP sender side of a sink link.
//!
//! [`SenderLink`] is the seam the link controller dispatches transfers
//! through. It is kept dyn-compatible and framed in terms of the plain
//! [`RecordEnvelope`], the same way [`bridge_core::converter::MessageConverter`]
//! is: the controller and its tests never need to know the wire message
//! shape, only whether a send happened and, for unsettled links, how it was
//! eventually disposed.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use bridge_core::converter::MessageConverter;
use bridge_core::endpoint::BoxFuture;
use bridge_core::qos::Disposition;
use bridge_core::record::RecordEnvelope;
use bridge_core::DeliveryToken;
use dashmap::DashMap;
use fe2o3_amqp::link::SendError;
use fe2o3_amqp::Sender;
use fe2o3_amqp_types::definitions;
use tokio::sync::{oneshot, Mutex, Notify};
use tracing::warn;

use crate::error::ErrorCondition;

/// The AMQP sender a sink link dispatches transfers through.
///
/// Message conversion is this trait's implementation's job, not the
/// controller's: a converter failure is a per-record concern (logged and
/// dropped, per the bridge's error-handling rules), and keeping it inside
/// the adapter means the controller and its tests never need an AMQP crate
/// dependency at all.
pub trait SenderLink: Send + Sync {
    /// Outstanding link credit. `0` means the controller must queue the next
    /// token rather than attempt a send.
    fn credit(&self) -> u32;

    /// Resolves once the link has credit again, for the controller's drain
    /// loop to wait on while paused.
    fn credit_available(&self) -> BoxFuture<'_, ()>;

    /// Attempt to transmit `record` under `token`, consuming one credit.
    /// Returns `false` without consuming credit or sending anything if none
    /// remains — the controller should treat this as "try again later",
    /// never as a dropped record.
    ///
    /// A record this implementation cannot convert to an AMQP message is
    /// logged and dropped internally; that case also returns `true`, since
    /// from the controller's perspective the token has been fully handled
    /// and must not be queued again.
    fn try_send(&self, token: &DeliveryToken, record: &RecordEnvelope) -> bool;

    /// Wait for the peer's disposition on a transfer previously sent
    /// unsettled under `token`. Only ever awaited for unsettled sends.
    fn disposition(&self, token: &DeliveryToken) -> BoxFuture<'_, Disposition>;

    /// Detach the link, attaching an AMQP error condition if one caused the
    /// close.
    fn close(&self, condition: Option<ErrorCondition>) -> BoxFuture<'_, ()>;
}

/// A [`SenderLink`] backed by a real `fe2o3-amqp` [`Sender`].
///
/// Credit is tracked independently of the underlying sender's own flow
/// state: the session updates it via [`Self::grant_credit`] as `Flow`
/// performatives arrive, and this type only ever decrements it on a
/// successful [`SenderLink::try_send`]. This mirrors the shape
/// `bridge-testing`'s fake link presents, so the controller's dispatch loop
/// is identical in production and in tests.
pub struct Fe2o3SenderLink {
    sender: Arc<Mutex<Sender>>,
    converter: Box<dyn MessageConverter>,
    credit: AtomicU32,
    credit_notify: Notify,
    /// Outcome of each in-flight send, filled in by the task
    /// [`Self::try_send`] spawns and drained by [`Self::disposition`].
    pending: DashMap<DeliveryToken, oneshot::Receiver<Disposition>>,
}

impl Fe2o3SenderLink {
    /// Wrap an attached `fe2o3-amqp` sender with the given initial credit
    /// and message converter.
    #[must_use]
    pub fn new(sender: Sender, converter: Box<dyn MessageConverter>, initial_credit: u32) -> Self {
        Self {
            sender: Arc::new(Mutex::new(sender)),
            converter,
            credit: AtomicU32::new(initial_credit),
            credit_notify: Notify::new(),
            pending: DashMap::new(),
        }
    }

    /// Record that the peer granted more credit, as observed from an
    /// incoming `Flow` performative.
    pub fn grant_credit(&self, amount: u32) {
        self.credit.fetch_add(amount, Ordering::SeqCst);
        self.credit_notify.notify_waiters();
    }
}

impl SenderLink for Fe2o3SenderLink {
    fn credit(&self) -> u32 {
        self.credit.load(Ordering::SeqCst)
    }

    fn credit_available(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            if self.credit() > 0 {
                return;
            }
            self.credit_notify.notified().await;
        })
    }

    fn try_send(&self, token: &DeliveryToken, record: &RecordEnvelope) -> bool {
        if self
            .credit
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |c| c.checked_sub(1))
            .is_err()
        {
            return false;
        }

        let message = match self.converter.to_amqp(record) {
            Ok(message) => message,
            Err(err) => {
                warn!(%token, error = %err, "dropping record that failed conversion");
                return true;
            }
        };

        let (tx, rx) = oneshot::channel();
        self.pending.insert(token.clone(), rx);

        let sender = Arc::clone(&self.sender);
        let token = token.clone();
        tokio::spawn(async move {
            let mut sender = sender.lock().await;
            let disposition = match sender.send(message).await {
                Ok(()) => Disposition::Accepted,
                Err(err) => {
                    let disposition = send_error_to_disposition(&err).unwrap_or(Disposition::Released);
                    warn!(%token, error = %err, "amqp transfer not accepted");
                    disposition
                }
            };
            let _ = tx.send(disposition);
        });

        true
    }

    fn disposition(&self, token: &DeliveryToken) -> BoxFuture<'_, Disposition> {
        let waiting = self.pending.remove(token).map(|(_, rx)| rx);
        Box::pin(async move {
            match waiting {
                Some(rx) => rx.await.unwrap_or(Disposition::Released),
                None => Disposition::Released,
            }
        })
    }

    fn close(&self, condition: Option<ErrorCondition>) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let mut sender = self.sender.lock().await;
            let error = condition.map(|c| {
                definitions::Error::new(
                    definitions::ErrorCondition::Custom(c.condition.to_string()),
                    Some(c.description),
                    None,
                )
            });
            if let Err(err) = sender.close_with_error(error).await {
                warn!(error = %err, "failed to close amqp sender cleanly");
            }
        })
    }
}

/// Translate a `fe2o3-amqp` send failure into the disposition it implies,
/// where one applies.
#[must_use]
pub fn send_error_to_disposition(err: &SendError) -> Option<Disposition> {
    match err {
        SendError::Rejected(_) => Some(Disposition::Rejected),
        SendError::Released(_) => Some(Disposition::Released),
        SendError::Modified(_) => Some(Disposition::Modified),
        SendError::Local(_) | SendError::Detached(_) => None,
    }
}
