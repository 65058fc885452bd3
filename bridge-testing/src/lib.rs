//! Shared fakes and property-test strategies used across the bridge's test
//! suites: a fake AMQP sender link, a fake Kafka consumer double, and
//! proptest strategies for record sequences and disposition orderings.

use bridge_core::qos::Qos;
use bridge_core::record::RecordEnvelope;

/// Fake collaborators standing in for the real AMQP link and Kafka consumer.
pub mod fakes {
    use std::sync::{Arc, Mutex};

    use bridge_core::qos::Disposition;
    use bridge_core::DeliveryToken;
    use tokio::sync::Notify;

    use super::RecordEnvelope;

    /// A fake AMQP sender link: records every transfer sent and every
    /// credit grant, and lets tests script dispositions for unsettled
    /// deliveries without a real peer.
    #[derive(Debug, Default)]
    pub struct FakeLink {
        inner: Mutex<FakeLinkState>,
        credit_notify: Notify,
        disposition_notify: Notify,
        closed: Mutex<Option<Option<(&'static str, String)>>>,
    }

    #[derive(Debug, Default)]
    struct FakeLinkState {
        credit: u32,
        sent: Vec<(DeliveryToken, RecordEnvelope)>,
        dispositions: Vec<(DeliveryToken, Disposition)>,
    }

    impl FakeLink {
        /// A fake link with an initial credit grant.
        #[must_use]
        pub fn new(initial_credit: u32) -> Self {
            Self {
                inner: Mutex::new(FakeLinkState {
                    credit: initial_credit,
                    ..FakeLinkState::default()
                }),
                credit_notify: Notify::new(),
                disposition_notify: Notify::new(),
                closed: Mutex::new(None),
            }
        }

        /// Current credit available to send on.
        #[must_use]
        pub fn credit(&self) -> u32 {
            self.inner.lock().unwrap_or_else(|e| e.into_inner()).credit
        }

        /// Grant additional credit, as if a `Flow` performative arrived.
        pub fn grant_credit(&self, amount: u32) {
            self.inner
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .credit += amount;
            self.credit_notify.notify_waiters();
        }

        /// Resolves once credit is available, for tests driving the same
        /// drain-on-credit-return path the real adapter uses.
        pub async fn credit_available(&self) {
            loop {
                let notified = self.credit_notify.notified();
                if self.credit() > 0 {
                    return;
                }
                notified.await;
            }
        }

        /// Attempt to send a transfer. Returns `false` without recording
        /// anything if no credit remains, mirroring a real link's refusal
        /// to send past its credit window.
        #[must_use]
        pub fn try_send(&self, token: DeliveryToken, record: RecordEnvelope) -> bool {
            let mut state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            if state.credit == 0 {
                return false;
            }
            state.credit -= 1;
            state.sent.push((token, record));
            true
        }

        /// The transfers sent so far, in send order.
        #[must_use]
        pub fn sent(&self) -> Vec<(DeliveryToken, RecordEnvelope)> {
            self.inner.lock().unwrap_or_else(|e| e.into_inner()).sent.clone()
        }

        /// Script a disposition for a previously sent token, as if the
        /// remote peer had settled it.
        pub fn settle(&self, token: DeliveryToken, disposition: Disposition) {
            self.inner
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .dispositions
                .push((token, disposition));
            self.disposition_notify.notify_waiters();
        }

        /// Dispositions recorded so far, in the order they were scripted.
        #[must_use]
        pub fn dispositions(&self) -> Vec<(DeliveryToken, Disposition)> {
            self.inner
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .dispositions
                .clone()
        }

        /// Wait for a disposition to be [`Self::settle`]d for `token`.
        pub async fn await_disposition(&self, token: &DeliveryToken) -> Disposition {
            loop {
                let notified = self.disposition_notify.notified();
                if let Some(disposition) = self
                    .inner
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .dispositions
                    .iter()
                    .find(|(t, _)| t == token)
                    .map(|(_, d)| *d)
                {
                    return disposition;
                }
                notified.await;
            }
        }

        /// Record that the link was closed, with an optional AMQP
        /// condition, as the controller's error path does.
        pub fn record_close(&self, condition: Option<(&'static str, String)>) {
            *self.closed.lock().unwrap_or_else(|e| e.into_inner()) = Some(condition);
        }

        /// Whether [`Self::record_close`] has been called, and with what
        /// condition.
        #[must_use]
        pub fn closed_with(&self) -> Option<Option<(&'static str, String)>> {
            self.closed.lock().unwrap_or_else(|e| e.into_inner()).clone()
        }
    }

    /// A fake Kafka consumer that replays a fixed, ordered sequence of
    /// records instead of polling a real broker.
    #[derive(Debug, Clone)]
    pub struct FakeConsumer {
        records: Arc<Vec<RecordEnvelope>>,
        position: Arc<Mutex<usize>>,
    }

    impl FakeConsumer {
        /// Build a fake consumer that will yield exactly these records, in
        /// order, one per [`Self::poll`] call.
        #[must_use]
        pub fn new(records: Vec<RecordEnvelope>) -> Self {
            Self {
                records: Arc::new(records),
                position: Arc::new(Mutex::new(0)),
            }
        }

        /// Return the next record, or `None` once the fixture is
        /// exhausted.
        pub fn poll(&self) -> Option<RecordEnvelope> {
            let mut position = self.position.lock().unwrap_or_else(|e| e.into_inner());
            let record = self.records.get(*position).cloned();
            if record.is_some() {
                *position += 1;
            }
            record
        }
    }

}

/// Proptest strategies for generating record sequences and disposition
/// orderings, shared by the offset tracker's and the sink endpoint's
/// property tests.
pub mod strategies {
    use proptest::prelude::*;

    use bridge_core::qos::Disposition;

    use super::{Qos, RecordEnvelope};

    /// A single topic/partition's worth of strictly increasing offsets,
    /// the shape every property test in the tracker and the sink endpoint
    /// assumes a real partition produces.
    pub fn offset_sequence(max_len: usize) -> impl Strategy<Value = Vec<i64>> {
        (1..=max_len).prop_flat_map(|len| {
            Just(len).prop_flat_map(move |len| {
                (0i64..1000).prop_map(move |start| (start..start + len as i64).collect())
            })
        })
    }

    /// Turn an offset sequence into records on a fixed topic and
    /// partition.
    pub fn records_for(topic: &'static str, partition: i32, offsets: Vec<i64>) -> Vec<RecordEnvelope> {
        offsets
            .into_iter()
            .map(|offset| RecordEnvelope {
                topic: topic.to_string(),
                partition,
                offset,
                key: None,
                value: Some(offset.to_le_bytes().to_vec()),
                headers: Vec::new(),
            })
            .collect()
    }

    /// A permutation of `0..len`, modeling a delivery or disposition order
    /// that need not match send order.
    pub fn permutation_of(len: usize) -> impl Strategy<Value = Vec<usize>> {
        Just((0..len).collect::<Vec<_>>()).prop_shuffle()
    }

    /// One of the four disposition outcomes a peer can send back for an
    /// unsettled delivery.
    pub fn disposition() -> impl Strategy<Value = Disposition> {
        prop_oneof![
            Just(Disposition::Accepted),
            Just(Disposition::Rejected),
            Just(Disposition::Released),
            Just(Disposition::Modified),
        ]
    }

    /// Either QoS mode, for tests parameterized over settled vs unsettled
    /// behavior.
    pub fn qos() -> impl Strategy<Value = Qos> {
        prop_oneof![Just(Qos::Settled), Just(Qos::Unsettled)]
    }
}
