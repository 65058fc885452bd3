//! Integration tests for the sink endpoint's attach-time contract: address
//! and source-filter validation, and close-callback delivery.
//!
//! The per-link dispatch loop's credit and offset-tracking mechanics are
//! covered by `bridge-sink`'s own unit tests (in `src/endpoint.rs`), which
//! can reach the private dispatch loop directly; a separate integration
//! crate cannot, since `dispatch_loop` is not part of this crate's public
//! surface.

use std::sync::{Arc, Mutex};

use bridge_core::endpoint::BoxFuture;
use bridge_core::error::AmqpErrorSymbol;
use bridge_core::qos::{Disposition, Qos};
use bridge_core::record::RecordEnvelope;
use bridge_core::{BridgeConfig, BridgeEndpoint, DeliveryToken};
use bridge_sink::{ErrorCondition, FilterValue, SenderLink, SinkEndpoint, SinkError};
use bridge_testing::fakes::FakeLink;

/// Neither `SenderLink` nor `FakeLink` is local to this crate, so this
/// newtype is needed to satisfy the orphan rule.
struct FakeSenderLink(Arc<FakeLink>);

impl SenderLink for FakeSenderLink {
    fn credit(&self) -> u32 {
        self.0.credit()
    }

    fn credit_available(&self) -> BoxFuture<'_, ()> {
        Box::pin(self.0.credit_available())
    }

    fn try_send(&self, token: &DeliveryToken, record: &RecordEnvelope) -> bool {
        self.0.try_send(token.clone(), record.clone())
    }

    fn disposition(&self, token: &DeliveryToken) -> BoxFuture<'_, Disposition> {
        Box::pin(self.0.await_disposition(token))
    }

    fn close(&self, condition: Option<ErrorCondition>) -> BoxFuture<'_, ()> {
        let inner = Arc::clone(&self.0);
        let condition = condition.map(|c| (c.condition, c.description));
        Box::pin(async move {
            inner.record_close(condition);
        })
    }
}

fn attach(
    address: &str,
    partition_filter: Option<FilterValue>,
    offset_filter: Option<FilterValue>,
) -> Result<SinkEndpoint<FakeSenderLink>, SinkError> {
    let link = Arc::new(FakeSenderLink(Arc::new(FakeLink::new(1))));
    SinkEndpoint::try_attach(
        address,
        partition_filter,
        offset_filter,
        Qos::Unsettled,
        link,
        BridgeConfig::default(),
    )
}

#[test]
fn missing_group_id_is_rejected_at_attach_and_no_worker_is_started() {
    let err = attach("orders", None, None).unwrap_err();
    assert!(matches!(err, SinkError::Attach(AmqpErrorSymbol::NoGroupId)));
}

#[test]
fn offset_filter_without_partition_is_rejected_at_attach() {
    let err = attach("orders/group.id/g1", None, Some(FilterValue::Long(42))).unwrap_err();
    assert!(matches!(
        err,
        SinkError::Attach(AmqpErrorSymbol::NoPartitionFilter)
    ));
}

#[test]
fn valid_address_and_filters_attach_cleanly() {
    let endpoint = attach(
        "orders/group.id/g1",
        Some(FilterValue::Int(2)),
        Some(FilterValue::Long(10)),
    )
    .unwrap();
    assert!(endpoint.name().starts_with("sink-"));
}

#[tokio::test]
async fn close_without_ever_opening_fires_registered_callbacks_exactly_once() {
    let sink = attach("orders/group.id/g1", None, None).unwrap();

    let fired = Arc::new(Mutex::new(0));
    let counter = Arc::clone(&fired);
    sink.on_close(Box::new(move || {
        *counter.lock().unwrap() += 1;
    }));

    sink.close().await.unwrap();
    assert_eq!(*fired.lock().unwrap(), 1);

    // Closing again is a no-op; a callback already fired does not fire
    // twice.
    sink.close().await.unwrap();
    assert_eq!(*fired.lock().unwrap(), 1);
}

#[tokio::test]
async fn callback_registered_after_close_fires_immediately() {
    let sink = attach("orders/group.id/g1", None, None).unwrap();
    sink.close().await.unwrap();

    let fired = Arc::new(Mutex::new(0));
    let counter = Arc::clone(&fired);
    sink.on_close(Box::new(move || {
        *counter.lock().unwrap() += 1;
    }));
    assert_eq!(*fired.lock().unwrap(), 1);
}
