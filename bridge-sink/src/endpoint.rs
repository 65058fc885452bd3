//! The link controller: parses and validates a sink link's attach, wires up
//! the Kafka consumer worker and offset tracker, and runs the per-link
//! dispatch loop that drains the channel onto the AMQP sender.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use bridge_channel::{ChannelReceiver, ChannelRequest};
use bridge_core::endpoint::BoxFuture;
use bridge_core::error::BridgeError;
use bridge_core::qos::Qos;
use bridge_core::{BridgeConfig, BridgeEndpoint, DeliveryToken, LinkAddress};
use bridge_kafka::{PartitionAssignment, WorkerConfig, WorkerHandle};
use bridge_offsets::SharedOffsetTracker;
use tracing::instrument;

use crate::error::{ErrorCondition, SinkError};
use crate::filters::{self, FilterValue};
use crate::sender::SenderLink;

struct Running {
    worker: Arc<WorkerHandle>,
    dispatch: tokio::task::JoinHandle<()>,
}

struct Shared<L> {
    name: String,
    topic: String,
    group_id: String,
    qos: Qos,
    config: BridgeConfig,
    partition_filter: Option<i32>,
    offset_filter: Option<i64>,
    sender: Arc<L>,
    tracker: SharedOffsetTracker,
    running: StdMutex<Option<Running>>,
    close_callbacks: StdMutex<Vec<Box<dyn FnOnce() + Send>>>,
    closed: AtomicBool,
}

impl<L: SenderLink + 'static> Shared<L> {
    fn worker_handle(&self) -> Option<Arc<WorkerHandle>> {
        self.running
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .as_ref()
            .map(|running| Arc::clone(&running.worker))
    }

    fn fire_close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let callbacks = std::mem::take(
            &mut *self
                .close_callbacks
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner),
        );
        for callback in callbacks {
            callback();
        }
    }
}

/// The sink endpoint: one per attached AMQP sink link, composing the Kafka
/// consumer worker, the inter-thread channel, and the offset tracker behind
/// the [`BridgeEndpoint`] contract.
///
/// Generic over the concrete [`SenderLink`] so tests can drive the same
/// dispatch loop against `bridge-testing`'s fake link without pulling in an
/// AMQP crate dependency.
pub struct SinkEndpoint<L: SenderLink + 'static> {
    shared: Arc<Shared<L>>,
}

impl<L: SenderLink + 'static> SinkEndpoint<L> {
    /// Parse and validate a sink link's attach, without yet starting any
    /// background work — that happens in [`BridgeEndpoint::open`].
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Attach`] if the address is missing its
    /// `/group.id/` component, or if the source filters fail validation
    /// (see [`filters::validate`]).
    pub fn try_attach(
        address: &str,
        partition_filter: Option<FilterValue>,
        offset_filter: Option<FilterValue>,
        qos: Qos,
        sender: Arc<L>,
        config: BridgeConfig,
    ) -> Result<Self, SinkError> {
        let link_address = LinkAddress::parse(address)?;
        let parsed_filters = filters::validate(partition_filter, offset_filter)?;

        Ok(Self {
            shared: Arc::new(Shared {
                name: next_endpoint_name(),
                topic: link_address.topic,
                group_id: link_address.group_id,
                qos,
                config,
                partition_filter: parsed_filters.partition,
                offset_filter: parsed_filters.offset,
                sender,
                tracker: SharedOffsetTracker::new(),
                running: StdMutex::new(None),
                close_callbacks: StdMutex::new(Vec::new()),
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// The channel/keyed-store name this endpoint is addressed by, unique
    /// for the process's lifetime.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    #[instrument(skip(self), fields(name = %self.shared.name, topic = %self.shared.topic))]
    async fn open_internal(&self) -> Result<(), SinkError> {
        let capacity = self.shared.config.max_poll_batch_size
            + self.shared.config.default_credit_window as usize;
        let (channel_sender, receiver) = bridge_channel::channel(capacity);

        let partitions = match self.shared.partition_filter {
            Some(partition) => PartitionAssignment::Explicit(vec![(partition, self.shared.offset_filter)]),
            None => PartitionAssignment::Group,
        };

        let tracker_for_worker = self.shared.qos.awaits_disposition().then(|| self.shared.tracker.clone());

        let worker_config = WorkerConfig {
            bridge: self.shared.config.clone(),
            topic: self.shared.topic.clone(),
            group_id: self.shared.group_id.clone(),
            partitions,
            tracker: tracker_for_worker,
        };

        let runtime = tokio::runtime::Handle::current();
        let worker = Arc::new(bridge_kafka::spawn(worker_config, channel_sender, runtime)?);

        let dispatch = tokio::spawn(dispatch_loop(receiver, Arc::clone(&self.shared)));

        *self
            .shared
            .running
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(Running { worker, dispatch });

        Ok(())
    }

    #[instrument(skip(self), fields(name = %self.shared.name))]
    async fn close_internal(&self) {
        let running = self
            .shared
            .running
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();

        if let Some(running) = running {
            running.dispatch.abort();
            let worker = running.worker;
            let _ = tokio::task::spawn_blocking(move || worker.shutdown()).await;
        }

        self.shared.tracker.clear();
        self.shared.fire_close();
    }
}

impl<L: SenderLink + 'static> BridgeEndpoint for SinkEndpoint<L> {
    fn open(&self) -> BoxFuture<'_, Result<(), BridgeError>> {
        Box::pin(async move { self.open_internal().await.map_err(Into::into) })
    }

    fn close(&self) -> BoxFuture<'_, Result<(), BridgeError>> {
        Box::pin(async move {
            self.close_internal().await;
            Ok(())
        })
    }

    fn on_close(&self, callback: Box<dyn FnOnce() + Send>) {
        let already_closed = self.shared.closed.load(Ordering::SeqCst);
        if already_closed {
            callback();
            return;
        }
        self.shared
            .close_callbacks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(callback);
    }
}

fn next_endpoint_name() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("sink-{n}")
}

/// The event loop's per-endpoint task: reads channel messages, maintains the
/// deferred-delivery queue, and dispatches sends/errors per the link's QoS.
async fn dispatch_loop<L: SenderLink + 'static>(mut receiver: ChannelReceiver, shared: Arc<Shared<L>>) {
    let mut deferred: VecDeque<DeliveryToken> = VecDeque::new();
    let mut seen_partitions: HashSet<i32> = HashSet::new();
    let mut paused = false;

    loop {
        tokio::select! {
            message = receiver.recv() => {
                let Some(message) = message else {
                    break;
                };
                match message.request {
                    ChannelRequest::Send => {
                        if let Some(record) = receiver.peek(&message.token) {
                            seen_partitions.insert(record.partition);
                        }
                        deferred.push_back(message.token);
                        drain(&mut deferred, &mut paused, &receiver, &shared, &seen_partitions).await;
                    }
                    ChannelRequest::Error => {
                        let condition = ErrorCondition {
                            condition: message.error_amqp.unwrap_or("internal-error"),
                            description: message.error_desc.unwrap_or_default(),
                        };
                        shared.sender.close(Some(condition)).await;
                        break;
                    }
                }
            }
            () = shared.sender.credit_available(), if paused => {
                paused = false;
                drain(&mut deferred, &mut paused, &receiver, &shared, &seen_partitions).await;
            }
        }
    }

    shared.fire_close();
}

/// Drain the deferred queue FIFO while credit remains, pausing the worker on
/// the partitions this endpoint has ever seen once it runs out and resuming
/// them once the queue empties.
async fn drain<L: SenderLink + 'static>(
    deferred: &mut VecDeque<DeliveryToken>,
    paused: &mut bool,
    receiver: &ChannelReceiver,
    shared: &Arc<Shared<L>>,
    seen_partitions: &HashSet<i32>,
) {
    while let Some(token) = deferred.front().cloned() {
        if shared.sender.credit() == 0 {
            if !*paused {
                pause_all(shared, seen_partitions);
                *paused = true;
            }
            return;
        }

        // Peek rather than remove: the record must stay in the store until
        // the send actually succeeds, so a failed attempt can be retried
        // with the same record still available.
        let Some(record) = receiver.peek(&token) else {
            // Stale: already removed (e.g. the endpoint closed concurrently).
            deferred.pop_front();
            continue;
        };

        if !shared.sender.try_send(&token, &record) {
            // Lost the race between the credit check above and the send
            // itself; leave the token at the front of the queue and the
            // record in the store, and wait for the next credit grant.
            if !*paused {
                pause_all(shared, seen_partitions);
                *paused = true;
            }
            return;
        }

        deferred.pop_front();
        let _ = receiver.take(&token);

        if shared.qos.awaits_disposition() {
            shared.tracker.track(token.clone(), record.partition, record.offset);
            spawn_disposition_wait(shared, token);
        }
    }

    if *paused {
        resume_all(shared, seen_partitions);
        *paused = false;
    }
}

fn pause_all<L: SenderLink + 'static>(shared: &Arc<Shared<L>>, seen_partitions: &HashSet<i32>) {
    let Some(worker) = shared.worker_handle() else {
        return;
    };
    for &partition in seen_partitions {
        worker.pause(partition);
    }
}

fn resume_all<L: SenderLink + 'static>(shared: &Arc<Shared<L>>, seen_partitions: &HashSet<i32>) {
    let Some(worker) = shared.worker_handle() else {
        return;
    };
    for &partition in seen_partitions {
        worker.resume(partition);
    }
}

fn spawn_disposition_wait<L: SenderLink + 'static>(shared: &Arc<Shared<L>>, token: DeliveryToken) {
    let shared = Arc::clone(shared);
    tokio::spawn(async move {
        shared.sender.disposition(&token).await;
        shared.tracker.delivered(&token);
    });
}
