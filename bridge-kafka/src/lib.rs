//! The Kafka consumer worker: a dedicated OS thread that polls a
//! `rdkafka` consumer and forwards records to the bridge event loop over
//! the inter-thread channel.
//!
//! The worker runs on its own `std::thread`, not a tokio task, because
//! `rdkafka`'s blocking poll is the simplest way to get a bounded,
//! predictable poll cadence independent of the tokio scheduler; the bridge
//! event loop only ever talks to it through [`WorkerHandle`]'s directive
//! channel and the shared [`bridge_channel`] pair.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use bridge_channel::ChannelSender;
use bridge_core::error::AmqpErrorSymbol;
use bridge_core::record::RecordEnvelope;
use bridge_core::BridgeConfig;
use bridge_offsets::SharedOffsetTracker;
use bridge_runtime::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerState};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{BaseConsumer, CommitMode, Consumer};
use rdkafka::error::KafkaError;
use rdkafka::message::Message as _;
use rdkafka::topic_partition_list::{Offset, TopicPartitionList};
use thiserror::Error;
use tracing::{debug, error, warn};

/// Which partitions a sink link's worker should consume: the whole topic
/// via a consumer group, or an explicit set of partitions (optionally
/// seeked to a starting offset each).
#[derive(Debug, Clone)]
pub enum PartitionAssignment {
    /// Join `group_id` and let Kafka's group protocol assign partitions.
    Group,
    /// Consume exactly these partitions, each optionally seeked to a
    /// starting offset before the first poll.
    Explicit(Vec<(i32, Option<i64>)>),
}

/// Configuration for a single consumer worker, one per sink link.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Shared bridge configuration (bootstrap servers, poll cadence, etc).
    pub bridge: BridgeConfig,
    /// Topic to consume from.
    pub topic: String,
    /// Consumer group id the link's address named.
    pub group_id: String,
    /// Partition assignment strategy.
    pub partitions: PartitionAssignment,
    /// Shared offset tracker to query and commit against between poll
    /// cycles, for unsettled links. `None` for settled links, which rely on
    /// the consumer's own `enable.auto.commit` setting instead.
    pub tracker: Option<SharedOffsetTracker>,
}

/// Errors raised while starting or running a consumer worker.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// The underlying Kafka client returned an error.
    #[error("kafka error: {0}")]
    Kafka(#[from] KafkaError),

    /// An explicit partition assignment named partitions that do not exist
    /// on the topic.
    #[error("requested partitions do not exist on topic")]
    NoSuchPartitions,

    /// The channel to the event loop closed before the worker could start.
    #[error("channel to event loop is closed")]
    ChannelClosed,
}

impl From<&WorkerError> for Option<AmqpErrorSymbol> {
    fn from(value: &WorkerError) -> Self {
        match value {
            WorkerError::NoSuchPartitions => Some(AmqpErrorSymbol::PartitionsNotExist),
            WorkerError::Kafka(_) | WorkerError::ChannelClosed => None,
        }
    }
}

enum Directive {
    Pause(i32),
    Resume(i32),
    Shutdown,
}

/// A handle to a running consumer worker thread. Dropping this handle stops
/// the worker; call [`WorkerHandle::shutdown`] explicitly to wait for it.
///
/// `shutdown` takes `&self` rather than `&mut self` so the handle can be
/// shared (e.g. `Arc<WorkerHandle>`) between the event loop's dispatch task,
/// which calls [`Self::pause`]/[`Self::resume`] as credit changes, and the
/// close path, which calls `shutdown` exactly once.
pub struct WorkerHandle {
    directives: std_mpsc::Sender<Directive>,
    join: Mutex<Option<JoinHandle<()>>>,
    shut_down: Arc<AtomicBool>,
}

impl WorkerHandle {
    /// Pause polling of a partition. Safe to call at any time; takes effect
    /// before the worker's next poll.
    pub fn pause(&self, partition: i32) {
        let _ = self.directives.send(Directive::Pause(partition));
    }

    /// Resume polling of a previously paused partition.
    pub fn resume(&self, partition: i32) {
        let _ = self.directives.send(Directive::Resume(partition));
    }

    /// Stop the worker thread and wait for it to exit. Idempotent: calling
    /// this more than once is a no-op after the first call.
    ///
    /// Blocks on the worker thread's join; callers on an async runtime
    /// should run this via `spawn_blocking`.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.directives.send(Directive::Shutdown);
        if let Some(join) = self
            .join
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take()
        {
            let _ = join.join();
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Start a consumer worker thread for a sink link.
///
/// `runtime` is used to hand records back to the tokio-side channel from
/// the worker's blocking thread.
///
/// # Errors
///
/// Returns [`WorkerError::Kafka`] if the consumer cannot be constructed or
/// subscribed, and [`WorkerError::NoSuchPartitions`] if an explicit
/// partition assignment names partitions absent from the topic's metadata.
pub fn spawn(
    config: WorkerConfig,
    sender: ChannelSender,
    runtime: tokio::runtime::Handle,
) -> Result<WorkerHandle, WorkerError> {
    let consumer: BaseConsumer = build_client_config(&config)
        .create()
        .map_err(WorkerError::Kafka)?;

    let is_group_subscription = matches!(config.partitions, PartitionAssignment::Group);
    match &config.partitions {
        PartitionAssignment::Group => {
            consumer.subscribe(&[config.topic.as_str()])?;
        }
        PartitionAssignment::Explicit(parts) => {
            assign_explicit(&consumer, &config.topic, parts)?;
        }
    }

    let (directive_tx, directive_rx) = std_mpsc::channel();
    let shut_down = Arc::new(AtomicBool::new(false));
    let poll_timeout = config.bridge.poll_timeout;
    let max_batch = config.bridge.max_poll_batch_size;
    let breaker = CircuitBreaker::new(
        CircuitBreakerConfig::builder()
            .failure_threshold(config.bridge.poll_failure_escalation_threshold)
            .build(),
    );
    let topic = config.topic.clone();
    let tracker = config.tracker.clone();

    let join = std::thread::Builder::new()
        .name(format!("kafka-worker-{}-{}", config.topic, config.group_id))
        .spawn(move || {
            run_poll_loop(
                &consumer,
                &directive_rx,
                &sender,
                &runtime,
                poll_timeout,
                max_batch,
                &breaker,
                &topic,
                tracker.as_ref(),
                is_group_subscription,
            );
        })
        .map_err(|_| WorkerError::ChannelClosed)?;

    Ok(WorkerHandle {
        directives: directive_tx,
        join: Mutex::new(Some(join)),
        shut_down,
    })
}

fn build_client_config(config: &WorkerConfig) -> ClientConfig {
    let mut client_config = ClientConfig::new();
    client_config
        .set("bootstrap.servers", &config.bridge.bootstrap_servers)
        .set("group.id", &config.group_id)
        .set(
            "enable.auto.commit",
            if config.bridge.enable_auto_commit {
                "true"
            } else {
                "false"
            },
        )
        .set("auto.offset.reset", &config.bridge.auto_offset_reset);
    client_config
}

/// The partition ids a topic's metadata reports, or
/// [`WorkerError::NoSuchPartitions`] if the topic is absent or carries none.
fn existing_partitions(consumer: &BaseConsumer, topic: &str) -> Result<HashSet<i32>, WorkerError> {
    let metadata = consumer.fetch_metadata(Some(topic), Duration::from_secs(10))?;
    let Some(topic_metadata) = metadata.topics().iter().find(|t| t.name() == topic) else {
        return Err(WorkerError::NoSuchPartitions);
    };
    let existing: HashSet<i32> = topic_metadata.partitions().iter().map(|p| p.id()).collect();
    if existing.is_empty() {
        return Err(WorkerError::NoSuchPartitions);
    }
    Ok(existing)
}

fn assign_explicit(
    consumer: &BaseConsumer,
    topic: &str,
    parts: &[(i32, Option<i64>)],
) -> Result<(), WorkerError> {
    let existing = existing_partitions(consumer, topic)?;
    if parts.iter().any(|(p, _)| !existing.contains(p)) {
        return Err(WorkerError::NoSuchPartitions);
    }

    let mut tpl = TopicPartitionList::new();
    for (partition, offset) in parts {
        let offset = offset.map_or(Offset::Beginning, Offset::Offset);
        tpl.add_partition_offset(topic, *partition, offset)?;
    }
    consumer.assign(&tpl)?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run_poll_loop(
    consumer: &BaseConsumer,
    directives: &std_mpsc::Receiver<Directive>,
    sender: &ChannelSender,
    runtime: &tokio::runtime::Handle,
    poll_timeout: Duration,
    max_batch: usize,
    breaker: &CircuitBreaker,
    topic: &str,
    tracker: Option<&SharedOffsetTracker>,
    group_subscription: bool,
) {
    let mut paused: HashSet<i32> = HashSet::new();

    // A group subscription only registers interest; the group protocol
    // resolves the actual assignment asynchronously, so this is the first
    // point at which "no partitions" (e.g. the topic is absent) can be
    // observed. An explicit assignment already validated this before the
    // worker thread was even started.
    if group_subscription {
        match existing_partitions(consumer, topic) {
            Ok(_) => {}
            Err(WorkerError::NoSuchPartitions) => {
                error!(topic, "group subscription resolved to no partitions, escalating");
                let _ = runtime.block_on(sender.publish_error(
                    AmqpErrorSymbol::PartitionsNotExist.as_str(),
                    format!("topic {topic} has no partitions"),
                ));
                return;
            }
            Err(err) => {
                warn!(topic, error = %err, "failed to fetch topic metadata after subscribing");
            }
        }
    }

    loop {
        match directives.try_recv() {
            Ok(Directive::Pause(partition)) => {
                apply_pause(consumer, topic, partition, &mut paused, true);
            }
            Ok(Directive::Resume(partition)) => {
                apply_pause(consumer, topic, partition, &mut paused, false);
            }
            Ok(Directive::Shutdown) => {
                debug!(topic, "consumer worker received shutdown directive");
                return;
            }
            Err(std_mpsc::TryRecvError::Empty) => {}
            Err(std_mpsc::TryRecvError::Disconnected) => {
                debug!(topic, "directive channel disconnected, shutting down");
                return;
            }
        }

        let mut delivered_this_round = 0;
        while delivered_this_round < max_batch {
            match consumer.poll(poll_timeout) {
                Some(Ok(message)) => {
                    let _ = runtime.block_on(breaker.call(|| async { Ok::<(), ()>(()) }));
                    let record = to_envelope(topic, &message);
                    if runtime.block_on(sender.publish(record)).is_err() {
                        debug!(topic, "event loop channel closed, shutting down worker");
                        return;
                    }
                    delivered_this_round += 1;
                }
                Some(Err(err)) => {
                    warn!(topic, error = %err, "poll error");
                    let _ = runtime.block_on(breaker.call(|| async { Err::<(), ()>(()) }));
                    if runtime.block_on(breaker.state()) == CircuitBreakerState::Open {
                        error!(topic, "poll failure threshold exceeded, escalating");
                        let _ = runtime
                            .block_on(sender.publish_error("internal-error", err.to_string()));
                    }
                    break;
                }
                None => break,
            }
        }

        if let Some(tracker) = tracker {
            commit_advanced_frontiers(consumer, tracker, topic);
        }
    }
}

/// Commit whatever prefix the offset tracker has advanced since the last
/// call, for unsettled links. Runs once per outer poll-loop iteration, i.e.
/// between poll batches.
///
/// Commit failures are logged and left for the next cycle to retry; they
/// never surface to AMQP.
fn commit_advanced_frontiers(consumer: &BaseConsumer, tracker: &SharedOffsetTracker, topic: &str) {
    let offsets = tracker.snapshot();
    if offsets.is_empty() {
        return;
    }

    let mut tpl = TopicPartitionList::new();
    for (&partition, &offset) in &offsets {
        if let Err(err) = tpl.add_partition_offset(topic, partition, Offset::Offset(offset)) {
            warn!(topic, partition, error = %err, "failed to stage offset for commit");
        }
    }

    match consumer.commit(&tpl, CommitMode::Async) {
        Ok(()) => {
            for (partition, offset) in offsets {
                tracker.commit(partition, offset);
            }
        }
        Err(err) => {
            warn!(topic, error = %err, "offset commit failed, will retry next cycle");
        }
    }
}

fn apply_pause(
    consumer: &BaseConsumer,
    topic: &str,
    partition: i32,
    paused: &mut HashSet<i32>,
    pause: bool,
) {
    let mut tpl = TopicPartitionList::new();
    let _ = tpl.add_partition(topic, partition);
    let result = if pause {
        consumer.pause(&tpl)
    } else {
        consumer.resume(&tpl)
    };
    if let Err(err) = result {
        warn!(topic, partition, error = %err, "failed to toggle partition pause state");
        return;
    }
    if pause {
        paused.insert(partition);
    } else {
        paused.remove(&partition);
    }
}

fn to_envelope(topic: &str, message: &rdkafka::message::BorrowedMessage<'_>) -> RecordEnvelope {
    let headers = message
        .headers()
        .map(|headers| {
            headers
                .iter()
                .map(|header| {
                    (
                        header.key.to_string(),
                        header.value.map(<[u8]>::to_vec).unwrap_or_default(),
                    )
                })
                .collect()
        })
        .unwrap_or_default();

    RecordEnvelope {
        topic: topic.to_string(),
        partition: message.partition(),
        offset: message.offset(),
        key: message.key().map(<[u8]>::to_vec),
        value: message.payload().map(<[u8]>::to_vec),
        headers,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_error_maps_no_such_partitions_to_amqp_symbol() {
        let symbol: Option<AmqpErrorSymbol> = (&WorkerError::NoSuchPartitions).into();
        assert_eq!(symbol, Some(AmqpErrorSymbol::PartitionsNotExist));
    }

    #[test]
    fn worker_error_kafka_has_no_amqp_symbol() {
        let err = WorkerError::ChannelClosed;
        let symbol: Option<AmqpErrorSymbol> = (&err).into();
        assert_eq!(symbol, None);
    }
}
