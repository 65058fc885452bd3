//! Integration tests for the consumer worker against a real Kafka broker.
//!
//! These spin up a container via `testcontainers` and are ignored by
//! default; run with `cargo test -- --ignored`.
//!
//! # Panics
//!
//! Setup failures use `expect()`/`panic!()`, which is acceptable in test
//! code.

#![allow(clippy::expect_used)]
#![allow(clippy::panic)]
#![allow(clippy::unwrap_used)]

use std::time::Duration;

use bridge_channel::channel;
use bridge_core::BridgeConfig;
use bridge_kafka::{spawn, PartitionAssignment, WorkerConfig};
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use testcontainers::runners::AsyncRunner;
use testcontainers::ImageExt;
use testcontainers_modules::kafka::{Kafka, KAFKA_PORT};

async fn start_kafka() -> (testcontainers::ContainerAsync<Kafka>, String) {
    let kafka = Kafka::default()
        .with_env_var("KAFKA_AUTO_CREATE_TOPICS_ENABLE", "true")
        .start()
        .await
        .expect("failed to start kafka container");
    let host = kafka.get_host().await.expect("failed to get host");
    let port = kafka
        .get_host_port_ipv4(KAFKA_PORT)
        .await
        .expect("failed to get port");
    (kafka, format!("{host}:{port}"))
}

async fn create_topic(brokers: &str, topic: &str, partitions: i32) {
    let admin: AdminClient<_> = ClientConfig::new()
        .set("bootstrap.servers", brokers)
        .create()
        .expect("failed to create admin client");
    admin
        .create_topics(
            &[NewTopic::new(topic, partitions, TopicReplication::Fixed(1))],
            &AdminOptions::new(),
        )
        .await
        .expect("failed to create topic");
}

async fn produce(brokers: &str, topic: &str, key: &str, value: &str) {
    let producer: FutureProducer = ClientConfig::new()
        .set("bootstrap.servers", brokers)
        .create()
        .expect("failed to create producer");
    producer
        .send(
            FutureRecord::to(topic).payload(value).key(key),
            Duration::from_secs(10),
        )
        .await
        .expect("failed to produce record");
}

#[tokio::test]
#[ignore = "requires docker"]
async fn worker_delivers_records_from_group_subscription() {
    let (_kafka, brokers) = start_kafka().await;
    let topic = "sink-group-topic";
    create_topic(&brokers, topic, 1).await;
    produce(&brokers, topic, "k1", "v1").await;

    let (sender, mut receiver) = channel(16);
    let config = WorkerConfig {
        bridge: BridgeConfig {
            bootstrap_servers: brokers,
            auto_offset_reset: "earliest".to_string(),
            ..BridgeConfig::default()
        },
        topic: topic.to_string(),
        group_id: "sink-group".to_string(),
        partitions: PartitionAssignment::Group,
        tracker: None,
    };

    let runtime = tokio::runtime::Handle::current();
    let handle = spawn(config, sender, runtime).expect("failed to spawn worker");

    let message = tokio::time::timeout(Duration::from_secs(15), receiver.recv())
        .await
        .expect("timed out waiting for record")
        .expect("channel closed");
    let record = receiver.take(&message.token).expect("record missing from store");
    assert_eq!(record.value.as_deref(), Some(b"v1".as_slice()));

    handle.shutdown();
}

#[tokio::test]
#[ignore = "requires docker"]
async fn worker_rejects_nonexistent_explicit_partitions() {
    let (_kafka, brokers) = start_kafka().await;
    let topic = "sink-explicit-topic";
    create_topic(&brokers, topic, 1).await;

    let (sender, _receiver) = channel(16);
    let config = WorkerConfig {
        bridge: BridgeConfig {
            bootstrap_servers: brokers,
            ..BridgeConfig::default()
        },
        topic: topic.to_string(),
        group_id: "sink-group-explicit".to_string(),
        partitions: PartitionAssignment::Explicit(vec![(7, None)]),
        tracker: None,
    };

    let runtime = tokio::runtime::Handle::current();
    let result = spawn(config, sender, runtime);
    assert!(result.is_err());
}
