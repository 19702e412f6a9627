//! Tests for builder modules

use qoms::builders::QueueBuilder;
use qoms::config::QueueConfig;
use qoms::core::QueueError;
use qoms::infra::ManualProbe;
use qoms::util::serde::Priority;

#[test]
fn test_queue_builder_keeps_config() {
    let config = QueueConfig {
        max_retries: 7,
        ..QueueConfig::default()
    };
    let builder = QueueBuilder::new(config).with_probe(ManualProbe::default());
    assert_eq!(builder.config().max_retries, 7);
}

#[test]
fn test_queue_builder_rejects_invalid_config() {
    let config = QueueConfig {
        lease_timeout_ms: 0,
        ..QueueConfig::default()
    };
    let err = QueueBuilder::new(config).build().expect_err("invalid config");
    assert!(matches!(err, QueueError::InvalidConfig(_)));
}

#[test]
fn test_queue_builder_needs_runtime() {
    let err = QueueBuilder::new(QueueConfig::default())
        .with_probe(ManualProbe::default())
        .build()
        .expect_err("no runtime");
    assert!(matches!(err, QueueError::Runtime(_)));
}

#[tokio::test]
async fn test_queue_builder_builds_working_queue() {
    let queue = QueueBuilder::new(QueueConfig::default())
        .with_probe(ManualProbe::new(5.0, 5.0))
        .build()
        .expect("queue");

    let value = queue
        .enqueue(Priority::Normal, || async { Ok::<_, anyhow::Error>(21 * 2) })
        .await
        .expect("completes");
    assert_eq!(value, 42);
    assert_eq!(queue.config().max_retries, 3);
    queue.shutdown().await;
}
