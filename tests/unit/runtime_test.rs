//! Tests for tokio spawner utilities

use qoms::core::{QueueError, Spawn};
use qoms::runtime::tokio_spawner::TokioSpawner;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_tokio_spawner_spawn() {
    let spawner = TokioSpawner::new(tokio::runtime::Handle::current());

    let (tx, rx) = tokio::sync::oneshot::channel();
    spawner.spawn(Box::pin(async move {
        tx.send(123).unwrap();
    }));

    let result = rx.await.expect("oneshot result");
    assert_eq!(result, 123);
}

#[tokio::test]
async fn test_current_spawner_inside_runtime() {
    let spawner = TokioSpawner::current().expect("inside runtime");
    let (tx, rx) = tokio::sync::oneshot::channel();
    spawner.spawn(Box::pin(async move {
        let _ = tx.send("done");
    }));
    assert_eq!(rx.await.expect("oneshot result"), "done");
}

#[test]
fn test_current_spawner_outside_runtime() {
    let err = TokioSpawner::current().expect_err("no runtime");
    assert!(matches!(err, QueueError::Runtime(_)));
}
