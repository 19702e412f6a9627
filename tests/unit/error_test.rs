//! Tests for error types

use qoms::core::{Outcome, PermanentFailure, QueueError};
use qoms::util::serde::OperationId;

#[test]
fn test_shutdown_error() {
    let err = QueueError::Shutdown;
    assert_eq!(format!("{}", err), "queue shut down");
}

#[test]
fn test_invalid_config_error() {
    let err = QueueError::InvalidConfig("tick_interval_ms must be greater than 0".to_string());
    assert_eq!(
        format!("{}", err),
        "invalid configuration: tick_interval_ms must be greater than 0"
    );
}

#[test]
fn test_retries_exhausted_carries_last_error() {
    let id = OperationId::new();
    let err = QueueError::RetriesExhausted {
        id,
        retries: 3,
        source: anyhow::anyhow!("connection reset"),
    };
    assert!(err.is_exhausted());
    assert_eq!(
        format!("{}", err),
        format!("operation {id} failed after 3 retries: connection reset")
    );
    let source = std::error::Error::source(&err).expect("source");
    assert_eq!(source.to_string(), "connection reset");
}

#[test]
fn test_rejected_is_not_exhausted() {
    let err = QueueError::Rejected {
        id: OperationId::new(),
        source: PermanentFailure::new("bad input").into(),
    };
    assert!(!err.is_exhausted());
    assert!(err.to_string().ends_with("rejected: bad input"));
}

#[test]
fn test_outcome_classification() {
    let ok: Outcome<u8> = Outcome::from_result(Ok(1));
    assert!(ok.is_success());

    let transient: Outcome<u8> = Outcome::from_result(Err(anyhow::anyhow!("timeout")));
    assert!(matches!(transient, Outcome::TransientFailure(_)));

    let wrapped = anyhow::Error::new(PermanentFailure::new("schema mismatch")).context("loading row");
    let terminal: Outcome<u8> = Outcome::from_result(Err(wrapped));
    assert!(matches!(terminal, Outcome::TerminalFailure(_)));
}
