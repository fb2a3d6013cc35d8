use std::sync::atomic::{AtomicUsize, Ordering};

use adno_agent_transport::{RetryPolicy, TransportError};

#[tokio::test]
async fn retries_transient_failures_up_to_max_retries() {
    let policy = RetryPolicy {
        max_retries: 3,
        backoff_ms: 1,
    };
    let calls = AtomicUsize::new(0);

    let result: Result<(), TransportError> = policy
        .execute(|| async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(TransportError::Timeout)
        })
        .await;

    assert!(result.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn succeeds_without_exhausting_retries() {
    let policy = RetryPolicy {
        max_retries: 5,
        backoff_ms: 1,
    };
    let calls = AtomicUsize::new(0);

    let result = policy
        .execute(|| async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(TransportError::Timeout)
            } else {
                Ok::<_, TransportError>("ok")
            }
        })
        .await;

    assert_eq!(result.unwrap(), "ok");
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn non_transient_4xx_is_not_retried() {
    let policy = RetryPolicy {
        max_retries: 5,
        backoff_ms: 1,
    };
    let calls = AtomicUsize::new(0);

    let result: Result<(), TransportError> = policy
        .execute(|| async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(TransportError::Http {
                status: 400,
                problem: None,
                body: "bad request".to_string(),
            })
        })
        .await;

    assert!(result.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn retries_429_even_though_it_is_a_4xx() {
    let policy = RetryPolicy {
        max_retries: 2,
        backoff_ms: 1,
    };
    let calls = AtomicUsize::new(0);

    let result: Result<(), TransportError> = policy
        .execute(|| async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(TransportError::Http {
                status: 429,
                problem: None,
                body: "slow down".to_string(),
            })
        })
        .await;

    assert!(result.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}
