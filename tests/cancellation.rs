//! Tests for abort and cooperative cancellation.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use query_cache::{CancellationToken, FetchError, LifecycleState, QueryClient, QueryEngine};

/// Engine whose fetch waits `delay_ms` unless cancelled, recording errors.
fn slow_engine(
    client: &QueryClient,
) -> (QueryEngine<u64, u64>, Arc<Mutex<Vec<FetchError>>>) {
    let errors = Arc::new(Mutex::new(Vec::new()));
    let sink = errors.clone();
    let engine = client
        .query("slow", |delay_ms: u64, token: Option<CancellationToken>| async move {
            let sleep = tokio::time::sleep(Duration::from_millis(delay_ms));
            match token {
                Some(token) => token.run_until_cancelled(sleep).await?,
                None => sleep.await,
            }
            Ok::<_, FetchError>(delay_ms)
        })
        .error_handler(move |err| sink.lock().push(err.clone()))
        .build();
    (engine, errors)
}

#[tokio::test]
async fn test_abort_routes_through_error_path() {
    let client = QueryClient::new();
    let (engine, errors) = slow_engine(&client);

    let running = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.execute(10_000).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(engine.is_loading());

    engine.abort(Some("user left"));
    assert_eq!(engine.state(), LifecycleState::Pending);
    let result = running.await.unwrap();

    assert!(result.is_none());
    assert_eq!(engine.state(), LifecycleState::Error);
    assert!(engine.data().is_none());

    let errors = errors.lock();
    assert_eq!(errors.len(), 1);
    match &errors[0] {
        FetchError::Cancelled { reason } => assert_eq!(reason.as_deref(), Some("user left")),
        other => panic!("Expected Cancelled, got {:?}", other),
    }
}

#[tokio::test]
async fn test_abort_before_execute_leaves_state_untouched() {
    let client = QueryClient::new();
    let (engine, errors) = slow_engine(&client);

    engine.abort(None);
    assert_eq!(engine.state(), LifecycleState::Idle);

    // The token stays cancelled for this engine.
    assert!(engine.execute(1).await.is_none());
    assert_eq!(engine.state(), LifecycleState::Error);
    assert!(errors.lock()[0].is_cancelled());
}

#[tokio::test]
async fn test_non_cancellable_engine_ignores_abort() {
    let client = QueryClient::new();
    let seen_token = Arc::new(Mutex::new(None));
    let sink = seen_token.clone();
    let engine = client
        .query("plain", move |_: (), token: Option<CancellationToken>| {
            *sink.lock() = Some(token.is_some());
            async { Ok(1u8) }
        })
        .cancellable(false)
        .build();

    engine.abort(Some("ignored"));
    assert_eq!(engine.execute(()).await.as_deref(), Some(&1));
    assert_eq!(*seen_token.lock(), Some(false));
    assert_eq!(engine.state(), LifecycleState::Success);
}

#[tokio::test]
async fn test_fetch_ignoring_token_completes() {
    let client = QueryClient::new();
    let engine = client
        .query("stubborn", |_: (), _| async {
            tokio::time::sleep(Duration::from_millis(30)).await;
            Ok("done".to_string())
        })
        .build();

    let running = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.execute(()).await })
    };
    tokio::time::sleep(Duration::from_millis(5)).await;
    engine.abort(Some("too late"));

    let result = running.await.unwrap();
    assert_eq!(result.as_deref().map(String::as_str), Some("done"));
    assert_eq!(engine.state(), LifecycleState::Success);
    assert!(engine
        .cancellation_token()
        .is_some_and(CancellationToken::is_cancelled));
}

#[tokio::test]
async fn test_polling_fetch_sees_cancellation() {
    let client = QueryClient::new();
    let engine = client
        .query("poll", |steps: u32, token: Option<CancellationToken>| async move {
            let mut done = 0;
            for _ in 0..steps {
                if let Some(token) = &token {
                    token.check()?;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
                done += 1;
            }
            Ok::<_, FetchError>(done)
        })
        .build();

    let running = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.execute(1_000).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    engine.abort(None);

    assert!(running.await.unwrap().is_none());
    assert_eq!(engine.state(), LifecycleState::Error);
}
