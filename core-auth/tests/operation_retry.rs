//! Executor recovery rules, end to end, on a paused clock.

mod common;

use common::*;
use core_auth::{AccessToken, ErrorKind, OperationError, OperationFailure, RetryPolicy};
use core_runtime::events::{CoreEvent, OperationEvent};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Operation that replays `outcomes` (then succeeds) and records the token
/// used for each attempt.
#[derive(Clone, Default)]
struct ScriptedOperation {
    outcomes: Arc<Mutex<VecDeque<Result<&'static str, OperationFailure>>>>,
    tokens: Arc<Mutex<Vec<String>>>,
}

impl ScriptedOperation {
    fn new(outcomes: Vec<Result<&'static str, OperationFailure>>) -> Self {
        Self {
            outcomes: Arc::new(Mutex::new(outcomes.into())),
            tokens: Arc::default(),
        }
    }

    fn always(failure: OperationFailure, times: usize) -> Self {
        Self::new(vec![Err(failure); times])
    }

    fn attempts(&self) -> usize {
        self.tokens.lock().unwrap().len()
    }

    fn tokens(&self) -> Vec<String> {
        self.tokens.lock().unwrap().clone()
    }

    fn call(&self, token: AccessToken) -> impl std::future::Future<Output = Result<&'static str, OperationFailure>> {
        self.tokens.lock().unwrap().push(token.access_token);
        let outcome = self.outcomes.lock().unwrap().pop_front().unwrap_or(Ok("ok"));
        async move { outcome }
    }
}

fn policy(max_retries: u32) -> RetryPolicy {
    RetryPolicy::new(max_retries)
        .with_base_delay(Duration::from_millis(100))
        .with_max_delay(Duration::from_secs(10))
}

#[tokio::test(start_paused = true)]
async fn transient_failures_stop_after_max_retries() {
    let h = harness(ScriptedTokenEndpoint::new());
    let op = ScriptedOperation::always(OperationFailure::status(503, "HTTP 503"), 100);

    let err = h
        .executor
        .run("list_accounts", |token| op.call(token), &policy(3))
        .await
        .unwrap_err();

    assert_eq!(op.attempts(), 4);
    assert_eq!(err.kind(), ErrorKind::Transient);
    assert_eq!(err.status(), Some(503));
    assert_eq!(err.operation(), "list_accounts");
    assert_eq!(h.endpoint.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn transport_failures_are_retried_with_the_same_token() {
    let h = harness(ScriptedTokenEndpoint::new());
    let op = ScriptedOperation::new(vec![
        Err(OperationFailure::transport("connection reset")),
        Err(OperationFailure::transport("connection reset")),
    ]);

    let value = h
        .executor
        .run("get_account", |token| op.call(token), &policy(3))
        .await
        .unwrap();

    assert_eq!(value, "ok");
    assert_eq!(op.tokens(), vec!["tok-1", "tok-1", "tok-1"]);
}

#[tokio::test(start_paused = true)]
async fn rate_limited_three_times_then_success() {
    let h = harness(ScriptedTokenEndpoint::new());
    let op = ScriptedOperation::always(OperationFailure::status(429, "HTTP 429"), 3);

    let value = h
        .executor
        .run("list_safes", |token| op.call(token), &policy(3))
        .await
        .unwrap();

    assert_eq!(value, "ok");
    assert_eq!(op.attempts(), 4);
}

#[tokio::test(start_paused = true)]
async fn retry_after_is_honoured() {
    let h = harness(ScriptedTokenEndpoint::new());
    let op = ScriptedOperation::new(vec![Err(
        OperationFailure::status(429, "HTTP 429").with_retry_after(Duration::from_secs(4))
    )]);

    let started = Instant::now();
    h.executor
        .run("list_safes", |token| op.call(token), &policy(3))
        .await
        .unwrap();

    assert!(started.elapsed() >= Duration::from_secs(4));
    assert_eq!(op.attempts(), 2);
}

#[tokio::test(start_paused = true)]
async fn unauthorized_twice_is_fatal_after_one_reauth() {
    let h = harness(ScriptedTokenEndpoint::new());
    let op = ScriptedOperation::always(OperationFailure::status(401, "HTTP 401"), 100);

    let err = h
        .executor
        .run("get_account", |token| op.call(token), &policy(3))
        .await
        .unwrap_err();

    assert_eq!(op.tokens(), vec!["tok-1", "tok-2"]);
    assert_eq!(h.endpoint.calls(), 2);
    assert_eq!(err.kind(), ErrorKind::Fatal);
    assert_eq!(err.status(), Some(401));
}

#[tokio::test(start_paused = true)]
async fn unauthorized_once_recovers_with_fresh_token() {
    let h = harness(ScriptedTokenEndpoint::new());
    let mut events = h.event_bus.subscribe();
    let op = ScriptedOperation::new(vec![Err(OperationFailure::status(401, "HTTP 401"))]);

    let value = h
        .executor
        .run("get_account", |token| op.call(token), &policy(0))
        .await
        .unwrap();

    assert_eq!(value, "ok");
    assert_eq!(op.tokens(), vec!["tok-1", "tok-2"]);

    let mut saw_reauth = false;
    while let Ok(event) = events.try_recv() {
        if matches!(
            event,
            CoreEvent::Operation(OperationEvent::ReauthRequired { .. })
        ) {
            saw_reauth = true;
        }
    }
    assert!(saw_reauth);
}

#[tokio::test(start_paused = true)]
async fn forbidden_and_not_found_are_not_retried() {
    for (status, kind) in [(403, ErrorKind::Forbidden), (404, ErrorKind::NotFound)] {
        let h = harness(ScriptedTokenEndpoint::new());
        let op = ScriptedOperation::always(OperationFailure::status(status, "denied"), 10);

        let err = h
            .executor
            .run("get_safe", |token| op.call(token), &policy(3))
            .await
            .unwrap_err();

        assert_eq!(op.attempts(), 1);
        assert_eq!(err.kind(), kind);
        assert_eq!(err.status(), Some(status));
    }
}

#[tokio::test(start_paused = true)]
async fn unexpected_client_error_is_fatal() {
    let h = harness(ScriptedTokenEndpoint::new());
    let op = ScriptedOperation::always(OperationFailure::status(400, "HTTP 400"), 10);

    let err = h
        .executor
        .run("add_account", |token| op.call(token), &policy(3))
        .await
        .unwrap_err();

    assert_eq!(op.attempts(), 1);
    assert!(matches!(
        err,
        OperationError::Failed {
            kind: ErrorKind::Fatal,
            status: Some(400),
            ..
        }
    ));
}

#[tokio::test(start_paused = true)]
async fn transient_refresh_failures_use_the_retry_budget() {
    let h = harness(ScriptedTokenEndpoint::with_script(vec![
        Ok(error_response(503)),
        Ok(error_response(503)),
    ]));
    let op = ScriptedOperation::new(vec![]);

    let value = h
        .executor
        .run("list_accounts", |token| op.call(token), &policy(3))
        .await
        .unwrap();

    assert_eq!(value, "ok");
    assert_eq!(h.endpoint.calls(), 3);
    assert_eq!(op.tokens(), vec!["tok-3"]);
}

#[tokio::test(start_paused = true)]
async fn transient_refresh_failures_exhaust_the_budget() {
    let h = harness(ScriptedTokenEndpoint::with_script(vec![
        Ok(error_response(503)),
        Ok(error_response(503)),
        Ok(error_response(503)),
    ]));
    let op = ScriptedOperation::new(vec![]);

    let err = h
        .executor
        .run("list_accounts", |token| op.call(token), &policy(2))
        .await
        .unwrap_err();

    assert!(matches!(err, OperationError::Authentication { .. }));
    assert_eq!(err.kind(), ErrorKind::Fatal);
    assert_eq!(h.endpoint.calls(), 3);
    assert_eq!(op.attempts(), 0);
}

#[tokio::test(start_paused = true)]
async fn rejected_credentials_are_terminal() {
    let h = harness(ScriptedTokenEndpoint::with_script(vec![Ok(error_response(
        400,
    ))]));
    let op = ScriptedOperation::new(vec![]);

    let err = h
        .executor
        .run("list_accounts", |token| op.call(token), &policy(3))
        .await
        .unwrap_err();

    assert!(matches!(err, OperationError::Authentication { .. }));
    assert!(!err.to_string().contains(SECRET));
    assert_eq!(h.endpoint.calls(), 1);
    assert_eq!(op.attempts(), 0);
}

#[tokio::test(start_paused = true)]
async fn deadline_stops_backoff() {
    let h = harness(ScriptedTokenEndpoint::new());
    let op = ScriptedOperation::always(OperationFailure::status(503, "HTTP 503"), 100);
    let policy = RetryPolicy::new(10)
        .with_base_delay(Duration::from_secs(1))
        .with_jitter(false)
        .with_deadline(Duration::from_millis(2500));

    let err = h
        .executor
        .run("list_accounts", |token| op.call(token), &policy)
        .await
        .unwrap_err();

    assert!(matches!(err, OperationError::TimedOut { .. }));
    assert_eq!(err.kind(), ErrorKind::Transient);
    // Attempts at t=0s and t=1s; the 2s backoff that follows crosses the deadline.
    assert_eq!(op.attempts(), 2);
}

#[tokio::test(start_paused = true)]
async fn cancellation_interrupts_backoff() {
    let h = harness(ScriptedTokenEndpoint::new());
    let op = ScriptedOperation::always(OperationFailure::status(503, "HTTP 503"), 100);
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        trigger.cancel();
    });

    let err = h
        .executor
        .run_with_cancellation(
            "list_accounts",
            |token| op.call(token),
            &RetryPolicy::new(10).with_base_delay(Duration::from_secs(1)),
            &cancel,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, OperationError::Cancelled { .. }));
    assert_eq!(err.kind(), ErrorKind::Fatal);
    assert_eq!(op.attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn retries_emit_events() {
    let h = harness(ScriptedTokenEndpoint::new());
    let mut events = h.event_bus.subscribe();
    let op = ScriptedOperation::always(OperationFailure::status(502, "HTTP 502"), 100);

    h.executor
        .run("list_accounts", |token| op.call(token), &policy(2))
        .await
        .unwrap_err();

    let mut retries = 0;
    let mut failed = None;
    while let Ok(event) = events.try_recv() {
        match event {
            CoreEvent::Operation(OperationEvent::Retrying { .. }) => retries += 1,
            CoreEvent::Operation(OperationEvent::Failed { kind, status, .. }) => {
                failed = Some((kind, status))
            }
            _ => {}
        }
    }

    assert_eq!(retries, 2);
    assert_eq!(failed, Some(("Transient".to_string(), Some(502))));
}

#[tokio::test]
async fn concurrent_unauthorized_callers_share_one_reexchange() {
    let h = harness(ScriptedTokenEndpoint::new().with_latency(Duration::from_millis(20)));
    let mut events = h.event_bus.subscribe();

    let stale = h.authenticator.get_valid_token().await.unwrap();
    assert_eq!(stale.access_token, "tok-1");

    let policy = RetryPolicy::no_retry();
    let calls = (0..16).map(|_| {
        h.executor.run(
            "list_accounts",
            |token: AccessToken| async move {
                tokio::task::yield_now().await;
                if token.access_token == "tok-1" {
                    Err(OperationFailure::status(401, "HTTP 401"))
                } else {
                    Ok(token.access_token)
                }
            },
            &policy,
        )
    });

    let results = futures::future::join_all(calls).await;

    for result in results {
        assert_eq!(result.unwrap(), "tok-2");
    }
    assert_eq!(h.endpoint.calls(), 2);

    let mut reauths = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(
            event,
            CoreEvent::Operation(OperationEvent::ReauthRequired { .. })
        ) {
            reauths += 1;
        }
    }
    assert_eq!(reauths, 16);
}
