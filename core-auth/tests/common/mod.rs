#![allow(dead_code)]

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse};
use bridge_traits::time::ManualClock;
use chrono::{DateTime, Utc};
use core_auth::{Authenticator, Credentials, OperationExecutor};
use core_runtime::events::EventBus;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

pub const SECRET: &str = "s3cr3t-value";

/// Token endpoint that replays scripted replies, then issues `tok-N` tokens.
#[derive(Default)]
pub struct ScriptedTokenEndpoint {
    script: Mutex<VecDeque<BridgeResult<HttpResponse>>>,
    calls: AtomicUsize,
    latency: Option<Duration>,
    gate: Option<Arc<Notify>>,
}

impl ScriptedTokenEndpoint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(replies: Vec<BridgeResult<HttpResponse>>) -> Self {
        Self {
            script: Mutex::new(replies.into()),
            ..Self::default()
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Holds every exchange until `gate` is notified.
    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HttpClient for ScriptedTokenEndpoint {
    async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;

        if !request.url.ends_with("/oauth2/platformtoken") {
            return Err(BridgeError::OperationFailed(format!(
                "unexpected url {}",
                request.url
            )));
        }

        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let scripted = self.script.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Ok(token_response(&format!("tok-{}", n), 900)))
    }
}

pub fn token_response(token: &str, expires_in: i64) -> HttpResponse {
    HttpResponse::new(
        200,
        format!(
            r#"{{"access_token":"{}","token_type":"Bearer","expires_in":{}}}"#,
            token, expires_in
        ),
    )
}

pub fn error_response(status: u16) -> HttpResponse {
    HttpResponse::new(
        status,
        format!(
            r#"{{"error":"server_error","error_description":"client_secret={} rejected"}}"#,
            SECRET
        ),
    )
}

pub fn start_time() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap()
}

pub fn credentials() -> Credentials {
    Credentials::new("acme", "svc-gateway@acme", SECRET)
}

pub struct Harness {
    pub endpoint: Arc<ScriptedTokenEndpoint>,
    pub clock: Arc<ManualClock>,
    pub event_bus: EventBus,
    pub authenticator: Authenticator,
    pub executor: OperationExecutor,
}

pub fn harness(endpoint: ScriptedTokenEndpoint) -> Harness {
    let endpoint = Arc::new(endpoint);
    let clock = Arc::new(ManualClock::new(start_time()));
    let event_bus = EventBus::new(256);
    let authenticator = Authenticator::new(
        credentials(),
        endpoint.clone(),
        clock.clone(),
        Some(event_bus.clone()),
    );
    let executor = OperationExecutor::new(authenticator.clone()).with_event_bus(event_bus.clone());

    Harness {
        endpoint,
        clock,
        event_bus,
        authenticator,
        executor,
    }
}
