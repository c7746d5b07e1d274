//! In-process stand-in for the GameSense engine: records every POST body
//! and answers with a configurable status.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::Value;
use tokio::net::TcpListener;

#[derive(Clone, Default)]
pub struct FakeEngine {
    pub received: Arc<Mutex<Vec<(String, Value)>>>,
    status: Arc<Mutex<Option<StatusCode>>>,
    delay: Arc<Mutex<Option<Duration>>>,
}

impl FakeEngine {
    /// Bind on an ephemeral port and serve in the background.
    pub async fn start() -> (Self, SocketAddr) {
        let engine = Self::default();
        let app = Router::new()
            .route("/:endpoint", post(record))
            .with_state(engine.clone());
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("fake engine should bind");
        let addr = listener.local_addr().expect("bound address");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        (engine, addr)
    }

    pub fn respond_with(&self, status: StatusCode) {
        *self.status.lock().unwrap() = Some(status);
    }

    pub fn stall_for(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn endpoints(&self) -> Vec<String> {
        self.received
            .lock()
            .unwrap()
            .iter()
            .map(|(endpoint, _)| endpoint.clone())
            .collect()
    }

    pub fn last_body(&self) -> Option<Value> {
        self.received.lock().unwrap().last().map(|(_, body)| body.clone())
    }
}

async fn record(
    State(engine): State<FakeEngine>,
    Path(endpoint): Path<String>,
    Json(body): Json<Value>,
) -> StatusCode {
    let delay = *engine.delay.lock().unwrap();
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
    engine.received.lock().unwrap().push((endpoint, body));
    let status = *engine.status.lock().unwrap();
    status.unwrap_or(StatusCode::OK)
}
