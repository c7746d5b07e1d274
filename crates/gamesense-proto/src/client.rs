//! HTTP client for the GameSense engine.
//!
//! The engine is a local HTTP server whose address is published in
//! `coreProps.json`.  Every call has a connect and a request timeout so a
//! stalled engine costs at most one tick.  There is no retry here: a
//! connection-class error tells the caller to throw the client away and
//! build a fresh one (which re-reads the address) on its next attempt.

use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use crate::config::EngineConfig;
use crate::platform;
use crate::protocol::{DisplayEvent, EventBinding, GameMetadata, HandlerOptions};

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("engine unreachable at {address}: {reason}")]
    Unreachable { address: String, reason: String },
    #[error("engine at {address} did not answer in time")]
    Timeout { address: String },
    #[error("engine rejected {endpoint} with HTTP {status}: {body}")]
    Rejected {
        endpoint: String,
        status: u16,
        body: String,
    },
    #[error("engine address unavailable: {0}")]
    Discovery(String),
    #[error("failed to build engine request: {0}")]
    Encode(String),
}

impl TransportError {
    /// True when the engine could not be talked to at all.  The client that
    /// produced this error should be discarded.
    pub fn is_connection_failure(&self) -> bool {
        matches!(
            self,
            Self::Unreachable { .. } | Self::Timeout { .. } | Self::Discovery(_)
        )
    }
}

/// Something that can put a display event on the device.
pub trait DeviceApi: Send + Sync {
    /// Where this client sends to, for error reports.
    fn address(&self) -> &str;

    fn send(&self, event: &DisplayEvent) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Register the game and bind the screen handlers for every event.
    fn register(
        &self,
        options: HandlerOptions,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}

/// Builds fresh clients after a connection failure.
pub trait DeviceApiFactory: Send {
    type Client: DeviceApi;

    fn create(&mut self) -> Result<Self::Client, TransportError>;
}

// ── GameSenseClient ───────────────────────────────────────────────────────────

pub struct GameSenseClient {
    http: reqwest::Client,
    base_url: String,
    game: String,
}

impl GameSenseClient {
    pub fn new(
        address: &str,
        game: &str,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            // The engine is always local; never route it through a proxy
            .no_proxy()
            .build()
            .map_err(|e| TransportError::Encode(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url(address),
            game: game.to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn game(&self) -> &str {
        &self.game
    }

    pub async fn send_event(&self, event: &DisplayEvent) -> Result<(), TransportError> {
        let body = event.to_game_event(&self.game);
        self.post("game_event", &body).await
    }

    pub async fn register_game(&self) -> Result<(), TransportError> {
        self.post("game_metadata", &GameMetadata::new(&self.game)).await
    }

    pub async fn bind_event(&self, binding: &EventBinding) -> Result<(), TransportError> {
        self.post("bind_game_event", binding).await
    }

    async fn post<T: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &T,
    ) -> Result<(), TransportError> {
        let url = format!("{}/{}", self.base_url, endpoint);
        let resp = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = resp.status();
        if status.is_success() {
            debug!("engine: POST /{} -> {}", endpoint, status);
            return Ok(());
        }

        let body = resp.text().await.unwrap_or_default();
        Err(TransportError::Rejected {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
            body: body.trim().to_string(),
        })
    }

    fn classify(&self, err: reqwest::Error) -> TransportError {
        let address = self.base_url.clone();
        if err.is_timeout() {
            TransportError::Timeout { address }
        } else if err.is_builder() {
            TransportError::Encode(err.to_string())
        } else {
            // connect refused, connection reset, broken body: all mean the
            // engine went away
            TransportError::Unreachable {
                address,
                reason: err.to_string(),
            }
        }
    }
}

impl DeviceApi for GameSenseClient {
    fn address(&self) -> &str {
        &self.base_url
    }

    async fn send(&self, event: &DisplayEvent) -> Result<(), TransportError> {
        self.send_event(event).await
    }

    async fn register(&self, options: HandlerOptions) -> Result<(), TransportError> {
        self.register_game().await?;
        for binding in EventBinding::all(&self.game, options) {
            self.bind_event(&binding).await?;
        }
        Ok(())
    }
}

fn base_url(address: &str) -> String {
    let address = address.trim().trim_end_matches('/');
    if address.starts_with("http://") || address.starts_with("https://") {
        address.to_string()
    } else {
        format!("http://{}", address)
    }
}

// ── factory ───────────────────────────────────────────────────────────────────

/// Creates `GameSenseClient`s from the engine config.  The address is
/// resolved on every `create()`, so an engine restart on a new port is
/// picked up by the next client.
pub struct GameSenseClientFactory {
    engine: EngineConfig,
}

impl GameSenseClientFactory {
    pub fn new(engine: EngineConfig) -> Self {
        Self { engine }
    }

    pub fn resolve_address(&self) -> Result<String, TransportError> {
        if let Some(address) = self.engine.address.as_deref() {
            if !address.trim().is_empty() {
                return Ok(address.trim().to_string());
            }
        }
        platform::read_engine_address(&self.engine.core_props).map_err(|e| {
            TransportError::Discovery(format!("{}: {}", self.engine.core_props.display(), e))
        })
    }
}

impl DeviceApiFactory for GameSenseClientFactory {
    type Client = GameSenseClient;

    fn create(&mut self) -> Result<GameSenseClient, TransportError> {
        let address = self.resolve_address()?;
        GameSenseClient::new(
            &address,
            &self.engine.game,
            Duration::from_millis(self.engine.connect_timeout_ms),
            Duration::from_millis(self.engine.request_timeout_ms),
        )
    }
}
