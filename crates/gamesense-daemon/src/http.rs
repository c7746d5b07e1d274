use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use gamesense_proto::config::{parse_tick_rate, PreferenceError, PreferenceStore, Preferences};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// The control API owns its own store on the preferences file; the
/// scheduler picks changes up from disk on its next tick.
#[derive(Clone)]
struct HttpState {
    preferences: Arc<Mutex<PreferenceStore>>,
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
    preferences: PathBuf,
}

#[derive(Serialize)]
struct ApiError {
    error: String,
}

pub fn router(preferences: PreferenceStore) -> Router {
    let state = HttpState {
        preferences: Arc::new(Mutex::new(preferences)),
    };

    Router::new()
        .route("/api/health", get(health))
        .route("/api/preferences", get(get_preferences))
        .route("/api/preferences/:key/:value", post(set_preference))
        .route("/api/tick-rate/:ms", post(set_tick_rate))
        .with_state(state)
}

pub fn start_server(
    bind_address: String,
    port: u16,
    preferences: PreferenceStore,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let app = router(preferences);

        let addr = format!("{}:{}", bind_address, port);
        let listener = match TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(e) => {
                error!("Failed to bind control API to {}: {}", addr, e);
                return;
            }
        };

        info!("Control API listening on http://{}", addr);

        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
        {
            error!("Control API error: {}", e);
        }
    })
}

async fn health(State(state): State<HttpState>) -> Json<Health> {
    let store = state.preferences.lock().await;
    Json(Health {
        status: "ok",
        preferences: store.path().to_path_buf(),
    })
}

async fn get_preferences(State(state): State<HttpState>) -> Json<Preferences> {
    let mut store = state.preferences.lock().await;
    Json(store.current().clone())
}

async fn set_preference(
    State(state): State<HttpState>,
    Path((key, value)): Path<(String, String)>,
) -> Response {
    info!("Control API: set {} = {}", key, value);
    let mut store = state.preferences.lock().await;
    match store.update(&key, &value) {
        Ok(prefs) => Json(prefs).into_response(),
        Err(e) => preference_error(e),
    }
}

async fn set_tick_rate(State(state): State<HttpState>, Path(ms): Path<String>) -> Response {
    info!("Control API: tick rate {} ms", ms);
    // validated here as well so a bad value never reaches the file
    if let Err(e) = parse_tick_rate(&ms) {
        return preference_error(e);
    }
    let mut store = state.preferences.lock().await;
    match store.update("tickRate", &ms) {
        Ok(prefs) => Json(prefs).into_response(),
        Err(e) => preference_error(e),
    }
}

fn preference_error(e: PreferenceError) -> Response {
    let status = match e {
        PreferenceError::UnknownKey(_)
        | PreferenceError::InvalidBool { .. }
        | PreferenceError::InvalidTickRate(_) => StatusCode::BAD_REQUEST,
        PreferenceError::Empty
        | PreferenceError::Io(_)
        | PreferenceError::Parse(_)
        | PreferenceError::Encode(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    warn!("Control API: rejected change: {}", e);
    (status, Json(ApiError { error: e.to_string() })).into_response()
}
