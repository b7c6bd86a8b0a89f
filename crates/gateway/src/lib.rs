//! HTTP gateway for LexChamber.
//!
//! Exposes the consultation API, the per-user refresh stream, and the
//! embedded browser frontend. Each browser tab holds one bearer token that
//! scopes its own session state.
//!
//! Built on Axum for high performance async HTTP.

pub mod api_v1;
pub mod frontend;

use axum::extract::DefaultBodyLimit;
use axum::{
    Router,
    http::{HeaderMap, StatusCode},
    middleware::{self, Next},
    response::Json,
    routing::get,
};
use lexchamber_agent::{ChamberManager, SessionState, TranscriptView, TurnController};
use lexchamber_config::AppConfig;
use lexchamber_core::event::EventBus;
use lexchamber_core::inference::InferenceGateway;
use lexchamber_core::store::ConsultationStore;
use lexchamber_store::SqliteStore;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn};

/// Maximum number of live tab sessions before the oldest idle one is evicted.
const MAX_SESSIONS: usize = 10_000;

/// One browser tab's session, shared between its concurrent requests.
pub type TabHandle = Arc<Mutex<SessionState>>;

struct TabEntry {
    session: TabHandle,
    created: Instant,
}

/// Shared application state for the gateway.
pub struct GatewayState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn ConsultationStore>,
    pub events: Arc<EventBus>,
    pub controller: Arc<TurnController>,
    pub chambers: ChamberManager,
    pub transcripts: TranscriptView,
    sessions: RwLock<HashMap<String, TabEntry>>,
    rate_limiter: RateLimiter,
    started_at: Instant,
}

pub type SharedState = Arc<GatewayState>;

impl GatewayState {
    pub fn new(
        config: AppConfig,
        store: Arc<dyn ConsultationStore>,
        gateway: Arc<dyn InferenceGateway>,
    ) -> Self {
        let config = Arc::new(config);
        let events = Arc::new(EventBus::default());
        let controller = Arc::new(TurnController::from_config(
            store.clone(),
            gateway,
            events.clone(),
            &config,
        ));

        Self {
            chambers: ChamberManager::new(store.clone(), events.clone()),
            transcripts: TranscriptView::new(store.clone()),
            rate_limiter: RateLimiter::new(
                config.gateway.rate_limit_per_minute,
                Duration::from_secs(60),
            ),
            config,
            store,
            events,
            controller,
            sessions: RwLock::new(HashMap::new()),
            started_at: Instant::now(),
        }
    }

    /// Register a tab session and return its bearer token.
    pub async fn open_session(&self, session: SessionState) -> String {
        let token = uuid::Uuid::new_v4().to_string();
        let mut sessions = self.sessions.write().await;

        if sessions.len() >= MAX_SESSIONS {
            let oldest = sessions
                .iter()
                .filter(|(_, e)| e.session.try_lock().is_ok_and(|s| !s.is_busy()))
                .min_by_key(|(_, e)| e.created)
                .map(|(t, _)| t.clone());
            if let Some(oldest) = oldest {
                sessions.remove(&oldest);
            }
        }

        sessions.insert(
            token.clone(),
            TabEntry {
                session: Arc::new(Mutex::new(session)),
                created: Instant::now(),
            },
        );
        token
    }

    pub async fn session(&self, token: &str) -> Option<TabHandle> {
        self.sessions
            .read()
            .await
            .get(token)
            .map(|e| e.session.clone())
    }

    pub async fn close_session(&self, token: &str) -> bool {
        self.sessions.write().await.remove(token).is_some()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }
}

/// Build the full router.
///
/// Layers applied:
/// - Bearer session lookup on all /v1 routes except session start
/// - CORS limited to configured origins
/// - Request body size limit (1 MB)
/// - In-memory rate limiting per session token
/// - HTTP trace logging
pub fn build_router(state: SharedState) -> Router {
    let origins: Vec<axum::http::HeaderValue> = state
        .config
        .gateway
        .allowed_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::PATCH,
            axum::http::Method::DELETE,
        ])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::AUTHORIZATION,
        ])
        .max_age(Duration::from_secs(3600));

    let v1 = api_v1::v1_router(state.clone()).layer(middleware::from_fn_with_state(
        state.clone(),
        api_v1::session_middleware,
    ));

    Router::new()
        .route("/health", get(health_handler))
        .with_state(state.clone())
        .merge(v1)
        .merge(frontend::frontend_router())
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(middleware::from_fn_with_state(state, rate_limit_middleware))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Start the gateway HTTP server.
///
/// Opens the store and the inference gateway first, so a missing API key or
/// an unwritable database fails before the port is bound.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let gateway = lexchamber_providers::build_from_config(&config)?;
    let store: Arc<dyn ConsultationStore> = Arc::new(SqliteStore::new(&config.db_path).await?);

    let state = Arc::new(GatewayState::new(config, store, gateway));
    let app = build_router(state);

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown signal received");
    }
}

// --- Rate Limiter ---

/// Simple in-memory sliding-window rate limiter.
///
/// Tracks request timestamps per client key (session token).
/// Thread-safe via `std::sync::Mutex` (non-async, held briefly).
struct RateLimiter {
    max_requests: usize,
    window: Duration,
    clients: std::sync::Mutex<HashMap<String, Vec<Instant>>>,
}

impl RateLimiter {
    fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            clients: std::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Returns `true` if the client is within its limit. A limit of 0 disables
    /// limiting.
    fn check(&self, client_key: &str) -> bool {
        if self.max_requests == 0 {
            return true;
        }
        let now = Instant::now();
        let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());

        if clients.len() > 10_000 {
            clients.retain(|_, timestamps| {
                timestamps
                    .last()
                    .is_some_and(|t| now.duration_since(*t) < self.window)
            });
        }

        let timestamps = clients.entry(client_key.to_string()).or_default();
        timestamps.retain(|t| now.duration_since(*t) < self.window);

        if timestamps.len() >= self.max_requests {
            return false;
        }

        timestamps.push(now);
        true
    }
}

/// Rejects with 429 once a client exceeds its per-minute budget. Health
/// checks, static assets, and the event stream are exempt.
async fn rate_limit_middleware(
    axum::extract::State(state): axum::extract::State<SharedState>,
    req: axum::extract::Request,
    next: Next,
) -> Result<axum::response::Response, StatusCode> {
    let path = req.uri().path();
    if !path.starts_with("/v1") || path == "/v1/events" {
        return Ok(next.run(req).await);
    }

    let client_key = api_v1::request_token(req.headers(), req.uri())
        .unwrap_or_else(|| "anonymous".to_string());

    if !state.rate_limiter.check(&client_key) {
        warn!(client = %client_key.chars().take(8).collect::<String>(), "Rate limit exceeded");
        return Err(StatusCode::TOO_MANY_REQUESTS);
    }

    Ok(next.run(req).await)
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    uptime_secs: u64,
    sessions: usize,
}

async fn health_handler(
    axum::extract::State(state): axum::extract::State<SharedState>,
) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.uptime().as_secs(),
        sessions: state.session_count().await,
    })
}

/// The identity asserted by the upstream identity collaborator, if any.
pub(crate) fn asserted_identity(config: &AppConfig, headers: &HeaderMap) -> Option<(String, String)> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };
    let email = header(&config.gateway.identity_header)?;
    let name = header(&config.gateway.identity_name_header).unwrap_or_default();
    Some((email, name))
}
