//! HTTP API v1 — consultation endpoints.
//!
//! Endpoints:
//!
//! - `POST   /v1/session`               — Identity hand-off, returns a tab token
//! - `GET    /v1/session`               — Current tab state
//! - `DELETE /v1/session`               — Discard the tab
//! - `GET    /v1/languages`             — Offered answer languages
//! - `GET    /v1/chambers`              — List the user's chambers
//! - `POST   /v1/chambers`              — Create (and select) a chamber
//! - `PATCH  /v1/chambers/{id}`         — Rename, set persona/language
//! - `DELETE /v1/chambers/{id}`         — Delete a chamber and its turns
//! - `POST   /v1/chambers/{id}/select`  — Make a chamber current
//! - `GET    /v1/chambers/{id}/turns`   — Transcript (JSON, or `?format=html`)
//! - `POST   /v1/chambers/{id}/submit`  — Ask a question
//! - `GET    /v1/events`                — SSE refresh stream for this user

use axum::{
    Extension, Router,
    extract::{Path, Query, Request, State},
    http::{HeaderMap, StatusCode, Uri},
    middleware::Next,
    response::sse::{Event as SseEvent, KeepAlive, Sse},
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use tokio_stream::StreamExt;
use tracing::{error, info, warn};

use lexchamber_agent::{SessionState, SubmissionError, SubmissionOutcome, Transcript, session};
use lexchamber_core::consultation::{Chamber, ChamberId};
use lexchamber_core::error::{InferenceError, StoreError};

use crate::{SharedState, TabHandle, asserted_identity};

// ── Routing ───────────────────────────────────────────────────────────────

pub fn v1_router(state: SharedState) -> Router {
    Router::new()
        .route(
            "/v1/session",
            post(start_session_handler)
                .get(session_info_handler)
                .delete(end_session_handler),
        )
        .route("/v1/languages", get(languages_handler))
        .route(
            "/v1/chambers",
            get(list_chambers_handler).post(create_chamber_handler),
        )
        .route(
            "/v1/chambers/{id}",
            axum::routing::patch(update_chamber_handler).delete(delete_chamber_handler),
        )
        .route("/v1/chambers/{id}/select", post(select_chamber_handler))
        .route("/v1/chambers/{id}/turns", get(turns_handler))
        .route("/v1/chambers/{id}/submit", post(submit_handler))
        .route("/v1/events", get(events_handler))
        .with_state(state)
}

/// The tab a request belongs to, resolved by [`session_middleware`].
#[derive(Clone)]
pub struct TabSession {
    pub token: String,
    pub session: TabHandle,
}

/// The tab token of a request: the bearer header, or `?token=` for
/// `EventSource`, which cannot set headers.
pub fn request_token(headers: &HeaderMap, uri: &Uri) -> Option<String> {
    let bearer = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());
    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    uri.query()?
        .split('&')
        .find_map(|pair| pair.strip_prefix("token="))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// Resolves the tab token to its session. Session start and the language
/// list are open.
pub async fn session_middleware(
    State(state): State<SharedState>,
    mut req: Request,
    next: Next,
) -> Response {
    let path = req.uri().path();
    let open = (path == "/v1/session" && req.method() == axum::http::Method::POST)
        || path == "/v1/languages";
    if open {
        return next.run(req).await;
    }

    let Some(token) = request_token(req.headers(), req.uri()) else {
        return ApiError::unauthorized("Missing session token").into_response();
    };
    let Some(session) = state.session(&token).await else {
        return ApiError::unauthorized("Unknown or expired session").into_response();
    };

    req.extensions_mut().insert(TabSession { token, session });
    next.run(req).await
}

// ── Errors ────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<&'static str>,
    /// Set when the question was stored but no answer was produced
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_seq: Option<i64>,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorResponse,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>, kind: &'static str) -> Self {
        Self {
            status,
            body: ErrorResponse {
                error: message.into(),
                kind: Some(kind),
                user_seq: None,
            },
        }
    }

    fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message, "not_authenticated")
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message, "bad_request")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotAuthenticated(_) => {
                Self::unauthorized("Your session has expired. Please sign in again.")
            }
            StoreError::UnknownChamber { .. } => Self::new(
                StatusCode::NOT_FOUND,
                "This chamber is missing. Select or create another chamber.",
                "unknown_chamber",
            ),
            other => {
                error!("Store failure: {other}");
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "The consultation store is unavailable. Please try again.",
                    "store_failed",
                )
            }
        }
    }
}

impl From<SubmissionError> for ApiError {
    fn from(e: SubmissionError) -> Self {
        let message = e.user_message();
        match e {
            SubmissionError::NotSignedIn => Self::unauthorized(message),
            SubmissionError::NoChamberSelected => {
                Self::new(StatusCode::BAD_REQUEST, message, "no_chamber_selected")
            }
            SubmissionError::NoPendingInput => {
                Self::new(StatusCode::BAD_REQUEST, message, "empty_input")
            }
            SubmissionError::Busy => Self::new(StatusCode::CONFLICT, message, "busy"),
            SubmissionError::UserTurnNotRecorded(store) => {
                let mut api = Self::from(store);
                api.body.error = message;
                api
            }
            SubmissionError::Inference { user_seq, error } => {
                let status = match error {
                    InferenceError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
                    _ => StatusCode::BAD_GATEWAY,
                };
                let mut api = Self::new(status, message, error.kind());
                api.body.user_seq = Some(user_seq);
                api
            }
        }
    }
}

type ApiResult<T> = Result<T, ApiError>;

// ── Session ───────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub token: String,
    pub email: String,
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct SessionInfo {
    pub email: Option<String>,
    pub current_chamber: Option<ChamberId>,
    pub busy: bool,
}

/// `POST /v1/session` — bind a fresh tab to the identity asserted upstream.
async fn start_session_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> ApiResult<(StatusCode, Json<SessionResponse>)> {
    let (email, name) = asserted_identity(&state.config, &headers)
        .ok_or_else(|| ApiError::unauthorized("No authenticated identity was provided"))?;

    let mut tab = SessionState::new();
    let user = session::sign_in(state.store.as_ref(), &mut tab, &email, &name).await?;
    let token = state.open_session(tab).await;

    info!(email = %user.email, "Tab session opened");
    Ok((
        StatusCode::CREATED,
        Json(SessionResponse {
            token,
            email: user.email,
            name: user.name,
        }),
    ))
}

async fn session_info_handler(Extension(tab): Extension<TabSession>) -> Json<SessionInfo> {
    let session = tab.session.lock().await;
    Json(SessionInfo {
        email: session.user_email().map(str::to_string),
        current_chamber: session.current_chamber(),
        busy: session.is_busy(),
    })
}

async fn end_session_handler(
    State(state): State<SharedState>,
    Extension(tab): Extension<TabSession>,
) -> StatusCode {
    state.close_session(&tab.token).await;
    StatusCode::NO_CONTENT
}

#[derive(Debug, Serialize)]
pub struct LanguagesResponse {
    pub default: String,
    pub languages: Vec<String>,
}

async fn languages_handler(State(state): State<SharedState>) -> Json<LanguagesResponse> {
    Json(LanguagesResponse {
        default: state.config.default_language.clone(),
        languages: state.config.languages.clone(),
    })
}

// ── Chambers ──────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct ChamberListResponse {
    pub chambers: Vec<Chamber>,
    pub current: Option<ChamberId>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateChamberRequest {
    #[serde(default)]
    pub title: String,
}

/// Absent fields are left unchanged. An empty persona or language clears
/// the override.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateChamberRequest {
    pub title: Option<String>,
    pub persona: Option<String>,
    pub language: Option<String>,
}

async fn list_chambers_handler(
    State(state): State<SharedState>,
    Extension(tab): Extension<TabSession>,
) -> ApiResult<Json<ChamberListResponse>> {
    let session = tab.session.lock().await;
    let chambers = state.chambers.list(&session).await?;
    Ok(Json(ChamberListResponse {
        chambers,
        current: session.current_chamber(),
    }))
}

async fn create_chamber_handler(
    State(state): State<SharedState>,
    Extension(tab): Extension<TabSession>,
    Json(req): Json<CreateChamberRequest>,
) -> ApiResult<(StatusCode, Json<Chamber>)> {
    let mut session = tab.session.lock().await;
    let chamber = state.chambers.create(&mut session, &req.title).await?;
    Ok((StatusCode::CREATED, Json(chamber)))
}

async fn update_chamber_handler(
    State(state): State<SharedState>,
    Extension(tab): Extension<TabSession>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateChamberRequest>,
) -> ApiResult<Json<Chamber>> {
    let chamber_id = ChamberId(id);
    if let Some(language) = req.language.as_deref().map(str::trim) {
        if !language.is_empty() && !state.config.supports_language(language) {
            return Err(ApiError::bad_request(format!(
                "Unsupported language: {language}"
            )));
        }
    }

    let mut session = tab.session.lock().await;
    let mut chamber = state.chambers.get(&mut session, chamber_id).await?;
    if let Some(title) = &req.title {
        chamber = state.chambers.rename(&session, chamber_id, title).await?;
    }
    if req.persona.is_some() || req.language.is_some() {
        let persona = req.persona.or(chamber.persona);
        let language = req.language.or(chamber.language);
        chamber = state
            .chambers
            .set_preferences(&session, chamber_id, persona.as_deref(), language.as_deref())
            .await?;
    }
    Ok(Json(chamber))
}

async fn delete_chamber_handler(
    State(state): State<SharedState>,
    Extension(tab): Extension<TabSession>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    let mut session = tab.session.lock().await;
    state.chambers.delete(&mut session, ChamberId(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn select_chamber_handler(
    State(state): State<SharedState>,
    Extension(tab): Extension<TabSession>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Chamber>> {
    let mut session = tab.session.lock().await;
    let chamber = state.chambers.select(&mut session, ChamberId(id)).await?;
    Ok(Json(chamber))
}

#[derive(Debug, Default, Deserialize)]
pub struct TurnsQuery {
    pub format: Option<String>,
}

/// `GET /v1/chambers/{id}/turns` — selects the chamber if needed, then
/// rereads it from the store. Other tabs call this on `transcript_changed`.
async fn turns_handler(
    State(state): State<SharedState>,
    Extension(tab): Extension<TabSession>,
    Path(id): Path<i64>,
    Query(query): Query<TurnsQuery>,
) -> ApiResult<Response> {
    let chamber_id = ChamberId(id);
    let mut session = tab.session.lock().await;
    if session.current_chamber() != Some(chamber_id) {
        state.chambers.select(&mut session, chamber_id).await?;
    }

    let transcript: Transcript = state
        .transcripts
        .refresh(&mut session)
        .await?
        .ok_or(StoreError::UnknownChamber { chamber_id: id })?;

    Ok(match query.format.as_deref() {
        Some("html") => {
            let html = lexchamber_agent::transcript::render_html(&transcript).map_err(|e| {
                error!(chamber_id = id, "Transcript render failed: {e}");
                ApiError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "The transcript could not be displayed.",
                    "internal",
                )
            })?;
            Html(html).into_response()
        }
        _ => Json(transcript).into_response(),
    })
}

// ── Submission ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub user_seq: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assistant_seq: Option<i64>,
    pub reply: String,
    /// False when the reply was shown but could not be stored
    pub recorded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
}

impl From<SubmissionOutcome> for SubmitResponse {
    fn from(outcome: SubmissionOutcome) -> Self {
        match outcome {
            SubmissionOutcome::Answered {
                user_seq,
                assistant_seq,
                reply,
            } => Self {
                user_seq,
                assistant_seq: Some(assistant_seq),
                reply,
                recorded: true,
                notice: None,
            },
            SubmissionOutcome::ReplyNotRecorded { user_seq, reply, .. } => Self {
                user_seq,
                assistant_seq: None,
                reply,
                recorded: false,
                notice: Some("This answer could not be saved and will not appear after reload.".into()),
            },
        }
    }
}

/// `POST /v1/chambers/{id}/submit`
///
/// The tab lock is held only to capture and consume the input. The round
/// trip runs in its own task, so a client that disconnects mid-call leaves
/// the provider call and both writes to complete, and the tab is unlocked
/// when they do.
async fn submit_handler(
    State(state): State<SharedState>,
    Extension(tab): Extension<TabSession>,
    Path(id): Path<i64>,
    Json(req): Json<SubmitRequest>,
) -> ApiResult<Json<SubmitResponse>> {
    let chamber_id = ChamberId(id);

    let submission = {
        let mut session = tab.session.lock().await;
        if session.is_busy() {
            return Err(SubmissionError::Busy.into());
        }
        if session.current_chamber() != Some(chamber_id) {
            state.chambers.select(&mut session, chamber_id).await?;
        }
        if !session.capture_input(req.message) {
            return Err(SubmissionError::NoPendingInput.into());
        }
        session.begin_submission()?
    };

    let controller = state.controller.clone();
    let handle = tab.session.clone();
    let task = tokio::spawn(async move {
        let result = controller
            .handle_submission(&submission.email, submission.chamber_id, &submission.utterance)
            .await;
        handle
            .lock()
            .await
            .finish_submission(submission.chamber_id, &result);
        result
    });

    let result = task.await.map_err(|e| {
        error!(chamber_id = id, "Submission task failed: {e}");
        ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "The submission could not be completed.",
            "internal",
        )
    })?;

    match result {
        Ok(outcome) => Ok(Json(outcome.into())),
        Err(e) => {
            warn!(chamber_id = id, "Submission failed: {e}");
            Err(e.into())
        }
    }
}

// ── Refresh stream ────────────────────────────────────────────────────────

/// `GET /v1/events` — domain events for the signed-in user only. Other tabs
/// re-read the store when they see `transcript_changed` or `chamber_deleted`.
async fn events_handler(
    State(state): State<SharedState>,
    Extension(tab): Extension<TabSession>,
) -> ApiResult<Sse<impl futures::Stream<Item = Result<SseEvent, Infallible>>>> {
    let email = tab
        .session
        .lock()
        .await
        .user_email()
        .map(str::to_string)
        .ok_or_else(|| ApiError::unauthorized("Please sign in to continue."))?;

    let rx = state.events.subscribe();
    let stream = tokio_stream::wrappers::BroadcastStream::new(rx)
        .filter_map(|result| result.ok())
        .filter(move |event| event.email() == email)
        .map(|event| {
            let data = serde_json::to_string(event.as_ref()).unwrap_or_default();
            Ok(SseEvent::default().event(event.name()).data(data))
        });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
