use anyhow::{Context, Result};
use axum::body::Body;
use axum::extract::{DefaultBodyLimit, Extension, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE, COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue, Request, Response, StatusCode};
use axum::middleware::Next;
use axum::response::{Html, IntoResponse};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};
use uuid::Uuid;

use super::models::{
    ActionStatus, AnalyzeRequest, AnalyzeResponse, ErrorResponse, StateResponse,
    SynthesizeRequest, SynthesizeResponse, UploadRequest, UploadResponse,
};
use super::state::ServerState;
use crate::Services;
use crate::analysis::AnalysisKind;
use crate::extractor::{self, Document};
use crate::providers::Provider;
use crate::session::{self, SessionState, UploadOutcome};
use crate::speech::{self, AUDIO_FILE_NAME, SpeechOutcome, Synthesizer};

pub(crate) const SESSION_COOKIE: &str = "pdf_ai_session";

const NOTHING_TO_PROCESS: &str = "Nessun testo estratto: niente da elaborare.";
const NOTHING_TO_SAY: &str = "Nessun testo leggibile dopo la pulizia: audio non generato.";

pub(crate) struct ServerError {
    pub(crate) status: StatusCode,
    pub(crate) message: String,
}

impl ServerError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> axum::response::Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}

#[derive(Debug, Clone)]
pub(crate) struct SessionId(String);

pub async fn run_server(services: Services, addr: String) -> Result<()> {
    let state = Arc::new(ServerState::from_services(services)?);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| "failed to bind server address")?;
    spawn_session_sweeper(state.clone());
    info!(
        addr = %addr,
        max_upload_bytes = state.limits.max_upload_bytes,
        session_ttl_secs = state.limits.session_ttl.as_secs(),
        "serving PDF AI Audio"
    );
    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// Drop idle sessions even when no request comes in to trigger it.
fn spawn_session_sweeper<P, S>(state: Arc<ServerState<P, S>>)
where
    P: Provider + 'static,
    S: Synthesizer + 'static,
{
    let period = state.limits.session_ttl.clamp(Duration::from_secs(1), Duration::from_secs(60));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            let removed = state.sessions.lock().await.evict_expired(Instant::now());
            if removed > 0 {
                debug!(removed, "expired idle sessions");
            }
        }
    });
}

pub(crate) fn router<P, S>(state: Arc<ServerState<P, S>>) -> Router
where
    P: Provider + 'static,
    S: Synthesizer + 'static,
{
    let body_limit = state.limits.max_upload_bytes;
    Router::new()
        .route("/", get(index::<P, S>))
        .route("/health", get(health))
        .route("/state", get(session_state::<P, S>))
        .route("/upload", post(upload::<P, S>))
        .route("/analyze", post(analyze::<P, S>))
        .route("/synthesize", post(synthesize::<P, S>))
        .route("/audio", get(audio::<P, S>))
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(axum::middleware::from_fn(session_middleware))
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// Attach a `SessionId` to every request, minting one (and the cookie) for
/// new visitors.
async fn session_middleware(mut req: Request<Body>, next: Next) -> Response<Body> {
    let existing = session_from_cookies(req.headers());
    let id = existing
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    req.extensions_mut().insert(SessionId(id.clone()));
    let mut response = next.run(req).await;
    if existing.is_none() {
        let cookie = format!("{}={}; Path=/; HttpOnly; SameSite=Lax", SESSION_COOKIE, id);
        if let Ok(value) = HeaderValue::from_str(&cookie) {
            response.headers_mut().append(SET_COOKIE, value);
        }
    }
    response
}

/// Only well-formed uuids are accepted as session ids.
fn session_from_cookies(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .and_then(|(_, value)| Uuid::parse_str(value.trim()).ok())
        .map(|id| id.to_string())
}

async fn index<P: Provider, S: Synthesizer>(
    State(state): State<Arc<ServerState<P, S>>>,
) -> Html<String> {
    Html(state.index_html.clone())
}

async fn session_state<P: Provider, S: Synthesizer>(
    State(state): State<Arc<ServerState<P, S>>>,
    Extension(session): Extension<SessionId>,
) -> Json<StateResponse> {
    let mut sessions = state.sessions.lock().await;
    let response = match sessions.get(&session.0) {
        Some(current) => StateResponse::new(current, state.engine),
        None => StateResponse::new(&SessionState::default(), state.engine),
    };
    Json(response)
}

async fn upload<P: Provider, S: Synthesizer>(
    State(state): State<Arc<ServerState<P, S>>>,
    Extension(session): Extension<SessionId>,
    Json(payload): Json<UploadRequest>,
) -> Result<Json<UploadResponse>, ServerError> {
    if payload.documents.is_empty() {
        return Err(ServerError::bad_request("at least one document is required"));
    }
    let documents = payload
        .documents
        .into_iter()
        .map(|document| {
            let bytes = BASE64.decode(document.data_base64.trim()).map_err(|err| {
                ServerError::bad_request(format!(
                    "invalid base64 for {}: {}",
                    document.name.as_deref().unwrap_or("document"),
                    err
                ))
            })?;
            Ok(Document::new(document.name, bytes))
        })
        .collect::<Result<Vec<_>, ServerError>>()?;

    let count = documents.len();
    let text = tokio::task::spawn_blocking(move || extractor::extract_text(&documents))
        .await
        .map_err(|err| ServerError::internal(format!("server task failed: {}", err)))?
        .map_err(|err| ServerError::bad_request(format!("{:#}", err)))?;

    let mut sessions = state.sessions.lock().await;
    let current = sessions.entry(session.0);
    let outcome = session::apply_extracted(current, text);
    info!(documents = count, ?outcome, "document upload");
    let message = match outcome {
        UploadOutcome::NewDocument => "Testo estratto.",
        UploadOutcome::Unchanged => "Stesso documento: risultati mantenuti.",
        UploadOutcome::NothingToProcess => NOTHING_TO_PROCESS,
    };
    Ok(Json(UploadResponse {
        outcome,
        chars: current.extracted_text().chars().count(),
        message: message.to_string(),
    }))
}

async fn analyze<P: Provider, S: Synthesizer>(
    State(state): State<Arc<ServerState<P, S>>>,
    Extension(session): Extension<SessionId>,
    Json(payload): Json<AnalyzeRequest>,
) -> Result<Json<AnalyzeResponse>, ServerError> {
    let kind = AnalysisKind::parse(&payload.kind)
        .ok_or_else(|| ServerError::bad_request(format!("unknown analysis: {}", payload.kind)))?;
    let Some((text, generation)) = state.snapshot(&session.0).await else {
        return Ok(Json(AnalyzeResponse {
            status: ActionStatus::NothingToProcess,
            analysis: None,
            message: Some(NOTHING_TO_PROCESS.to_string()),
        }));
    };

    let output = state.analyzer.analyze(&text, kind).await;
    let stored = state
        .sessions
        .lock()
        .await
        .get_mut(&session.0)
        .is_some_and(|current| current.store_analysis(generation, output.clone()));
    if !stored {
        debug!(kind = kind.as_str(), "document changed during analysis; result not kept");
    }
    Ok(Json(AnalyzeResponse {
        status: ActionStatus::Done,
        analysis: Some(output),
        message: None,
    }))
}

async fn synthesize<P: Provider, S: Synthesizer>(
    State(state): State<Arc<ServerState<P, S>>>,
    Extension(session): Extension<SessionId>,
    Json(payload): Json<SynthesizeRequest>,
) -> Result<Json<SynthesizeResponse>, ServerError> {
    let voice = crate::parse_voice(payload.voice.as_deref(), state.engine)
        .map_err(|err| ServerError::bad_request(err.to_string()))?;
    let Some((text, generation)) = state.snapshot(&session.0).await else {
        return Ok(Json(SynthesizeResponse::status(
            ActionStatus::NothingToProcess,
            NOTHING_TO_PROCESS,
        )));
    };

    let outcome = speech::speak(&state.synthesizer, &text, &state.policy, voice).await;
    let (audio, response) = match outcome {
        SpeechOutcome::Done(clip) => {
            let response = SynthesizeResponse {
                status: ActionStatus::Done,
                audio_base64: Some(BASE64.encode(&clip.bytes)),
                mime: Some(clip.mime.clone()),
                message: None,
                error: None,
            };
            (Some(clip), response)
        }
        SpeechOutcome::NothingToSay => (
            None,
            SynthesizeResponse::status(ActionStatus::NothingToSay, NOTHING_TO_SAY),
        ),
        SpeechOutcome::Failed(message) => (
            None,
            SynthesizeResponse {
                status: ActionStatus::Failed,
                audio_base64: None,
                mime: None,
                message: None,
                error: Some(message),
            },
        ),
    };
    let stored = state
        .sessions
        .lock()
        .await
        .get_mut(&session.0)
        .is_some_and(|current| current.store_audio(generation, audio));
    if !stored {
        debug!("document changed during synthesis; audio not kept");
    }
    Ok(Json(response))
}

async fn audio<P: Provider, S: Synthesizer>(
    State(state): State<Arc<ServerState<P, S>>>,
    Extension(session): Extension<SessionId>,
) -> Result<Response<Body>, ServerError> {
    let clip = state
        .sessions
        .lock()
        .await
        .get(&session.0)
        .and_then(|current| current.last_audio().cloned())
        .ok_or_else(|| ServerError::not_found("no audio generated for this session"))?;
    Response::builder()
        .header(CONTENT_TYPE, clip.mime)
        .header(
            CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", AUDIO_FILE_NAME),
        )
        .body(Body::from(clip.bytes))
        .map_err(|err| ServerError::internal(err.to_string()))
}
