//! HTTP handlers for the review API.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use tokio::sync::Mutex;

use crate::conversation::{DirSource, ReadState, SessionSource, SourceError};
use crate::danger::DangerMap;
use crate::progress::{Progress, ProgressStore};
use crate::registry::SpawnRegistry;
use crate::session::{message_entries, parse_session_content, session_header, visible_entries};

use super::api::{MarkReadRequest, OperationResponse, SessionSummary};

/// Application state shared across all handlers.
///
/// The registry and danger map are scanned once at startup; only the
/// progress store mutates while serving.
#[derive(Clone)]
pub struct AppState {
    /// Source the logs are served from.
    pub source: Arc<DirSource>,
    /// Known spawned conversations.
    pub registry: Arc<SpawnRegistry>,
    /// Danger findings, keyed by log filename.
    pub dangers: Arc<DangerMap>,
    /// Read progress store.
    pub progress: Arc<Mutex<ProgressStore>>,
}

impl AppState {
    /// Bundle the scanned inputs into shared state.
    #[must_use]
    pub fn new(
        source: DirSource,
        registry: SpawnRegistry,
        dangers: DangerMap,
        progress: ProgressStore,
    ) -> Self {
        Self {
            source: Arc::new(source),
            registry: Arc::new(registry),
            dangers: Arc::new(dangers),
            progress: Arc::new(Mutex::new(progress)),
        }
    }
}

/// GET /api/sessions - summaries for every log in the session directory.
pub async fn get_sessions(
    State(state): State<AppState>,
) -> Result<Json<Vec<SessionSummary>>, StatusCode> {
    let names = state.source.list().await.map_err(|e| {
        tracing::warn!(error = %e, "Failed to list session logs");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let progress = state.progress.lock().await.marks().clone();

    let mut summaries = Vec::with_capacity(names.len());
    for name in names {
        let Ok(content) = state.source.fetch(&name).await else {
            continue;
        };
        let entries = parse_session_content(&content);
        let visible = visible_entries(&entries);
        let messages = message_entries(&entries);
        let watermark = progress.get(&name).map(|mark| mark.last_read_id.as_str());
        let read = ReadState::compute(&visible, &messages, watermark);

        summaries.push(SessionSummary {
            label: session_header(&entries)
                .and_then(|header| header.label.clone())
                .unwrap_or_default(),
            total_messages: read.total_messages,
            unread_messages: read.unread_messages(),
            danger_count: state.dangers.get(&name).map_or(0, Vec::len),
            filename: name,
        });
    }

    Ok(Json(summaries))
}

/// GET /api/sessions/:name - raw content of one log.
pub async fn get_session_content(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<String, StatusCode> {
    match state.source.fetch(&name).await {
        Ok(content) => Ok(content),
        Err(SourceError::NotFound(_) | SourceError::InvalidName(_)) => Err(StatusCode::NOT_FOUND),
        Err(e) => {
            tracing::warn!(log = %name, error = %e, "Failed to read session log");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// GET /api/progress - the full watermark map.
pub async fn get_progress(State(state): State<AppState>) -> Json<Progress> {
    Json(state.progress.lock().await.marks().clone())
}

/// POST /api/progress - record a watermark and persist the store.
pub async fn post_progress(
    State(state): State<AppState>,
    Json(request): Json<MarkReadRequest>,
) -> (StatusCode, Json<OperationResponse>) {
    let mut store = state.progress.lock().await;
    store.mark_read(request.key, request.entry_id);

    match store.save().await {
        Ok(()) => (
            StatusCode::OK,
            Json(OperationResponse::success("Marked as read")),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to persist progress");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(OperationResponse::error("Failed to persist progress", e.to_string())),
            )
        }
    }
}

/// GET /api/dangers - every flagged tool call, keyed by log filename.
pub async fn get_dangers(State(state): State<AppState>) -> Json<DangerMap> {
    Json(state.dangers.as_ref().clone())
}
