//! Session actions: choose a file, start or cancel a run, fetch results.

use std::path::PathBuf;

use axum::extract::{Multipart, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::{Form, Json};
use bioscreen_common::{ErrorKind, PipelineError};
use bioscreen_pipeline::{CancelToken, PipelineProgress};
use serde::Deserialize;
use tokio::sync::broadcast;
use tracing::{info, warn};
use uuid::Uuid;

use crate::handlers::page::{page, Banner};
use crate::state::{AppEvent, Session, SessionState, SharedState, ShellError};

// ── Form input ────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct SelectForm {
    pub path: String,
}

// ── Responses ─────────────────────────────────────────────────────────────────

async fn error_page(state: &SharedState, status: StatusCode, banner: Banner) -> Response {
    let session = state.snapshot().await;
    page(status, &session, Some(banner))
}

async fn shell_error(state: &SharedState, err: ShellError) -> Response {
    let (status, kind) = match err {
        ShellError::NoFile => (StatusCode::BAD_REQUEST, ErrorKind::MissingInput.to_string()),
        ShellError::Busy | ShellError::NotRunning => (StatusCode::CONFLICT, "session".to_string()),
    };
    error_page(state, status, Banner::error(kind, err)).await
}

fn back_home() -> Response {
    Redirect::to("/").into_response()
}

// ── Choosing a file ───────────────────────────────────────────────────────────

async fn select_path(state: &SharedState, path: PathBuf) -> Result<(), ShellError> {
    let mut session = state.session.lock().await;
    session.select(path)?;
    let name = session.file_name().unwrap_or_default();
    info!(file = %name, "Input file selected");
    let _ = state.event_tx.send(AppEvent::FileSelected { name });
    Ok(())
}

/// Keeps the last path component, with anything outside `[A-Za-z0-9._-]`
/// replaced by `_`.
pub fn sanitize_file_name(raw: &str) -> String {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') { c } else { '_' })
        .collect();
    if cleaned.trim_matches('.').is_empty() {
        "upload.csv".to_string()
    } else {
        cleaned
    }
}

/// `POST /upload`: multipart field `file`. Each upload gets its own
/// directory so `predictions.csv` lands beside it without clobbering
/// earlier results.
pub async fn upload(State(state): State<SharedState>, mut multipart: Multipart) -> Response {
    let mut stored = None;
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                let status = e.status();
                return error_page(&state, status, Banner::error("upload", e)).await;
            }
        };
        if field.name() != Some("file") {
            continue;
        }
        let name = sanitize_file_name(field.file_name().unwrap_or_default());
        let bytes = match field.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => {
                let status = e.status();
                return error_page(&state, status, Banner::error("upload", e)).await;
            }
        };
        if bytes.is_empty() {
            break;
        }

        let dir = state.config.web.upload_dir.join(Uuid::new_v4().simple().to_string());
        let path = dir.join(&name);
        let write = async {
            tokio::fs::create_dir_all(&dir).await?;
            tokio::fs::write(&path, &bytes).await
        };
        if let Err(e) = write.await {
            let err = PipelineError::io(&path, e);
            return error_page(
                &state,
                StatusCode::INTERNAL_SERVER_ERROR,
                Banner::error(err.kind(), err),
            )
            .await;
        }
        info!(path = %path.display(), bytes = bytes.len(), "Stored upload");
        stored = Some(path);
        break;
    }

    let Some(path) = stored else {
        return shell_error(&state, ShellError::NoFile).await;
    };
    match select_path(&state, path).await {
        Ok(()) => back_home(),
        Err(e) => shell_error(&state, e).await,
    }
}

/// `POST /select`: picks a file already on local disk.
pub async fn select(State(state): State<SharedState>, Form(form): Form<SelectForm>) -> Response {
    let path = PathBuf::from(form.path.trim());
    if form.path.trim().is_empty() || !path.is_file() {
        let err = PipelineError::MissingInput(format!("input file not found: {}", path.display()));
        return error_page(&state, StatusCode::BAD_REQUEST, Banner::error(err.kind(), err)).await;
    }
    match select_path(&state, path).await {
        Ok(()) => back_home(),
        Err(e) => shell_error(&state, e).await,
    }
}

// ── Running ───────────────────────────────────────────────────────────────────

/// `POST /predict`: starts a background run and returns immediately.
pub async fn predict(State(state): State<SharedState>) -> Response {
    let cancel = CancelToken::new();
    let request = {
        let mut session = state.session.lock().await;
        match session.begin(cancel.clone()) {
            Ok(request) => request,
            Err(e) => {
                drop(session);
                return shell_error(&state, e).await;
            }
        }
    };
    info!(run_id = %request.run_id, input = %request.input.display(), "Starting run");

    let (progress_tx, progress_rx) = broadcast::channel(64);
    let forwarder = tokio::spawn(forward_progress(progress_rx, state.event_tx.clone()));

    let task_state = state.clone();
    tokio::spawn(async move {
        let state = task_state;
        let result = state.pipeline.run(&request, Some(progress_tx), cancel).await;
        // The sender is gone once `run` returns, so the forwarder drains and stops.
        let _ = forwarder.await;

        let mut session = state.session.lock().await;
        let event = match result {
            Ok(outcome) => {
                session.finish(&outcome);
                AppEvent::Done {
                    run_id: outcome.run_id,
                    output: outcome.output.display().to_string(),
                    predictions: outcome.predictions.len(),
                    warnings: outcome.warnings.len(),
                }
            }
            Err(e) => {
                session.fail(&e);
                AppEvent::Failed {
                    run_id: request.run_id,
                    kind: e.kind(),
                    message: e.to_string(),
                }
            }
        };
        let _ = state.event_tx.send(event);
    });

    back_home()
}

async fn forward_progress(
    mut rx: broadcast::Receiver<PipelineProgress>,
    event_tx: broadcast::Sender<AppEvent>,
) {
    loop {
        match rx.recv().await {
            Ok(p) => {
                let _ = event_tx.send(AppEvent::Progress {
                    run_id: p.run_id,
                    stage: p.stage,
                    message: p.message,
                    warning: p.warning,
                });
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(skipped = n, "Progress forwarder lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// `POST /cancel`
pub async fn cancel(State(state): State<SharedState>) -> Response {
    let result = state.session.lock().await.request_cancel();
    match result {
        Ok(()) => {
            info!("Cancellation requested");
            back_home()
        }
        Err(e) => shell_error(&state, e).await,
    }
}

// ── Reading results ───────────────────────────────────────────────────────────

/// `GET /api/status`
pub async fn status(State(state): State<SharedState>) -> Json<Session> {
    Json(state.snapshot().await)
}

/// `GET /predictions`: the last run's output file.
pub async fn download_predictions(State(state): State<SharedState>) -> Response {
    let session = state.snapshot().await;
    let path = match (session.state, session.output) {
        (SessionState::Done, Some(path)) => path,
        _ => return (StatusCode::NOT_FOUND, "No predictions available").into_response(),
    };
    match tokio::fs::read(&path).await {
        Ok(bytes) => (
            [
                (header::CONTENT_TYPE, "text/csv"),
                (header::CONTENT_DISPOSITION, "attachment; filename=\"predictions.csv\""),
            ],
            bytes,
        )
            .into_response(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Predictions file unreadable");
            (StatusCode::NOT_FOUND, "No predictions available").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("screen.csv"), "screen.csv");
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name(r"C:\data\my file.csv"), "my_file.csv");
        assert_eq!(sanitize_file_name(".."), "upload.csv");
        assert_eq!(sanitize_file_name(""), "upload.csv");
    }
}
