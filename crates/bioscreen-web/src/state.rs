//! Shared application state for the web server.
//!
//! The single screening session lives here as an explicit [`Session`]
//! behind a mutex; handlers move it through
//! Idle → FileSelected → Processing → {Done, Failed}.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bioscreen_common::{Config, ErrorKind, PipelineError};
use bioscreen_pipeline::{CancelToken, Pipeline, PipelineOutcome, PipelineRequest, PipelineStage};
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use uuid::Uuid;

/// Events pushed to connected clients via SSE.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppEvent {
    /// A structure file was chosen
    FileSelected { name: String },
    /// Pipeline stage update
    Progress { run_id: Uuid, stage: PipelineStage, message: String, warning: bool },
    /// Run finished and predictions were written
    Done { run_id: Uuid, output: String, predictions: usize, warnings: usize },
    /// Run stopped with an error
    Failed { run_id: Uuid, kind: ErrorKind, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    FileSelected,
    Processing,
    Done,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionError {
    pub kind: ErrorKind,
    pub message: String,
}

/// Why the shell refused an action.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ShellError {
    #[error("Please upload a file first")]
    NoFile,
    #[error("A prediction run is already in progress")]
    Busy,
    #[error("No prediction run is in progress")]
    NotRunning,
}

/// The one screening session served by this process.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub state: SessionState,
    pub file: Option<PathBuf>,
    pub run_id: Option<Uuid>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub output: Option<PathBuf>,
    pub predictions: usize,
    pub warnings: Vec<String>,
    pub error: Option<SessionError>,
    #[serde(skip)]
    cancel: Option<CancelToken>,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            state: SessionState::Idle,
            file: None,
            run_id: None,
            started_at: None,
            finished_at: None,
            output: None,
            predictions: 0,
            warnings: Vec::new(),
            error: None,
            cancel: None,
        }
    }
}

impl Session {
    pub fn file_name(&self) -> Option<String> {
        self.file
            .as_deref()
            .and_then(Path::file_name)
            .map(|n| n.to_string_lossy().into_owned())
    }

    pub fn select(&mut self, path: PathBuf) -> Result<(), ShellError> {
        if self.state == SessionState::Processing {
            return Err(ShellError::Busy);
        }
        *self = Session {
            state: SessionState::FileSelected,
            file: Some(path),
            ..Session::default()
        };
        Ok(())
    }

    /// Moves to Processing and returns the request to run.
    pub fn begin(&mut self, cancel: CancelToken) -> Result<PipelineRequest, ShellError> {
        if self.state == SessionState::Processing {
            return Err(ShellError::Busy);
        }
        let file = self.file.clone().ok_or(ShellError::NoFile)?;
        let request = PipelineRequest::new(file);
        self.state = SessionState::Processing;
        self.run_id = Some(request.run_id);
        self.started_at = Some(Utc::now());
        self.finished_at = None;
        self.output = None;
        self.predictions = 0;
        self.warnings.clear();
        self.error = None;
        self.cancel = Some(cancel);
        Ok(request)
    }

    pub fn finish(&mut self, outcome: &PipelineOutcome) {
        self.state = SessionState::Done;
        self.finished_at = Some(outcome.finished_at);
        self.output = Some(outcome.output.clone());
        self.predictions = outcome.predictions.len();
        self.warnings = outcome.warnings.clone();
        self.cancel = None;
    }

    pub fn fail(&mut self, err: &PipelineError) {
        self.state = SessionState::Failed;
        self.finished_at = Some(Utc::now());
        self.error = Some(SessionError {
            kind: err.kind(),
            message: err.to_string(),
        });
        self.cancel = None;
    }

    pub fn request_cancel(&self) -> Result<(), ShellError> {
        match (&self.state, &self.cancel) {
            (SessionState::Processing, Some(token)) => {
                token.cancel();
                Ok(())
            }
            _ => Err(ShellError::NotRunning),
        }
    }
}

/// Shared state injected into every Axum handler.
pub struct AppState {
    pub config: Config,
    pub pipeline: Arc<Pipeline>,
    pub session: Mutex<Session>,
    /// Broadcast channel for SSE push events
    pub event_tx: broadcast::Sender<AppEvent>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let pipeline = Arc::new(Pipeline::new(config.clone()));
        Self::with_pipeline(config, pipeline)
    }

    pub fn with_pipeline(config: Config, pipeline: Arc<Pipeline>) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            config,
            pipeline,
            session: Mutex::new(Session::default()),
            event_tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.event_tx.subscribe()
    }

    pub async fn snapshot(&self) -> Session {
        self.session.lock().await.clone()
    }
}

pub type SharedState = Arc<AppState>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_without_file_is_refused() {
        let mut session = Session::default();
        let err = session.begin(CancelToken::new()).unwrap_err();
        assert_eq!(err, ShellError::NoFile);
        assert_eq!(err.to_string(), "Please upload a file first");
        assert_eq!(session.state, SessionState::Idle);
    }

    #[test]
    fn test_transitions() {
        let mut session = Session::default();
        session.select(PathBuf::from("/data/screen.csv")).unwrap();
        assert_eq!(session.state, SessionState::FileSelected);
        assert_eq!(session.file_name().as_deref(), Some("screen.csv"));

        let token = CancelToken::new();
        let request = session.begin(token.clone()).unwrap();
        assert_eq!(request.input, PathBuf::from("/data/screen.csv"));
        assert_eq!(session.run_id, Some(request.run_id));
        assert_eq!(session.state, SessionState::Processing);

        assert!(matches!(session.begin(CancelToken::new()), Err(ShellError::Busy)));
        assert_eq!(session.select(PathBuf::from("/other.csv")), Err(ShellError::Busy));

        session.request_cancel().unwrap();
        assert!(token.is_cancelled());

        session.fail(&PipelineError::Cancelled);
        assert_eq!(session.state, SessionState::Failed);
        assert_eq!(session.error.as_ref().unwrap().kind, ErrorKind::Cancelled);
        assert_eq!(session.request_cancel(), Err(ShellError::NotRunning));

        // A failed session keeps its file and can be re-run.
        assert!(session.begin(CancelToken::new()).is_ok());
    }
}
