//! Main page: file choice, run controls, status and live activity feed.
//!
//! Rendered from `templates/index.html`. The `.html` name turns on
//! minijinja's HTML auto-escaping for every interpolated value.

use std::sync::OnceLock;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use minijinja::{context, Environment};
use serde::Serialize;
use tracing::error;

use crate::state::{Session, SessionState, SharedState};

const INDEX_TEMPLATE: &str = "index.html";

/// Message shown above the controls after an action or a finished run.
#[derive(Debug, Clone)]
pub enum Banner {
    Success(String),
    Error { kind: String, message: String },
}

#[derive(Serialize)]
struct BannerView<'a> {
    class: &'static str,
    kind: Option<&'a str>,
    message: &'a str,
}

impl Banner {
    pub fn error(kind: impl ToString, message: impl ToString) -> Self {
        Banner::Error {
            kind: kind.to_string(),
            message: message.to_string(),
        }
    }

    fn view(&self) -> BannerView<'_> {
        match self {
            Banner::Success(message) => BannerView {
                class: "success",
                kind: None,
                message: message.as_str(),
            },
            Banner::Error { kind, message } => BannerView {
                class: "error",
                kind: Some(kind.as_str()),
                message: message.as_str(),
            },
        }
    }
}

fn templates() -> &'static Environment<'static> {
    static ENV: OnceLock<Environment<'static>> = OnceLock::new();
    ENV.get_or_init(|| {
        let mut env = Environment::new();
        env.set_loader(|name| {
            Ok((name == INDEX_TEMPLATE).then(|| include_str!("../../templates/index.html").to_string()))
        });
        env
    })
}

pub async fn home(State(state): State<SharedState>) -> Response {
    let session = state.snapshot().await;
    page(StatusCode::OK, &session, None)
}

/// Full page with `status`, or a plain 500 if the template fails.
pub fn page(status: StatusCode, session: &Session, banner: Option<Banner>) -> Response {
    match render_page(session, banner) {
        Ok(html) => (status, Html(html)).into_response(),
        Err(e) => {
            error!("Page render failed: {e:#}");
            (StatusCode::INTERNAL_SERVER_ERROR, "page render failed").into_response()
        }
    }
}

/// Banner implied by the session itself when no action banner is given.
fn session_banner(session: &Session) -> Option<Banner> {
    match session.state {
        SessionState::Done => {
            let output = session
                .output
                .as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_default();
            Some(Banner::Success(format!(
                "{} predictions written to {}",
                session.predictions, output
            )))
        }
        SessionState::Failed => session
            .error
            .as_ref()
            .map(|e| Banner::error(e.kind, &e.message)),
        _ => None,
    }
}

fn status_label(session: &Session) -> String {
    match session.state {
        SessionState::Idle => "No file selected".to_string(),
        SessionState::FileSelected => format!(
            "File selected: {}",
            session.file_name().unwrap_or_default()
        ),
        SessionState::Processing => format!(
            "Processing {}...",
            session.file_name().unwrap_or_default()
        ),
        SessionState::Done => "Processing complete".to_string(),
        SessionState::Failed => "Processing failed".to_string(),
    }
}

pub fn render_page(session: &Session, banner: Option<Banner>) -> Result<String, minijinja::Error> {
    let banner = banner.or_else(|| session_banner(session));
    let template = templates().get_template(INDEX_TEMPLATE)?;
    template.render(context! {
        banner => banner.as_ref().map(Banner::view),
        processing => session.state == SessionState::Processing,
        done => session.state == SessionState::Done,
        status => status_label(session),
        warnings => &session.warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_idle_page() {
        let html = render_page(&Session::default(), None).unwrap();
        assert!(html.contains("No file selected"));
        assert!(!html.contains("id=\"banner\""));
        assert!(!html.contains("/predictions\""));
    }

    #[test]
    fn test_selected_file_name_is_escaped() {
        let mut session = Session::default();
        session.select(PathBuf::from("/data/<b>.csv")).unwrap();
        let html = render_page(&session, None).unwrap();
        assert!(html.contains("File selected: &lt;b&gt;.csv"));
    }

    #[test]
    fn test_action_banner_wins() {
        let html = render_page(
            &Session::default(),
            Some(Banner::error("missing_input", "Please upload a file first")),
        )
        .unwrap();
        assert!(html.contains("banner-error"));
        assert!(html.contains("missing_input"));
        assert!(html.contains("Please upload a file first"));
    }

    #[test]
    fn test_markup_in_messages_is_escaped() {
        let mut session = Session::default();
        session.warnings.push("row <script>alert(1)</script> skipped".to_string());
        let html = render_page(
            &session,
            Some(Banner::error("io", "bad \"quote\" & <tag>")),
        )
        .unwrap();
        assert!(!html.contains("<script>alert"));
        assert!(html.contains("&lt;script&gt;alert(1)"));
        assert!(html.contains("&amp; &lt;tag&gt;"));
        assert!(!html.contains("\"quote\""));
        assert!(html.contains("Warnings (1)"));
    }

    #[test]
    fn test_processing_disables_inputs_and_enables_cancel() {
        let mut session = Session::default();
        session.select(PathBuf::from("/data/screen.csv")).unwrap();
        session.begin(bioscreen_pipeline::CancelToken::new()).unwrap();
        let html = render_page(&session, None).unwrap();
        assert!(html.contains("Processing screen.csv..."));
        assert!(html.contains(r#"class="btn btn-primary" disabled>Predict"#));
        assert!(html.contains(r#"class="btn btn-outline">Cancel"#));
    }
}
