//! Route handlers. All of them read; none touches the ledger's state.

use askama::Template;
use axum::extract::{Path, Request, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::{routing::get, Json, Router};
use serde_json::{json, Value};
use tower::ServiceExt;
use tower_http::services::ServeFile;
use tracing::{error, warn};

use super::state::AppState;
use crate::ledger::RunRecord;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/runs", get(list_runs))
}

/// One row of the status page.
pub struct RunRow {
    pub started: String,
    pub title: String,
    pub revision_under_test: String,
    pub baseline_revision: String,
    pub status: &'static str,
    pub url: Option<String>,
    pub log_file: String,
}

impl From<RunRecord> for RunRow {
    fn from(record: RunRecord) -> Self {
        Self {
            started: record
                .started_at
                .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
                .unwrap_or_default(),
            log_file: record.log_file(),
            title: record.title,
            revision_under_test: record.revision_under_test,
            baseline_revision: record.baseline_revision,
            status: record.status.as_str(),
            url: record.url,
        }
    }
}

#[derive(Template)]
#[template(path = "status.html")]
struct StatusPage<'a> {
    project: &'a str,
    runs: Vec<RunRow>,
}

#[derive(Template)]
#[template(path = "logs.html")]
struct LogIndex {
    files: Vec<String>,
}

fn render<T: Template>(template: &T) -> Response {
    match template.render() {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            error!(error = %e, "failed to render page");
            (StatusCode::INTERNAL_SERVER_ERROR, "render error").into_response()
        }
    }
}

/// `GET /` -- every run, newest first.
pub async fn status_page(State(state): State<AppState>) -> Response {
    let runs = state
        .ledger
        .newest_first()
        .into_iter()
        .map(RunRow::from)
        .collect();
    render(&StatusPage {
        project: &state.project,
        runs,
    })
}

/// `GET /logs/` -- every file in the log directory.
pub async fn log_index(State(state): State<AppState>) -> Response {
    let mut entries = match tokio::fs::read_dir(state.logs_dir.as_path()).await {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %state.logs_dir.display(), error = %e, "cannot list log directory");
            return render(&LogIndex { files: Vec::new() });
        }
    };

    let mut files = Vec::new();
    loop {
        match entries.next_entry().await {
            Ok(Some(entry)) => {
                let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
                if is_file {
                    files.push(entry.file_name().to_string_lossy().into_owned());
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "error while listing log directory");
                break;
            }
        }
    }
    files.sort_unstable_by(|a, b| b.cmp(a));
    render(&LogIndex { files })
}

/// `GET /logs/{file}` -- one run log, readable while the run is in flight.
pub async fn log_file(
    State(state): State<AppState>,
    Path(name): Path<String>,
    request: Request,
) -> Response {
    if name.is_empty() || name.starts_with('.') || name.contains(['/', '\\']) {
        return (StatusCode::NOT_FOUND, "not found").into_response();
    }
    match ServeFile::new(state.logs_dir.join(&name)).oneshot(request).await {
        Ok(response) => response.into_response(),
        Err(never) => match never {},
    }
}

async fn health() -> Json<Value> {
    Json(json!({
        "data": {
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION")
        },
        "meta": {
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "version": env!("CARGO_PKG_VERSION")
        }
    }))
}

async fn list_runs(State(state): State<AppState>) -> Json<Value> {
    let runs = state.ledger.newest_first();
    Json(json!({ "data": runs, "meta": { "total": runs.len() } }))
}
