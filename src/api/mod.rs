//! HTTP surface -- status page, log browser and a small JSON API.

mod routes;
pub mod state;

use self::state::AppState;
use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(routes::status_page))
        .route("/logs", get(routes::log_index))
        .route("/logs/", get(routes::log_index))
        .route("/logs/{file}", get(routes::log_file))
        .nest("/api/v1", routes::api_routes())
        .fallback(fallback)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn fallback() -> (axum::http::StatusCode, &'static str) {
    (axum::http::StatusCode::NOT_FOUND, "not found")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{Ledger, RunRecord, RunStatus};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt; // for `oneshot`

    async fn state(dir: &std::path::Path) -> AppState {
        let ledger = Ledger::load(dir.join("runs.json")).await.unwrap();
        let logs_dir = dir.join("logs");
        std::fs::create_dir_all(&logs_dir).unwrap();
        AppState::new(ledger, logs_dir, "qt/qtwayland")
    }

    async fn get_body(app: Router, uri: &str) -> (StatusCode, String) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), 1_000_000)
            .await
            .unwrap();
        (status, String::from_utf8_lossy(&body).into_owned())
    }

    #[tokio::test]
    async fn test_status_page_lists_runs_newest_first() {
        let dir = tempfile::TempDir::new().unwrap();
        let state = state(dir.path()).await;
        state
            .ledger
            .append(RunRecord::running(
                "gerrit-watcher-100-1",
                "refs/changes/00/100/1",
                "5.11",
                "100 #1 (5.11) - Fix crash",
                Some("https://codereview.qt-project.org/100".to_string()),
            ))
            .unwrap();
        state
            .ledger
            .update_status("gerrit-watcher-100-1", RunStatus::Failed, Some(1))
            .unwrap();
        state
            .ledger
            .append(RunRecord::running(
                "gerrit-watcher-health-dev-1",
                "dev",
                "dev",
                "health check dev",
                None,
            ))
            .unwrap();

        let (status, body) = get_body(router(state), "/").await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("qt&#x2f;qtwayland") || body.contains("qt/qtwayland"));
        let health = body.find("health check dev").unwrap();
        let change = body.find("Fix crash").unwrap();
        assert!(health < change, "newest run must come first");
        assert!(body.contains("gerrit-watcher-100-1.log"));
        assert!(body.contains("failed"));
        assert!(body.contains("running"));
    }

    #[tokio::test]
    async fn test_empty_status_page() {
        let dir = tempfile::TempDir::new().unwrap();
        let (status, body) = get_body(router(state(dir.path()).await), "/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("No runs yet."));
    }

    #[tokio::test]
    async fn test_runs_json() {
        let dir = tempfile::TempDir::new().unwrap();
        let state = state(dir.path()).await;
        state
            .ledger
            .append(RunRecord::running("run-a", "dev", "dev", "health check dev", None))
            .unwrap();

        let (status, body) = get_body(router(state), "/api/v1/runs").await;

        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["meta"]["total"], 1);
        assert_eq!(json["data"][0]["containerName"], "run-a");
        assert_eq!(json["data"][0]["status"], "running");
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let dir = tempfile::TempDir::new().unwrap();
        let (status, body) = get_body(router(state(dir.path()).await), "/api/v1/health").await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["data"]["status"], "ok");
    }

    #[tokio::test]
    async fn test_serves_log_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let state = state(dir.path()).await;
        std::fs::write(state.logs_dir.join("run-a.log"), "hello from the sandbox\n").unwrap();

        let (status, body) = get_body(router(state), "/logs/run-a.log").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "hello from the sandbox\n");
    }

    #[tokio::test]
    async fn test_log_directory_listing() {
        let dir = tempfile::TempDir::new().unwrap();
        let state = state(dir.path()).await;
        std::fs::write(state.logs_dir.join("run-a.log"), "a").unwrap();
        std::fs::write(state.logs_dir.join("run-b.log"), "b").unwrap();

        let (status, body) = get_body(router(state), "/logs/").await;

        assert_eq!(status, StatusCode::OK);
        let a = body.find("run-a.log").unwrap();
        let b = body.find("run-b.log").unwrap();
        assert!(b < a);
    }

    #[tokio::test]
    async fn test_hidden_file_is_not_served() {
        let dir = tempfile::TempDir::new().unwrap();
        let state = state(dir.path()).await;
        std::fs::write(state.logs_dir.join(".secret"), "x").unwrap();

        let (status, _) = get_body(router(state), "/logs/.secret").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_missing_log_is_404() {
        let dir = tempfile::TempDir::new().unwrap();
        let (status, _) = get_body(router(state(dir.path()).await), "/logs/nope.log").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unknown_path_is_404() {
        let dir = tempfile::TempDir::new().unwrap();
        let (status, _) = get_body(router(state(dir.path()).await), "/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
