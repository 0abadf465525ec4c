//! HTTP surface over the orchestrator.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use crate::browser::SessionManager;
use crate::engine::CaseRunner;
use crate::error::Error;
use crate::model::{BrowserKind, TestCase, TestExecution, TestRun};
use crate::orchestrator::Orchestrator;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Orchestrator,
    pub runner: Arc<CaseRunner>,
    pub sessions: Arc<SessionManager>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRunRequest {
    pub project_id: i64,
    pub url: String,
    #[serde(default)]
    pub browser: Option<String>,
    pub test_type: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultsCallbackRequest {
    pub passed: u32,
    pub failed: u32,
}

/// Direct execution request, the surface a remote orchestrator posts to
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteRequest {
    pub test_run_id: i64,
    #[serde(default)]
    pub browser: Option<String>,
    pub test_cases: Vec<TestCase>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::External(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (
            status,
            Json(ErrorBody {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/test-runs", post(start_run))
        .route("/api/test-runs/:id", get(get_run))
        .route("/api/test-runs/:id/stop", post(stop_run))
        .route("/api/test-runs/:id/results", post(report_results))
        .route("/api/test-runs/:id/executions", get(list_executions))
        .route("/api/projects/:id/test-runs", get(list_runs))
        .route("/api/execute", post(execute))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn start_run(
    State(state): State<AppState>,
    Json(request): Json<StartRunRequest>,
) -> Result<(StatusCode, Json<TestRun>), Error> {
    let run = state
        .orchestrator
        .start_run(
            request.project_id,
            &request.url,
            request.browser.as_deref(),
            &request.test_type,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(run)))
}

async fn get_run(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<TestRun>, Error> {
    Ok(Json(state.orchestrator.get_run(id).await?))
}

async fn list_runs(
    State(state): State<AppState>,
    Path(project_id): Path<i64>,
) -> Result<Json<Vec<TestRun>>, Error> {
    Ok(Json(state.orchestrator.list_runs(project_id).await?))
}

async fn stop_run(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<TestRun>, Error> {
    Ok(Json(state.orchestrator.stop_run(id).await?))
}

async fn report_results(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<ResultsCallbackRequest>,
) -> Result<Json<TestRun>, Error> {
    Ok(Json(
        state
            .orchestrator
            .report_results(id, request.passed, request.failed)
            .await?,
    ))
}

async fn list_executions(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<TestExecution>>, Error> {
    Ok(Json(state.orchestrator.list_executions(id).await?))
}

/// Accept a batch for execution and run it in the background; results are
/// reported through the run's results endpoint when done.
async fn execute(
    State(state): State<AppState>,
    Json(request): Json<ExecuteRequest>,
) -> Result<StatusCode, Error> {
    if request.test_cases.is_empty() {
        return Err(Error::validation("testCases must not be empty"));
    }
    let browser = request
        .browser
        .as_deref()
        .map(BrowserKind::parse_or_default)
        .unwrap_or_default();

    let runner = state.runner.clone();
    let orchestrator = state.orchestrator.clone();
    let run_id = request.test_run_id;
    let cases = request.test_cases;
    tokio::spawn(async move {
        match runner.run(run_id, browser, &cases).await {
            Ok(summary) => {
                if let Err(e) = orchestrator
                    .report_results(run_id, summary.passed, summary.failed)
                    .await
                {
                    log::error!("failed to report results for run {}: {}", run_id, e);
                }
            }
            Err(e) => {
                log::error!("execution batch for run {} failed: {:#}", run_id, e);
            }
        }
    });

    Ok(StatusCode::ACCEPTED)
}

/// Serve the API until ctrl-c, then close every live browser session.
pub async fn serve(state: AppState, port: u16) -> anyhow::Result<()> {
    let sessions = state.sessions.clone();
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    log::info!("listening on http://0.0.0.0:{}", port);
    println!("🚀 Server running at http://localhost:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            log::info!("shutdown requested");
            sessions.release_all().await;
        })
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::driver::mock::MockFactory;
    use crate::evidence::EvidenceStore;
    use crate::generator::TestGenerator;
    use crate::model::{RunStatus, TestType};
    use crate::orchestrator::InProcessDispatcher;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::{json, Value};
    use std::time::Duration;
    use tower::ServiceExt;

    struct StaticGenerator(Vec<TestCase>);

    #[async_trait]
    impl TestGenerator for StaticGenerator {
        async fn generate(
            &self,
            _url: &str,
            _browser: BrowserKind,
            _test_type: TestType,
        ) -> anyhow::Result<Vec<TestCase>> {
            Ok(self.0.clone())
        }
    }

    fn test_app(cases: Vec<TestCase>) -> (Router, tempfile::TempDir) {
        let store = Arc::new(MemoryStore::new());
        let evidence_dir = tempfile::tempdir().unwrap();
        let sessions = Arc::new(SessionManager::new(Arc::new(MockFactory::new())));
        let runner = Arc::new(CaseRunner::new(
            sessions.clone(),
            store.clone(),
            Arc::new(EvidenceStore::new(evidence_dir.path())),
            100,
            0,
            false,
        ));
        let orchestrator = Orchestrator::new(
            store.clone(),
            store,
            Arc::new(StaticGenerator(cases)),
            Arc::new(InProcessDispatcher::new(runner.clone())),
            Duration::from_secs(30),
        );
        let state = AppState {
            orchestrator,
            runner,
            sessions,
        };
        (router(state), evidence_dir)
    }

    fn case() -> TestCase {
        TestCase {
            name: "smoke".to_string(),
            description: None,
            steps: vec![crate::model::TestStep {
                action: "click".to_string(),
                selector: Some("#go".to_string()),
                ..Default::default()
            }],
        }
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn start_run_returns_created_snapshot() {
        let (app, _dir) = test_app(vec![case()]);

        let response = app
            .oneshot(post_json(
                "/api/test-runs",
                json!({"projectId": 1, "url": "https://example.com", "testType": "smoke"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        let body = body_json(response).await;
        assert_eq!(body["status"], "PENDING");
        assert_eq!(body["projectId"], 1);
        assert_eq!(body["browser"], "chromium");
        assert_eq!(body["totalTests"], 0);
    }

    #[tokio::test]
    async fn start_run_rejects_bad_browser() {
        let (app, _dir) = test_app(vec![]);

        let response = app
            .oneshot(post_json(
                "/api/test-runs",
                json!({"projectId": 1, "url": "https://example.com", "browser": "netscape", "testType": "smoke"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert!(body["error"].as_str().unwrap().contains("netscape"));
    }

    #[tokio::test]
    async fn unknown_run_is_404() {
        let (app, _dir) = test_app(vec![]);
        let response = app.oneshot(get("/api/test-runs/404")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn run_lifecycle_is_observable_over_http() {
        let (app, _dir) = test_app(vec![case()]);

        let created = app
            .clone()
            .oneshot(post_json(
                "/api/test-runs",
                json!({"projectId": 5, "url": "https://example.com", "testType": "functional"}),
            ))
            .await
            .unwrap();
        let id = body_json(created).await["id"].as_i64().unwrap();

        // Poll until the background workflow lands on a terminal status
        let mut terminal = Value::Null;
        for _ in 0..200 {
            let response = app
                .clone()
                .oneshot(get(&format!("/api/test-runs/{}", id)))
                .await
                .unwrap();
            let body = body_json(response).await;
            let status: RunStatus = body["status"].as_str().unwrap().parse().unwrap();
            if status.is_terminal() {
                terminal = body;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(terminal["status"], "PASSED");
        assert_eq!(terminal["totalTests"], 1);
        assert_eq!(terminal["passedTests"], 1);

        let executions = app
            .clone()
            .oneshot(get(&format!("/api/test-runs/{}/executions", id)))
            .await
            .unwrap();
        let executions = body_json(executions).await;
        assert_eq!(executions.as_array().unwrap().len(), 1);
        assert_eq!(executions[0]["status"], "PASSED");

        let listed = app
            .oneshot(get("/api/projects/5/test-runs"))
            .await
            .unwrap();
        let listed = body_json(listed).await;
        assert_eq!(listed.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn stop_endpoint_returns_stopped_run() {
        // The background workflow races the stop request; either way the
        // run must come back terminal.
        let (app, _dir) = test_app(vec![case()]);

        let created = app
            .clone()
            .oneshot(post_json(
                "/api/test-runs",
                json!({"projectId": 1, "url": "https://example.com", "testType": "smoke"}),
            ))
            .await
            .unwrap();
        let id = body_json(created).await["id"].as_i64().unwrap();

        // Let the workflow leave PENDING before stopping
        for _ in 0..200 {
            let response = app
                .clone()
                .oneshot(get(&format!("/api/test-runs/{}", id)))
                .await
                .unwrap();
            if body_json(response).await["status"] != "PENDING" {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let response = app
            .oneshot(post_json(&format!("/api/test-runs/{}/stop", id), json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        let status: RunStatus = body["status"].as_str().unwrap().parse().unwrap();
        assert!(status.is_terminal());
    }

    #[tokio::test]
    async fn execute_accepts_and_reports_back() {
        let (app, _dir) = test_app(vec![case()]);

        // Seed a run whose results the batch will report into
        let created = app
            .clone()
            .oneshot(post_json(
                "/api/test-runs",
                json!({"projectId": 1, "url": "https://example.com", "testType": "smoke"}),
            ))
            .await
            .unwrap();
        let id = body_json(created).await["id"].as_i64().unwrap();

        let response = app
            .clone()
            .oneshot(post_json(
                "/api/execute",
                json!({
                    "testRunId": id,
                    "browser": "chromium",
                    "testCases": [{"name": "direct", "steps": [{"action": "click", "selector": "#x"}]}]
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        // The batch lands as executions on the run
        let mut found = false;
        for _ in 0..200 {
            let response = app
                .clone()
                .oneshot(get(&format!("/api/test-runs/{}/executions", id)))
                .await
                .unwrap();
            let body = body_json(response).await;
            if body
                .as_array()
                .unwrap()
                .iter()
                .any(|e| e["testName"] == "direct" && e["status"] == "PASSED")
            {
                found = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(found);
    }

    #[tokio::test]
    async fn execute_rejects_empty_batch() {
        let (app, _dir) = test_app(vec![]);

        let response = app
            .oneshot(post_json(
                "/api/execute",
                json!({"testRunId": 1, "testCases": []}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn results_callback_finalizes_the_run() {
        let (app, _dir) = test_app(vec![case()]);

        let created = app
            .clone()
            .oneshot(post_json(
                "/api/test-runs",
                json!({"projectId": 1, "url": "https://example.com", "testType": "smoke"}),
            ))
            .await
            .unwrap();
        let id = body_json(created).await["id"].as_i64().unwrap();

        let response = app
            .oneshot(post_json(
                &format!("/api/test-runs/{}/results", id),
                json!({"passed": 4, "failed": 0}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        // Either the callback won the race and finalized the run, or the
        // in-process workflow already did; both leave it terminal.
        let status: RunStatus = body["status"].as_str().unwrap().parse().unwrap();
        assert!(status.is_terminal());
    }
}
