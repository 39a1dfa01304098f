//! End-to-end tests of the HTTP surface
//!
//! The extraction backend and the executors are real axum servers on
//! loopback ports; the orchestrator is driven through `relay-client`.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use relay_client::OrchestratorClient;
use relay_core::domain::event::EventType;
use relay_core::domain::outcome::{Classification, RunOutcome};
use relay_core::domain::result::{ErrorKind, TaskStatus};
use relay_core::domain::run::{Run, RunSource, RunState};
use relay_core::domain::task::TaskKind;
use relay_core::dto::event::EventQuery;
use relay_core::dto::run::{RunView, SubmitRun};
use relay_orchestrator::api::create_router;
use relay_orchestrator::config::{Config, ExecutorConfig};
use relay_orchestrator::service::executor::HttpExecutorClient;
use relay_orchestrator::service::extraction::ChatCompletionExtractor;
use relay_orchestrator::service::feedback::LogFeedbackSink;
use relay_orchestrator::service::validation::PassThrough;
use relay_orchestrator::service::{Collaborators, Orchestrator};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

// =============================================================================
// Fake collaborators
// =============================================================================

/// Chat-completion stand-in that decides by keyword
async fn chat_completions(Json(body): Json<Value>) -> Json<Value> {
    let text = body["messages"][1]["content"].as_str().unwrap_or_default().to_string();

    if text.contains("slowly") {
        tokio::time::sleep(Duration::from_millis(500)).await;
    }

    let envelope = if text.contains("refuse") {
        json!({ "status": "error", "message": "not a DevOps request" })
    } else {
        let mut tasks = Vec::new();
        if text.contains("CI") {
            tasks.push(json!({
                "type": "ci",
                "description": "Set up CI pipeline",
                "parameters": { "repository": "R", "branch": "main" }
            }));
        }
        if text.contains("deploy") {
            tasks.push(json!({
                "type": "deploy",
                "description": "Deploy to production",
                "parameters": { "repository": "R", "namespace": "prod" }
            }));
        }
        if text.contains("terraform") {
            tasks.push(json!({
                "type": "terraform",
                "description": "Provision infrastructure",
                "parameters": {}
            }));
        }
        json!({ "status": "success", "tasks": tasks })
    };

    Json(json!({
        "choices": [{ "message": { "role": "assistant", "content": envelope.to_string() } }]
    }))
}

/// Executor stand-in that echoes its request after `delay`
fn executor(delay: Duration) -> Router {
    Router::new()
        .route("/health", get(|| async { StatusCode::OK }))
        .route(
            "/execute",
            post(
                |State(delay): State<Duration>, Json(request): Json<Value>| async move {
                    tokio::time::sleep(delay).await;
                    Json(json!({ "status": "success", "echo": request }))
                },
            ),
        )
        .with_state(delay)
}

struct Harness {
    client: OrchestratorClient,
    base_url: String,
}

impl Harness {
    /// Orchestrator whose deploy executor answers after `deploy_delay`
    async fn start(deploy_delay: Duration, deploy_timeout: Duration) -> Self {
        let extraction_url = serve(Router::new().route("/chat/completions", post(chat_completions))).await;
        let ci_url = serve(executor(Duration::ZERO)).await;
        let helm_url = serve(executor(Duration::ZERO)).await;
        let deploy_url = serve(executor(deploy_delay)).await;

        let mut config = Config::default();
        config.extraction.base_url = extraction_url;
        config.extraction.timeout = Duration::from_secs(5);
        config.executors.insert(TaskKind::CiPipeline, ExecutorConfig::new(ci_url));
        config.executors.insert(TaskKind::HelmChart, ExecutorConfig::new(helm_url));
        let mut deploy = ExecutorConfig::new(deploy_url);
        deploy.timeout = deploy_timeout;
        config.executors.insert(TaskKind::Deploy, deploy);

        let collaborators = Collaborators {
            extractor: Arc::new(ChatCompletionExtractor::new(config.extraction.clone())),
            executors: Arc::new(HttpExecutorClient::new()),
            feedback: Arc::new(LogFeedbackSink),
            hook: Arc::new(PassThrough),
            jira: None,
        };
        let orchestrator = Orchestrator::new(&config, collaborators);
        let base_url = serve(create_router(orchestrator)).await;

        Self {
            client: OrchestratorClient::new(&base_url),
            base_url,
        }
    }

    async fn default() -> Self {
        Self::start(Duration::ZERO, Duration::from_secs(5)).await
    }

    async fn submit(&self, text: &str) -> Uuid {
        self.client
            .submit_run(SubmitRun {
                text: text.to_string(),
                source: RunSource::Manual,
                ticket_key: None,
            })
            .await
            .unwrap()
            .run_id
    }

    async fn finish(&self, id: Uuid) -> Run {
        self.client
            .wait_for_run(id, Duration::from_millis(20), Duration::from_secs(10))
            .await
            .unwrap()
    }
}

// =============================================================================
// Runs
// =============================================================================

#[tokio::test]
async fn test_ci_request_completes_all() {
    let harness = Harness::default().await;
    let id = harness.submit("Set up CI for repo R on branch main").await;

    let run = harness.finish(id).await;
    assert_eq!(run.state, RunState::Completed);

    let outcome = harness.client.get_outcome(id).await.unwrap();
    assert_eq!(outcome.classification(), Some(Classification::CompletedAll));

    let results = harness.client.get_results(id).await.unwrap();
    assert_eq!(results.len(), 1);
    let echo = &results[0].payload.as_ref().unwrap()["echo"];
    assert_eq!(echo["type"], "ci_pipeline");
    assert_eq!(echo["run_id"], json!(id));
    assert_eq!(echo["parameters"]["repository"], "R");
    assert_eq!(echo["parameters"]["branch"], "main");
}

#[tokio::test]
async fn test_slow_executor_gives_partial_failure() {
    let harness = Harness::start(Duration::from_secs(5), Duration::from_millis(200)).await;
    let id = harness.submit("Set up CI and deploy it").await;
    harness.finish(id).await;

    let RunOutcome::Completed { summary, .. } = harness.client.get_outcome(id).await.unwrap() else {
        panic!("expected completed outcome");
    };
    assert_eq!(summary.classification, Classification::PartialFailure);
    assert_eq!(summary.tasks[0].status, TaskStatus::Success);
    assert!(summary.tasks[0].payload.is_some());
    assert_eq!(summary.tasks[1].status, TaskStatus::Timeout);
    assert_eq!(
        summary.tasks[1].error.as_ref().unwrap().kind,
        ErrorKind::ExecutorTimeout
    );
}

#[tokio::test]
async fn test_unknown_kind_is_isolated() {
    let harness = Harness::default().await;
    let id = harness.submit("Set up CI and terraform the VPC").await;
    harness.finish(id).await;

    let RunOutcome::Completed { summary, .. } = harness.client.get_outcome(id).await.unwrap() else {
        panic!("expected completed outcome");
    };
    assert_eq!(summary.classification, Classification::PartialFailure);
    assert_eq!(summary.tasks[1].kind.as_str(), "terraform");
    assert_eq!(
        summary.tasks[1].error.as_ref().unwrap().kind,
        ErrorKind::UnknownKind
    );
}

#[tokio::test]
async fn test_no_actionable_tasks() {
    let harness = Harness::default().await;
    let id = harness.submit("Hello, how is everyone today?").await;
    let run = harness.finish(id).await;

    assert_eq!(run.state, RunState::Completed);
    assert!(run.tasks.is_empty());
    assert_eq!(
        run.outcome.unwrap().classification(),
        Some(Classification::NoActionableTasks)
    );
}

#[tokio::test]
async fn test_refusal_fails_run() {
    let harness = Harness::default().await;
    let id = harness.submit("Please refuse this").await;
    let run = harness.finish(id).await;

    assert_eq!(run.state, RunState::Failed);
    assert_eq!(run.error.unwrap().kind, ErrorKind::ExtractionError);
    assert!(matches!(
        harness.client.get_outcome(id).await.unwrap(),
        RunOutcome::Failed { .. }
    ));

    let events = harness.client.get_run_events(id).await.unwrap();
    assert!(events.iter().all(|e| e.event_type != EventType::TaskDispatched));
    assert_eq!(events.last().unwrap().event_type, EventType::RunFailed);
}

#[tokio::test]
async fn test_outcome_conflicts_until_terminal() {
    let harness = Harness::default().await;
    let id = harness.submit("Set up CI slowly").await;

    let err = harness.client.get_outcome(id).await.unwrap_err();
    assert!(err.is_conflict());

    harness.finish(id).await;
    assert!(harness.client.get_outcome(id).await.is_ok());
}

#[tokio::test]
async fn test_cancel_running_run() {
    let harness = Harness::start(Duration::from_secs(30), Duration::from_secs(60)).await;
    let id = harness.submit("deploy the service").await;

    for _ in 0..200 {
        if harness.client.get_run(id).await.unwrap().state == RunState::Dispatched {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let handle = harness.client.cancel_run(id).await.unwrap();
    assert_eq!(handle.state, RunState::Failed);

    let run = harness.client.get_run(id).await.unwrap();
    assert_eq!(run.error.unwrap().kind, ErrorKind::Cancelled);
    assert!(run.results.is_empty());

    let again = harness.client.cancel_run(id).await.unwrap_err();
    assert!(again.is_conflict());
}

#[tokio::test]
async fn test_unknown_run_is_not_found() {
    let harness = Harness::default().await;
    let err = harness.client.get_run(Uuid::new_v4()).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_list_views() {
    let harness = Harness::default().await;
    let id = harness.submit("Set up CI").await;
    harness.finish(id).await;

    let history = harness.client.list_runs(RunView::History).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, id);
    assert_eq!(history[0].classification, Some(Classification::CompletedAll));

    assert!(harness.client.list_runs(RunView::Active).await.unwrap().is_empty());
}

// =============================================================================
// Events & executors
// =============================================================================

#[tokio::test]
async fn test_event_log_queries() {
    let harness = Harness::default().await;
    let id = harness.submit("Set up CI").await;
    harness.finish(id).await;

    let events = harness
        .client
        .list_events(&EventQuery::for_run(id))
        .await
        .unwrap();
    assert_eq!(events.first().unwrap().event_type, EventType::TaskReceived);
    assert_eq!(events.last().unwrap().event_type, EventType::RunCompleted);
    assert!(events.iter().any(|e| e.event_type == EventType::TaskDispatched));
    assert!(events.windows(2).all(|w| w[0].sequence < w[1].sequence));

    let latest = harness
        .client
        .list_events(&EventQuery {
            limit: Some(1),
            ..EventQuery::for_run(id)
        })
        .await
        .unwrap();
    assert_eq!(latest.len(), 1);
    assert_eq!(latest[0].event_type, EventType::RunCompleted);

    let cleared = harness.client.clear_events().await.unwrap();
    assert!(cleared.hidden >= events.len());
    assert!(
        harness
            .client
            .list_events(&EventQuery::default())
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn test_executor_listing() {
    let harness = Harness::default().await;
    let executors = harness.client.list_executors().await.unwrap();

    let kinds: Vec<TaskKind> = executors.iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![TaskKind::CiPipeline, TaskKind::HelmChart, TaskKind::Deploy]
    );
    assert!(executors.iter().all(|e| e.in_flight == 0));
}

// =============================================================================
// Ticket intake
// =============================================================================

#[tokio::test]
async fn test_webhook_intake() {
    let harness = Harness::default().await;
    let http = reqwest::Client::new();
    let url = format!("{}/webhook/jira", harness.base_url);

    let rejected = http
        .post(&url)
        .json(&json!({ "issue": { "key": "OPS-1", "fields": { "description": "Set up CI" } } }))
        .send()
        .await
        .unwrap();
    assert_eq!(rejected.status(), reqwest::StatusCode::BAD_REQUEST);

    let accepted = http
        .post(&url)
        .json(&json!({
            "issue": {
                "key": "OPS-2",
                "fields": { "description": "Set up CI for R", "team": "DevOps" }
            }
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(accepted.status(), reqwest::StatusCode::ACCEPTED);

    let body: Value = accepted.json().await.unwrap();
    let id: Uuid = serde_json::from_value(body["run_id"].clone()).unwrap();
    let run = harness.finish(id).await;
    assert_eq!(run.source, RunSource::Webhook);
    assert_eq!(run.ticket_key.as_deref(), Some("OPS-2"));
}

#[tokio::test]
async fn test_ticket_submit_without_jira() {
    let harness = Harness::default().await;
    let response = reqwest::Client::new()
        .post(format!("{}/tickets/OPS-3/submit", harness.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
}
