//! Executor transport
//!
//! Per-kind request adapters and the client that POSTs them to executor
//! services. The orchestrator treats parameters as opaque; this is the one
//! place they are deserialised into concrete request types.

use async_trait::async_trait;
use relay_core::domain::result::ErrorKind;
use relay_core::domain::task::{Parameters, TaskKind};
use relay_core::dto::executor::{
    CiPipelineRequest, DeployRequest, ExecutionRequest, HelmChartRequest,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Executor call error type
#[derive(Debug, Error)]
pub enum ExecutorCallError {
    #[error("invalid parameters for {kind}: {message}")]
    InvalidParameters { kind: TaskKind, message: String },

    #[error("executor request failed: {0}")]
    Transport(String),

    #[error("executor returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("executor reported an error: {0}")]
    Reported(String),

    #[error("executor response is not a JSON object: {0}")]
    MalformedBody(String),

    #[error("executor did not answer within {0:?}")]
    Timeout(Duration),
}

impl ExecutorCallError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExecutorCallError::InvalidParameters { .. } => ErrorKind::InvalidParameters,
            ExecutorCallError::Timeout(_) => ErrorKind::ExecutorTimeout,
            _ => ErrorKind::ExecutorFailure,
        }
    }
}

/// Normalise opaque parameters into the request body of `kind`
///
/// Defaults are filled in (e.g. `branch = main` for CI) and unknown keys
/// are dropped.
pub fn build_request(
    kind: TaskKind,
    parameters: &Parameters,
) -> Result<serde_json::Value, ExecutorCallError> {
    match kind {
        TaskKind::CiPipeline => normalise::<CiPipelineRequest>(kind, parameters),
        TaskKind::HelmChart => normalise::<HelmChartRequest>(kind, parameters),
        TaskKind::Deploy => normalise::<DeployRequest>(kind, parameters),
    }
}

fn normalise<T>(kind: TaskKind, parameters: &Parameters) -> Result<serde_json::Value, ExecutorCallError>
where
    T: DeserializeOwned + Serialize,
{
    let raw = serde_json::Value::Object(
        parameters
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
    );

    let typed: T = serde_json::from_value(raw).map_err(|e| ExecutorCallError::InvalidParameters {
        kind,
        message: e.to_string(),
    })?;

    serde_json::to_value(typed).map_err(|e| ExecutorCallError::InvalidParameters {
        kind,
        message: e.to_string(),
    })
}

/// Interprets a 2xx executor body
///
/// A JSON object whose `status` is `error` or `failure` is an
/// executor-reported failure; any other object is the success payload.
pub fn interpret_body(body: serde_json::Value) -> Result<serde_json::Value, ExecutorCallError> {
    let serde_json::Value::Object(map) = &body else {
        return Err(ExecutorCallError::MalformedBody(body.to_string()));
    };

    match map.get("status").and_then(|s| s.as_str()) {
        Some("error") | Some("failure") => {
            let message = map
                .get("message")
                .or_else(|| map.get("error"))
                .and_then(|m| m.as_str())
                .unwrap_or("no message")
                .to_string();
            Err(ExecutorCallError::Reported(message))
        }
        _ => Ok(body),
    }
}

/// Transport to executor services
///
/// Implementations do not enforce the per-kind timeout; the dispatch
/// coordinator wraps every call in it.
#[async_trait]
pub trait ExecutorClient: Send + Sync {
    /// POST the envelope to `{base_url}/execute`
    async fn execute(
        &self,
        base_url: &str,
        request: &ExecutionRequest,
    ) -> Result<serde_json::Value, ExecutorCallError>;

    /// Liveness check against `{base_url}/health`
    async fn check_health(&self, base_url: &str) -> bool;
}

/// reqwest-backed executor client
#[derive(Clone, Default)]
pub struct HttpExecutorClient {
    client: reqwest::Client,
}

impl HttpExecutorClient {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExecutorClient for HttpExecutorClient {
    async fn execute(
        &self,
        base_url: &str,
        request: &ExecutionRequest,
    ) -> Result<serde_json::Value, ExecutorCallError> {
        let url = format!("{}/execute", base_url.trim_end_matches('/'));
        debug!("POST {} for task {}", url, request.task_id);

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| ExecutorCallError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExecutorCallError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ExecutorCallError::MalformedBody(e.to_string()))?;

        interpret_body(body)
    }

    async fn check_health(&self, base_url: &str) -> bool {
        let url = format!("{}/health", base_url.trim_end_matches('/'));
        match self.client.get(&url).timeout(HEALTH_CHECK_TIMEOUT).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!("Health check of {} failed: {}", url, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: serde_json::Value) -> Parameters {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_ci_request_gets_defaults() {
        let body = build_request(
            TaskKind::CiPipeline,
            &params(json!({"repository": "R", "dockerfile_path": "./Dockerfile"})),
        )
        .unwrap();

        assert_eq!(body["repository"], "R");
        assert_eq!(body["branch"], "main");
        assert_eq!(body["build_steps"], json!(["test", "lint", "build"]));
        assert!(body.get("dockerfile_path").is_none());
    }

    #[test]
    fn test_deploy_without_namespace_is_invalid() {
        let err = build_request(TaskKind::Deploy, &params(json!({"repository": "R"}))).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameters);
    }

    #[test]
    fn test_helm_rejects_wrong_shape() {
        let err = build_request(
            TaskKind::HelmChart,
            &params(json!({"repository": "R", "service_ports": "8080"})),
        )
        .unwrap_err();
        assert!(matches!(err, ExecutorCallError::InvalidParameters { .. }));
    }

    #[test]
    fn test_interpret_body() {
        let ok = interpret_body(json!({"status": "success", "pipeline": "yaml"})).unwrap();
        assert_eq!(ok["pipeline"], "yaml");

        let err = interpret_body(json!({"status": "error", "message": "bad repo"})).unwrap_err();
        assert!(matches!(err, ExecutorCallError::Reported(msg) if msg == "bad repo"));

        assert!(matches!(
            interpret_body(json!([1, 2])),
            Err(ExecutorCallError::MalformedBody(_))
        ));
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            ExecutorCallError::Timeout(Duration::from_secs(1)).kind(),
            ErrorKind::ExecutorTimeout
        );
        assert_eq!(
            ExecutorCallError::Http {
                status: 500,
                body: String::new()
            }
            .kind(),
            ErrorKind::ExecutorFailure
        );
    }
}
