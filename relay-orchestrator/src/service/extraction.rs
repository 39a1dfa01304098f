//! Extraction Adapter
//!
//! Turns free-form text into an ordered list of task descriptors by calling
//! an external decomposition backend. The adapter owns the input check, the
//! single transient retry and the overall timeout for that one call.

use async_trait::async_trait;
use relay_core::domain::event::{EventType, NewEvent, Service};
use relay_core::domain::result::ErrorKind;
use relay_core::domain::task::{DeclaredKind, Parameters, TaskDescriptor};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::ExtractionConfig;
use crate::repository::EventRecorder;

/// Instructions sent as the system message of every extraction call
pub const SYSTEM_PROMPT: &str = r#"You are a DevOps task analyzer. Read the request and extract the DevOps tasks it asks for.

For an actionable request, return a JSON object:
{"status": "success", "tasks": [{"type": "ci" | "helm" | "deploy", "description": "...", "parameters": {...}}]}

Use "ci" for CI pipeline generation (parameters: repository, branch, build_steps),
"helm" for chart generation (parameters: repository, app_name, service_ports, environment_variables)
and "deploy" for cluster deployment (parameters: repository, namespace, cluster_details, release_name, helm_values).

If the request contains no DevOps work, return {"status": "success", "tasks": []}.
If the request is unclear, return {"status": "error", "message": "<what is missing>"}."#;

/// Extraction error type
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("input text is empty")]
    EmptyInput,

    #[error("extraction timed out after {0:?}")]
    Timeout(Duration),

    #[error("extraction backend could not parse the request: {0}")]
    Refused(String),

    #[error("malformed extraction response: {0}")]
    Malformed(String),

    #[error("extraction backend returned HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("extraction transport error: {0}")]
    Transport(String),

    #[error("extraction backend unavailable (HTTP {status})")]
    Unavailable { status: u16 },
}

impl ExtractionError {
    /// Transport failures, 429 and 5xx are retried once
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ExtractionError::Transport(_) | ExtractionError::Unavailable { .. }
        )
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ExtractionError::EmptyInput => ErrorKind::ValidationError,
            ExtractionError::Timeout(_) => ErrorKind::ExtractionTimeout,
            _ => ErrorKind::ExtractionError,
        }
    }
}

/// One task as returned by the backend, before ids are assigned
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedTask {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parameters: Parameters,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    status: Option<String>,
    #[serde(default)]
    tasks: Option<serde_json::Value>,
    #[serde(default)]
    message: Option<String>,
}

/// Parse the backend's JSON envelope
///
/// `{"status":"success","tasks":[..]}` yields the tasks (possibly none);
/// `{"status":"error","message":..}` is a well-formed refusal.
pub fn parse_envelope(content: &str) -> Result<Vec<ExtractedTask>, ExtractionError> {
    let envelope: Envelope = serde_json::from_str(content)
        .map_err(|e| ExtractionError::Malformed(format!("response is not JSON: {}", e)))?;

    match envelope.status.as_deref() {
        Some("success") => {
            let tasks = match envelope.tasks {
                Some(tasks @ serde_json::Value::Array(_)) => tasks,
                _ => {
                    return Err(ExtractionError::Malformed(
                        "success response without a tasks list".to_string(),
                    ));
                }
            };
            serde_json::from_value(tasks)
                .map_err(|e| ExtractionError::Malformed(format!("invalid task entry: {}", e)))
        }
        Some("error") => Err(ExtractionError::Refused(
            envelope
                .message
                .unwrap_or_else(|| "no reason given".to_string()),
        )),
        Some(other) => Err(ExtractionError::Malformed(format!(
            "unknown status '{}'",
            other
        ))),
        None => Err(ExtractionError::Malformed(
            "response is missing 'status'".to_string(),
        )),
    }
}

/// External decomposition backend, one attempt per call
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract_once(&self, text: &str) -> Result<Vec<ExtractedTask>, ExtractionError>;
}

/// Chat-completion backend
pub struct ChatCompletionExtractor {
    client: reqwest::Client,
    config: ExtractionConfig,
}

impl ChatCompletionExtractor {
    pub fn new(config: ExtractionConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn request_body(&self, text: &str) -> serde_json::Value {
        json!({
            "model": self.config.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": text},
            ],
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
            "response_format": {"type": "json_object"},
        })
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl Extractor for ChatCompletionExtractor {
    async fn extract_once(&self, text: &str) -> Result<Vec<ExtractedTask>, ExtractionError> {
        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );

        let mut request = self.client.post(&url).json(&self.request_body(text));
        if !self.config.api_key.is_empty() {
            request = request.bearer_auth(&self.config.api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ExtractionError::Transport(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(ExtractionError::Unavailable {
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExtractionError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| ExtractionError::Malformed(format!("invalid completion body: {}", e)))?;

        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ExtractionError::Malformed("completion has no content".to_string()))?;

        debug!("Extraction backend answered: {}", content);

        parse_envelope(&content)
    }
}

/// Wraps an [`Extractor`] with validation, retry, timeout and events
pub struct ExtractionAdapter {
    extractor: Arc<dyn Extractor>,
    timeout: Duration,
    events: Arc<EventRecorder>,
}

impl ExtractionAdapter {
    pub fn new(extractor: Arc<dyn Extractor>, timeout: Duration, events: Arc<EventRecorder>) -> Self {
        Self {
            extractor,
            timeout,
            events,
        }
    }

    /// Extract the ordered task descriptors of one run
    ///
    /// Task ids are `task-1`, `task-2`, ... in extraction order.
    pub async fn extract(
        &self,
        run_id: Uuid,
        text: &str,
    ) -> Result<Vec<TaskDescriptor>, ExtractionError> {
        self.events.record(
            NewEvent::new(
                Service::Extraction,
                EventType::ExtractionStarted,
                "Extracting tasks from input",
            )
            .for_run(run_id)
            .with_data(json!({ "input_length": text.len() })),
        );

        let outcome = if text.trim().is_empty() {
            Err(ExtractionError::EmptyInput)
        } else {
            let attempt = async {
                match self.extractor.extract_once(text).await {
                    Err(e) if e.is_transient() => {
                        warn!("Transient extraction failure for run {}, retrying: {}", run_id, e);
                        self.extractor.extract_once(text).await
                    }
                    other => other,
                }
            };

            match tokio::time::timeout(self.timeout, attempt).await {
                Ok(result) => result,
                Err(_) => Err(ExtractionError::Timeout(self.timeout)),
            }
        };

        match outcome {
            Ok(extracted) => {
                let tasks = into_descriptors(extracted);
                let kinds: Vec<String> = tasks.iter().map(|t| t.kind.to_string()).collect();
                self.events.record(
                    NewEvent::new(
                        Service::Extraction,
                        EventType::ExtractionCompleted,
                        format!("Extracted {} task(s)", tasks.len()),
                    )
                    .for_run(run_id)
                    .with_data(json!({ "task_count": tasks.len(), "kinds": kinds })),
                );
                Ok(tasks)
            }
            Err(e) => {
                self.events.record(
                    NewEvent::new(
                        Service::Extraction,
                        EventType::ExtractionFailed,
                        format!("Extraction failed: {}", e),
                    )
                    .for_run(run_id)
                    .with_data(json!({ "error_kind": e.kind(), "message": e.to_string() })),
                );
                Err(e)
            }
        }
    }
}

fn into_descriptors(extracted: Vec<ExtractedTask>) -> Vec<TaskDescriptor> {
    extracted
        .into_iter()
        .enumerate()
        .map(|(index, task)| TaskDescriptor {
            id: format!("task-{}", index + 1),
            kind: DeclaredKind::from_label(&task.kind),
            description: task.description,
            parameters: task.parameters,
            sequence_index: index,
        })
        .collect()
}
