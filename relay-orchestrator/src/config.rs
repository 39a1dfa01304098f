//! Orchestrator configuration
//!
//! Defines all configurable parameters of the orchestrator: the HTTP bind
//! address, the extraction backend, the executor registry, run deadlines and
//! the feedback sink.

use relay_core::domain::task::TaskKind;
use std::collections::BTreeMap;
use std::time::Duration;

/// Connection settings for one executor kind
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorConfig {
    /// Base URL; `/execute` and `/health` are appended
    pub base_url: String,

    /// Per-call timeout
    pub timeout: Duration,

    /// Max simultaneous in-flight calls to this kind, shared across runs
    pub max_concurrency: usize,
}

impl ExecutorConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Duration::from_secs(120),
            max_concurrency: 4,
        }
    }
}

/// Chat-completion backend used by the extraction adapter
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionConfig {
    /// Base URL, `/chat/completions` is appended
    pub base_url: String,

    /// Bearer token; omitted from requests when empty
    pub api_key: String,

    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,

    /// Bound on the whole extraction call, retry included
    pub timeout: Duration,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            model: "gpt-4o".to_string(),
            temperature: 0.1,
            max_tokens: 2000,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Ticket system credentials
#[derive(Debug, Clone, PartialEq)]
pub struct JiraConfig {
    pub url: String,
    pub username: String,
    pub api_token: String,
}

/// Orchestrator configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP listen address (e.g., "0.0.0.0:8080")
    pub bind_addr: String,

    pub extraction: ExtractionConfig,

    /// Registered executors; a kind missing here is unregistered
    pub executors: BTreeMap<TaskKind, ExecutorConfig>,

    /// Ceiling on in-flight executor calls across all kinds
    pub global_max_in_flight: usize,

    /// Overall deadline for the dispatch stage of one run
    pub run_deadline: Duration,

    /// Event Recorder retention
    pub event_capacity: usize,

    /// How often executors are health checked
    pub health_check_interval: Duration,

    /// Consecutive missed health checks before a kind is marked unhealthy
    pub health_failure_threshold: u32,

    /// Enables the required-parameter pre-dispatch hook
    pub task_validation: bool,

    /// Bounded feedback delivery queue
    pub feedback_queue_size: usize,

    /// Enables the ticket feedback sink and ticket intake
    pub jira: Option<JiraConfig>,
}

impl Config {
    /// Creates configuration from environment variables
    ///
    /// Every variable is optional and falls back to the defaults:
    /// - ORCHESTRATOR_BIND_ADDR (default: 0.0.0.0:8080)
    /// - EXTRACTION_URL, EXTRACTION_API_KEY, EXTRACTION_MODEL,
    ///   EXTRACTION_TEMPERATURE, EXTRACTION_MAX_TOKENS, EXTRACTION_TIMEOUT (seconds)
    /// - CI_EXECUTOR_URL, HELM_EXECUTOR_URL, DEPLOY_EXECUTOR_URL (empty unregisters)
    /// - <KIND>_EXECUTOR_TIMEOUT (seconds), <KIND>_EXECUTOR_CONCURRENCY
    /// - GLOBAL_MAX_IN_FLIGHT, RUN_DEADLINE (seconds), EVENT_CAPACITY
    /// - HEALTH_CHECK_INTERVAL (seconds), HEALTH_FAILURE_THRESHOLD
    /// - TASK_VALIDATION (true/false), FEEDBACK_QUEUE_SIZE
    /// - JIRA_URL, JIRA_USERNAME, JIRA_API_TOKEN
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();

        let extraction = ExtractionConfig {
            base_url: env_string("EXTRACTION_URL").unwrap_or(defaults.extraction.base_url),
            api_key: env_string("EXTRACTION_API_KEY").unwrap_or_default(),
            model: env_string("EXTRACTION_MODEL").unwrap_or(defaults.extraction.model),
            temperature: env_parse("EXTRACTION_TEMPERATURE")?
                .unwrap_or(defaults.extraction.temperature),
            max_tokens: env_parse("EXTRACTION_MAX_TOKENS")?
                .unwrap_or(defaults.extraction.max_tokens),
            timeout: env_secs("EXTRACTION_TIMEOUT")?.unwrap_or(defaults.extraction.timeout),
        };

        let mut executors = BTreeMap::new();
        for kind in TaskKind::ALL {
            let prefix = env_prefix(kind);
            let base_url = match env_string(&format!("{}_EXECUTOR_URL", prefix)) {
                Some(url) if url.trim().is_empty() => continue,
                Some(url) => url,
                None => match defaults.executors.get(&kind) {
                    Some(exec) => exec.base_url.clone(),
                    None => continue,
                },
            };

            let mut exec = ExecutorConfig::new(base_url);
            if let Some(timeout) = env_secs(&format!("{}_EXECUTOR_TIMEOUT", prefix))? {
                exec.timeout = timeout;
            }
            if let Some(limit) = env_parse(&format!("{}_EXECUTOR_CONCURRENCY", prefix))? {
                exec.max_concurrency = limit;
            }
            executors.insert(kind, exec);
        }

        let jira = match (
            env_string("JIRA_URL"),
            env_string("JIRA_USERNAME"),
            env_string("JIRA_API_TOKEN"),
        ) {
            (Some(url), Some(username), Some(api_token)) if !url.is_empty() => Some(JiraConfig {
                url,
                username,
                api_token,
            }),
            _ => None,
        };

        Ok(Self {
            bind_addr: env_string("ORCHESTRATOR_BIND_ADDR").unwrap_or(defaults.bind_addr),
            extraction,
            executors,
            global_max_in_flight: env_parse("GLOBAL_MAX_IN_FLIGHT")?
                .unwrap_or(defaults.global_max_in_flight),
            run_deadline: env_secs("RUN_DEADLINE")?.unwrap_or(defaults.run_deadline),
            event_capacity: env_parse("EVENT_CAPACITY")?.unwrap_or(defaults.event_capacity),
            health_check_interval: env_secs("HEALTH_CHECK_INTERVAL")?
                .unwrap_or(defaults.health_check_interval),
            health_failure_threshold: env_parse("HEALTH_FAILURE_THRESHOLD")?
                .unwrap_or(defaults.health_failure_threshold),
            task_validation: env_parse("TASK_VALIDATION")?.unwrap_or(defaults.task_validation),
            feedback_queue_size: env_parse("FEEDBACK_QUEUE_SIZE")?
                .unwrap_or(defaults.feedback_queue_size),
            jira,
        })
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.bind_addr.is_empty() {
            anyhow::bail!("bind_addr cannot be empty");
        }

        if !is_http_url(&self.extraction.base_url) {
            anyhow::bail!("extraction url must start with http:// or https://");
        }

        if self.extraction.timeout.is_zero() {
            anyhow::bail!("extraction timeout must be greater than 0");
        }

        for (kind, exec) in &self.executors {
            if !is_http_url(&exec.base_url) {
                anyhow::bail!("{} executor url must start with http:// or https://", kind);
            }
            if exec.timeout.is_zero() {
                anyhow::bail!("{} executor timeout must be greater than 0", kind);
            }
            if exec.max_concurrency == 0 {
                anyhow::bail!("{} executor concurrency must be greater than 0", kind);
            }
        }

        if self.global_max_in_flight == 0 {
            anyhow::bail!("global_max_in_flight must be greater than 0");
        }

        if self.run_deadline.is_zero() {
            anyhow::bail!("run_deadline must be greater than 0");
        }

        if self.event_capacity == 0 {
            anyhow::bail!("event_capacity must be greater than 0");
        }

        if self.health_check_interval.is_zero() {
            anyhow::bail!("health_check_interval must be greater than 0");
        }

        if self.health_failure_threshold == 0 {
            anyhow::bail!("health_failure_threshold must be greater than 0");
        }

        if self.feedback_queue_size == 0 {
            anyhow::bail!("feedback_queue_size must be greater than 0");
        }

        if let Some(jira) = &self.jira {
            if !is_http_url(&jira.url) {
                anyhow::bail!("jira url must start with http:// or https://");
            }
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        let executors = [
            (TaskKind::CiPipeline, "http://localhost:9001"),
            (TaskKind::HelmChart, "http://localhost:9002"),
            (TaskKind::Deploy, "http://localhost:9003"),
        ]
        .into_iter()
        .map(|(kind, url)| (kind, ExecutorConfig::new(url)))
        .collect();

        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            extraction: ExtractionConfig::default(),
            executors,
            global_max_in_flight: 16,
            run_deadline: Duration::from_secs(600),
            event_capacity: 1000,
            health_check_interval: Duration::from_secs(30),
            health_failure_threshold: 2,
            task_validation: false,
            feedback_queue_size: 64,
            jira: None,
        }
    }
}

fn env_prefix(kind: TaskKind) -> &'static str {
    match kind {
        TaskKind::CiPipeline => "CI",
        TaskKind::HelmChart => "HELM",
        TaskKind::Deploy => "DEPLOY",
    }
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn env_parse<T>(name: &str) -> anyhow::Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) if raw.trim().is_empty() => Ok(None),
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("invalid value for {}: {}", name, e)),
        Err(_) => Ok(None),
    }
}

fn env_secs(name: &str) -> anyhow::Result<Option<Duration>> {
    Ok(env_parse::<u64>(name)?.map(Duration::from_secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.bind_addr, "0.0.0.0:8080");
        assert_eq!(config.extraction.model, "gpt-4o");
        assert_eq!(config.extraction.max_tokens, 2000);
        assert_eq!(config.executors.len(), 3);
        assert_eq!(
            config.executors[&TaskKind::HelmChart].base_url,
            "http://localhost:9002"
        );
        assert!(!config.task_validation);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.event_capacity = 0;
        assert!(config.validate().is_err());
        config.event_capacity = 10;

        config.extraction.base_url = "not-a-url".to_string();
        assert!(config.validate().is_err());
        config.extraction.base_url = "http://localhost:7000".to_string();

        if let Some(exec) = config.executors.get_mut(&TaskKind::Deploy) {
            exec.max_concurrency = 0;
        }
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unregistered_kind_is_valid() {
        let mut config = Config::default();
        config.executors.remove(&TaskKind::Deploy);
        assert!(config.validate().is_ok());
    }
}
