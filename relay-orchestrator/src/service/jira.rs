//! Ticket system client
//!
//! Minimal Jira REST v2 client: read an issue description, post a comment,
//! apply a named transition. Authenticates with basic auth.

use reqwest::Response;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::config::JiraConfig;
use crate::service::feedback::FeedbackError;

#[derive(Debug, Deserialize)]
struct IssueBody {
    fields: IssueFields,
}

#[derive(Debug, Deserialize)]
struct IssueFields {
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TransitionList {
    transitions: Vec<Transition>,
}

#[derive(Debug, Deserialize)]
struct Transition {
    id: String,
    name: String,
}

/// Jira REST client
#[derive(Clone)]
pub struct JiraClient {
    client: reqwest::Client,
    config: JiraConfig,
}

impl JiraClient {
    pub fn new(config: JiraConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn issue_url(&self, key: &str, suffix: &str) -> String {
        format!(
            "{}/rest/api/2/issue/{}{}",
            self.config.url.trim_end_matches('/'),
            key,
            suffix
        )
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        self.client
            .get(url)
            .basic_auth(&self.config.username, Some(&self.config.api_token))
    }

    fn post(&self, url: &str) -> reqwest::RequestBuilder {
        self.client
            .post(url)
            .basic_auth(&self.config.username, Some(&self.config.api_token))
    }

    /// Description text of an issue
    pub async fn issue_description(&self, key: &str) -> Result<String, FeedbackError> {
        let url = self.issue_url(key, "?fields=description");
        let response = self.get(&url).send().await?;
        let issue: IssueBody = check(response).await?.json().await?;

        issue
            .fields
            .description
            .filter(|d| !d.trim().is_empty())
            .ok_or_else(|| FeedbackError::NoDescription(key.to_string()))
    }

    /// Post a plain-text comment
    pub async fn add_comment(&self, key: &str, body: &str) -> Result<(), FeedbackError> {
        debug!("Commenting on {}", key);
        let url = self.issue_url(key, "/comment");
        let response = self.post(&url).json(&json!({ "body": body })).send().await?;
        check(response).await?;
        Ok(())
    }

    /// Apply the transition whose name matches `name`, case-insensitively
    pub async fn transition(&self, key: &str, name: &str) -> Result<(), FeedbackError> {
        let url = self.issue_url(key, "/transitions");
        let response = self.get(&url).send().await?;
        let list: TransitionList = check(response).await?.json().await?;

        let transition = list
            .transitions
            .into_iter()
            .find(|t| t.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| FeedbackError::MissingTransition(name.to_string()))?;

        debug!("Moving {} to {} (transition {})", key, name, transition.id);
        let response = self
            .post(&url)
            .json(&json!({ "transition": { "id": transition.id } }))
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }
}

async fn check(response: Response) -> Result<Response, FeedbackError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(FeedbackError::Http {
        status: status.as_u16(),
        body,
    })
}
