//! Ticket webhook DTOs

use serde::{Deserialize, Serialize};

/// Team label a ticket must carry to be accepted
pub const DEVOPS_TEAM: &str = "devops";

/// Incoming ticket webhook payload
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JiraWebhook {
    #[serde(default)]
    pub issue: Option<JiraIssue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JiraIssue {
    pub key: String,
    #[serde(default)]
    pub fields: Option<JiraFields>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JiraFields {
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub team: Option<String>,
    #[serde(default)]
    pub customfield_team: Option<String>,
}

/// A validated ticket ready for submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketRequest {
    pub key: String,
    pub description: String,
}

impl JiraWebhook {
    /// Check the payload and extract the ticket to submit
    pub fn validate(&self) -> Result<TicketRequest, String> {
        let issue = self.issue.as_ref().ok_or("payload has no issue")?;
        let fields = issue.fields.as_ref().ok_or("issue has no fields")?;

        let team = fields
            .customfield_team
            .as_deref()
            .filter(|t| !t.is_empty())
            .or(fields.team.as_deref())
            .ok_or("issue has no team")?;
        if !team.eq_ignore_ascii_case(DEVOPS_TEAM) {
            return Err(format!("issue belongs to team '{}', not devops", team));
        }

        let description = fields
            .description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .ok_or("issue has no description")?;

        Ok(TicketRequest {
            key: issue.key.clone(),
            description: description.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn webhook(fields: serde_json::Value) -> JiraWebhook {
        serde_json::from_value(json!({"issue": {"key": "OPS-7", "fields": fields}})).unwrap()
    }

    #[test]
    fn test_accepts_devops_ticket() {
        let hook = webhook(json!({"team": "DevOps", "description": "Set up CI for repo R"}));
        let ticket = hook.validate().unwrap();
        assert_eq!(ticket.key, "OPS-7");
        assert_eq!(ticket.description, "Set up CI for repo R");
    }

    #[test]
    fn test_custom_team_field_wins() {
        let hook = webhook(json!({
            "team": "devops",
            "customfield_team": "frontend",
            "description": "x"
        }));
        assert!(hook.validate().is_err());
    }

    #[test]
    fn test_rejects_missing_parts() {
        assert!(JiraWebhook::default().validate().is_err());
        assert!(webhook(json!({"team": "devops"})).validate().is_err());
        assert!(webhook(json!({"description": "x"})).validate().is_err());
    }
}
