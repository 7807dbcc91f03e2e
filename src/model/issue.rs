use serde::{Deserialize, Serialize};

/// Station reported when the backend carries no status for an item.
pub const UNKNOWN_STATION: &str = "Unknown";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    /// Backend-native identifier: the GitHub issue number or a Jira key such as `TEST-123`.
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// Current workflow stage.
    pub station: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// First assignee only, even when the backend allows several.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub author: String,
    pub body: String,
    pub created_at: String,
}
