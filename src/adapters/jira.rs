use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::debug;

use super::runner::{CliInvoker, CommandRunner};
use super::{parse_each, TicketSystemAdapter, IN_PROGRESS_LABEL};
use crate::config::{ClaimMethod, JiraAcliConfig};
use crate::error::{ChooError, Result};
use crate::model::{Comment, Issue, UNKNOWN_STATION};
use crate::util::adf::extract_text_from_adf;

const ITEM_FIELDS: &str = "key,summary,description,status,assignee,labels";
const STATION_QUERY_LIMIT: &str = "100";

/// Jira through the Atlassian `acli` CLI.
///
/// JQL does both discovery and filtering. `status_mapping` translates the
/// workflow's logical station names into Jira status names on the way in,
/// and back again when reporting an issue's station.
pub struct JiraAcliAdapter {
    acli: CliInvoker,
    project: String,
    agent_label: String,
    claim_method: ClaimMethod,
    status_mapping: BTreeMap<String, String>,
    stations: OnceCell<Vec<String>>,
}

#[derive(Deserialize)]
struct WorkItem {
    key: Option<String>,
    #[serde(rename = "self")]
    self_url: Option<String>,
    #[serde(default)]
    fields: WorkItemFields,
}

#[derive(Deserialize, Default)]
struct WorkItemFields {
    summary: Option<String>,
    description: Option<Value>,
    status: Option<StatusField>,
    assignee: Option<JiraUser>,
    #[serde(default)]
    labels: Vec<String>,
}

#[derive(Deserialize)]
struct StatusField {
    name: Option<String>,
}

#[derive(Deserialize)]
struct JiraUser {
    #[serde(rename = "displayName")]
    display_name: Option<String>,
    #[serde(rename = "emailAddress")]
    email_address: Option<String>,
}

impl JiraUser {
    /// Display name, else email. Either may be absent depending on the account type.
    fn into_name(self) -> Option<String> {
        self.display_name
            .filter(|n| !n.is_empty())
            .or(self.email_address.filter(|e| !e.is_empty()))
    }
}

#[derive(Deserialize)]
struct JiraComment {
    author: Option<JiraUser>,
    body: Option<Value>,
    created: Option<String>,
}

impl WorkItem {
    fn status(&self) -> Option<&str> {
        self.fields
            .status
            .as_ref()
            .and_then(|s| s.name.as_deref())
            .filter(|s| !s.is_empty())
    }

    fn into_issue(self, fallback_id: &str, station: String) -> Issue {
        Issue {
            id: self.key.unwrap_or_else(|| fallback_id.to_string()),
            title: self.fields.summary.unwrap_or_default(),
            body: self.fields.description.as_ref().and_then(extract_text_from_adf),
            station,
            url: self.self_url,
            assignee: self.fields.assignee.and_then(JiraUser::into_name),
            labels: self.fields.labels,
        }
    }
}

/// Whether an `acli` failure means the work item does not exist.
///
/// `acli` has no structured error codes, so this matches on its wording.
fn is_not_found_message(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("not found") || message.contains("does not exist")
}

fn same_status(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

fn jql_string(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

/// `acli` search results come back as a bare top-level array.
fn search_results(data: Value) -> Vec<Value> {
    match data {
        Value::Array(items) => items,
        _ => Vec::new(),
    }
}

impl JiraAcliAdapter {
    pub fn new(config: JiraAcliConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            acli: CliInvoker::new("acli", runner),
            project: config.project,
            agent_label: config.agent_label,
            claim_method: config.claim_method,
            status_mapping: config.status_mapping,
            stations: OnceCell::new(),
        }
    }

    fn backend_status<'a>(&'a self, station: &'a str) -> &'a str {
        self.status_mapping
            .get(station)
            .map(String::as_str)
            .unwrap_or(station)
    }

    /// Logical station for a work item with the given Jira status.
    ///
    /// A station the caller asked for is kept when it maps to the item's
    /// status or the item reports none. Otherwise the status is inverse-mapped,
    /// the first mapped name winning when several share it. Jira compares
    /// status names case-insensitively, and so does this.
    fn resolve_station(&self, status: Option<&str>, requested: Option<&str>) -> String {
        if let Some(requested) = requested {
            let target = self.backend_status(requested);
            if status.map_or(true, |s| same_status(s, target)) {
                return requested.to_string();
            }
        }
        match status {
            Some(status) => self
                .status_mapping
                .iter()
                .find(|(_, mapped)| same_status(mapped, status))
                .map(|(station, _)| station.clone())
                .unwrap_or_else(|| status.to_string()),
            None => UNKNOWN_STATION.to_string(),
        }
    }

    /// JQL for agent-ready, unclaimed work at a station.
    fn ready_work_jql(&self, station: &str) -> String {
        let mut jql = format!(
            "project = {} AND status = {} AND labels = {}",
            self.project,
            jql_string(self.backend_status(station)),
            jql_string(&self.agent_label)
        );
        match &self.claim_method {
            ClaimMethod::Assignee => jql.push_str(" AND assignee is EMPTY"),
            ClaimMethod::Label => {
                jql.push_str(&format!(" AND labels not in ({})", jql_string(IN_PROGRESS_LABEL)))
            }
            ClaimMethod::Unrecognized(_) => {}
        }
        jql
    }

    async fn edit_claim(&self, issue_id: &str, claim: bool) -> Result<()> {
        let args: &[&str] = match (&self.claim_method, claim) {
            (ClaimMethod::Assignee, true) => &["--assignee", "@me"],
            (ClaimMethod::Assignee, false) => &["--remove-assignee"],
            (ClaimMethod::Label, true) => &["--add-label", IN_PROGRESS_LABEL],
            (ClaimMethod::Label, false) => &["--remove-label", IN_PROGRESS_LABEL],
            (ClaimMethod::Unrecognized(_), _) => {
                debug!(
                    method = self.claim_method.as_str(),
                    issue_id, "unrecognized claim method, nothing to do"
                );
                return Ok(());
            }
        };
        let subcommand = match self.claim_method {
            ClaimMethod::Assignee => "assign",
            _ => "edit",
        };

        let mut cmd = vec!["jira", "workitem", subcommand, "--key", issue_id];
        cmd.extend_from_slice(args);
        self.acli.run(&cmd).await?;
        Ok(())
    }
}

#[async_trait]
impl TicketSystemAdapter for JiraAcliAdapter {
    fn name(&self) -> &str {
        "Jira"
    }

    async fn list_stations(&self) -> Result<Vec<String>> {
        let stations = self
            .stations
            .get_or_try_init(|| async {
                let jql = format!("project = {}", self.project);
                let data = self
                    .acli
                    .run_json(&[
                        "jira",
                        "workitem",
                        "search",
                        "--jql",
                        &jql,
                        "--fields",
                        "status",
                        "--limit",
                        STATION_QUERY_LIMIT,
                        "--json",
                    ])
                    .await?;
                let (items, _) = parse_each::<WorkItem, _>(search_results(data), "work item");
                let unique: BTreeSet<String> = items
                    .iter()
                    .filter_map(|item| item.status().map(str::to_string))
                    .collect();
                Ok::<_, ChooError>(unique.into_iter().collect::<Vec<_>>())
            })
            .await?;
        Ok(stations.clone())
    }

    async fn list_issues(&self, station: &str) -> Result<Vec<Issue>> {
        let jql = self.ready_work_jql(station);
        let data = self
            .acli
            .run_json(&[
                "jira",
                "workitem",
                "search",
                "--jql",
                &jql,
                "--fields",
                ITEM_FIELDS,
                "--json",
            ])
            .await?;

        let (items, _) = parse_each::<WorkItem, _>(search_results(data), "work item");
        Ok(items
            .into_iter()
            .map(|item| {
                let resolved = self.resolve_station(item.status(), Some(station));
                item.into_issue("", resolved)
            })
            .collect())
    }

    async fn get_issue(&self, issue_id: &str) -> Result<Issue> {
        let data = match self
            .acli
            .run_json(&[
                "jira",
                "workitem",
                "view",
                issue_id,
                "--fields",
                ITEM_FIELDS,
                "--json",
            ])
            .await
        {
            Ok(data) => data,
            Err(ChooError::CommandFailed { stderr, .. }) if is_not_found_message(&stderr) => {
                return Err(ChooError::IssueNotFound(issue_id.to_string()));
            }
            Err(e) => return Err(e),
        };

        let item: WorkItem = serde_json::from_value(data)?;
        let station = self.resolve_station(item.status(), None);
        Ok(item.into_issue(issue_id, station))
    }

    async fn claim_issue(&self, issue_id: &str) -> Result<()> {
        self.edit_claim(issue_id, true).await
    }

    async fn unclaim_issue(&self, issue_id: &str) -> Result<()> {
        self.edit_claim(issue_id, false).await
    }

    async fn move_issue(&self, issue_id: &str, to_station: &str) -> Result<()> {
        let status = self.backend_status(to_station);
        self.acli
            .run(&[
                "jira",
                "workitem",
                "transition",
                "--key",
                issue_id,
                "--status",
                status,
                "--yes",
            ])
            .await?;
        Ok(())
    }

    async fn get_comments(&self, issue_id: &str) -> Result<Vec<Comment>> {
        let data = self
            .acli
            .run_json(&["jira", "workitem", "comment", "list", issue_id, "--json"])
            .await?;
        let raw = match data {
            Value::Object(mut map) => search_results(map.remove("comments").unwrap_or_default()),
            other => search_results(other),
        };
        let (comments, _) = parse_each::<JiraComment, _>(raw, "comment");

        Ok(comments
            .into_iter()
            .map(|c| Comment {
                author: c
                    .author
                    .and_then(JiraUser::into_name)
                    .unwrap_or_else(|| "unknown".to_string()),
                body: c
                    .body
                    .as_ref()
                    .and_then(extract_text_from_adf)
                    .unwrap_or_default(),
                created_at: c.created.unwrap_or_default(),
            })
            .collect())
    }

    async fn add_comment(&self, issue_id: &str, message: &str) -> Result<()> {
        self.acli
            .run(&[
                "jira",
                "workitem",
                "comment",
                "create",
                "--key",
                issue_id,
                "--body",
                message,
            ])
            .await?;
        Ok(())
    }
}
