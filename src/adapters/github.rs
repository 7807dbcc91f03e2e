use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::debug;

use super::runner::{CliInvoker, CommandRunner};
use super::{parse_each, TicketSystemAdapter, IN_PROGRESS_LABEL};
use crate::config::{ClaimMethod, GitHubProjectConfig};
use crate::error::{ChooError, Result};
use crate::model::{Comment, Issue, UNKNOWN_STATION};

const LIST_LIMIT: &str = "100";
const STATUS_FIELD: &str = "Status";
const ISSUE_FIELDS: &str = "number,title,body,url,assignees,labels";

/// GitHub Projects V2 through the `gh` CLI.
///
/// Mutations need opaque node IDs (project, Status field, option) while the
/// listing commands speak in names, so the IDs and the project's item listing
/// are resolved lazily and memoized for the lifetime of the adapter. The
/// adapter lives for one command, so the caches are never refreshed.
pub struct GitHubProjectAdapter {
    gh: CliInvoker,
    owner: String,
    repo: String,
    project_number: String,
    claim_method: ClaimMethod,
    project_id: OnceCell<String>,
    status_field: OnceCell<StatusField>,
    items: OnceCell<Vec<ProjectItem>>,
}

struct StatusField {
    id: String,
    options: Vec<StatusOption>,
}

impl StatusField {
    fn option_id(&self, name: &str) -> Option<&str> {
        self.options
            .iter()
            .find(|o| o.name == name)
            .map(|o| o.id.as_str())
    }
}

#[derive(Deserialize)]
struct ProjectList {
    #[serde(default)]
    projects: Vec<ProjectSummary>,
}

#[derive(Deserialize)]
struct ProjectSummary {
    number: u64,
    id: String,
}

#[derive(Deserialize)]
struct FieldList {
    #[serde(default)]
    fields: Vec<FieldEntry>,
}

#[derive(Deserialize)]
struct FieldEntry {
    id: String,
    name: String,
    #[serde(default)]
    options: Vec<StatusOption>,
}

#[derive(Deserialize)]
struct StatusOption {
    id: String,
    name: String,
}

#[derive(Deserialize)]
struct ProjectItem {
    id: String,
    status: Option<String>,
    #[serde(default)]
    assignees: Vec<String>,
    #[serde(default)]
    labels: Vec<String>,
    #[serde(default)]
    content: ItemContent,
}

#[derive(Deserialize, Default)]
struct ItemContent {
    number: Option<u64>,
    title: Option<String>,
    body: Option<String>,
    url: Option<String>,
}

impl ProjectItem {
    fn is_issue(&self, issue_id: &str) -> bool {
        self.content
            .number
            .is_some_and(|n| n.to_string() == issue_id)
    }

    fn station(&self) -> &str {
        self.status
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(UNKNOWN_STATION)
    }

    fn to_issue(&self) -> Issue {
        Issue {
            id: self
                .content
                .number
                .map(|n| n.to_string())
                .unwrap_or_default(),
            title: self.content.title.clone().unwrap_or_default(),
            body: self.content.body.clone(),
            station: self.station().to_string(),
            url: self.content.url.clone(),
            assignee: self.assignees.first().cloned(),
            labels: self.labels.clone(),
        }
    }
}

#[derive(Deserialize)]
struct IssueView {
    number: Option<u64>,
    title: Option<String>,
    body: Option<String>,
    url: Option<String>,
    #[serde(default)]
    assignees: Vec<GhUser>,
    #[serde(default)]
    labels: Vec<GhLabel>,
}

#[derive(Deserialize)]
struct GhUser {
    login: Option<String>,
}

#[derive(Deserialize)]
struct GhLabel {
    name: String,
}

#[derive(Deserialize)]
struct GhComment {
    author: Option<GhUser>,
    body: Option<String>,
    #[serde(rename = "createdAt")]
    created_at: Option<String>,
}

/// `gh issue view` reports a missing issue only through this GraphQL phrase.
fn is_unresolved_issue_message(message: &str) -> bool {
    message.contains("Could not resolve to an Issue")
}

fn take_array(value: Value, key: &str) -> Vec<Value> {
    match value {
        Value::Object(mut map) => match map.remove(key) {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

impl GitHubProjectAdapter {
    pub fn new(config: GitHubProjectConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            gh: CliInvoker::new("gh", runner),
            owner: config.owner,
            repo: config.repo,
            project_number: config.project_number.to_string(),
            claim_method: config.claim_method,
            project_id: OnceCell::new(),
            status_field: OnceCell::new(),
            items: OnceCell::new(),
        }
    }

    fn repo_slug(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }

    async fn project_id(&self) -> Result<&str> {
        let id = self
            .project_id
            .get_or_try_init(|| async {
                let data = self
                    .gh
                    .run_json(&[
                        "project",
                        "list",
                        "--owner",
                        &self.owner,
                        "--format",
                        "json",
                        "--limit",
                        LIST_LIMIT,
                    ])
                    .await?;
                let list: ProjectList = serde_json::from_value(data)?;
                list.projects
                    .into_iter()
                    .find(|p| p.number.to_string() == self.project_number)
                    .map(|p| p.id)
                    .ok_or_else(|| {
                        ChooError::Backend(format!(
                            "Project {} not found for owner {}",
                            self.project_number, self.owner
                        ))
                    })
            })
            .await?;
        Ok(id)
    }

    async fn status_field(&self) -> Result<&StatusField> {
        self.status_field
            .get_or_try_init(|| async {
                let data = self
                    .gh
                    .run_json(&[
                        "project",
                        "field-list",
                        &self.project_number,
                        "--owner",
                        &self.owner,
                        "--format",
                        "json",
                    ])
                    .await?;
                let list: FieldList = serde_json::from_value(data)?;
                list.fields
                    .into_iter()
                    .find(|f| f.name == STATUS_FIELD)
                    .map(|f| StatusField {
                        id: f.id,
                        options: f.options,
                    })
                    .ok_or_else(|| ChooError::Backend("Status field not found in project".into()))
            })
            .await
    }

    /// The project's items, fetched once and shared by every operation.
    async fn items(&self) -> Result<&[ProjectItem]> {
        let items = self
            .items
            .get_or_try_init(|| async {
                let data = self
                    .gh
                    .run_json(&[
                        "project",
                        "item-list",
                        &self.project_number,
                        "--owner",
                        &self.owner,
                        "--format",
                        "json",
                        "--limit",
                        LIST_LIMIT,
                    ])
                    .await?;
                let (items, _) = parse_each(take_array(data, "items"), "project item");
                Ok::<_, ChooError>(items)
            })
            .await?;
        Ok(items)
    }

    async fn edit_claim(&self, issue_id: &str, claim: bool) -> Result<()> {
        let (flag, value) = match (&self.claim_method, claim) {
            (ClaimMethod::Assignee, true) => ("--add-assignee", "@me"),
            (ClaimMethod::Assignee, false) => ("--remove-assignee", "@me"),
            (ClaimMethod::Label, true) => ("--add-label", IN_PROGRESS_LABEL),
            (ClaimMethod::Label, false) => ("--remove-label", IN_PROGRESS_LABEL),
            (ClaimMethod::Unrecognized(_), _) => {
                debug!(
                    method = self.claim_method.as_str(),
                    issue_id, "unrecognized claim method, nothing to do"
                );
                return Ok(());
            }
        };

        let repo = self.repo_slug();
        self.gh
            .run(&["issue", "edit", issue_id, "--repo", &repo, flag, value])
            .await?;
        Ok(())
    }
}

#[async_trait]
impl TicketSystemAdapter for GitHubProjectAdapter {
    fn name(&self) -> &str {
        "GitHub Projects"
    }

    async fn list_stations(&self) -> Result<Vec<String>> {
        let stations: BTreeSet<String> = self
            .items()
            .await?
            .iter()
            .filter_map(|item| item.status.clone())
            .filter(|s| !s.is_empty())
            .collect();
        Ok(stations.into_iter().collect())
    }

    async fn list_issues(&self, station: &str) -> Result<Vec<Issue>> {
        Ok(self
            .items()
            .await?
            .iter()
            .filter(|item| item.station() == station)
            .map(ProjectItem::to_issue)
            .collect())
    }

    async fn get_issue(&self, issue_id: &str) -> Result<Issue> {
        let repo = self.repo_slug();
        let data = match self
            .gh
            .run_json(&["issue", "view", issue_id, "--repo", &repo, "--json", ISSUE_FIELDS])
            .await
        {
            Ok(data) => data,
            Err(ChooError::CommandFailed { stderr, .. })
                if is_unresolved_issue_message(&stderr) =>
            {
                return Err(ChooError::IssueNotFound(issue_id.to_string()));
            }
            Err(e) => return Err(e),
        };
        let view: IssueView = serde_json::from_value(data)?;

        // Per-item Status is only exposed through the project listing.
        let station = self
            .items()
            .await?
            .iter()
            .find(|item| item.is_issue(issue_id))
            .map(|item| item.station().to_string())
            .unwrap_or_else(|| UNKNOWN_STATION.to_string());

        Ok(Issue {
            id: view
                .number
                .map(|n| n.to_string())
                .unwrap_or_else(|| issue_id.to_string()),
            title: view.title.unwrap_or_default(),
            body: view.body,
            station,
            url: view.url,
            assignee: view.assignees.into_iter().find_map(|a| a.login),
            labels: view.labels.into_iter().map(|l| l.name).collect(),
        })
    }

    async fn claim_issue(&self, issue_id: &str) -> Result<()> {
        self.edit_claim(issue_id, true).await
    }

    async fn unclaim_issue(&self, issue_id: &str) -> Result<()> {
        self.edit_claim(issue_id, false).await
    }

    async fn move_issue(&self, issue_id: &str, to_station: &str) -> Result<()> {
        let item_id = self
            .items()
            .await?
            .iter()
            .find(|item| item.is_issue(issue_id))
            .map(|item| item.id.clone())
            .ok_or_else(|| ChooError::Backend(format!("Issue {issue_id} not found in project")))?;

        let field = self.status_field().await?;
        let option_id = field
            .option_id(to_station)
            .ok_or_else(|| ChooError::InvalidStation {
                station: to_station.to_string(),
                available: field.options.iter().map(|o| o.name.clone()).collect(),
            })?;

        let project_id = self.project_id().await?;
        self.gh
            .run(&[
                "project",
                "item-edit",
                "--id",
                &item_id,
                "--project-id",
                project_id,
                "--field-id",
                &field.id,
                "--single-select-option-id",
                option_id,
            ])
            .await?;
        Ok(())
    }

    async fn get_comments(&self, issue_id: &str) -> Result<Vec<Comment>> {
        let repo = self.repo_slug();
        let data = self
            .gh
            .run_json(&["issue", "view", issue_id, "--repo", &repo, "--json", "comments"])
            .await?;
        let (comments, _) = parse_each::<GhComment, _>(take_array(data, "comments"), "comment");

        Ok(comments
            .into_iter()
            .map(|c| Comment {
                author: c
                    .author
                    .and_then(|a| a.login)
                    .unwrap_or_else(|| "unknown".to_string()),
                body: c.body.unwrap_or_default(),
                created_at: c.created_at.unwrap_or_default(),
            })
            .collect())
    }

    async fn add_comment(&self, issue_id: &str, message: &str) -> Result<()> {
        let repo = self.repo_slug();
        self.gh
            .run(&["issue", "comment", issue_id, "--repo", &repo, "--body", message])
            .await?;
        Ok(())
    }
}
