//! Ticket system adapters.
//!
//! One `TicketSystemAdapter` is built per invocation from the configured
//! ticket system. Both variants drive an installed vendor CLI (`gh`, `acli`)
//! and normalize its output into [`Issue`] values.

pub mod github;
pub mod jira;
pub mod runner;

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::{TicketSystemConfig, GITHUB_PROJECT_TYPE, JIRA_ACLI_TYPE};
use crate::error::{ChooError, Result};
use crate::model::{Comment, Issue};

use github::GitHubProjectAdapter;
use jira::JiraAcliAdapter;
use runner::{CommandRunner, ProcessRunner};

/// Label used by the `label` claim method.
pub const IN_PROGRESS_LABEL: &str = "in-progress";

#[async_trait]
pub trait TicketSystemAdapter: Send + Sync {
    fn name(&self) -> &str;

    /// Station names known to the backend, sorted and de-duplicated.
    async fn list_stations(&self) -> Result<Vec<String>>;

    /// Issues at `station`. Items the backend returns in an unexpected shape are skipped.
    async fn list_issues(&self, station: &str) -> Result<Vec<Issue>>;

    async fn get_issue(&self, issue_id: &str) -> Result<Issue>;

    /// Mark the issue as being worked on. A no-op for unrecognized claim methods.
    async fn claim_issue(&self, issue_id: &str) -> Result<()>;

    async fn unclaim_issue(&self, issue_id: &str) -> Result<()>;

    async fn move_issue(&self, issue_id: &str, to_station: &str) -> Result<()>;

    /// Comments oldest first, in the order the backend reports them.
    async fn get_comments(&self, issue_id: &str) -> Result<Vec<Comment>>;

    async fn add_comment(&self, issue_id: &str, message: &str) -> Result<()>;
}

#[cfg(test)]
pub mod tests;

pub fn create_adapter(
    config: &TicketSystemConfig,
    verbose: bool,
) -> Result<Box<dyn TicketSystemAdapter>> {
    create_adapter_with_runner(config, Arc::new(ProcessRunner::new(verbose)))
}

pub fn create_adapter_with_runner(
    config: &TicketSystemConfig,
    runner: Arc<dyn CommandRunner>,
) -> Result<Box<dyn TicketSystemAdapter>> {
    match config.kind.as_str() {
        GITHUB_PROJECT_TYPE => Ok(Box::new(GitHubProjectAdapter::new(
            config.github_config()?,
            runner,
        ))),
        JIRA_ACLI_TYPE => Ok(Box::new(JiraAcliAdapter::new(config.jira_config()?, runner))),
        other => Err(ChooError::UnknownAdapter(other.to_string())),
    }
}

/// Parse a JSON array of items one by one, skipping the ones that don't fit `T`.
///
/// Returns the parsed items and how many were discarded.
pub(crate) fn parse_each<T, I>(items: I, what: &str) -> (Vec<T>, usize)
where
    T: serde::de::DeserializeOwned,
    I: IntoIterator<Item = serde_json::Value>,
{
    let mut parsed = Vec::new();
    let mut skipped = 0;
    for item in items {
        match serde_json::from_value::<T>(item) {
            Ok(value) => parsed.push(value),
            Err(e) => {
                skipped += 1;
                tracing::debug!(error = %e, "skipping unparseable {what}");
            }
        }
    }
    if skipped > 0 {
        tracing::warn!(skipped, "skipped {skipped} unparseable {what}(s)");
    }
    (parsed, skipped)
}
