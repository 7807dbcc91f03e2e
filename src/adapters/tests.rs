use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::runner::CommandRunner;
use super::{create_adapter, create_adapter_with_runner, TicketSystemAdapter};
use crate::config::TicketSystemConfig;
use crate::error::{ChooError, Result};

enum Reply {
    Stdout(String),
    Fail(String),
    FailOnce { stderr: String, spent: AtomicBool },
    Timeout,
}

impl Reply {
    fn is_spent(&self) -> bool {
        matches!(self, Reply::FailOnce { spent, .. } if spent.load(Ordering::SeqCst))
    }
}

/// A runner that replays canned output and records every invocation.
///
/// A reply matches when its pattern tokens appear, in order, among the
/// invocation's program and arguments. The first match wins; unmatched calls
/// succeed with empty output. A `fail_once_on` reply is skipped after it fires.
pub struct MockRunner {
    replies: Vec<(Vec<String>, Reply)>,
    calls: Arc<Mutex<Vec<Vec<String>>>>,
}

impl MockRunner {
    pub fn new() -> Self {
        Self {
            replies: Vec::new(),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn on(self, pattern: &[&str], stdout: &str) -> Self {
        self.reply(pattern, Reply::Stdout(stdout.to_string()))
    }

    pub fn fail_on(self, pattern: &[&str], stderr: &str) -> Self {
        self.reply(pattern, Reply::Fail(stderr.to_string()))
    }

    pub fn fail_once_on(self, pattern: &[&str], stderr: &str) -> Self {
        self.reply(
            pattern,
            Reply::FailOnce {
                stderr: stderr.to_string(),
                spent: AtomicBool::new(false),
            },
        )
    }

    pub fn timeout_on(self, pattern: &[&str]) -> Self {
        self.reply(pattern, Reply::Timeout)
    }

    fn reply(mut self, pattern: &[&str], reply: Reply) -> Self {
        let pattern = pattern.iter().map(|s| s.to_string()).collect();
        self.replies.push((pattern, reply));
        self
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn last_call(&self) -> Vec<String> {
        self.calls().pop().expect("no command was run")
    }

    pub fn count(&self, pattern: &[&str]) -> usize {
        let pattern: Vec<String> = pattern.iter().map(|s| s.to_string()).collect();
        self.calls()
            .iter()
            .filter(|call| matches_pattern(call, &pattern))
            .count()
    }
}

fn matches_pattern(call: &[String], pattern: &[String]) -> bool {
    let mut tokens = call.iter();
    pattern.iter().all(|p| tokens.any(|t| t == p))
}

#[async_trait]
impl CommandRunner for MockRunner {
    async fn run(&self, program: &str, args: &[String]) -> Result<String> {
        let mut call = vec![program.to_string()];
        call.extend(args.iter().cloned());
        self.calls.lock().unwrap().push(call.clone());

        match self
            .replies
            .iter()
            .find(|(pattern, reply)| matches_pattern(&call, pattern) && !reply.is_spent())
        {
            Some((_, Reply::Stdout(out))) => Ok(out.clone()),
            Some((_, Reply::FailOnce { stderr, spent })) => {
                spent.store(true, Ordering::SeqCst);
                Err(ChooError::CommandFailed {
                    program: program.to_string(),
                    stderr: stderr.clone(),
                })
            }
            Some((_, Reply::Fail(stderr))) => Err(ChooError::CommandFailed {
                program: program.to_string(),
                stderr: stderr.clone(),
            }),
            Some((_, Reply::Timeout)) => Err(ChooError::Timeout {
                program: program.to_string(),
                timeout_secs: 30,
                command: call.join(" "),
            }),
            None => Ok(String::new()),
        }
    }
}

fn yaml(src: &str) -> serde_yaml::Value {
    serde_yaml::from_str(src).unwrap()
}

fn github_config(extra: &str) -> TicketSystemConfig {
    TicketSystemConfig::new(
        "github-project-gh",
        yaml(&format!("owner: acme\nrepo: widgets\nproject_number: 7\n{extra}")),
    )
}

fn jira_config(extra: &str) -> TicketSystemConfig {
    TicketSystemConfig::new(
        "jira-acli",
        yaml(&format!("project: TEST\nagent_label: agent-ready\n{extra}")),
    )
}

#[test]
fn pattern_matching_is_an_ordered_subsequence() {
    let call: Vec<String> = ["gh", "issue", "view", "12", "--json", "comments"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let pat = |p: &[&str]| p.iter().map(|s| s.to_string()).collect::<Vec<_>>();
    assert!(matches_pattern(&call, &pat(&["gh", "view", "comments"])));
    assert!(!matches_pattern(&call, &pat(&["gh", "comments", "view"])));
    assert!(!matches_pattern(&call, &pat(&["acli"])));
}

#[test]
fn factory_builds_each_known_backend() {
    let gh = create_adapter(&github_config(""), false).unwrap();
    assert_eq!(gh.name(), "GitHub Projects");

    let jira = create_adapter(&jira_config(""), true).unwrap();
    assert_eq!(jira.name(), "Jira");
}

#[test]
fn factory_rejects_unknown_type() {
    let config = TicketSystemConfig::new("linear-api", yaml("team: core"));
    let err = create_adapter(&config, false).err().unwrap();
    assert!(matches!(err, ChooError::UnknownAdapter(ref t) if t == "linear-api"));
    assert_eq!(err.to_string(), "Unknown adapter type: linear-api");
}

#[test]
fn factory_rejects_missing_required_fields() {
    let config = TicketSystemConfig::new("jira-acli", yaml("project: TEST"));
    let err = create_adapter(&config, false).err().unwrap();
    assert!(matches!(err, ChooError::Config(_)));
    assert!(err.to_string().contains("agent_label"));
}

#[tokio::test]
async fn unrecognized_claim_method_is_a_no_op_for_every_backend() {
    for config in [
        github_config("claim_method: telepathy"),
        jira_config("claim_method: telepathy"),
    ] {
        let runner = Arc::new(MockRunner::new());
        let adapter: Box<dyn TicketSystemAdapter> =
            create_adapter_with_runner(&config, runner.clone()).unwrap();

        adapter.claim_issue("1").await.unwrap();
        adapter.unclaim_issue("1").await.unwrap();
        assert!(runner.calls().is_empty(), "{} ran a command", adapter.name());
    }
}

#[tokio::test]
async fn timeouts_surface_unchanged_through_adapters() {
    let runner = Arc::new(MockRunner::new().timeout_on(&["acli", "search"]));
    let adapter = create_adapter_with_runner(&jira_config(""), runner.clone()).unwrap();

    let err = adapter.list_stations().await.unwrap_err();
    assert!(err.is_timeout());
    assert!(err.to_string().contains("acli jira workitem search"));
}

#[tokio::test]
async fn adapters_are_interchangeable_behind_the_trait() {
    let gh_runner = Arc::new(MockRunner::new().on(
        &["gh", "project", "item-list"],
        r#"{"items":[{"id":"PVTI_1","status":"Todo","content":{"number":3,"title":"A"}}]}"#,
    ));
    let jira_runner = Arc::new(MockRunner::new().on(
        &["acli", "search"],
        r#"[{"key":"TEST-3","fields":{"summary":"A","status":{"name":"Todo"},"labels":["agent-ready"]}}]"#,
    ));

    let adapters: Vec<Box<dyn TicketSystemAdapter>> = vec![
        create_adapter_with_runner(&github_config(""), gh_runner).unwrap(),
        create_adapter_with_runner(&jira_config(""), jira_runner).unwrap(),
    ];

    for adapter in &adapters {
        let issues = adapter.list_issues("Todo").await.unwrap();
        assert_eq!(issues.len(), 1, "{}", adapter.name());
        assert_eq!(issues[0].station, "Todo");
        assert_eq!(issues[0].title, "A");
    }
}
