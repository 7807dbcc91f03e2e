//! Agent CLIs that `choo run` hands a train's prompt to.
//!
//! An agent runs in the foreground with inherited stdio until it exits. It
//! talks back to the tracker through `choo work`, using the `CHOO_*`
//! variables it was started with.

pub mod claude;
pub mod copilot;

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

use crate::adapters::runner::{command_line, shell_quote};
use crate::error::{ChooError, Result};

pub use claude::ClaudeAdapter;
pub use copilot::CopilotAdapter;

#[async_trait]
pub trait AgentAdapter: Send + Sync {
    fn name(&self) -> &str;

    /// The full argv, binary first.
    fn argv(&self, system_prompt: &str) -> Vec<String>;

    /// Run the agent to completion and return its exit code.
    ///
    /// `env` is layered over the current process environment.
    async fn run(
        &self,
        system_prompt: &str,
        working_dir: &Path,
        env: &BTreeMap<String, String>,
    ) -> Result<i32>;
}

pub fn create_agent_adapter(cli: &str, verbose: bool) -> Result<Box<dyn AgentAdapter>> {
    match cli {
        "claude" => Ok(Box::new(ClaudeAdapter::new(verbose))),
        "copilot" => Ok(Box::new(CopilotAdapter::new(verbose))),
        other => Err(ChooError::UnsupportedAgent(other.to_string())),
    }
}

fn log_invocation(argv: &[String], working_dir: &Path, env: &BTreeMap<String, String>) {
    let env_display = env
        .iter()
        .map(|(k, v)| format!("{k}={}", shell_quote(v)))
        .collect::<Vec<_>>()
        .join(" ");
    let (program, args) = argv.split_first().map_or(("", &[][..]), |(p, a)| (p.as_str(), a));
    info!(working_dir = %working_dir.display(), "working directory");
    info!(env = %env_display, "environment");
    info!(command = %command_line(program, args), "running agent");
}

/// Spawn `argv` in the foreground and wait for it.
///
/// A process killed by a signal has no exit code and is reported as -1.
pub(crate) async fn spawn_agent(
    argv: &[String],
    working_dir: &Path,
    env: &BTreeMap<String, String>,
    verbose: bool,
) -> Result<i32> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| ChooError::Backend("agent command is empty".into()))?;

    if verbose {
        log_invocation(argv, working_dir, env);
    }

    let status = tokio::process::Command::new(program)
        .args(args)
        .current_dir(working_dir)
        .envs(env)
        .status()
        .await
        .map_err(|source| ChooError::Spawn {
            program: program.clone(),
            source,
        })?;

    Ok(status.code().unwrap_or(-1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(strs: &[&str]) -> Vec<String> {
        strs.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn factory_knows_claude_and_copilot() {
        assert_eq!(create_agent_adapter("claude", false).unwrap().name(), "claude");
        assert_eq!(create_agent_adapter("copilot", true).unwrap().name(), "copilot");
    }

    #[test]
    fn factory_rejects_other_clis() {
        let err = create_agent_adapter("opencode", false).err().unwrap();
        assert!(matches!(err, ChooError::UnsupportedAgent(ref cli) if cli == "opencode"));
        assert_eq!(
            err.to_string(),
            "Unsupported agent CLI: opencode. Currently supported: claude, copilot"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn exit_code_is_returned() {
        let dir = tempfile::tempdir().unwrap();
        let code = spawn_agent(&argv(&["sh", "-c", "exit 3"]), dir.path(), &BTreeMap::new(), false)
            .await
            .unwrap();
        assert_eq!(code, 3);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn runs_in_working_dir_with_extra_env() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker"), "").unwrap();
        let env = BTreeMap::from([
            ("CHOO_TRAIN".to_string(), "dev".to_string()),
            ("CHOO_TO_STATION".to_string(), "In Review".to_string()),
        ]);

        let script = r#"test -f marker && test "$CHOO_TRAIN" = dev && test "$CHOO_TO_STATION" = "In Review" && test -n "$PATH""#;
        let code = spawn_agent(&argv(&["sh", "-c", script]), dir.path(), &env, true)
            .await
            .unwrap();
        assert_eq!(code, 0);
    }

    #[tokio::test]
    async fn missing_agent_binary_is_a_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = spawn_agent(
            &argv(&["choo-no-such-agent"]),
            dir.path(),
            &BTreeMap::new(),
            false,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ChooError::Spawn { .. }));
    }

    #[tokio::test]
    async fn empty_argv_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(spawn_agent(&[], dir.path(), &BTreeMap::new(), false)
            .await
            .is_err());
    }
}
