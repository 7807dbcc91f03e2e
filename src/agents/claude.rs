use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::Path;

use super::{spawn_agent, AgentAdapter};
use crate::error::Result;

pub const KICKOFF_MESSAGE: &str = "Start working on the next available issue.";

/// Claude Code in non-interactive mode, with the train prompt appended to its
/// own system prompt.
pub struct ClaudeAdapter {
    verbose: bool,
}

impl ClaudeAdapter {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

#[async_trait]
impl AgentAdapter for ClaudeAdapter {
    fn name(&self) -> &str {
        "claude"
    }

    fn argv(&self, system_prompt: &str) -> Vec<String> {
        [
            "claude",
            "--append-system-prompt",
            system_prompt,
            "--allow-dangerously-skip-permissions",
            "--dangerously-skip-permissions",
            "--print",
            KICKOFF_MESSAGE,
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    async fn run(
        &self,
        system_prompt: &str,
        working_dir: &Path,
        env: &BTreeMap<String, String>,
    ) -> Result<i32> {
        spawn_agent(&self.argv(system_prompt), working_dir, env, self.verbose).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_is_appended_and_kickoff_printed() {
        let argv = ClaudeAdapter::new(false).argv("You are a dev agent.\n\nShip it.");
        assert_eq!(
            argv,
            vec![
                "claude",
                "--append-system-prompt",
                "You are a dev agent.\n\nShip it.",
                "--allow-dangerously-skip-permissions",
                "--dangerously-skip-permissions",
                "--print",
                "Start working on the next available issue.",
            ]
        );
    }
}
