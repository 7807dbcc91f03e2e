use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

use super::{spawn_agent, AgentAdapter};
use crate::error::Result;

pub const DEFAULT_BINARY: &str = "copilot";

/// GitHub Copilot CLI. The prompt goes in as the `-p` message, and
/// `--allow-all-tools` is required when nobody is there to approve tool calls.
pub struct CopilotAdapter {
    binary: String,
    verbose: bool,
}

impl CopilotAdapter {
    pub fn new(verbose: bool) -> Self {
        Self::with_binary(DEFAULT_BINARY, verbose)
    }

    pub fn with_binary(binary: impl Into<String>, verbose: bool) -> Self {
        Self {
            binary: binary.into(),
            verbose,
        }
    }
}

#[async_trait]
impl AgentAdapter for CopilotAdapter {
    fn name(&self) -> &str {
        "copilot"
    }

    fn argv(&self, system_prompt: &str) -> Vec<String> {
        vec![
            self.binary.clone(),
            "-p".to_string(),
            system_prompt.to_string(),
            "--allow-all-tools".to_string(),
        ]
    }

    async fn run(
        &self,
        system_prompt: &str,
        working_dir: &Path,
        env: &BTreeMap<String, String>,
    ) -> Result<i32> {
        if self.verbose {
            info!(chars = system_prompt.chars().count(), "system prompt length");
        }
        spawn_agent(&self.argv(system_prompt), working_dir, env, self.verbose).await
    }
}
