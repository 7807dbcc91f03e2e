//! Invocation of the external tracker CLIs (`gh`, `acli`).
//!
//! Every call is a single blocking-style round trip: spawn, wait with a ceiling,
//! capture stdout. Failures come back typed so callers can tell a non-zero exit
//! from a hung process.

use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{ChooError, Result};

pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args` and return its stdout.
    async fn run(&self, program: &str, args: &[String]) -> Result<String>;
}

/// Runs commands as real child processes.
pub struct ProcessRunner {
    timeout: Duration,
    verbose: bool,
}

impl ProcessRunner {
    pub fn new(verbose: bool) -> Self {
        Self {
            timeout: DEFAULT_COMMAND_TIMEOUT,
            verbose,
        }
    }

    #[cfg(test)]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, program: &str, args: &[String]) -> Result<String> {
        let command = command_line(program, args);
        if self.verbose {
            info!("$ {command}");
        } else {
            debug!(%command, "running external command");
        }

        let child = tokio::process::Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ChooError::Spawn {
                program: program.to_string(),
                source,
            })?;

        // Dropping the wait future on timeout drops the child, which kills it.
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(ChooError::Timeout {
                    program: program.to_string(),
                    timeout_secs: self.timeout.as_secs(),
                    command,
                })
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            debug!(%command, status = %output.status, "external command failed");
            return Err(ChooError::CommandFailed {
                program: program.to_string(),
                stderr,
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

/// One external binary bound to a runner. Each adapter owns one.
#[derive(Clone)]
pub struct CliInvoker {
    program: &'static str,
    runner: Arc<dyn CommandRunner>,
}

impl CliInvoker {
    pub fn new(program: &'static str, runner: Arc<dyn CommandRunner>) -> Self {
        Self { program, runner }
    }

    pub async fn run(&self, args: &[&str]) -> Result<String> {
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        self.runner.run(self.program, &args).await
    }

    pub async fn run_json(&self, args: &[&str]) -> Result<serde_json::Value> {
        let stdout = self.run(args).await?;
        Ok(serde_json::from_str(&stdout)?)
    }
}

pub fn command_line(program: &str, args: &[String]) -> String {
    std::iter::once(program.to_string())
        .chain(args.iter().map(|a| shell_quote(a)))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Quote an argument for display the way a POSIX shell would accept it.
pub fn shell_quote(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:@,+%".contains(c));
    if plain {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}
