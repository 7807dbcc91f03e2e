use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, FixedOffset, Utc};
use clap::{Args, Parser, Subcommand};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::adapters::{self, TicketSystemAdapter};
use crate::agents::create_agent_adapter;
use crate::config::{config_path, ChooConfig, TrainConfig, DEFAULT_CHOO_DIR};
use crate::model::{Comment, Issue};
use crate::prompts::{self, load_combined_prompt, PROMPTS_DIR};

/// Choo - run AI agents through your ticket workflow, one train at a time.
#[derive(Parser, Debug)]
#[command(name = "choo")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Directory holding config.yml and the prompts
    #[arg(long, global = true, env = "CHOO_DIR", default_value = DEFAULT_CHOO_DIR)]
    pub choo_dir: PathBuf,

    /// Log external commands and agent invocations to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a starter .choo directory
    Init,

    /// List the stations the ticket system knows about
    Stations,

    /// Start the agent for one train, or for every train in order
    Run {
        /// Train name (default: all trains)
        train: Option<String>,
    },

    /// Commands agents use to work on issues
    Work {
        #[command(flatten)]
        context: TrainContext,

        #[command(subcommand)]
        command: WorkCommand,
    },
}

#[derive(Subcommand, Debug)]
pub enum WorkCommand {
    /// List unclaimed issues waiting at a station
    List {
        /// Station to list (default: the current train's from_station)
        #[arg(long)]
        station: Option<String>,
    },

    /// Show an issue with its comments
    Read { issue_id: String },

    /// Claim an issue
    Start { issue_id: String },

    /// Move an issue to the current train's to_station and release it
    Complete { issue_id: String },

    /// Comment why an issue is blocked and release it
    Blocked {
        issue_id: String,

        #[arg(long)]
        reason: String,
    },

    /// Add a comment to an issue
    Comment { issue_id: String, message: String },
}

/// The train an agent was started for. `choo run` exports these to the agent.
#[derive(Args, Debug, Clone, Default)]
pub struct TrainContext {
    /// Current train
    #[arg(long, env = "CHOO_TRAIN")]
    pub train: Option<String>,

    /// Station the current train picks work up from
    #[arg(long, env = "CHOO_FROM_STATION")]
    pub from_station: Option<String>,

    /// Station the current train delivers work to
    #[arg(long, env = "CHOO_TO_STATION")]
    pub to_station: Option<String>,
}

impl TrainContext {
    fn current_train<'a>(&self, config: &'a ChooConfig) -> Result<Option<&'a TrainConfig>> {
        match &self.train {
            Some(name) => config
                .train(name)
                .map(Some)
                .ok_or_else(|| anyhow!("Unknown train: {name}")),
            None => Ok(None),
        }
    }

    pub fn from_station(&self, config: &ChooConfig) -> Result<String> {
        if let Some(station) = &self.from_station {
            return Ok(station.clone());
        }
        match self.current_train(config)? {
            Some(train) => Ok(train.from_station.clone()),
            None => bail!("No current train: set CHOO_TRAIN or pass --station"),
        }
    }

    pub fn to_station(&self, config: &ChooConfig) -> Result<String> {
        if let Some(station) = &self.to_station {
            return Ok(station.clone());
        }
        match self.current_train(config)? {
            Some(train) => Ok(train.to_station.clone()),
            None => bail!("No current train: set CHOO_TRAIN or CHOO_TO_STATION"),
        }
    }
}

/// Run the parsed command and return the process exit code.
pub async fn execute(cli: Cli) -> Result<i32> {
    match &cli.command {
        Commands::Init => {
            for path in init_project(&cli.choo_dir)? {
                println!("Created {}", path.display());
            }
            Ok(0)
        }
        Commands::Stations => {
            let config = load_config(&cli.choo_dir)?;
            let adapter = adapter_for(&config, cli.verbose)?;
            for station in adapter.list_stations().await? {
                println!("{station}");
            }
            Ok(0)
        }
        Commands::Run { train } => {
            let config = load_config(&cli.choo_dir)?;
            run_trains(&config, &cli.choo_dir, train.as_deref(), cli.verbose).await
        }
        Commands::Work { context, command } => {
            if let WorkCommand::Comment { message, .. } = command {
                ensure_message(message)?;
            }
            let config = load_config(&cli.choo_dir)?;
            let adapter = adapter_for(&config, cli.verbose)?;
            let mut stdout = std::io::stdout().lock();
            run_work(adapter.as_ref(), &config, context, command, &mut stdout).await?;
            Ok(0)
        }
    }
}

pub fn load_config(choo_dir: &Path) -> Result<ChooConfig> {
    ChooConfig::load(&config_path(choo_dir)).context("Failed to load choo configuration")
}

pub fn adapter_for(config: &ChooConfig, verbose: bool) -> Result<Box<dyn TicketSystemAdapter>> {
    adapters::create_adapter(&config.ticket_system, verbose)
        .with_context(|| format!("Failed to set up {} adapter", config.ticket_system.kind))
}

fn ensure_message(message: &str) -> Result<()> {
    if message.trim().is_empty() {
        bail!("Comment message cannot be empty");
    }
    Ok(())
}

/// Variables handed to an agent so its `choo work` calls know which train they serve.
pub fn train_env(train: &TrainConfig, choo_dir: &Path) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("CHOO_DIR".to_string(), choo_dir.display().to_string()),
        ("CHOO_TRAIN".to_string(), train.name.clone()),
        ("CHOO_FROM_STATION".to_string(), train.from_station.clone()),
        ("CHOO_TO_STATION".to_string(), train.to_station.clone()),
    ])
}

async fn run_trains(
    config: &ChooConfig,
    choo_dir: &Path,
    train: Option<&str>,
    verbose: bool,
) -> Result<i32> {
    let trains: Vec<&TrainConfig> = match train {
        Some(name) => {
            let train = config.train(name).ok_or_else(|| {
                let names: Vec<&str> = config.trains.iter().map(|t| t.name.as_str()).collect();
                anyhow!("Unknown train: {name}. Available: {}", names.join(", "))
            })?;
            vec![train]
        }
        None => config.trains.iter().collect(),
    };

    let working_dir = std::env::current_dir().context("Failed to read current directory")?;
    let mut exit_code = 0;
    for train in trains {
        let prompt = load_combined_prompt(&train.name, choo_dir)?;
        let agent = create_agent_adapter(&train.cli, verbose)?;
        info!(train = %train.name, agent = agent.name(), "starting train");

        let code = agent
            .run(&prompt, &working_dir, &train_env(train, choo_dir))
            .await
            .with_context(|| format!("Train '{}' failed to start {}", train.name, agent.name()))?;
        if code != 0 {
            warn!(train = %train.name, code, "agent exited with a failure");
            exit_code = code;
        }
    }
    Ok(exit_code)
}

pub async fn run_work(
    adapter: &dyn TicketSystemAdapter,
    config: &ChooConfig,
    context: &TrainContext,
    command: &WorkCommand,
    out: &mut dyn Write,
) -> Result<()> {
    match command {
        WorkCommand::List { station } => {
            let station = match station {
                Some(s) => s.clone(),
                None => context.from_station(config)?,
            };
            let issues = adapter.list_issues(&station).await?;
            if issues.is_empty() {
                writeln!(out, "No issues at {station}")?;
            }
            for issue in &issues {
                writeln!(out, "{}\t{}", issue.id, issue.title)?;
            }
        }
        WorkCommand::Read { issue_id } => {
            let issue = adapter.get_issue(issue_id).await?;
            let comments = adapter.get_comments(issue_id).await?;
            write!(out, "{}", render_issue(&issue, &comments))?;
        }
        WorkCommand::Start { issue_id } => {
            adapter.claim_issue(issue_id).await?;
            writeln!(out, "Started {issue_id}")?;
        }
        WorkCommand::Complete { issue_id } => {
            let to_station = context.to_station(config)?;
            adapter.move_issue(issue_id, &to_station).await?;
            adapter.unclaim_issue(issue_id).await?;
            writeln!(out, "Moved {issue_id} to {to_station}")?;
        }
        WorkCommand::Blocked { issue_id, reason } => {
            adapter
                .add_comment(issue_id, &format!("Blocked: {reason}"))
                .await?;
            adapter.unclaim_issue(issue_id).await?;
            writeln!(out, "Marked {issue_id} as blocked")?;
        }
        WorkCommand::Comment { issue_id, message } => {
            ensure_message(message)?;
            adapter.add_comment(issue_id, message).await?;
            writeln!(out, "Commented on {issue_id}")?;
        }
    }
    Ok(())
}

/// RFC 3339, or Jira's offset without a colon. Anything else is shown as given.
pub fn format_timestamp(raw: &str) -> String {
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::<FixedOffset>::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z"))
        .map(|dt| dt.with_timezone(&Utc).format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|_| raw.to_string())
}

pub fn render_issue(issue: &Issue, comments: &[Comment]) -> String {
    let mut s = format!("{}: {}\n", issue.id, issue.title);
    s.push_str(&format!("Station: {}\n", issue.station));
    if let Some(url) = &issue.url {
        s.push_str(&format!("URL: {url}\n"));
    }
    s.push_str(&format!(
        "Assignee: {}\n",
        issue.assignee.as_deref().unwrap_or("unassigned")
    ));
    if !issue.labels.is_empty() {
        s.push_str(&format!("Labels: {}\n", issue.labels.join(", ")));
    }
    s.push('\n');
    s.push_str(issue.body.as_deref().unwrap_or("No description provided."));
    s.push('\n');

    if !comments.is_empty() {
        s.push_str(&format!("\nComments ({}):\n", comments.len()));
        for c in comments {
            let when = if c.created_at.is_empty() {
                String::new()
            } else {
                format!(" ({})", format_timestamp(&c.created_at))
            };
            s.push_str(&format!("\n--- {}{} ---\n{}\n", c.author, when, c.body));
        }
    }
    s
}

const CONFIG_TEMPLATE: &str = r#"ticket_system:
  type: github-project-gh
  config:
    owner: your-org
    repo: your-repo
    project_number: 1
    claim_method: assignee

stations:
  - Todo
  - In Progress
  - In Review
  - Done

trains:
  - name: example
    from_station: Todo
    to_station: In Review
    cli: claude
"#;

const SYSTEM_PROMPT_TEMPLATE: &str = r#"# Working with choo

You pick up issues from a ticket board and move them along when you are done.
Use these commands:

- `choo work list` shows unclaimed issues waiting for you.
- `choo work read <id>` shows an issue and its comments.
- `choo work start <id>` claims an issue before you begin.
- `choo work comment <id> "<message>"` records progress.
- `choo work complete <id>` hands the issue to the next station.
- `choo work blocked <id> --reason "<why>"` releases an issue you cannot finish.

Work on one issue at a time.
"#;

const TRAIN_PROMPT_TEMPLATE: &str = r#"# Example train

Take the first issue from `choo work list`, implement it, make sure the tests
pass, then complete it.
"#;

/// Write the starter files and return the paths created.
///
/// Refuses to touch an existing config. Prompt files that already exist are kept.
pub fn init_project(choo_dir: &Path) -> Result<Vec<PathBuf>> {
    let config = config_path(choo_dir);
    if config.exists() {
        bail!("{} already exists", config.display());
    }
    std::fs::create_dir_all(choo_dir.join(PROMPTS_DIR))
        .with_context(|| format!("Failed to create {}", choo_dir.display()))?;

    let files = [
        (config, CONFIG_TEMPLATE),
        (prompts::system_prompt_path(choo_dir), SYSTEM_PROMPT_TEMPLATE),
        (prompts::train_prompt_path(choo_dir, "example"), TRAIN_PROMPT_TEMPLATE),
    ];
    let mut created = Vec::new();
    for (path, contents) in files {
        if path.exists() {
            continue;
        }
        std::fs::write(&path, contents)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        created.push(path);
    }
    Ok(created)
}
