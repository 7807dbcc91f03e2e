use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use crate::error::{ChooError, Result};

pub const DEFAULT_CHOO_DIR: &str = ".choo";
pub const CONFIG_FILE: &str = "config.yml";

pub const GITHUB_PROJECT_TYPE: &str = "github-project-gh";
pub const JIRA_ACLI_TYPE: &str = "jira-acli";

/// How an adapter marks an issue as being worked on.
///
/// Values other than `assignee` and `label` are kept as `Unrecognized` so that
/// adapters can treat them as a no-op instead of failing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum ClaimMethod {
    #[default]
    Assignee,
    Label,
    Unrecognized(String),
}

impl From<String> for ClaimMethod {
    fn from(value: String) -> Self {
        match value.as_str() {
            "assignee" => ClaimMethod::Assignee,
            "label" => ClaimMethod::Label,
            _ => ClaimMethod::Unrecognized(value),
        }
    }
}

impl ClaimMethod {
    pub fn as_str(&self) -> &str {
        match self {
            ClaimMethod::Assignee => "assignee",
            ClaimMethod::Label => "label",
            ClaimMethod::Unrecognized(other) => other,
        }
    }

    fn ensure_known(&self) -> Result<()> {
        if let ClaimMethod::Unrecognized(other) = self {
            return Err(ChooError::Config(format!(
                "Invalid claim_method: {other}. Must be one of: assignee, label"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitHubProjectConfig {
    pub owner: String,
    pub repo: String,
    pub project_number: u64,
    #[serde(default)]
    pub claim_method: ClaimMethod,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JiraAcliConfig {
    pub project: String,
    pub agent_label: String,
    #[serde(default)]
    pub claim_method: ClaimMethod,
    /// Logical station name -> Jira status name.
    #[serde(default)]
    pub status_mapping: BTreeMap<String, String>,
}

impl JiraAcliConfig {
    /// Two stations on one Jira status could not be told apart when reading
    /// an issue back. Jira status names are case-insensitive.
    fn ensure_distinct_statuses(&self) -> Result<()> {
        let mut seen: BTreeMap<String, &str> = BTreeMap::new();
        for (station, status) in &self.status_mapping {
            if let Some(other) = seen.insert(status.to_lowercase(), station) {
                return Err(ChooError::Config(format!(
                    "status_mapping maps both '{other}' and '{station}' to Jira status '{status}'"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketSystemConfig {
    #[serde(rename = "type")]
    pub kind: String,
    /// Free-form settings whose required keys depend on `kind`.
    pub config: serde_yaml::Value,
}

impl TicketSystemConfig {
    pub fn new(kind: impl Into<String>, config: serde_yaml::Value) -> Self {
        Self {
            kind: kind.into(),
            config,
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self.kind.as_str() {
            GITHUB_PROJECT_TYPE => self.github_config()?.claim_method.ensure_known(),
            JIRA_ACLI_TYPE => {
                let jira = self.jira_config()?;
                jira.claim_method.ensure_known()?;
                jira.ensure_distinct_statuses()
            }
            other => Err(ChooError::Config(format!(
                "Unknown ticket system type: {other}"
            ))),
        }
    }

    pub fn github_config(&self) -> Result<GitHubProjectConfig> {
        self.typed_config()
    }

    pub fn jira_config(&self) -> Result<JiraAcliConfig> {
        self.typed_config()
    }

    fn typed_config<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        serde_yaml::from_value(self.config.clone()).map_err(|e| {
            ChooError::Config(format!("Invalid ticket_system.config ({}): {e}", self.kind))
        })
    }
}

/// A configured agent run that pulls work from one station and delivers it to another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrainConfig {
    pub name: String,
    pub from_station: String,
    pub to_station: String,
    pub cli: String,
}

#[derive(Debug, Clone)]
pub struct ChooConfig {
    pub ticket_system: TicketSystemConfig,
    pub stations: Vec<String>,
    pub trains: Vec<TrainConfig>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    ticket_system: Option<RawTicketSystem>,
    stations: Option<Vec<String>>,
    trains: Option<Vec<TrainConfig>>,
}

#[derive(Deserialize)]
struct RawTicketSystem {
    #[serde(rename = "type")]
    kind: Option<String>,
    config: Option<serde_yaml::Value>,
}

pub fn config_path(choo_dir: &Path) -> PathBuf {
    choo_dir.join(CONFIG_FILE)
}

impl ChooConfig {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ChooError::Config(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        if contents.trim().is_empty() {
            return Err(ChooError::Config("Configuration file is empty".into()));
        }
        let value: serde_yaml::Value = serde_yaml::from_str(contents)
            .map_err(|e| ChooError::Config(format!("Failed to parse YAML: {e}")))?;
        if value.is_null() {
            return Err(ChooError::Config("Configuration file is empty".into()));
        }

        let raw: RawConfig = serde_yaml::from_value(value)
            .map_err(|e| ChooError::Config(format!("Invalid configuration: {e}")))?;

        let ticket = raw
            .ticket_system
            .ok_or_else(|| missing("Missing required section: ticket_system"))?;
        let kind = ticket
            .kind
            .ok_or_else(|| missing("Missing required field: ticket_system.type"))?;
        let bag = ticket
            .config
            .ok_or_else(|| missing("Missing required field: ticket_system.config"))?;

        let ticket_system = TicketSystemConfig::new(kind, bag);
        ticket_system.validate()?;

        let stations = raw
            .stations
            .ok_or_else(|| missing("Missing required section: stations"))?;
        let trains = raw
            .trains
            .ok_or_else(|| missing("Missing required section: trains"))?;

        let config = Self {
            ticket_system,
            stations,
            trains,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.stations.is_empty() {
            return Err(ChooError::Config("stations list cannot be empty".into()));
        }
        let station_set: HashSet<&str> = self.stations.iter().map(String::as_str).collect();
        if station_set.len() != self.stations.len() {
            return Err(ChooError::Config("Duplicate station names found".into()));
        }

        if self.trains.is_empty() {
            return Err(ChooError::Config("trains list cannot be empty".into()));
        }
        let mut train_names = HashSet::new();
        for train in &self.trains {
            if !train_names.insert(train.name.as_str()) {
                return Err(ChooError::Config("Duplicate train names found".into()));
            }
            if !station_set.contains(train.from_station.as_str()) {
                return Err(ChooError::Config(format!(
                    "Train '{}' references unknown from_station: {}",
                    train.name, train.from_station
                )));
            }
            if !station_set.contains(train.to_station.as_str()) {
                return Err(ChooError::Config(format!(
                    "Train '{}' references unknown to_station: {}",
                    train.name, train.to_station
                )));
            }
        }
        Ok(())
    }

    pub fn train(&self, name: &str) -> Option<&TrainConfig> {
        self.trains.iter().find(|t| t.name == name)
    }
}

fn missing(msg: &str) -> ChooError {
    ChooError::Config(msg.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const VALID: &str = r#"
ticket_system:
  type: github-project-gh
  config:
    owner: testorg
    repo: testrepo
    project_number: 1
    claim_method: assignee

stations:
  - backlog
  - done

trains:
  - name: dev
    from_station: backlog
    to_station: done
    cli: claude
"#;

    fn config_err(yaml: &str) -> String {
        ChooConfig::from_yaml(yaml).unwrap_err().to_string()
    }

    #[test]
    fn load_valid_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(VALID.as_bytes()).unwrap();

        let config = ChooConfig::load(file.path()).unwrap();
        assert_eq!(config.ticket_system.kind, GITHUB_PROJECT_TYPE);
        assert_eq!(config.stations, vec!["backlog", "done"]);
        assert_eq!(config.trains.len(), 1);
        assert_eq!(config.trains[0].name, "dev");

        let gh = config.ticket_system.github_config().unwrap();
        assert_eq!(gh.owner, "testorg");
        assert_eq!(gh.repo, "testrepo");
        assert_eq!(gh.project_number, 1);
        assert_eq!(gh.claim_method, ClaimMethod::Assignee);
    }

    #[test]
    fn missing_file_is_reported() {
        let err = ChooConfig::load(Path::new("/nonexistent/config.yml")).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn empty_file_is_reported() {
        assert!(config_err("").contains("empty"));
        assert!(config_err("~\n").contains("empty"));
    }

    #[test]
    fn missing_ticket_system_section() {
        assert!(config_err("stations: [a]\n").contains("ticket_system"));
    }

    #[test]
    fn unknown_top_level_key_is_rejected() {
        let yaml = format!("{VALID}\nextra: true\n");
        assert!(config_err(&yaml).contains("extra"));
    }

    #[test]
    fn missing_github_field_names_the_field() {
        let yaml = r#"
ticket_system:
  type: github-project-gh
  config:
    owner: testorg
"#;
        assert!(config_err(yaml).contains("repo"));
    }

    #[test]
    fn project_number_must_be_an_integer() {
        let yaml = VALID.replace("project_number: 1", "project_number: one");
        assert!(config_err(&yaml).contains("project_number") || config_err(&yaml).contains("u64"));
    }

    #[test]
    fn unknown_ticket_system_type() {
        let yaml = r#"
ticket_system:
  type: invalid-adapter
  config:
    foo: bar
"#;
        assert!(config_err(yaml).contains("Unknown ticket system type"));
    }

    #[test]
    fn invalid_claim_method_is_rejected_at_load() {
        let yaml = VALID.replace("claim_method: assignee", "claim_method: telepathy");
        assert!(config_err(&yaml).contains("Invalid claim_method: telepathy"));
    }

    #[test]
    fn jira_config_with_status_mapping() {
        let yaml = r#"
ticket_system:
  type: jira-acli
  config:
    project: TEST
    agent_label: agent-ready
    claim_method: label
    status_mapping:
      backlog: To Do
      done: Done
stations: [backlog, done]
trains:
  - name: dev
    from_station: backlog
    to_station: done
    cli: copilot
"#;
        let config = ChooConfig::from_yaml(yaml).unwrap();
        let jira = config.ticket_system.jira_config().unwrap();
        assert_eq!(jira.project, "TEST");
        assert_eq!(jira.claim_method, ClaimMethod::Label);
        assert_eq!(jira.status_mapping.get("backlog").map(String::as_str), Some("To Do"));
    }

    #[test]
    fn jira_status_mapping_must_be_one_to_one() {
        let yaml = r#"
ticket_system:
  type: jira-acli
  config:
    project: TEST
    agent_label: agent-ready
    status_mapping:
      backlog: To Do
      todo: to do
stations: [backlog, todo]
trains:
  - name: dev
    from_station: backlog
    to_station: todo
    cli: claude
"#;
        let msg = config_err(yaml);
        assert!(msg.contains("'backlog' and 'todo'"), "{msg}");
    }

    #[test]
    fn jira_requires_agent_label() {
        let yaml = r#"
ticket_system:
  type: jira-acli
  config:
    project: TEST
"#;
        assert!(config_err(yaml).contains("agent_label"));
    }

    #[test]
    fn duplicate_stations_are_rejected() {
        let yaml = VALID.replace("  - done\n", "  - done\n  - done\n");
        assert!(config_err(&yaml).contains("Duplicate station"));
    }

    #[test]
    fn empty_trains_are_rejected() {
        let head = VALID.split("trains:").next().unwrap();
        let yaml = format!("{head}trains: []\n");
        assert!(config_err(&yaml).contains("trains list cannot be empty"));
    }

    #[test]
    fn train_must_reference_known_stations() {
        let yaml = VALID.replace("to_station: done", "to_station: shipped");
        assert!(config_err(&yaml).contains("unknown to_station: shipped"));
    }

    #[test]
    fn unknown_train_key_is_rejected() {
        let yaml = VALID.replace("    cli: claude", "    cli: claude\n    model: opus");
        assert!(config_err(&yaml).contains("model"));
    }

    #[test]
    fn train_lookup_by_name() {
        let config = ChooConfig::from_yaml(VALID).unwrap();
        assert_eq!(config.train("dev").unwrap().to_station, "done");
        assert!(config.train("missing").is_none());
    }

    #[test]
    fn claim_method_keeps_unrecognized_values() {
        assert_eq!(ClaimMethod::from("label".to_string()), ClaimMethod::Label);
        let other = ClaimMethod::from("carrier-pigeon".to_string());
        assert_eq!(other.as_str(), "carrier-pigeon");
        assert!(matches!(other, ClaimMethod::Unrecognized(_)));
    }
}
