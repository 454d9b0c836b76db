use crate::error::{OpsError, Result};
use crate::paths;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// ServerConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

// ---------------------------------------------------------------------------
// ExecutionConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Hard wall-clock limit for a single run.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    /// Program used to run playbook (`.yml`/`.yaml`) executables.
    #[serde(default = "default_playbook_runner")]
    pub playbook_runner: String,
    #[serde(default = "default_ledger_capacity")]
    pub ledger_capacity: usize,
}

fn default_timeout_seconds() -> u64 {
    180
}

fn default_playbook_runner() -> String {
    "ansible-playbook".to_string()
}

fn default_ledger_capacity() -> usize {
    crate::ledger::DEFAULT_CAPACITY
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout_seconds(),
            playbook_runner: default_playbook_runner(),
            ledger_capacity: default_ledger_capacity(),
        }
    }
}

// ---------------------------------------------------------------------------
// ScheduleConfig
// ---------------------------------------------------------------------------

/// The heartbeat schedule installed once at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    pub action: String,
    pub interval_minutes: u64,
}

fn default_schedule() -> Option<ScheduleConfig> {
    Some(ScheduleConfig {
        action: "ping".to_string(),
        interval_minutes: 5,
    })
}

// ---------------------------------------------------------------------------
// EnvOverrideRule
// ---------------------------------------------------------------------------

/// Extra environment applied to every action whose executable lives under
/// `path_prefix`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvOverrideRule {
    pub path_prefix: String,
    #[serde(default)]
    pub vars: BTreeMap<String, String>,
}

fn default_env_overrides() -> Vec<EnvOverrideRule> {
    vec![EnvOverrideRule {
        path_prefix: "playbooks/zos/".to_string(),
        vars: BTreeMap::from([(
            "ANSIBLE_CONFIG".to_string(),
            "playbooks/zos/ansible.cfg".to_string(),
        )]),
    }]
}

// ---------------------------------------------------------------------------
// ActionConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionConfig {
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub description: String,
    /// Playbook path or command. Relative paths resolve against the project root.
    pub executable: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_scope: Option<String>,
}

fn default_actions() -> Vec<ActionConfig> {
    vec![
        ActionConfig {
            id: "ping".to_string(),
            label: "Ping hosts".to_string(),
            description: "Check SSH reachability of every managed host".to_string(),
            executable: "playbooks/ping.yml".to_string(),
            target_scope: Some("all".to_string()),
        },
        ActionConfig {
            id: "restart-service".to_string(),
            label: "Restart service".to_string(),
            description: "Restart the application service on the web tier".to_string(),
            executable: "playbooks/restart_service.yml".to_string(),
            target_scope: Some("webservers".to_string()),
        },
        ActionConfig {
            id: "submit-job".to_string(),
            label: "Submit mainframe job".to_string(),
            description: "Submit the batch JCL job to the z/OS host".to_string(),
            executable: "playbooks/zos/submit_job.yml".to_string(),
            target_scope: Some("zos".to_string()),
        },
    ]
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default = "default_schedule")]
    pub default_schedule: Option<ScheduleConfig>,
    #[serde(default = "default_env_overrides")]
    pub env_overrides: Vec<EnvOverrideRule>,
    #[serde(default = "default_actions")]
    pub actions: Vec<ActionConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            execution: ExecutionConfig::default(),
            default_schedule: default_schedule(),
            env_overrides: default_env_overrides(),
            actions: default_actions(),
        }
    }
}

impl Config {
    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Err(OpsError::NotInitialized);
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    /// Load the project config, falling back to the built-in defaults when
    /// no config file exists yet.
    pub fn load_or_default(root: &Path) -> Result<Self> {
        match Self::load(root) {
            Err(OpsError::NotInitialized) => Ok(Self::default()),
            other => other,
        }
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    /// Return the rule applying to `executable`, if any. First match wins.
    pub fn env_override_for(&self, executable: &str) -> Option<&EnvOverrideRule> {
        self.env_overrides
            .iter()
            .find(|r| !r.path_prefix.is_empty() && executable.starts_with(&r.path_prefix))
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let mut error = |message: String| {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message,
            })
        };

        // 1. Action ids must be valid and unique; executables non-empty
        let mut seen = HashSet::new();
        for action in &self.actions {
            if paths::validate_action_id(&action.id).is_err() {
                error(format!("invalid action id '{}'", action.id));
            }
            if !seen.insert(action.id.as_str()) {
                error(format!("duplicate action id '{}'", action.id));
            }
            if action.executable.trim().is_empty() {
                error(format!("action '{}' has an empty executable", action.id));
            }
        }

        // 2. Heartbeat must point at a known action with a positive interval
        if let Some(sched) = &self.default_schedule {
            if !seen.contains(sched.action.as_str()) {
                error(format!(
                    "default_schedule references unknown action '{}'",
                    sched.action
                ));
            }
            if sched.interval_minutes == 0 {
                error("default_schedule.interval_minutes must be positive".to_string());
            }
        }

        // 3. Execution limits
        if self.execution.timeout_seconds == 0 {
            error("execution.timeout_seconds must be positive".to_string());
        }

        if self.execution.ledger_capacity == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "execution.ledger_capacity is 0; using 1".to_string(),
            });
        }

        // 4. Env override rules with an empty prefix never match
        for rule in &self.env_overrides {
            if rule.path_prefix.is_empty() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: "env_overrides entry with empty path_prefix is ignored".to_string(),
                });
            }
        }

        // 5. Playbook runner availability
        let has_playbooks = self
            .actions
            .iter()
            .any(|a| crate::registry::is_playbook(&a.executable));
        if has_playbooks && which::which(&self.execution.playbook_runner).is_err() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "playbook runner '{}' not found on PATH; playbook actions will fail to launch",
                    self.execution.playbook_runner
                ),
            });
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
