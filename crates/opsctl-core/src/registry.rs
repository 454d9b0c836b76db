//! The immutable table of runnable actions.
//!
//! Built once at startup from [`Config`]; after that the set of valid action
//! ids is fixed. Lookups are exact: an unknown id is always `UnknownAction`.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::config::Config;
use crate::error::{OpsError, Result};
use crate::paths;

// ---------------------------------------------------------------------------
// ActionId
// ---------------------------------------------------------------------------

/// A validated action identifier: lowercase alphanumeric with hyphens.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ActionId(String);

impl ActionId {
    pub fn parse(id: &str) -> Result<Self> {
        paths::validate_action_id(id)?;
        Ok(Self(id.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ActionId {
    type Error = OpsError;

    fn try_from(value: String) -> Result<Self> {
        paths::validate_action_id(&value)?;
        Ok(Self(value))
    }
}

impl From<ActionId> for String {
    fn from(id: ActionId) -> Self {
        id.0
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// ActionDefinition
// ---------------------------------------------------------------------------

/// Environment applied on top of the inherited one when running an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvOverride {
    /// The configured prefix that selected this override.
    pub matched_prefix: String,
    pub vars: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionDefinition {
    pub id: ActionId,
    pub label: String,
    pub description: String,
    pub executable_ref: String,
    pub target_scope: Option<String>,
    pub env_override: Option<EnvOverride>,
}

impl ActionDefinition {
    pub fn is_playbook(&self) -> bool {
        is_playbook(&self.executable_ref)
    }
}

/// Whether `executable` names a playbook rather than a program.
pub fn is_playbook(executable: &str) -> bool {
    let lower = executable.to_ascii_lowercase();
    lower.ends_with(".yml") || lower.ends_with(".yaml")
}

// ---------------------------------------------------------------------------
// ActionRegistry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct ActionRegistry {
    actions: Vec<ActionDefinition>,
    index: HashMap<String, usize>,
}

impl ActionRegistry {
    /// Build the registry from `config.actions`, resolving each action's env
    /// override from `config.env_overrides`.
    ///
    /// Fails on the first invalid or duplicate id.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut definitions = Vec::with_capacity(config.actions.len());
        for action in &config.actions {
            let env_override = config
                .env_override_for(&action.executable)
                .map(|rule| EnvOverride {
                    matched_prefix: rule.path_prefix.clone(),
                    vars: rule.vars.clone(),
                });
            let label = if action.label.is_empty() {
                action.id.clone()
            } else {
                action.label.clone()
            };
            definitions.push(ActionDefinition {
                id: ActionId::parse(&action.id)?,
                label,
                description: action.description.clone(),
                executable_ref: action.executable.clone(),
                target_scope: action.target_scope.clone(),
                env_override,
            });
        }
        Self::new(definitions)
    }

    pub fn new(actions: Vec<ActionDefinition>) -> Result<Self> {
        let mut index = HashMap::with_capacity(actions.len());
        for (i, def) in actions.iter().enumerate() {
            if index.insert(def.id.as_str().to_string(), i).is_some() {
                return Err(OpsError::DuplicateAction(def.id.to_string()));
            }
        }
        Ok(Self { actions, index })
    }

    pub fn resolve(&self, id: &str) -> Result<&ActionDefinition> {
        self.index
            .get(id)
            .map(|&i| &self.actions[i])
            .ok_or_else(|| OpsError::UnknownAction(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// All actions in configuration order.
    pub fn list(&self) -> &[ActionDefinition] {
        &self.actions
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
