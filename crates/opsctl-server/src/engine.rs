//! The execution engine: resolve an action, run it, record the outcome.
//!
//! Every call for a known action produces a finished [`RunRecord`] that is
//! appended to the ledger and counted in the metrics, whatever happened to
//! the process. Only an unknown action id (or an unusable host override) is
//! returned as an error, and in that case nothing is recorded.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use opsctl_core::config::Config;
use opsctl_core::error::Result;
use opsctl_core::hosts;
use opsctl_core::io::TempInventory;
use opsctl_core::ledger::RunLedger;
use opsctl_core::paths;
use opsctl_core::registry::{ActionDefinition, ActionRegistry};
use opsctl_core::run::{RunOutcome, RunRecord, RunStatus};
use tracing::{debug, info, warn};

use crate::metrics::Metrics;
use crate::runner::{CommandSpec, ProcessRunner};

/// Env var carrying an action's target scope to non-playbook executables.
pub const TARGET_SCOPE_ENV: &str = "OPSCTL_TARGET_SCOPE";
/// Env var carrying an ad-hoc inventory path to non-playbook executables.
pub const INVENTORY_ENV: &str = "OPSCTL_INVENTORY";

// ---------------------------------------------------------------------------
// Settings / options
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Working directory for every run; relative executables resolve here.
    pub root: PathBuf,
    pub timeout: Duration,
    pub playbook_runner: String,
}

impl EngineSettings {
    pub fn from_config(root: &Path, config: &Config) -> Self {
        Self {
            root: root.to_path_buf(),
            timeout: Duration::from_secs(config.execution.timeout_seconds),
            playbook_runner: config.execution.playbook_runner.clone(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub scheduled: bool,
    /// Ad-hoc host list replacing the action's inventory and scope.
    pub hosts: Option<Vec<String>>,
}

impl RunOptions {
    pub fn scheduled() -> Self {
        Self {
            scheduled: true,
            hosts: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct Engine {
    registry: Arc<ActionRegistry>,
    ledger: Arc<RunLedger>,
    metrics: Arc<Metrics>,
    runner: Arc<dyn ProcessRunner>,
    settings: EngineSettings,
}

impl Engine {
    pub fn new(
        registry: Arc<ActionRegistry>,
        ledger: Arc<RunLedger>,
        metrics: Arc<Metrics>,
        runner: Arc<dyn ProcessRunner>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            registry,
            ledger,
            metrics,
            runner,
            settings,
        }
    }

    pub fn registry(&self) -> &ActionRegistry {
        &self.registry
    }

    pub fn ledger(&self) -> &RunLedger {
        &self.ledger
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub async fn execute(&self, action_id: &str, scheduled: bool) -> Result<RunRecord> {
        self.execute_with(
            action_id,
            RunOptions {
                scheduled,
                hosts: None,
            },
        )
        .await
    }

    pub async fn execute_with(&self, action_id: &str, opts: RunOptions) -> Result<RunRecord> {
        let def = self.registry.resolve(action_id)?;
        let hosts = opts
            .hosts
            .as_deref()
            .map(hosts::valid_ipv4_hosts::<String>)
            .transpose()?;

        let gauge = self.metrics.start_run();
        let started = Instant::now();
        let record = RunRecord::start(def.id.as_str(), opts.scheduled).with_hosts(hosts.clone());
        info!(
            action = %def.id,
            run_id = %record.id,
            scheduled = opts.scheduled,
            "run started"
        );

        let (outcome, command) = match self.launch(def, hosts.as_deref()).await {
            Ok(done) => done,
            Err(e) => (
                RunOutcome::LaunchFailed {
                    error: format!("failed to prepare inventory: {e}"),
                },
                String::new(),
            ),
        };

        let record = record
            .with_command(command)
            .finish(outcome, started.elapsed().as_secs_f64());
        drop(gauge);

        let duration = record.duration_seconds.unwrap_or_default();
        self.metrics.observe_run(def.id.as_str(), record.status, duration);
        log_finished(&record, duration);
        self.ledger.append(record.clone());
        Ok(record)
    }

    /// Build the command for `def` and run it. The temporary inventory, if
    /// any, lives until the process has exited.
    async fn launch(
        &self,
        def: &ActionDefinition,
        hosts: Option<&[String]>,
    ) -> Result<(RunOutcome, String)> {
        let inventory = hosts.map(TempInventory::write::<String>).transpose()?;
        let spec = self.command_spec(def, inventory.as_ref().map(|i| i.path()));
        let command = spec.display();
        debug!(action = %def.id, command = %command, "launching");
        let outcome = self.runner.run(&spec, self.settings.timeout).await;
        drop(inventory);
        Ok((outcome, command))
    }

    /// Translate an action into a concrete command line.
    ///
    /// Playbooks go through the configured playbook runner with `--limit`
    /// set to the target scope. Anything else is executed directly and
    /// receives the scope through [`TARGET_SCOPE_ENV`]. An explicit
    /// inventory replaces the scope entirely.
    pub fn command_spec(&self, def: &ActionDefinition, inventory: Option<&Path>) -> CommandSpec {
        let root = &self.settings.root;
        let executable = paths::resolve_executable(root, &def.executable_ref);

        let mut spec = if def.is_playbook() {
            let mut spec = CommandSpec::new(&self.settings.playbook_runner);
            if let Some(inv) = inventory {
                spec = spec.arg("-i").arg(inv.display().to_string());
            }
            spec = spec.arg(executable.display().to_string());
            if let (None, Some(scope)) = (inventory, &def.target_scope) {
                spec = spec.arg("--limit").arg(scope);
            }
            spec
        } else {
            let mut spec = CommandSpec::new(executable.display().to_string());
            match (inventory, &def.target_scope) {
                (Some(inv), _) => spec = spec.env(INVENTORY_ENV, inv.display().to_string()),
                (None, Some(scope)) => spec = spec.env(TARGET_SCOPE_ENV, scope),
                (None, None) => {}
            }
            spec
        };

        if let Some(ov) = &def.env_override {
            for (k, v) in &ov.vars {
                spec = spec.env(k, v);
            }
        }
        spec.cwd = Some(root.clone());
        spec
    }
}

fn log_finished(record: &RunRecord, duration: f64) {
    match record.status {
        RunStatus::Success => info!(
            action = %record.action_id,
            run_id = %record.id,
            duration_seconds = duration,
            "run succeeded"
        ),
        _ => warn!(
            action = %record.action_id,
            run_id = %record.id,
            exit_code = ?record.exit_code,
            error = record.error.as_deref().unwrap_or(""),
            duration_seconds = duration,
            "run failed"
        ),
    }
    if record.error.is_none()
        && !record.stdout.trim().is_empty()
        && record.summary.as_ref().is_some_and(|s| s.is_empty())
    {
        debug!(run_id = %record.id, "no recap block found in output");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
