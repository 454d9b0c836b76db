use std::path::PathBuf;
use std::sync::Arc;

use opsctl_core::config::Config;
use opsctl_core::error::Result;
use opsctl_core::ledger::RunLedger;
use opsctl_core::registry::ActionRegistry;

use crate::engine::{Engine, EngineSettings};
use crate::metrics::Metrics;
use crate::runner::{ProcessRunner, SystemRunner};
use crate::scheduler::Scheduler;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub root: PathBuf,
    pub engine: Arc<Engine>,
    pub scheduler: Arc<Scheduler>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    /// State backed by real subprocesses.
    pub fn new(root: PathBuf, config: &Config) -> Result<Self> {
        Self::with_runner(root, config, Arc::new(SystemRunner))
    }

    pub fn with_runner(
        root: PathBuf,
        config: &Config,
        runner: Arc<dyn ProcessRunner>,
    ) -> Result<Self> {
        let registry = Arc::new(ActionRegistry::from_config(config)?);
        let ledger = Arc::new(RunLedger::new(config.execution.ledger_capacity));
        let metrics = Arc::new(Metrics::new());
        let settings = EngineSettings::from_config(&root, config);
        let engine = Arc::new(Engine::new(
            registry,
            ledger,
            metrics.clone(),
            runner,
            settings,
        ));
        let scheduler = Arc::new(Scheduler::new(engine.clone()));
        Ok(Self {
            root,
            engine,
            scheduler,
            metrics,
        })
    }
}
