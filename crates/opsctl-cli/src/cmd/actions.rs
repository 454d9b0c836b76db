use crate::output::{print_json, print_table};
use anyhow::Context;
use opsctl_core::config::Config;
use opsctl_core::registry::ActionRegistry;
use std::path::Path;

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let config = Config::load_or_default(root).context("failed to load config")?;
    let registry = ActionRegistry::from_config(&config)?;

    if json {
        return print_json(&registry.list());
    }

    let rows: Vec<Vec<String>> = registry
        .list()
        .iter()
        .map(|a| {
            vec![
                a.id.to_string(),
                a.label.clone(),
                a.executable_ref.clone(),
                a.target_scope.clone().unwrap_or_else(|| "-".to_string()),
            ]
        })
        .collect();
    print_table(&["ID", "LABEL", "EXECUTABLE", "SCOPE"], &rows);
    Ok(())
}
