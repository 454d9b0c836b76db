use anyhow::Context;
use opsctl_core::{config::Config, io, paths};
use std::path::Path;

pub fn run(root: &Path) -> anyhow::Result<()> {
    println!("Initializing opsctl in: {}", root.display());

    let config_path = paths::config_path(root);
    let yaml = serde_yaml::to_string(&Config::default()).context("failed to render default config")?;
    let created = io::write_if_missing(&config_path, yaml.as_bytes())
        .with_context(|| format!("failed to write {}", config_path.display()))?;

    if created {
        println!("  created: {}", paths::CONFIG_FILE);
    } else {
        println!("  exists:  {}", paths::CONFIG_FILE);
    }
    Ok(())
}
