use crate::output::{print_json, print_table};
use anyhow::Context;
use opsctl_core::config::Config;
use opsctl_core::run::{RunRecord, RunStatus};
use opsctl_server::engine::RunOptions;
use opsctl_server::state::AppState;
use std::path::Path;

pub fn run(root: &Path, action: &str, hosts: Vec<String>, json: bool) -> anyhow::Result<()> {
    let config = Config::load_or_default(root).context("failed to load config")?;
    let state = AppState::new(root.to_path_buf(), &config)?;
    let opts = RunOptions {
        scheduled: false,
        hosts: (!hosts.is_empty()).then_some(hosts),
    };

    let rt = tokio::runtime::Runtime::new()?;
    let record = rt.block_on(state.engine.execute_with(action, opts))?;

    if json {
        print_json(&record)?;
    } else {
        print_record(&record);
    }

    if record.status == RunStatus::Failed {
        anyhow::bail!("run {} of '{}' failed", record.id, record.action_id);
    }
    Ok(())
}

fn print_record(record: &RunRecord) {
    println!("Run:      {}", record.id);
    println!("Action:   {}", record.action_id);
    println!("Status:   {}", record.status);
    if let Some(code) = record.exit_code {
        println!("Exit:     {code}");
    }
    if let Some(secs) = record.duration_seconds {
        println!("Duration: {secs:.2}s");
    }
    if !record.command.is_empty() {
        println!("Command:  {}", record.command);
    }
    if let Some(err) = &record.error {
        println!("Error:    {err}");
    }

    match &record.summary {
        Some(summary) if !summary.is_empty() => {
            println!();
            let rows: Vec<Vec<String>> = summary
                .iter()
                .map(|(host, stats)| {
                    let stat = |k: &str| stats.get(k).copied().unwrap_or(0).to_string();
                    vec![
                        host.clone(),
                        stat("ok"),
                        stat("changed"),
                        stat("unreachable"),
                        stat("failed"),
                    ]
                })
                .collect();
            print_table(&["HOST", "OK", "CHANGED", "UNREACHABLE", "FAILED"], &rows);
        }
        _ => {
            if !record.stdout.trim().is_empty() {
                println!();
                println!("{}", record.stdout.trim_end());
            }
        }
    }
    if record.status == RunStatus::Failed && !record.stderr.trim().is_empty() {
        eprintln!("{}", record.stderr.trim_end());
    }
}
