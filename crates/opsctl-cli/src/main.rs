mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::config::ConfigSubcommand;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "opsctl",
    about = "Run, schedule, and observe infrastructure actions",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .opsctl/ or .git/)
    #[arg(long, global = true, env = "OPSCTL_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the default config to .opsctl/config.yaml
    Init,

    /// Start the HTTP API and the scheduler
    Serve {
        /// Port to listen on (default: server.port from config, 0 = OS-assigned)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Execute one action now and print its run record
    Run {
        /// Action id
        action: String,

        /// Target these IPv4 hosts instead of the action's scope (repeatable)
        #[arg(long = "host", value_name = "IP")]
        hosts: Vec<String>,
    },

    /// List the registered actions
    Actions,

    /// Inspect and validate the project configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Serve { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Init => cmd::init::run(&root),
        Commands::Serve { port } => cmd::serve::run(&root, port),
        Commands::Run { action, hosts } => cmd::run::run(&root, &action, hosts, cli.json),
        Commands::Actions => cmd::actions::run(&root, cli.json),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
