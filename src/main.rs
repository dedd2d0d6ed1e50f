use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use gerrit_watcher::config::{LoggingConfig, WatcherConfig};
use gerrit_watcher::ledger::{self, RunRecord};
use gerrit_watcher::{scheduler, version};

#[derive(Parser)]
#[command(
    name = "gerrit-watcher",
    about = "Gerrit patch-set watcher: runs sandboxed tests and reports back to review",
    version,
    long_about = None
)]
struct Cli {
    /// Config file (default: $GERRIT_WATCHER_CONFIG, then /etc/gerrit-watcher/gerrit-watcher.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the daemon (event dispatcher + health checks + status page)
    Serve {
        /// Bind address, overrides `[http] bind`
        #[arg(long, env = "GERRIT_WATCHER_BIND")]
        bind: Option<String>,
    },

    /// Print the run ledger, newest first
    Runs {
        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Inspect scheduled health checks
    Schedule {
        #[command(subcommand)]
        action: ScheduleAction,
    },

    /// Check whether a branch is new enough to be tested
    Eligible {
        /// Branch name, e.g. `5.12` or `dev`
        branch: String,
    },
}

#[derive(Subcommand)]
enum ScheduleAction {
    /// Preview what will run in the next N hours
    DryRun {
        /// Hours to preview
        #[arg(long, default_value = "24")]
        hours: u64,
    },
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));
    // stdout carries command output (`runs --json`); logs go to stderr.
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Resolve the configuration and start logging with its settings.
///
/// Config loading logs through a temporary stderr subscriber, since the
/// configured one does not exist yet.
fn setup(config_path: Option<&Path>) -> Result<WatcherConfig> {
    let bootstrap = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .finish();
    let config = tracing::subscriber::with_default(bootstrap, || {
        WatcherConfig::resolve(config_path)
    })?;
    init_tracing(&config.logging);
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { bind } => {
            let mut config = setup(cli.config.as_deref())?;
            if let Some(bind) = bind {
                config.http.bind = bind;
            }
            tracing::info!(bind = %config.http.bind, "starting gerrit-watcher daemon");
            gerrit_watcher::serve(config).await?;
        }
        Commands::Runs { json } => {
            let config = setup(cli.config.as_deref())?;
            let mut runs = ledger::store::read(&config.storage.ledger_path).await?;
            runs.reverse();
            if json {
                println!("{}", serde_json::to_string_pretty(&runs)?);
            } else {
                print_runs(&runs);
            }
        }
        Commands::Schedule { action } => {
            let config = setup(cli.config.as_deref())?;
            match action {
                ScheduleAction::DryRun { hours } => {
                    let checks = scheduler::health_checks(&config)?;
                    let upcoming = scheduler::preview(&checks, &chrono::Local::now(), hours);
                    println!("Upcoming health checks in the next {} hours:", hours);
                    if upcoming.is_empty() {
                        println!("  (none)");
                    }
                    for (time, revision) in upcoming {
                        println!("  {} -> {}", time.format("%Y-%m-%d %H:%M:%S"), revision);
                    }
                }
            }
        }
        Commands::Eligible { branch } => {
            match version::parse(&branch) {
                Some(v) => println!("{}: version {}", branch, v),
                None => println!("{}: no version", branch),
            }
            if version::is_eligible(&branch) {
                println!("eligible");
            } else {
                println!("not eligible");
            }
        }
    }

    Ok(())
}

fn print_runs(runs: &[RunRecord]) {
    if runs.is_empty() {
        println!("No runs recorded.");
        return;
    }
    println!(
        "{:<16} | {:<8} | {:<4} | {:<36} | Title",
        "Started", "Status", "Exit", "Run"
    );
    println!("{:-<16}-|-{:-<8}-|-{:-<4}-|-{:-<36}-|-{:-<30}", "", "", "", "", "");
    for run in runs {
        let started = run
            .started_at
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        let exit = run.exit_code.map(|c| c.to_string()).unwrap_or_default();
        println!(
            "{:<16} | {:<8} | {:<4} | {:<36} | {}",
            started,
            run.status.as_str(),
            exit,
            run.run_id,
            run.title
        );
    }
}
