mod config;
mod display;
mod handoff_log;
mod relay;
mod sound;
mod watcher;

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Watches a relay file and announces when coding agents hand work to
/// each other: a tone, a console banner, and a log entry per handoff.
#[derive(Parser, Debug)]
#[command(name = "agent-relay", version, about)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "relay.toml")]
    config: PathBuf,

    /// Relay file to watch (overrides config)
    #[arg(short, long)]
    relay: Option<PathBuf>,

    /// Handoff log file (overrides config)
    #[arg(short, long)]
    log: Option<PathBuf>,

    /// Seconds between checks (overrides config)
    #[arg(short, long)]
    interval: Option<u64>,

    /// Disable alert tones
    #[arg(long)]
    mute: bool,

    /// Redraw without clearing the terminal
    #[arg(long)]
    no_clear: bool,

    /// Render the current relay file once and exit
    #[arg(long)]
    status: bool,

    /// Validate config and print resolved settings, don't run
    #[arg(long)]
    dry_run: bool,

    /// Debug-level diagnostics on stderr
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    tracing::debug!(?cli, "parsed CLI arguments");

    let mut config = match config::load_config(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };
    config.apply_overrides(config::Overrides {
        relay_file: cli.relay,
        log_file: cli.log,
        check_interval_secs: cli.interval,
        mute: cli.mute,
        no_clear: cli.no_clear,
    });
    if let Err(e) = config.validate() {
        eprintln!("Error: {e}");
        return ExitCode::FAILURE;
    }

    if cli.dry_run {
        match toml::to_string_pretty(&config) {
            Ok(resolved) => {
                println!("Dry run: config validated, not watching.\n");
                println!("{resolved}");
                return ExitCode::SUCCESS;
            }
            Err(e) => {
                eprintln!("Error: failed to render config: {e}");
                return ExitCode::FAILURE;
            }
        }
    }

    if cli.status {
        return match relay::read_relay(&config.relay.file) {
            Ok(status) => {
                print!(
                    "{}",
                    display::render_status(&status, &config.agents, config.display.truncate_at)
                );
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("Error: {e}");
                ExitCode::FAILURE
            }
        };
    }

    tracing::info!(
        relay = %config.relay.file.display(),
        log = %config.relay.log_file.display(),
        interval_secs = config.relay.check_interval_secs,
        "agent-relay starting"
    );

    let emitter = sound::build_emitter(&config.sound);
    let mut monitor = watcher::Monitor::new(config, emitter, std::io::stdout());
    match monitor.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: console output failed: {e}");
            ExitCode::FAILURE
        }
    }
}
