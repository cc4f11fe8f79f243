use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use lskf_limiter::config::{LoggingConfig, Settings};
use lskf_limiter::ratelimit::{delay_for, CounterStore, LskfIdentifier, DELAY_TABLE};
use lskf_limiter::storage::FileCounterStore;

/// Administer persisted LSKF failure counters.
#[derive(Debug, Parser)]
#[command(name = "lskf-limiter", version, about)]
struct Cli {
    /// Configuration file (YAML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the counter directory from the configuration
    #[arg(long, global = true)]
    counter_dir: Option<PathBuf>,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the backoff table
    Delays,
    /// Inspect or modify persisted failure counters
    Counters {
        #[command(subcommand)]
        action: CounterAction,
    },
}

#[derive(Debug, Subcommand)]
enum CounterAction {
    /// List every persisted counter
    List,
    /// Show one counter and the delay it implies after a reboot
    Show(Target),
    /// Reset a counter to zero
    Reset(Target),
    /// Delete the counter of a removed protector
    Remove(Target),
}

#[derive(Debug, Args)]
struct Target {
    /// User id
    #[arg(long, allow_hyphen_values = true)]
    user: i32,

    /// Protector id in hex, with or without a 0x prefix
    #[arg(long, value_parser = parse_protector)]
    protector: u64,
}

impl Target {
    fn id(&self) -> LskfIdentifier {
        LskfIdentifier::new(self.user, self.protector)
    }
}

fn parse_protector(s: &str) -> Result<u64, String> {
    let digits = s.trim_start_matches("0x").trim_start_matches("0X");
    u64::from_str_radix(digits, 16).map_err(|e| format!("invalid protector id {:?}: {}", s, e))
}

/// A persisted counter as printed by the CLI.
#[derive(Debug, Serialize)]
struct CounterReport {
    user_id: i32,
    protector_id: String,
    num_failures: u32,
    /// Delay owed right after a reboot; `None` once no guesses remain
    delay_after_boot_secs: Option<u64>,
}

impl CounterReport {
    fn new(id: LskfIdentifier, num_failures: u32) -> Self {
        Self {
            user_id: id.user_id,
            protector_id: format!("{:016x}", id.protector_id),
            num_failures,
            delay_after_boot_secs: delay_for(num_failures).map(|d| d.as_secs()),
        }
    }
}

impl std::fmt::Display for CounterReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "user={} protector={} failures={} ",
            self.user_id, self.protector_id, self.num_failures
        )?;
        match self.delay_after_boot_secs {
            Some(secs) => write!(f, "delay={}", format_delay(Duration::from_secs(secs))),
            None => write!(f, "delay=no more guesses"),
        }
    }
}

fn format_delay(delay: Duration) -> String {
    let minutes = delay.as_secs() / 60;
    if minutes == 0 {
        "none".to_string()
    } else {
        format!("{}m", minutes)
    }
}

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn print_reports(reports: &[CounterReport], json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(reports)?);
    } else {
        for report in reports {
            println!("{}", report);
        }
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(dir) = cli.counter_dir {
        settings.storage.counter_dir = dir;
    }
    init_tracing(&settings.logging);
    debug!(?settings, "Configuration loaded");

    let store = FileCounterStore::new(&settings.storage.counter_dir);

    match cli.command {
        Command::Delays => {
            if cli.json {
                let secs: Vec<u64> = DELAY_TABLE.iter().map(|d| d.as_secs()).collect();
                println!("{}", serde_json::to_string_pretty(&secs)?);
            } else {
                for (failures, delay) in DELAY_TABLE.iter().enumerate() {
                    println!("{:>2} failures: {}", failures, format_delay(*delay));
                }
                println!("{:>2}+ failures: no more guesses", DELAY_TABLE.len());
            }
        }
        Command::Counters { action } => match action {
            CounterAction::List => {
                let reports: Vec<CounterReport> = store
                    .entries()
                    .context("listing failure counters")?
                    .into_iter()
                    .map(|(id, count)| CounterReport::new(id, count))
                    .collect();
                print_reports(&reports, cli.json)?;
            }
            CounterAction::Show(target) => {
                let id = target.id();
                let count = store.read(&id).with_context(|| format!("reading {}", id))?;
                print_reports(&[CounterReport::new(id, count)], cli.json)?;
            }
            CounterAction::Reset(target) => {
                let id = target.id();
                store.write(&id, 0).with_context(|| format!("resetting {}", id))?;
                info!(lskf = %id, "Failure counter reset");
            }
            CounterAction::Remove(target) => {
                let id = target.id();
                store.remove(&id).with_context(|| format!("removing {}", id))?;
                info!(lskf = %id, "Failure counter removed");
            }
        },
    }

    Ok(())
}
