//! hemsim CLI - run microsimulations from JSON configuration files
//!
//! Results are printed to stdout as JSON; logs go to stderr. The log filter
//! is read from `HEMSIM_LOG`, then `RUST_LOG`, defaulting to `info`.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use hemsim_core::api::dispatch;
use hemsim_core::config::{KeySpec, INPUT_KEYS, SETTING_KEYS};
use hemsim_core::{ConfigFile, OutputStatistic, RunParams, SampleSpec, Session};
use serde::Deserialize;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hemsim")]
#[command(about = "Health-economic discrete-event microsimulation")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full session lifecycle and print the output summary
    Run {
        /// JSON file with `inputs` and `settings` maps
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Simulate only the first N agents
        #[arg(long)]
        max_agents: Option<usize>,

        /// Print the extended output (per-agent rows, event tables)
        #[arg(long)]
        extended: bool,
    },
    /// Sample an output statistic over independent replicates
    Sample {
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Statistic name, e.g. mean_cost or deaths
        #[arg(short, long)]
        statistic: OutputStatistic,

        /// Number of replicates
        #[arg(short = 'n', long, default_value_t = 100)]
        replicates: usize,

        /// Seed of the first replicate (defaults to the `seed` setting)
        #[arg(long)]
        base_seed: Option<u64>,
    },
    /// List every input and setting key with its default
    Keys,
    /// Execute a JSON array of `{"call": name, "args": [...]}` against one session
    Script {
        #[arg(value_name = "FILE")]
        path: PathBuf,
    },
}

/// One entry of a call script
#[derive(Debug, Deserialize)]
struct ScriptCall {
    call: String,
    #[serde(default)]
    args: Vec<Value>,
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("HEMSIM_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_session(config: Option<&Path>) -> Result<Session> {
    let mut session = Session::new();
    if let Some(path) = config {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let file: ConfigFile = serde_json::from_str(&text)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        session
            .configure(&file)
            .with_context(|| format!("invalid config {}", path.display()))?;
        info!(path = %path.display(), "configuration loaded");
    }
    Ok(session)
}

fn describe_keys(table: &[KeySpec]) -> Vec<Value> {
    table
        .iter()
        .map(|spec| {
            serde_json::json!({
                "name": spec.name,
                "default": spec.default,
                "description": spec.description,
            })
        })
        .collect()
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            max_agents,
            extended,
        } => {
            let mut session = load_session(config.as_deref())?;
            session.init_session();

            let outcome = run_lifecycle(&mut session, RunParams { max_agents }, extended);
            if outcome.is_err() {
                session.deallocate_resources2();
            } else {
                session.deallocate_resources();
            }
            print_json(&outcome?)?;
        }
        Commands::Sample {
            config,
            statistic,
            replicates,
            base_seed,
        } => {
            let session = load_session(config.as_deref())?;
            let spec = SampleSpec {
                statistic,
                base_seed,
            };
            let sample = session
                .get_sample_output(&spec, replicates)
                .context("sampling failed")?;
            print_json(&sample)?;
        }
        Commands::Keys => {
            print_json(&serde_json::json!({
                "settings": describe_keys(SETTING_KEYS),
                "inputs": describe_keys(INPUT_KEYS),
            }))?;
        }
        Commands::Script { path } => {
            let text = fs::read_to_string(&path)
                .with_context(|| format!("failed to read script {}", path.display()))?;
            let calls: Vec<ScriptCall> = serde_json::from_str(&text)
                .with_context(|| format!("failed to parse script {}", path.display()))?;

            let mut session = Session::new();
            for (step, entry) in calls.iter().enumerate() {
                let result = dispatch(&mut session, &entry.call, &entry.args)
                    .with_context(|| format!("step {} ({}) failed", step, entry.call));
                match result {
                    Ok(value) => print_json(&serde_json::json!({
                        "step": step,
                        "call": entry.call,
                        "result": value,
                    }))?,
                    Err(err) => {
                        session.deallocate_resources2();
                        return Err(err);
                    }
                }
            }
        }
    }

    Ok(())
}

fn run_lifecycle(session: &mut Session, params: RunParams, extended: bool) -> Result<Value> {
    session.allocate_resources()?;
    let agents = session.create_agents()?;
    if agents == 0 {
        bail!("population_size is zero; nothing to simulate");
    }
    let status = session.model(params)?;
    info!(
        simulated = status.agents_simulated,
        failed = status.agents_failed,
        "run complete"
    );

    let value = if extended {
        serde_json::to_value(session.get_output_ex()?)?
    } else {
        serde_json::to_value(session.get_output()?)?
    };
    Ok(value)
}
