use clap::{Parser, Subcommand, ValueEnum};
use taskflow::actions::demos;
use taskflow::compiler::core::FlowCompiler;
use taskflow::config::{EngineConfig, FailurePolicy};
use taskflow::runtime::engine::FlowExecutor;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use anyhow::Result;
use tracing::{info, error};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum PolicyArg {
    FailFast,
    Continue,
}

impl From<PolicyArg> for FailurePolicy {
    fn from(p: PolicyArg) -> Self {
        match p {
            PolicyArg::FailFast => FailurePolicy::FailFast,
            PolicyArg::Continue => FailurePolicy::ContinueAndRecord,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run a flow file and print the final results store as JSON
    Run {
        /// Path to the flow YAML file
        #[arg(long, short)]
        file: PathBuf,

        /// Initial data (key=value), merged over the file's `initial` section
        #[arg(long, short = 'D', value_parser = parse_var)]
        vars: Vec<(String, Value)>,

        /// Engine config YAML used when the flow file has no `engine` section
        #[arg(long)]
        config: Option<PathBuf>,

        /// Failure policy override
        #[arg(long, value_enum)]
        policy: Option<PolicyArg>,

        /// Worker threads for thread-isolated tasks
        #[arg(long)]
        threads: Option<usize>,

        /// Worker processes for process-isolated tasks
        #[arg(long)]
        processes: Option<usize>,

        /// Worker executable for process-isolated tasks
        #[arg(long)]
        worker: Option<PathBuf>,
    },

    /// List the units this binary can load by path
    Units,
}

/// `key=value`, where the value is read as a YAML scalar (`5`, `true`,
/// `[1, 2]`) and kept as a plain string when it is not one.
fn parse_var(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw.split_once('=')
        .ok_or_else(|| format!("expected key=value, got `{}`", raw))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("missing key in `{}`", raw));
    }
    let value = match serde_yaml::from_str::<Value>(value) {
        Ok(parsed) if !value.trim().is_empty() => parsed,
        _ => Value::String(value.to_string()),
    };
    Ok((key.to_string(), value))
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries the results store
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();
    let cli = Cli::parse();
    let catalog = Arc::new(demos::catalog());

    match cli.command {
        Commands::Units => {
            for path in catalog.paths() {
                println!("{}", path);
            }
        }
        Commands::Run { file, vars, config, policy, threads, processes, worker } => {
            let defaults = match config {
                Some(path) => EngineConfig::from_yaml_file(&path)?,
                None => EngineConfig::default(),
            };

            let compiled = FlowCompiler::new(catalog).with_defaults(defaults).compile_file(&file)?;

            let mut engine_config = compiled.config;
            if let Some(p) = policy {
                engine_config.policy = p.into();
            }
            if let Some(n) = threads {
                engine_config.thread_workers = n;
            }
            if let Some(n) = processes {
                engine_config.process_workers = n;
            }
            if let Some(w) = worker {
                engine_config.worker_program = Some(w);
            }

            let mut initial = compiled.initial;
            initial.extend(vars);

            let executor = FlowExecutor::new(compiled.resolver, engine_config);
            info!(flow = %compiled.id, policy = ?executor.config().policy, "Running flow '{}'", compiled.name);
            let outcome = executor.run(&compiled.flow, initial).await;
            executor.shutdown().await;

            match outcome.into_result() {
                Ok(store) => {
                    println!("{}", serde_json::to_string_pretty(&store)?);
                    info!("Flow '{}' completed", compiled.name);
                }
                Err((store, e)) => {
                    println!("{}", serde_json::to_string_pretty(&store)?);
                    error!("Flow '{}' aborted: {}", compiled.name, e);
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}
