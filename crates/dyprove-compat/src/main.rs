use clap::{Parser, Subcommand};
use dyprove_compat::check;
use dyprove_compat::config::Config;
use dyprove_compat::ir::IRModel;
use dyprove_compat::server;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dyprove", version, about = "Symbolic security protocol prover")]
struct Cli {
    /// JSON configuration file with flags, budget and thread count.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command
}

#[derive(Subcommand)]
enum Command {
    /// Evaluate the lemmas of a model.
    Check {
        model: PathBuf,
        /// Only evaluate this lemma.
        #[arg(long)]
        lemma: Option<String>,
        /// Activate a flag, in addition to those of the configuration.
        #[arg(long = "flag")]
        flags: Vec<String>,
        #[arg(long)]
        max_steps: Option<u64>,
        /// Seconds, zero for none.
        #[arg(long)]
        timeout: Option<u64>,
        #[arg(long)]
        max_nodes: Option<usize>,
        /// Print the report as JSON.
        #[arg(long)]
        json: bool
    },
    /// Serve the evaluation API over HTTP.
    Serve {
        #[arg(long, default_value = "127.0.0.1:3000")]
        addr: String
    }
}

fn run(cli: Cli) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default()
    };
    if config.threads > 0 {
        rayon::ThreadPoolBuilder::new().num_threads(config.threads).build_global()?;
    }
    match cli.command {
        Command::Check { model, lemma, flags, max_steps, timeout, max_nodes, json } => {
            config.flags.extend(flags);
            if let Some(n) = max_steps { config.budget.max_steps = n }
            if let Some(t) = timeout { config.budget.timeout_secs = t }
            if let Some(n) = max_nodes { config.budget.max_nodes = n }
            let ir = IRModel::load(&model)?;
            let report = check(&ir, &config, lemma.as_deref())?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", report);
            }
            Ok(if report.has_failures() { ExitCode::FAILURE } else { ExitCode::SUCCESS })
        }
        Command::Serve { addr } => {
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(server::serve(&addr, config))?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
    match run(Cli::parse()) {
        Ok(code) => code,
        Err(err) => {
            error!("{}", err);
            ExitCode::from(2)
        }
    }
}
