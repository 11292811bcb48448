use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use continuum_cli::commands::{QueryCommand, ReplayCommand};
use continuum_cli::error::CliResult;
use continuum_cli::output::OutputFormat;

#[derive(Parser)]
#[command(name = "continuum-cli")]
#[command(about = "Continuum CLI - Replay and query recorded memory event logs")]
#[command(version)]
pub struct Cli {
    #[clap(long, short, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    #[clap(about = "Replay an event log and print memory statistics")]
    Replay(ReplayCommand),

    #[clap(about = "Replay an event log, then retrieve entries similar to a query")]
    Query(QueryCommand),
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run() -> CliResult<()> {
    init_logging();

    let cli = Cli::parse();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Table
    };

    match &cli.command {
        Command::Replay(cmd) => cmd.execute(format),
        Command::Query(cmd) => cmd.execute(format),
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,continuum=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
