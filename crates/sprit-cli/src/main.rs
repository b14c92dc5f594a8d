//! SpRIT CLI - HVSR processing from the command line.

mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "sprit")]
#[command(author, version, about = "HVSR site characterization", long_about = None)]
struct Cli {
    /// Log per-stage detail (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process one site configuration
    Process(commands::process::ProcessArgs),

    /// Process every site of a batch configuration
    Batch(commands::batch::BatchArgs),

    /// Generate a synthetic three-component recording
    Generate(commands::generate::GenerateArgs),

    /// Show or save the default processing parameters
    Params(commands::params::ParamsArgs),

    /// Fit a frequency-to-depth power law from sites of known depth
    Calibrate(commands::calibrate::CalibrateArgs),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    commands::common::init_tracing(cli.verbose);

    match cli.command {
        Commands::Process(args) => commands::process::run(args),
        Commands::Batch(args) => commands::batch::run(args),
        Commands::Generate(args) => commands::generate::run(args),
        Commands::Params(args) => commands::params::run(args),
        Commands::Calibrate(args) => commands::calibrate::run(args),
    }
}
