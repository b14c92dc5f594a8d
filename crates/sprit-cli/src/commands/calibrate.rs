//! Depth calibration command.

use clap::Args;
use sprit_core::calibration::{PUBLISHED_MODELS, read_calibration_csv};
use sprit_core::{DepthModel, PowerLaw};
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

#[derive(Args)]
pub struct CalibrateArgs {
    /// CSV table of sites with known depth to bedrock
    #[arg(value_name = "CSV", required_unless_present = "list")]
    table: Option<PathBuf>,

    /// Column holding the resonance frequency
    #[arg(long, default_value = "Peak Frequency")]
    freq_column: String,

    /// Column holding the known depth in metres
    #[arg(long, default_value = "Bedrock Depth")]
    depth_column: String,

    /// List the published depth models instead of fitting
    #[arg(long)]
    list: bool,
}

pub fn run(args: CalibrateArgs) -> anyhow::Result<()> {
    if args.list {
        println!("{:<26} {:>9} {:>7}", "Model", "a", "b");
        for (name, a, b) in PUBLISHED_MODELS {
            println!("{name:<26} {a:>9} {b:>7}");
        }
        return Ok(());
    }
    let Some(path) = &args.table else {
        anyhow::bail!("a calibration table is required");
    };

    let file = File::open(path)
        .map_err(|e| anyhow::anyhow!("cannot open '{}': {e}", path.display()))?;
    let reader = BufReader::new(file);
    let pairs = read_calibration_csv(reader, &args.freq_column, &args.depth_column)?;
    println!("Fitting {} calibration point(s)...", pairs.len());
    let law = PowerLaw::fit(&pairs)?;

    println!("\ndepth = {law}");
    println!("\nAdd to a site or batch file:\n");
    let section = toml::to_string_pretty(&DepthModel::PowerLaw(law))?;
    println!("[calibration]\n{section}");
    Ok(())
}
