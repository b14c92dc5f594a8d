//! Synthetic recording generation command.

use clap::Args;
use sprit_core::synthetic::generate;
use sprit_core::{Resonance, SyntheticParams};
use sprit_io::{ChannelOrder, write_record};
use std::path::PathBuf;

#[derive(Args)]
pub struct GenerateArgs {
    /// Output WAV file
    #[arg(value_name = "OUTPUT")]
    output: PathBuf,

    /// Duration in seconds
    #[arg(long, default_value = "600.0")]
    duration: f64,

    /// Sample rate in Hz
    #[arg(long, default_value = "100.0")]
    sample_rate: f64,

    /// Horizontal resonance frequency in Hz
    #[arg(long)]
    resonance: Option<f64>,

    /// Resonance amplification
    #[arg(long, default_value = "4.0", requires = "resonance")]
    amplification: f64,

    /// Random seed
    #[arg(long, default_value = "24301")]
    seed: u64,

    /// Component stored in each WAV channel
    #[arg(long, default_value = "ZNE")]
    channel_order: String,
}

pub fn run(args: GenerateArgs) -> anyhow::Result<()> {
    let order: ChannelOrder = args.channel_order.parse()?;
    let params = SyntheticParams {
        duration: args.duration,
        sample_rate: args.sample_rate,
        seed: args.seed,
        resonance: args.resonance.map(|f| Resonance {
            amplification: args.amplification,
            ..Resonance::at(f)
        }),
        ..SyntheticParams::default()
    };
    let record = generate(&params)?;

    println!(
        "Generating {:.1}s at {} Hz{}",
        args.duration,
        args.sample_rate,
        args.resonance
            .map(|f| format!(" with a {f} Hz resonance"))
            .unwrap_or_default()
    );
    write_record(&args.output, &record, order)?;
    println!("Written to {}", args.output.display());
    Ok(())
}
