//! Single-site processing command.

use super::common::write_file;
use clap::Args;
use sprit_config::SiteConfig;
use sprit_core::process_site;
use sprit_core::report::write_curve_csv;
use sprit_io::read_record;
use std::path::PathBuf;

#[derive(Args)]
pub struct ProcessArgs {
    /// Site configuration (TOML)
    #[arg(value_name = "SITE")]
    config: PathBuf,

    /// Write the HVSR curve and its envelopes as CSV
    #[arg(long, value_name = "FILE")]
    csv: Option<PathBuf>,

    /// Write the full result as JSON
    #[arg(long, value_name = "FILE")]
    json: Option<PathBuf>,
}

pub fn run(args: ProcessArgs) -> anyhow::Result<()> {
    let site = SiteConfig::load(&args.config)?;
    site.validate()?;

    let source = site.data.source(&site.site.site)?;
    println!("Reading {}...", source.path.display());
    let record = read_record(&source.path, source.channel_order, source.start_time)?;
    println!(
        "  {} samples, {} Hz, {:.1}s",
        record.len(),
        record.sample_rate(),
        record.duration()
    );

    let result = process_site(&site.input(record), &site.params)?;
    println!();
    print!("{}", result.text_report());

    if let Some(path) = &args.csv {
        write_file(path, |out| write_curve_csv(out, &result.curve))?;
        println!("\nCurve written to {}", path.display());
    }
    if let Some(path) = &args.json {
        write_file(path, |out| {
            serde_json::to_writer_pretty(&mut *out, &result).map_err(std::io::Error::other)
        })?;
        println!("Result written to {}", path.display());
    }

    Ok(())
}
