//! Batch processing command.

use super::common::format_f0;
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use sprit_config::BatchConfig;
use sprit_core::report::export_summary_csv;
use sprit_io::WavLoader;
use std::path::PathBuf;

#[derive(Args)]
pub struct BatchArgs {
    /// Batch configuration (TOML)
    #[arg(value_name = "BATCH")]
    config: PathBuf,

    /// Write the per-site summary table as CSV
    #[arg(long, value_name = "FILE")]
    csv: Option<PathBuf>,
}

pub fn run(args: BatchArgs) -> anyhow::Result<()> {
    let batch = BatchConfig::load(&args.config)?;
    let resolved = batch.resolve()?;
    if !resolved.rejected.is_empty() {
        println!("{} site(s) rejected by validation", resolved.rejected.len());
    }
    println!("Processing {} site(s)...", resolved.len());

    let pb = ProgressBar::new(resolved.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("##-"),
    );
    let result = resolved.run(&WavLoader::new(), &batch.defaults, |outcome| {
        pb.set_message(outcome.metadata.site.clone());
        pb.inc(1);
    });
    pb.finish_and_clear();

    println!("\nResults:");
    for outcome in &result.outcomes {
        match &outcome.result {
            Ok(r) => {
                let row = r.summary_row();
                let verdict = if row.peak_passes { "pass" } else { "fail" };
                let depth = row.depth.map(|d| format!("  {d:.1} m")).unwrap_or_default();
                println!(
                    "  {:<16} {:>12}  {}{}",
                    outcome.metadata.site,
                    format_f0(row.peak_frequency),
                    verdict,
                    depth
                );
            }
            Err(e) => println!("  {:<16} FAILED: {e}", outcome.metadata.site),
        }
    }
    println!(
        "\n{} succeeded, {} failed",
        result.succeeded().count(),
        result.failed().count()
    );

    if let Some(path) = &args.csv {
        export_summary_csv(path, &result.summary_rows())?;
        println!("Summary written to {}", path.display());
    }

    if result.all_failed() {
        anyhow::bail!("all {} sites failed", result.outcomes.len());
    }
    Ok(())
}
