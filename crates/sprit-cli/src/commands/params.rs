//! Default parameter command.

use clap::Args;
use sprit_config::{default_params_path, ensure_user_config_dir, load_default_params, save_params};
use sprit_core::HvsrParams;
use std::path::PathBuf;

#[derive(Args)]
pub struct ParamsArgs {
    /// Write the parameters to a file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Ignore the user parameter file and show the built-in defaults
    #[arg(long)]
    builtin: bool,

    /// Save the parameters as the user defaults
    #[arg(long, conflicts_with = "output")]
    save_user: bool,
}

pub fn run(args: ParamsArgs) -> anyhow::Result<()> {
    let params = if args.builtin {
        HvsrParams::default()
    } else {
        load_default_params()?
    };

    if args.save_user {
        ensure_user_config_dir()?;
        let path = default_params_path();
        save_params(&params, &path)?;
        println!("Saved user defaults to {}", path.display());
    } else if let Some(path) = &args.output {
        save_params(&params, path)?;
        println!("Parameters written to {}", path.display());
    } else {
        print!("{}", toml::to_string_pretty(&params)?);
    }
    Ok(())
}
