//! Generate subcommand: build an experiment directory.

use crate::config::Config;
use crate::experiment::{Experiment, GenerateOptions, generate_experiment};
use crate::template::parse_key_value_pairs;
use anyhow::{Result, anyhow};
use clap::Args;
use serde_json::{Map, Value};
use std::path::PathBuf;
use tracing::info;

/// Arguments for the generate subcommand
#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// Directory holding config_defaults.yaml and machine/
    #[arg(long, default_value = ".", value_name = "DIR")]
    pub ushdir: PathBuf,

    /// Experiment config file
    #[arg(long = "user-config", default_value = "config.yaml", value_name = "FILE")]
    pub user_config: PathBuf,

    /// Settings applied last, as SECTION.KEY=VALUE
    #[arg(value_name = "SECTION.KEY=VALUE")]
    pub overrides: Vec<String>,
}

/// Turn `section.key=value` pairs into a nested mapping.
pub fn nested_overrides(pairs: &[String]) -> Result<Map<String, Value>> {
    let flat = parse_key_value_pairs(pairs).map_err(|pair| anyhow!("'{}' is not a KEY=VALUE pair", pair))?;
    let mut nested = Config::default();
    for (key, value) in flat {
        let parts: Vec<&str> = key.split('.').collect();
        nested.set_path(&parts, value);
    }
    Ok(nested.into_map())
}

/// Run the generate command.
pub fn run_generate(args: &GenerateArgs) -> Result<Experiment> {
    let mut options = GenerateOptions::new(&args.ushdir, &args.user_config);
    options.overrides = nested_overrides(&args.overrides)?;
    let expt = generate_experiment(options)?;
    info!(
        "experiment generation completed; the experiment directory is:\n\n  EXPTDIR=\"{}\"\n",
        expt.exptdir.display()
    );
    Ok(expt)
}
