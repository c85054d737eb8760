//! Monitor subcommand: poll experiments until they finish, then summarize.

use crate::monitor::{
    ExperimentDict, MonitorOptions, RocotoClient, calculate_core_hours, create_expt_dict, monitor_jobs,
    read_monitor_file, timestamped_name, write_monitor_file, write_summary,
};
use anyhow::{Result, bail};
use clap::Args;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Arguments for the monitor subcommand
#[derive(Args, Debug)]
pub struct MonitorArgs {
    /// Monitor YAML file from an earlier run, or a directory of experiments
    #[arg(value_name = "PATH")]
    pub path: PathBuf,

    /// Number of experiments polled at once
    #[arg(short, long, default_value_t = 1)]
    pub procs: usize,

    /// Seconds between polling rounds
    #[arg(long, default_value_t = 5)]
    pub interval: u64,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,
}

/// Load the experiments to watch and pick the monitor file to keep them in.
pub fn load_experiments(path: &Path) -> Result<(ExperimentDict, PathBuf)> {
    if path.is_dir() {
        let dict = create_expt_dict(path)?;
        if dict.is_empty() {
            bail!("no experiments found under {}", path.display());
        }
        info!(count = dict.len(), dir = %path.display(), "found experiments");
        Ok((dict, PathBuf::from(timestamped_name("WE2E_tests", "yaml"))))
    } else if path.is_file() {
        Ok((read_monitor_file(path)?, path.to_path_buf()))
    } else {
        bail!("{} is neither a monitor file nor a directory", path.display());
    }
}

/// Monitor `dict`, then write core hours back into the monitor file and
/// a summary next to it. Returns the final dictionary and summary path.
pub async fn monitor_and_summarize(
    dict: ExperimentDict,
    options: &MonitorOptions,
) -> Result<(ExperimentDict, PathBuf)> {
    let mut dict = monitor_jobs(dict, options).await?;
    if let Err(e) = calculate_core_hours(&mut dict) {
        warn!(error = %e, "could not calculate core hours");
    }
    write_monitor_file(&options.monitor_file, &dict)?;

    let dir = match options.monitor_file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let (summary, summary_path) = write_summary(&dict, &dir)?;
    println!("{}", summary.table_text());
    info!(path = %summary_path.display(), "detailed summary written");
    Ok((dict, summary_path))
}

/// Run the monitor command.
pub async fn run_monitor(args: &MonitorArgs, client: Arc<dyn RocotoClient>) -> Result<ExperimentDict> {
    let (dict, monitor_file) = load_experiments(&args.path)?;
    let options = MonitorOptions::new(monitor_file, client)
        .with_procs(args.procs)
        .with_interval(Duration::from_secs(args.interval));
    let (dict, _) = monitor_and_summarize(dict, &options).await?;
    Ok(dict)
}
