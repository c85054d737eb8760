//! The YAML monitor file shared between polling rounds.

use super::status::{ExperimentDict, ExperimentRecord, is_experiment_dir};
use crate::error::MonitorError;
use chrono::Local;
use std::path::{Path, PathBuf};
use tracing::{debug, error};

const HEADER: &str = "\
### WARNING ###
### THIS FILE IS AUTO_GENERATED AND REGULARLY OVER-WRITTEN BY WORKFLOW SCRIPTS
### EDITS MAY RESULT IN MISBEHAVIOR OF EXPERIMENTS RUNNING
";

/// Timestamped file name such as `monitor_jobs_20240101120000.yaml`.
pub fn timestamped_name(prefix: &str, extension: &str) -> String {
    format!("{}_{}.{}", prefix, Local::now().format("%Y%m%d%H%M%S"), extension)
}

/// Write the warning header followed by the experiment dictionary.
pub fn write_monitor_file(path: &Path, dict: &ExperimentDict) -> Result<(), MonitorError> {
    let body = serde_yaml::to_string(dict).map_err(|e| MonitorError::MonitorFile {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    if let Err(e) = std::fs::write(path, format!("{}{}", HEADER, body)) {
        error!(
            path = %path.display(),
            "failure occurred while writing monitor file; it may be corrupt or invalid for re-run"
        );
        return Err(e.into());
    }
    debug!(path = %path.display(), "monitor file written");
    Ok(())
}

pub fn read_monitor_file(path: &Path) -> Result<ExperimentDict, MonitorError> {
    let text = std::fs::read_to_string(path)?;
    serde_yaml::from_str(&text).map_err(|e| MonitorError::MonitorFile {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Skeleton dictionary for every experiment directly under `dir`.
///
/// Subdirectories without a workflow XML are skipped. Every experiment
/// starts as `CREATED`.
pub fn create_expt_dict(dir: &Path) -> Result<ExperimentDict, MonitorError> {
    let mut dict = ExperimentDict::new();
    for entry in std::fs::read_dir(dir)? {
        let path: PathBuf = entry?.path();
        let name = match path.file_name() {
            Some(name) => name.to_string_lossy().to_string(),
            None => continue,
        };
        if !path.is_dir() {
            continue;
        }
        if is_experiment_dir(&path) {
            dict.insert(name, ExperimentRecord::new(path));
        } else {
            debug!(directory = %name, "skipping directory, experiment XML file not found");
        }
    }
    Ok(dict)
}
