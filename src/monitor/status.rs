//! Experiment and task status records, and the rules that reduce task
//! states to one experiment status.

use super::db::read_jobs;
use super::rocoto::RocotoClient;
use crate::error::MonitorError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info, warn};

/// File names Rocoto uses inside an experiment directory.
pub const WFLOW_XML: &str = "FV3LAM_wflow.xml";
pub const WFLOW_DB: &str = "FV3LAM_wflow.db";

/// Aggregate status of one experiment.
///
/// `SUCCEEDED`, `STALLED` and `STUCK` form the confirmation chain walked
/// after every tracked job has succeeded but before the experiment is
/// declared `COMPLETE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExptStatus {
    #[default]
    Created,
    Submitting,
    Queued,
    Running,
    Dying,
    Dead,
    Error,
    Succeeded,
    Stalled,
    Stuck,
    Complete,
}

impl ExptStatus {
    /// Experiments in these states are no longer polled.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Dead | Self::Error | Self::Complete)
    }

    pub fn is_confirming(self) -> bool {
        matches!(self, Self::Succeeded | Self::Stalled | Self::Stuck)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Submitting => "SUBMITTING",
            Self::Queued => "QUEUED",
            Self::Running => "RUNNING",
            Self::Dying => "DYING",
            Self::Dead => "DEAD",
            Self::Error => "ERROR",
            Self::Succeeded => "SUCCEEDED",
            Self::Stalled => "STALLED",
            Self::Stuck => "STUCK",
            Self::Complete => "COMPLETE",
        }
    }
}

impl fmt::Display for ExptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for ExptStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let all = [
            Self::Created,
            Self::Submitting,
            Self::Queued,
            Self::Running,
            Self::Dying,
            Self::Dead,
            Self::Error,
            Self::Succeeded,
            Self::Stalled,
            Self::Stuck,
            Self::Complete,
        ];
        all.into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown experiment status '{}'", s))
    }
}

/// One Rocoto job, keyed in [`ExperimentRecord::tasks`] by
/// `<taskname>_<YYYYMMDDHHMM>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub status: String,
    #[serde(default)]
    pub cores: i64,
    #[serde(default)]
    pub walltime: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub core_hours: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exact_count: Option<bool>,
}

/// State of one experiment as persisted in the monitor file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentRecord {
    pub expt_dir: PathBuf,
    #[serde(default)]
    pub status: ExptStatus,
    #[serde(flatten)]
    pub tasks: BTreeMap<String, TaskRecord>,
}

/// All monitored experiments, keyed by experiment name.
pub type ExperimentDict = BTreeMap<String, ExperimentRecord>;

impl ExperimentRecord {
    pub fn new(expt_dir: impl Into<PathBuf>) -> Self {
        Self {
            expt_dir: expt_dir.into(),
            status: ExptStatus::Created,
            tasks: BTreeMap::new(),
        }
    }

    pub fn xml_path(&self) -> PathBuf {
        self.expt_dir.join(WFLOW_XML)
    }

    pub fn db_path(&self) -> PathBuf {
        self.expt_dir.join(WFLOW_DB)
    }
}

/// Reduce task states to an experiment status.
///
/// Returns `None` when there are no states to reduce. The confirmation
/// chain is not applied here; an all-succeeded experiment reduces to
/// `SUCCEEDED`.
pub fn aggregate_status<S: AsRef<str>>(statuses: &[S]) -> Option<ExptStatus> {
    let has = |name: &str| statuses.iter().any(|s| s.as_ref() == name);
    if statuses.is_empty() {
        return None;
    }
    if has("DEAD") {
        let still_live = ["RUNNING", "SUBMITTING", "QUEUED", "FAILED"];
        return Some(if still_live.iter().any(|s| has(s)) {
            ExptStatus::Dying
        } else {
            ExptStatus::Dead
        });
    }
    if has("UNKNOWN") {
        return Some(ExptStatus::Error);
    }
    if has("RUNNING") {
        Some(ExptStatus::Running)
    } else if has("QUEUED") {
        Some(ExptStatus::Queued)
    } else if has("FAILED") || has("SUBMITTING") {
        Some(ExptStatus::Submitting)
    } else if has("SUCCEEDED") {
        Some(ExptStatus::Succeeded)
    } else {
        None
    }
}

/// Task keys listed by `rocotostat` that the record does not track yet.
///
/// Job lines look like `CYCLE TASK JOBID STATE EXIT TRIES DURATION`;
/// dividers (`===`) and the `CYCLE` header are skipped.
pub fn untracked_tasks(record: &ExperimentRecord, rocotostat: &str) -> Vec<String> {
    let mut untracked = Vec::new();
    for line in rocotostat.lines() {
        if line.trim().is_empty() || line.starts_with('=') {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 2 || fields[0] == "CYCLE" {
            continue;
        }
        let key = format!("{}_{}", fields[1], fields[0]);
        if !record.tasks.contains_key(&key) {
            untracked.push(key);
        }
    }
    untracked
}

/// Advance an all-succeeded experiment along the confirmation chain.
fn confirm_complete(record: &mut ExperimentRecord, name: &str, client: &dyn RocotoClient) -> Result<(), MonitorError> {
    let output = client.stat(&record.xml_path(), &record.db_path())?;
    let untracked = untracked_tasks(record, &output);
    if untracked.is_empty() {
        record.status = ExptStatus::Complete;
        return Ok(());
    }
    debug!(experiment = %name, ?untracked, "tasks not yet in the jobs table");
    record.status = match record.status {
        ExptStatus::Succeeded => ExptStatus::Stalled,
        ExptStatus::Stalled => ExptStatus::Stuck,
        _ => {
            warn!(
                experiment = %name,
                count = untracked.len(),
                "all tracked jobs succeeded but rocotostat still lists untracked tasks; check the workflow manually"
            );
            ExptStatus::Error
        }
    };
    Ok(())
}

/// Poll one experiment and update its record in place.
///
/// Runs `rocotorun`, merges the Rocoto jobs table into the task records,
/// runs `rocotorun` again and reduces the task states to an experiment
/// status. Terminal experiments are left alone unless `refresh` is set.
pub fn update_expt_status(
    record: &mut ExperimentRecord,
    name: &str,
    refresh: bool,
    client: &dyn RocotoClient,
) -> Result<(), MonitorError> {
    if record.status.is_terminal() && !refresh {
        return Ok(());
    }

    let xml = record.xml_path();
    let db = record.db_path();
    client.run(&xml, &db)?;

    debug!(experiment = %name, "reading jobs database");
    let jobs = match read_jobs(&db) {
        Ok(jobs) => jobs,
        Err(e) => {
            warn!(experiment = %name, error = %e, "unable to read database; cannot track experiment");
            record.status = ExptStatus::Error;
            return Ok(());
        }
    };
    for job in jobs {
        let key = job.key();
        let entry = record.tasks.entry(key).or_insert_with(|| TaskRecord {
            status: String::new(),
            cores: 0,
            walltime: 0.0,
            core_hours: None,
            exact_count: None,
        });
        entry.status = job.state;
        entry.cores = job.cores;
        entry.walltime = job.duration;
    }

    // A second run keeps rocotobqserver processes from piling up.
    client.run(&xml, &db)?;

    let statuses: Vec<&str> = record.tasks.values().map(|t| t.status.as_str()).collect();
    match aggregate_status(&statuses) {
        Some(ExptStatus::Succeeded) => {
            if record.status.is_confirming() {
                confirm_complete(record, name, client)?;
            } else {
                record.status = ExptStatus::Succeeded;
            }
        }
        Some(status) => record.status = status,
        None if record.status == ExptStatus::Created => {}
        None => return Err(MonitorError::NoStatus(name.to_string())),
    }
    if record.status.is_terminal() {
        info!(experiment = %name, status = %record.status, "experiment finished");
    }
    Ok(())
}

/// True if `path` holds a Rocoto experiment.
pub fn is_experiment_dir(path: &Path) -> bool {
    path.is_dir() && path.join(WFLOW_XML).is_file()
}
