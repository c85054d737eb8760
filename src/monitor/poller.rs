//! Polling rounds across many experiments.

use super::monitor_file::write_monitor_file;
use super::rocoto::RocotoClient;
use super::status::{ExperimentDict, ExptStatus, update_expt_status};
use crate::error::MonitorError;
use chrono::Local;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// Settings for [`monitor_jobs`].
#[derive(Clone)]
pub struct MonitorOptions {
    pub monitor_file: PathBuf,
    /// Number of experiments polled at once.
    pub procs: usize,
    /// Pause between polling rounds.
    pub interval: Duration,
    pub client: Arc<dyn RocotoClient>,
}

impl MonitorOptions {
    pub fn new(monitor_file: impl Into<PathBuf>, client: Arc<dyn RocotoClient>) -> Self {
        Self {
            monitor_file: monitor_file.into(),
            procs: 1,
            interval: Duration::from_secs(5),
            client,
        }
    }

    pub fn with_procs(mut self, procs: usize) -> Self {
        self.procs = procs.max(1);
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

/// Poll every experiment once, at most `procs` at a time.
///
/// Each experiment is updated on a blocking worker that owns its record;
/// results are gathered when the whole round is done. An experiment whose
/// update fails is marked `ERROR`.
pub async fn update_expt_status_parallel(
    dict: ExperimentDict,
    procs: usize,
    refresh: bool,
    client: Arc<dyn RocotoClient>,
) -> ExperimentDict {
    let semaphore = Arc::new(Semaphore::new(procs.max(1)));
    let mut updated = dict.clone();
    let mut workers = JoinSet::new();

    for (name, mut record) in dict {
        let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
            break;
        };
        let client = Arc::clone(&client);
        workers.spawn_blocking(move || {
            let _permit = permit;
            if let Err(e) = update_expt_status(&mut record, &name, refresh, client.as_ref()) {
                warn!(experiment = %name, error = %e, "status update failed");
                record.status = ExptStatus::Error;
            }
            (name, record)
        });
    }

    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok((name, record)) => {
                updated.insert(name, record);
            }
            Err(e) => error!(error = %e, "status worker did not finish"),
        }
    }
    updated
}

fn active_count(dict: &ExperimentDict) -> usize {
    dict.values().filter(|r| !r.status.is_terminal()).count()
}

/// Drive every experiment until all are `DEAD`, `ERROR` or `COMPLETE`.
///
/// The monitor file is rewritten after every round. Ctrl-C is honored
/// between rounds; in that case the file is written once more (retrying
/// once on failure) and [`MonitorError::Interrupted`] is returned.
pub async fn monitor_jobs(mut dict: ExperimentDict, options: &MonitorOptions) -> Result<ExperimentDict, MonitorError> {
    let start = Local::now();
    info!(path = %options.monitor_file.display(), "writing information for all experiments");
    write_monitor_file(&options.monitor_file, &dict)?;

    info!("checking tests available for monitoring...");
    let mut refresh = true;
    loop {
        dict = update_expt_status_parallel(dict, options.procs, refresh, Arc::clone(&options.client)).await;
        refresh = false;
        write_monitor_file(&options.monitor_file, &dict)?;

        let active = active_count(&dict);
        if active == 0 {
            break;
        }
        info!("{} of {} experiments still active", active, dict.len());

        tokio::select! {
            _ = tokio::time::sleep(options.interval) => {}
            _ = tokio::signal::ctrl_c() => {
                warn!("interrupted; saving monitor file before exiting");
                if let Err(e) = write_monitor_file(&options.monitor_file, &dict) {
                    warn!(error = %e, "retrying monitor file write");
                    write_monitor_file(&options.monitor_file, &dict)?;
                }
                return Err(MonitorError::Interrupted(options.monitor_file.clone()));
            }
        }
    }

    let elapsed = Local::now() - start;
    info!(
        "all {} experiments finished in {}s",
        dict.len(),
        elapsed.num_seconds()
    );
    Ok(dict)
}
