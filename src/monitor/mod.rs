//! Experiment monitoring.
//!
//! Experiments are advanced with `rocotorun` and their progress read back
//! from the Rocoto jobs database. Per-task state lives in a YAML monitor
//! file that is rewritten after every polling round, so a restarted monitor
//! picks up where the last one stopped.

pub mod db;
pub mod monitor_file;
pub mod poller;
pub mod rocoto;
pub mod status;
pub mod summary;

pub use db::{JobRow, read_jobs};
pub use monitor_file::{create_expt_dict, read_monitor_file, timestamped_name, write_monitor_file};
pub use poller::{MonitorOptions, monitor_jobs, update_expt_status_parallel};
pub use rocoto::{RocotoClient, SystemRocoto};
pub use status::{
    ExperimentDict, ExperimentRecord, ExptStatus, TaskRecord, WFLOW_DB, WFLOW_XML, aggregate_status,
    update_expt_status,
};
pub use summary::{Summary, calculate_core_hours, write_summary};
