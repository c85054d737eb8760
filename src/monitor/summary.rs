//! Core-hour accounting and the end-of-run summary report.

use super::monitor_file::timestamped_name;
use super::status::{ExperimentDict, ExptStatus};
use crate::config::formats::{ConfigFormat, shell::ShellFormat};
use crate::config::value::flatten;
use crate::error::{ConfigError, ConfigResult};
use regex_lite::Regex;
use serde_json::Value;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

pub const REPORT_WIDTH: usize = 100;

/// Length of `_YYYYMMDDHHMM` at the end of a task key.
const CYCLE_SUFFIX_LEN: usize = 13;

/// Task name for a task key, with cycle, ensemble member and forecast hour
/// suffixes removed.
pub fn base_task_name(key: &str) -> String {
    let name = if key.len() > CYCLE_SUFFIX_LEN {
        key.get(..key.len() - CYCLE_SUFFIX_LEN).unwrap_or(key)
    } else {
        key
    };
    let mut name = name.to_string();
    for pattern in [r"_mem\d{3}", r"_f\d{3}"] {
        if let Ok(re) = Regex::new(pattern) {
            name = re.replace_all(&name, "").into_owned();
        }
    }
    name
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Fill in `core_hours` for every task from each experiment's `var_defns.sh`.
///
/// With `NNODES_<TASK>` known, a task is charged for whole nodes
/// (`NCORES_PER_NODE * nodes * hours`) and marked `exact_count`. Otherwise
/// the job's own core count is used, which may undercount.
pub fn calculate_core_hours(dict: &mut ExperimentDict) -> ConfigResult<()> {
    for record in dict.values_mut() {
        let var_defns = record.expt_dir.join("var_defns.sh");
        let vars = flatten(&ShellFormat.load(&var_defns)?);
        let cores_per_node = vars
            .get("NCORES_PER_NODE")
            .and_then(as_f64)
            .ok_or_else(|| ConfigError::MissingMandatory("NCORES_PER_NODE".to_string()))?;

        for (key, task) in record.tasks.iter_mut() {
            let nnodes_var = format!("NNODES_{}", base_task_name(key).to_uppercase());
            let hours = task.walltime / 3600.0;
            let (core_hours, exact) = match vars.get(&nnodes_var).and_then(as_f64) {
                Some(nnodes) => (cores_per_node * nnodes * hours, true),
                None => (task.cores as f64 * hours, false),
            };
            task.core_hours = Some((core_hours * 100.0).round() / 100.0);
            task.exact_count = Some(exact);
        }
    }
    Ok(())
}

/// Overall status of a set of experiments.
pub fn total_status(dict: &ExperimentDict) -> &'static str {
    let has = |s: ExptStatus| dict.values().any(|r| r.status == s);
    if has(ExptStatus::Error) {
        "ERROR"
    } else if has(ExptStatus::Dead) {
        "DEAD"
    } else if has(ExptStatus::Complete) {
        "COMPLETE"
    } else {
        "UNKNOWN"
    }
}

fn truncate(s: &str, width: usize) -> String {
    s.chars().take(width).collect()
}

/// The summary table and per-experiment details.
#[derive(Debug, Clone, Default)]
pub struct Summary {
    pub table: Vec<String>,
    pub details: Vec<String>,
    pub total_core_hours: f64,
}

impl Summary {
    pub fn from_dict(dict: &ExperimentDict) -> Self {
        let rule = "-".repeat(REPORT_WIDTH);
        let mut table = vec![
            rule.clone(),
            format!("Experiment name {} | Status    | Core hours used ", " ".repeat(43)),
            rule.clone(),
        ];
        let mut details = Vec::new();
        let mut total = 0.0;

        for (name, record) in dict {
            let status = record.status.as_str();
            let mut expt_hours = 0.0;
            details.push(String::new());
            details.push(rule.clone());
            details.push(format!("Detailed summary of experiment {}", name));
            details.push(format!("{} | Status    | Walltime   | Core hours used", " ".repeat(40)));
            details.push(rule.clone());

            for (key, task) in &record.tasks {
                let mut line = format!("{:<40}  {:<12} {:>10.1}", truncate(key, 40), task.status, task.walltime);
                match task.core_hours {
                    Some(hours) => {
                        expt_hours += hours;
                        let _ = write!(line, "  {:>13.2}", hours);
                    }
                    None => line.push_str("            -"),
                }
                details.push(line);
            }
            details.push(rule.clone());
            details.push(format!(
                "Total {}  {:<12} {} {:>13.2}",
                " ".repeat(34),
                status,
                " ".repeat(11),
                expt_hours
            ));
            table.push(format!("{:<60}  {:<12}  {:>13.2}", truncate(name, 60), status, expt_hours));
            total += expt_hours;
        }
        table.push(rule);
        table.push(format!(
            "Total {}  {:<12}  {:>13.2}",
            " ".repeat(54),
            total_status(dict),
            total
        ));

        Self {
            table,
            details,
            total_core_hours: total,
        }
    }

    /// The table alone, as printed to the terminal.
    pub fn table_text(&self) -> String {
        self.table.iter().map(|l| format!("{}\n", l)).collect()
    }

    /// Write table and details to `WE2E_summary_<timestamp>.txt` in `dir`.
    pub fn write_to(&self, dir: &Path) -> std::io::Result<PathBuf> {
        let path = dir.join(timestamped_name("WE2E_summary", "txt"));
        let mut text = self.table_text();
        text.push_str("\nDetailed summary of each experiment:\n");
        for line in &self.details {
            text.push_str(line);
            text.push('\n');
        }
        std::fs::write(&path, text)?;
        Ok(path)
    }
}

/// Build the summary for `dict` and write it under `dir`.
pub fn write_summary(dict: &ExperimentDict, dir: &Path) -> std::io::Result<(Summary, PathBuf)> {
    let summary = Summary::from_dict(dict);
    let path = summary.write_to(dir)?;
    Ok((summary, path))
}
