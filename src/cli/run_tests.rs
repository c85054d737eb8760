//! Run-tests subcommand: generate a suite of end-to-end test experiments
//! and optionally monitor them to completion.
//!
//! Tests are named by their config files, `config.<name>.yaml`, found
//! anywhere under the test-configs directory. The `--tests` argument may be
//! a list of names, a single name, a suite (`all`, `fundamental`,
//! `comprehensive`) or a file listing names one per line.

use super::generate::nested_overrides;
use super::monitor::monitor_and_summarize;
use crate::experiment::{GenerateOptions, generate_experiment};
use crate::monitor::{
    ExperimentDict, ExperimentRecord, MonitorOptions, RocotoClient, timestamped_name, write_monitor_file,
};
use anyhow::{Context, Result, bail};
use clap::{Args, ValueEnum};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Suites defined by per-machine lists rather than by the configs present.
const MACHINE_SUITES: [&str; 2] = ["fundamental", "comprehensive"];

/// What to do once the experiments are generated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Launch {
    /// Poll the experiments until they finish (default)
    #[default]
    Monitor,
    /// Only write the monitor file
    None,
}

/// Arguments for the run-tests subcommand
#[derive(Args, Debug)]
pub struct RunTestsArgs {
    /// Machine name; see machine/ under the ush directory
    #[arg(short, long)]
    pub machine: String,

    /// Account for submitted jobs
    #[arg(short, long)]
    pub account: String,

    /// Test names, a suite name, or a file listing test names
    #[arg(short, long, num_args = 1.., required = true)]
    pub tests: Vec<String>,

    /// Compiler used to build the app
    #[arg(long, default_value = "intel")]
    pub compiler: String,

    /// EXPT_BASEDIR for every experiment
    #[arg(long = "expt-basedir", value_name = "DIR")]
    pub expt_basedir: Option<PathBuf>,

    /// Directory searched for config.<name>.yaml files
    #[arg(long = "test-configs", default_value = "test_configs", value_name = "DIR")]
    pub test_configs: PathBuf,

    /// Directory holding config_defaults.yaml and machine/
    #[arg(long, default_value = "../../ush", value_name = "DIR")]
    pub ushdir: PathBuf,

    /// Number of experiments polled at once
    #[arg(short, long, default_value_t = 1)]
    pub procs: usize,

    /// Seconds between polling rounds
    #[arg(long, default_value_t = 5)]
    pub interval: u64,

    #[arg(long, value_enum, default_value_t = Launch::Monitor)]
    pub launch: Launch,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,
}

/// Every `config.<name>.yaml` under `dir`, keyed by test name.
///
/// The same name appearing in two places is an error.
pub fn find_test_configs(dir: &Path) -> Result<BTreeMap<String, PathBuf>> {
    fn walk(dir: &Path, found: &mut BTreeMap<String, PathBuf>) -> Result<()> {
        let entries = std::fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))?;
        for entry in entries {
            let path = entry?.path();
            if path.is_dir() {
                walk(&path, found)?;
                continue;
            }
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(name) = file_name
                .strip_prefix("config.")
                .and_then(|n| n.strip_suffix(".yaml"))
            else {
                continue;
            };
            if let Some(previous) = found.insert(name.to_string(), path.clone()) {
                bail!(
                    "test {} is defined twice: {} and {}",
                    name,
                    previous.display(),
                    path.display()
                );
            }
        }
        Ok(())
    }

    let mut found = BTreeMap::new();
    walk(dir, &mut found)?;
    Ok(found)
}

fn read_name_list(path: &Path) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect())
}

/// The most specific machine suite file that exists.
fn suite_file(suites_dir: &Path, suite: &str, machine: &str, compiler: &str) -> Option<PathBuf> {
    [
        format!("{}.{}.{}.nco", suite, machine, compiler),
        format!("{}.{}.{}.com", suite, machine, compiler),
        format!("{}.{}.{}", suite, machine, compiler),
        format!("{}.{}", suite, machine),
        suite.to_string(),
    ]
    .into_iter()
    .map(|name| suites_dir.join(name))
    .find(|path| path.is_file())
}

/// Resolve the `--tests` argument to config files, in the order given.
pub fn resolve_tests(
    configs: &BTreeMap<String, PathBuf>,
    tests: &[String],
    suites_dir: &Path,
    machine: &str,
    compiler: &str,
) -> Result<Vec<(String, PathBuf)>> {
    let names: Vec<String> = match tests {
        [] => bail!("no tests given"),
        [single] if configs.contains_key(single) => vec![single.clone()],
        [single] if single == "all" => configs.keys().cloned().collect(),
        [single] if MACHINE_SUITES.contains(&single.as_str()) => {
            let path = suite_file(suites_dir, single, machine, compiler)
                .with_context(|| format!("no {} suite file under {}", single, suites_dir.display()))?;
            debug!(path = %path.display(), "reading test suite");
            read_name_list(&path)?
        }
        [single] if Path::new(single).is_file() => read_name_list(Path::new(single))?,
        [single] => bail!(
            "'{}' is not a valid test name, test suite, or file containing test names",
            single
        ),
        many => many.to_vec(),
    };

    let missing: Vec<&str> = names
        .iter()
        .filter(|n| !configs.contains_key(*n))
        .map(String::as_str)
        .collect();
    if !missing.is_empty() {
        bail!("could not find test configs for: {}", missing.join(", "));
    }
    Ok(names
        .into_iter()
        .filter_map(|n| configs.get(&n).map(|p| (n, p.clone())))
        .collect())
}

/// Generate every requested test, returning the experiments to monitor.
pub fn generate_tests(args: &RunTestsArgs) -> Result<ExperimentDict> {
    let configs = find_test_configs(&args.test_configs)?;
    let suites_dir = match args.test_configs.parent() {
        Some(parent) => parent.join("machine_suites"),
        None => PathBuf::from("machine_suites"),
    };
    let machine = args.machine.to_ascii_lowercase();
    let tests = resolve_tests(&configs, &args.tests, &suites_dir, &machine, &args.compiler)?;
    info!(
        "will run {} tests:\n{}",
        tests.len(),
        tests.iter().map(|(n, _)| n.as_str()).collect::<Vec<_>>().join("\n")
    );

    let mut dict = ExperimentDict::new();
    for (name, config) in tests {
        let mut pairs = vec![
            format!("user.MACHINE={}", machine),
            format!("user.ACCOUNT={}", args.account),
            format!("workflow.COMPILER={}", args.compiler),
            format!("workflow.EXPT_SUBDIR={}", name),
        ];
        if let Some(basedir) = &args.expt_basedir {
            pairs.push(format!("workflow.EXPT_BASEDIR={}", basedir.display()));
        }
        let mut options = GenerateOptions::new(&args.ushdir, &config);
        options.overrides = nested_overrides(&pairs)?;

        info!(test = %name, "calling workflow generation");
        let expt = generate_experiment(options).with_context(|| format!("failed to generate test {}", name))?;
        info!(test = %name, exptdir = %expt.exptdir.display(), "workflow successfully generated");

        let uses_cron = expt
            .config
            .get_path(&["workflow", "USE_CRON_TO_RELAUNCH"])
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false);
        if uses_cron {
            debug!(test = %name, "relaunched by cron; not monitored");
        } else {
            dict.insert(name, ExperimentRecord::new(expt.exptdir));
        }
    }
    Ok(dict)
}

/// Run the run-tests command.
pub async fn run_tests(args: &RunTestsArgs, client: Arc<dyn RocotoClient>) -> Result<ExperimentDict> {
    let dict = generate_tests(args)?;
    let monitor_file = PathBuf::from(timestamped_name("WE2E_tests", "yaml"));
    if dict.is_empty() {
        info!("no experiments to monitor");
        return Ok(dict);
    }
    match args.launch {
        Launch::None => {
            write_monitor_file(&monitor_file, &dict)?;
            info!(path = %monitor_file.display(), "experiments ready; monitor them later with this file");
            Ok(dict)
        }
        Launch::Monitor => {
            let options = MonitorOptions::new(&monitor_file, client)
                .with_procs(args.procs)
                .with_interval(Duration::from_secs(args.interval));
            let (dict, summary) = monitor_and_summarize(dict, &options).await?;
            info!("all experiments are complete");
            info!(path = %summary.display(), "summary of results available");
            Ok(dict)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn configs(temp: &TempDir) -> BTreeMap<String, PathBuf> {
        let root = temp.path().join("test_configs");
        fs::create_dir_all(root.join("grids_extrn_mdls_suites_community")).unwrap();
        fs::create_dir_all(root.join("wflow_features")).unwrap();
        for (dir, name) in [
            ("grids_extrn_mdls_suites_community", "grid_RRFS_CONUS_25km_ics_FV3GFS_lbcs_FV3GFS_suite_GFS_v16"),
            ("wflow_features", "specify_template_filenames"),
            ("wflow_features", "custom_ESGgrid"),
        ] {
            fs::write(root.join(dir).join(format!("config.{}.yaml", name)), "user: {}\n").unwrap();
        }
        fs::write(root.join("README.md"), "not a config").unwrap();
        find_test_configs(&root).unwrap()
    }

    #[test]
    fn test_find_test_configs() {
        let temp = TempDir::new().unwrap();
        let found = configs(&temp);
        assert_eq!(found.len(), 3);
        assert!(found.contains_key("custom_ESGgrid"));
    }

    #[test]
    fn test_duplicate_test_names() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("test_configs");
        fs::create_dir_all(root.join("a")).unwrap();
        fs::create_dir_all(root.join("b")).unwrap();
        fs::write(root.join("a").join("config.dup.yaml"), "").unwrap();
        fs::write(root.join("b").join("config.dup.yaml"), "").unwrap();
        assert!(find_test_configs(&root).is_err());
    }

    #[test]
    fn test_resolve_names_and_all() {
        let temp = TempDir::new().unwrap();
        let found = configs(&temp);
        let suites = temp.path().join("machine_suites");

        let one = resolve_tests(&found, &["custom_ESGgrid".into()], &suites, "hera", "intel").unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].0, "custom_ESGgrid");

        let all = resolve_tests(&found, &["all".into()], &suites, "hera", "intel").unwrap();
        assert_eq!(all.len(), 3);

        let many = vec!["specify_template_filenames".to_string(), "custom_ESGgrid".to_string()];
        let two = resolve_tests(&found, &many, &suites, "hera", "intel").unwrap();
        assert_eq!(two[0].0, "specify_template_filenames");

        let err = resolve_tests(&found, &["nope".into(), "custom_ESGgrid".into()], &suites, "hera", "intel");
        assert!(err.unwrap_err().to_string().contains("nope"));
    }

    #[test]
    fn test_resolve_machine_suite_prefers_specific_file() {
        let temp = TempDir::new().unwrap();
        let found = configs(&temp);
        let suites = temp.path().join("machine_suites");
        fs::create_dir_all(&suites).unwrap();
        fs::write(suites.join("fundamental"), "custom_ESGgrid\nspecify_template_filenames\n").unwrap();
        fs::write(suites.join("fundamental.hera.intel"), "# hera only\ncustom_ESGgrid\n\n").unwrap();

        let tests = resolve_tests(&found, &["fundamental".into()], &suites, "hera", "intel").unwrap();
        assert_eq!(tests.iter().map(|(n, _)| n.as_str()).collect::<Vec<_>>(), vec!["custom_ESGgrid"]);

        let tests = resolve_tests(&found, &["fundamental".into()], &suites, "jet", "intel").unwrap();
        assert_eq!(tests.len(), 2);
    }

    #[test]
    fn test_resolve_list_file() {
        let temp = TempDir::new().unwrap();
        let found = configs(&temp);
        let list = temp.path().join("my_tests.txt");
        fs::write(&list, "custom_ESGgrid\n").unwrap();
        let tests = resolve_tests(
            &found,
            &[list.display().to_string()],
            &temp.path().join("machine_suites"),
            "hera",
            "intel",
        )
        .unwrap();
        assert_eq!(tests[0].0, "custom_ESGgrid");
    }
}
