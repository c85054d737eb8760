//! Experiment generation.
//!
//! Loads the tiered experiment configuration, prepares the experiment
//! directory and writes the three artifacts Rocoto and the job scripts
//! need: the workflow XML, the rocoto YAML it was built from, and the
//! `var_defns.sh` variable-definitions file.

use crate::config::{Config, ConfigLoader, ConfigPaths, FileFormat, VariableSource};
use crate::error::{ConfigError, GenerateError};
use crate::preexist::{PreexistPolicy, check_for_preexist_dir_file};
use crate::rocoto::{create_xml, prepare_tasks};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const DEFAULT_WFLOW_XML_FN: &str = "FV3LAM_wflow.xml";
pub const DEFAULT_ROCOTO_YAML_FN: &str = "rocoto_defns.yaml";
pub const DEFAULT_VAR_DEFNS_FN: &str = "var_defns.sh";

/// Inputs to [`generate_experiment`].
pub struct GenerateOptions {
    pub ushdir: PathBuf,
    pub user_config: PathBuf,
    pub overrides: Map<String, Value>,
    /// Overrides `workflow.PREEXISTING_DIR_METHOD` when set.
    pub preexist: Option<PreexistPolicy>,
    pub source: Option<Box<dyn VariableSource>>,
}

impl GenerateOptions {
    pub fn new(ushdir: impl Into<PathBuf>, user_config: impl Into<PathBuf>) -> Self {
        Self {
            ushdir: ushdir.into(),
            user_config: user_config.into(),
            overrides: Map::new(),
            preexist: None,
            source: None,
        }
    }
}

/// Paths written for a generated experiment.
#[derive(Debug, Clone)]
pub struct Experiment {
    pub exptdir: PathBuf,
    pub wflow_xml: PathBuf,
    pub rocoto_yaml: PathBuf,
    pub var_defns: PathBuf,
    pub config: Config,
}

fn workflow_str<'c>(config: &'c Config, key: &str) -> Option<&'c str> {
    config.get_str(&["workflow", key]).filter(|s| !s.is_empty())
}

/// Where a workflow file goes: an explicit full path, or a file name in
/// the experiment directory.
fn artifact_path(config: &Config, exptdir: &Path, fp_key: &str, fn_key: &str, default: &str) -> PathBuf {
    if let Some(path) = workflow_str(config, fp_key) {
        return PathBuf::from(path);
    }
    exptdir.join(workflow_str(config, fn_key).unwrap_or(default))
}

fn write(path: &Path, text: &str) -> Result<(), GenerateError> {
    std::fs::write(path, text).map_err(|source| GenerateError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Build an experiment directory from layered configuration.
pub fn generate_experiment(options: GenerateOptions) -> Result<Experiment, GenerateError> {
    info!("starting experiment generation");
    let mut loader = ConfigLoader::new(ConfigPaths::from_ushdir(&options.ushdir, &options.user_config))
        .with_overrides(options.overrides);
    if let Some(source) = options.source {
        loader = loader.with_source(source);
    }
    let mut config = loader.load()?;

    let exptdir = match workflow_str(&config, "EXPTDIR") {
        Some(dir) => PathBuf::from(dir),
        None => {
            let base = workflow_str(&config, "EXPT_BASEDIR").unwrap_or_default();
            let subdir = workflow_str(&config, "EXPT_SUBDIR")
                .ok_or_else(|| ConfigError::MissingMandatory("EXPT_SUBDIR".to_string()))?;
            Path::new(base).join(subdir)
        }
    };
    config.set_path(&["workflow", "EXPTDIR"], Value::String(exptdir.display().to_string()));

    let policy = match options.preexist {
        Some(policy) => policy,
        None => workflow_str(&config, "PREEXISTING_DIR_METHOD")
            .map(str::parse)
            .transpose()
            .map_err(|source| GenerateError::Preexist {
                path: exptdir.clone(),
                source,
            })?
            .unwrap_or_default(),
    };
    check_for_preexist_dir_file(&exptdir, policy).map_err(|source| GenerateError::Preexist {
        path: exptdir.clone(),
        source,
    })?;
    std::fs::create_dir_all(&exptdir).map_err(|source| GenerateError::Io {
        path: exptdir.clone(),
        source,
    })?;
    info!(exptdir = %exptdir.display(), %policy, "experiment directory ready");

    let wflow_xml = artifact_path(&config, &exptdir, "WFLOW_XML_FP", "WFLOW_XML_FN", DEFAULT_WFLOW_XML_FN);
    let rocoto_yaml = artifact_path(&config, &exptdir, "ROCOTO_YAML_FP", "ROCOTO_YAML_FN", DEFAULT_ROCOTO_YAML_FN);
    let var_defns = artifact_path(
        &config,
        &exptdir,
        "GLOBAL_VAR_DEFNS_FP",
        "GLOBAL_VAR_DEFNS_FN",
        DEFAULT_VAR_DEFNS_FN,
    );

    let mut rocoto = match config.data_mut().remove("rocoto") {
        Some(Value::Object(rocoto)) => rocoto,
        _ => Map::new(),
    };
    prepare_tasks(&mut rocoto);

    let rocoto_config = Config::from_map(rocoto.clone());
    write(&rocoto_yaml, &rocoto_config.to_string_as(FileFormat::Yaml)?)?;
    debug!(path = %rocoto_yaml.display(), "wrote rocoto YAML");

    info!(path = %wflow_xml.display(), "creating Rocoto workflow XML");
    write(&wflow_xml, &create_xml(&rocoto)?)?;

    info!(path = %var_defns.display(), "generating experiment variable definitions");
    write(&var_defns, &config.to_string_as(FileFormat::Shell)?)?;

    config.data_mut().insert("rocoto".to_string(), Value::Object(rocoto));
    info!(exptdir = %exptdir.display(), "experiment generation completed");

    Ok(Experiment {
        exptdir,
        wflow_xml,
        rocoto_yaml,
        var_defns,
        config,
    })
}
