//! Set-namelist subcommand: update a Fortran namelist from YAML settings.
//!
//! Settings are applied in order: a section of a YAML config file, an
//! input settings file, then a YAML string from the command line. Within
//! each, a null group empties that group and a null key removes the key.

use crate::config::{Config, FileFormat};
use anyhow::{Context, Result, anyhow, bail};
use clap::{Args, ValueEnum};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::info;

/// Format of the `--input_nml` settings file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum SettingsType {
    #[default]
    Nml,
    Yaml,
}

/// Arguments for the set-namelist subcommand
#[derive(Args, Debug)]
pub struct SetNamelistArgs {
    /// Output namelist (YAML if the name ends in .yaml or .yml)
    #[arg(short, long, alias = "outnml", value_name = "FILE")]
    pub outfile: PathBuf,

    /// YAML config file and the top-level section to use
    #[arg(short, long, num_args = 2, value_names = ["FILE", "SECTION"])]
    pub config: Option<Vec<String>>,

    /// Settings file applied after the config section
    #[arg(short, long = "input_nml", value_name = "FILE")]
    pub input_nml: Option<PathBuf>,

    /// Base namelist to start from
    #[arg(short = 'n', long, value_name = "FILE")]
    pub basenml: Option<PathBuf>,

    /// Format of the settings file
    #[arg(short = 't', long = "type", value_enum, default_value_t = SettingsType::Nml)]
    pub settings_type: SettingsType,

    /// YAML string with settings applied last
    #[arg(short, long = "user_config", value_name = "YAML")]
    pub user_config: Option<String>,
}

/// Apply `settings` group by group onto `dest`.
///
/// Names are lowercased since namelists are case-insensitive.
pub fn update_namelist(dest: &mut Map<String, Value>, settings: &Map<String, Value>) {
    for (group, values) in settings {
        let group = group.to_ascii_lowercase();
        let Value::Object(values) = values else {
            info!(group = %group, "clearing namelist group");
            dest.insert(group, Value::Object(Map::new()));
            continue;
        };
        let entry = dest.entry(group.clone()).or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        let Value::Object(target) = entry else { continue };
        for (key, value) in values {
            let key = key.to_ascii_lowercase();
            if value.is_null() {
                info!("Removing {}.{}", group, key);
                target.remove(&key);
            } else {
                info!("Setting {}.{} = {}", group, key, value);
                target.insert(key, value.clone());
            }
        }
    }
}

fn config_section(file: &str, section: &str) -> Result<Map<String, Value>> {
    let config = Config::load_as(file, FileFormat::Yaml)?;
    match config.get(section) {
        Some(Value::Object(map)) => Ok(map.clone()),
        Some(Value::Null) => Ok(Map::new()),
        Some(_) => bail!("section {} in {} is not a mapping", section, file),
        None => bail!("section {} does not exist in top level of {}", section, file),
    }
}

fn output_format(path: &Path) -> FileFormat {
    match FileFormat::from_path(path) {
        Ok(FileFormat::Yaml) => FileFormat::Yaml,
        _ => FileFormat::Namelist,
    }
}

/// Run the set-namelist command.
pub fn run_set_namelist(args: &SetNamelistArgs) -> Result<Map<String, Value>> {
    let mut nml = match &args.basenml {
        Some(path) => Config::load_as(path, FileFormat::Namelist)?.into_map(),
        None => Map::new(),
    };

    if let Some(config) = &args.config {
        let [file, section] = config.as_slice() else {
            bail!("--config takes a file and a section name");
        };
        update_namelist(&mut nml, &config_section(file, section)?);
    }

    if let Some(path) = &args.input_nml {
        let format = match args.settings_type {
            SettingsType::Nml => FileFormat::Namelist,
            SettingsType::Yaml => FileFormat::Yaml,
        };
        update_namelist(&mut nml, Config::load_as(path, format)?.data());
    }

    if let Some(text) = &args.user_config {
        let settings = Config::from_yaml_str(text).map_err(|e| anyhow!("invalid --user_config: {}", e))?;
        update_namelist(&mut nml, settings.data());
    }

    let format = output_format(&args.outfile);
    let text = Config::from_map(nml.clone()).to_string_as(format)?;
    std::fs::write(&args.outfile, text).with_context(|| format!("failed to write {}", args.outfile.display()))?;
    info!(path = %args.outfile.display(), %format, "wrote namelist");
    Ok(nml)
}
