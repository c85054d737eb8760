//! Experiment configuration loader with tier-based merging.
//!
//! Layers, lowest precedence first: the defaults file, optional constants
//! and workflow defaults, the machine file, the user file, and finally any
//! command-line overrides. After merging, templates are resolved against the
//! variable source and the result is validated.

use super::document::Config;
use super::formats::{FileFormat, load_with};
use super::merge::update_values;
use super::source::{ProcessEnv, VariableSource};
use crate::error::{ConfigError, ConfigResult};
use serde_json::{Map, Value};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};

/// Configuration tier priority (lowest to highest).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConfigTier {
    /// `config_defaults.yaml` (lowest priority)
    Defaults = 0,
    /// `constants.yaml` and the default workflow task list
    Constants = 1,
    /// `machine/<machine>.yaml`
    Machine = 2,
    /// The user's experiment config
    User = 3,
    /// `KEY=VALUE` style overrides (highest priority)
    Overrides = 4,
}

impl std::fmt::Display for ConfigTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigTier::Defaults => write!(f, "defaults"),
            ConfigTier::Constants => write!(f, "constants"),
            ConfigTier::Machine => write!(f, "machine"),
            ConfigTier::User => write!(f, "user"),
            ConfigTier::Overrides => write!(f, "overrides"),
        }
    }
}

/// Names that must be non-empty once every tier is merged.
pub const MANDATORY_VARIABLES: [&str; 2] = ["EXPT_SUBDIR", "NCORES_PER_NODE"];

/// Keys under which tasks may be added freely.
const TASK_PREFIXES: [&str; 2] = ["task", "metatask"];

/// Files making up each tier.
#[derive(Debug, Clone)]
pub struct ConfigPaths {
    /// Directory holding the defaults, machine files and validation lists.
    pub ushdir: PathBuf,
    pub defaults: PathBuf,
    pub user: PathBuf,
    pub machine_dir: PathBuf,
    /// Optional constants file.
    pub constants: Option<PathBuf>,
    /// Optional workflow task defaults.
    pub workflow_defaults: Option<PathBuf>,
    /// Optional `valid_vals_<KEY>` lists.
    pub valid_values: Option<PathBuf>,
}

impl ConfigPaths {
    /// Standard layout under a `ush` directory.
    pub fn from_ushdir(ushdir: impl Into<PathBuf>, user: impl Into<PathBuf>) -> Self {
        let ushdir = ushdir.into();
        let existing = |p: PathBuf| p.exists().then_some(p);
        Self {
            defaults: ushdir.join("config_defaults.yaml"),
            user: user.into(),
            machine_dir: ushdir.join("machine"),
            constants: existing(ushdir.join("constants.yaml")),
            workflow_defaults: existing(ushdir.join("..").join("parm").join("wflow").join("default_workflow.yaml")),
            valid_values: existing(ushdir.join("valid_param_vals.yaml")),
            ushdir,
        }
    }

    /// Home directory of the application: the parent of `ushdir`.
    pub fn homedir(&self) -> PathBuf {
        normalize(&self.ushdir.join(".."))
    }
}

/// Loads and resolves a full experiment configuration.
pub struct ConfigLoader {
    pub paths: ConfigPaths,
    overrides: Map<String, Value>,
    source: Box<dyn VariableSource>,
    mandatory: Vec<String>,
}

impl ConfigLoader {
    pub fn new(paths: ConfigPaths) -> Self {
        Self {
            paths,
            overrides: Map::new(),
            source: Box::new(ProcessEnv),
            mandatory: MANDATORY_VARIABLES.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Highest-precedence layer.
    pub fn with_overrides(mut self, overrides: Map<String, Value>) -> Self {
        self.overrides = overrides;
        self
    }

    /// Variables visible to templates beneath the config itself.
    pub fn with_source(mut self, source: Box<dyn VariableSource>) -> Self {
        self.source = source;
        self
    }

    pub fn with_mandatory(mut self, names: &[&str]) -> Self {
        self.mandatory = names.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Merge every tier, resolve templates and validate.
    pub fn load(&self) -> ConfigResult<Config> {
        let defaults = load_yaml(&self.paths.defaults)?;
        debug!(path = %self.paths.defaults.display(), "loaded config defaults");

        if !self.paths.user.exists() {
            return Err(ConfigError::io(
                &self.paths.user,
                std::io::Error::new(std::io::ErrorKind::NotFound, "user config file not found"),
            ));
        }
        let user = load_yaml(&self.paths.user)?;

        let invalid = check_structure(&user, &defaults);
        if let Some(key) = invalid.into_iter().next() {
            return Err(ConfigError::InvalidKey {
                key,
                path: self.paths.user.clone(),
            });
        }

        // Overrides may name the machine for configs that leave it out.
        let machine = [&self.overrides, &user]
            .into_iter()
            .find_map(|layer| {
                layer
                    .get("user")
                    .and_then(|u| u.get("MACHINE"))
                    .and_then(Value::as_str)
                    .filter(|m| !m.is_empty())
            })
            .map(str::to_ascii_uppercase)
            .ok_or_else(|| ConfigError::MissingMandatory("user.MACHINE".to_string()))?;

        let machine_file = self
            .paths
            .machine_dir
            .join(format!("{}.yaml", machine.to_ascii_lowercase()));
        if !machine_file.exists() {
            return Err(ConfigError::io(
                &machine_file,
                std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("no machine file for {}", machine),
                ),
            ));
        }

        let mut layers: Vec<(ConfigTier, Map<String, Value>)> = vec![(ConfigTier::Defaults, defaults)];
        for optional in [&self.paths.constants, &self.paths.workflow_defaults].into_iter().flatten() {
            layers.push((ConfigTier::Constants, load_yaml(optional)?));
        }
        layers.push((ConfigTier::Machine, load_yaml(&machine_file)?));
        layers.push((ConfigTier::User, user));
        if !self.overrides.is_empty() {
            layers.push((ConfigTier::Overrides, self.overrides.clone()));
        }

        let mut merged = Map::new();
        for (tier, layer) in &layers {
            debug!(%tier, keys = layer.len(), "merging config tier");
            update_values(&mut merged, layer);
        }

        // A task set to null in a later tier switches it off. Nulls inside
        // a task body are left for the XML cleaning step.
        if let Some(Value::Object(rocoto)) = merged.get_mut("rocoto") {
            if let Some(Value::Object(tasks)) = rocoto.get_mut("tasks") {
                tasks.retain(|_, v| !v.is_null());
            }
        }

        if let Some(Value::Object(section)) = merged.get_mut("user") {
            section.insert("MACHINE".to_string(), Value::String(machine.clone()));
        }

        let homedir = self.paths.homedir();
        set_default(&mut merged, "user", "HOMEdir", Value::String(homedir.display().to_string()));
        set_default(&mut merged, "user", "USHdir", Value::String(self.paths.ushdir.display().to_string()));
        resolve_expt_basedir(&mut merged, &homedir);

        let mut config = Config::from_map(merged);
        let passes = config.dereference_all(self.source.as_ref())?;
        info!(machine = %machine, passes, "experiment configuration resolved");

        self.check_mandatory(&config)?;
        if let Some(valid) = &self.paths.valid_values {
            check_valid_values(&config, &load_yaml(valid)?)?;
        }
        Ok(config)
    }

    fn check_mandatory(&self, config: &Config) -> ConfigResult<()> {
        let flat = config.flatten();
        for name in &self.mandatory {
            let missing = match flat.get(name) {
                None | Some(Value::Null) => true,
                Some(Value::String(s)) => s.is_empty(),
                _ => false,
            };
            if missing {
                return Err(ConfigError::MissingMandatory(name.clone()));
            }
        }
        Ok(())
    }
}

fn load_yaml(path: &Path) -> ConfigResult<Map<String, Value>> {
    load_with(path, FileFormat::Yaml)
}

/// Dotted paths of user keys with no counterpart in the defaults.
/// Task and metatask entries may be added anywhere.
pub fn check_structure(user: &Map<String, Value>, defaults: &Map<String, Value>) -> Vec<String> {
    let mut invalid = Vec::new();
    collect_invalid(user, defaults, "", &mut invalid);
    invalid
}

fn collect_invalid(user: &Map<String, Value>, defaults: &Map<String, Value>, parent: &str, out: &mut Vec<String>) {
    for (key, value) in user {
        let prefix = key.split('_').next().unwrap_or_default();
        if TASK_PREFIXES.contains(&prefix) {
            info!(key = %key, "allowing task entry");
            continue;
        }
        let name = format!("{}{}", parent, key);
        match (defaults.get(key), value) {
            (None, _) => out.push(name),
            (Some(Value::Object(def)), Value::Object(inner)) => {
                collect_invalid(inner, def, &format!("{}.", name), out);
            }
            _ => {}
        }
    }
}

/// Check each `valid_vals_<KEY>` list against the flattened config.
pub fn check_valid_values(config: &Config, valid: &Map<String, Value>) -> ConfigResult<()> {
    let flat = config.flatten();
    for (entry, allowed) in valid {
        let Some(key) = entry.strip_prefix("valid_vals_") else {
            continue;
        };
        let Value::Array(allowed) = allowed else {
            continue;
        };
        let Some(value) = flat.get(key) else {
            continue;
        };
        let values: Vec<&Value> = match value {
            Value::Null => continue,
            Value::String(s) if s.is_empty() => continue,
            Value::Array(items) => items.iter().collect(),
            other => vec![other],
        };
        for v in values {
            if !allowed.iter().any(|a| same_value(a, v)) {
                let valid = allowed.iter().map(display).collect::<Vec<_>>().join(", ");
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    value: display(v),
                    valid,
                });
            }
        }
    }
    Ok(())
}

fn same_value(a: &Value, b: &Value) -> bool {
    a == b || display(a) == display(b)
}

fn display(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}


fn set_default(map: &mut Map<String, Value>, section: &str, key: &str, value: Value) {
    let entry = map
        .entry(section.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if let Value::Object(section) = entry {
        let slot = section.entry(key.to_string()).or_insert(Value::Null);
        if slot.is_null() || slot.as_str() == Some("") {
            *slot = value;
        }
    }
}

/// A relative or empty `EXPT_BASEDIR` lives under `<homedir>/../expt_dirs`.
fn resolve_expt_basedir(map: &mut Map<String, Value>, homedir: &Path) {
    let Some(Value::Object(workflow)) = map.get_mut("workflow") else {
        return;
    };
    let current = workflow
        .get("EXPT_BASEDIR")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    if current.contains("{{") {
        return;
    }
    let resolved = if Path::new(&current).is_absolute() {
        normalize(Path::new(&current))
    } else {
        normalize(&homedir.join("..").join("expt_dirs").join(&current))
    };
    workflow.insert(
        "EXPT_BASEDIR".to_string(),
        Value::String(resolved.display().to_string()),
    );
}

/// Lexically remove `.` and `..` components.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::source::StaticVars;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn write_layout(dir: &Path) -> PathBuf {
        let ush = dir.join("app").join("ush");
        fs::create_dir_all(ush.join("machine")).unwrap();
        fs::write(
            ush.join("config_defaults.yaml"),
            "user:\n  MACHINE: ''\n  ACCOUNT: ''\nworkflow:\n  EXPT_BASEDIR: ''\n  EXPT_SUBDIR: ''\n  CCPP_PHYS_SUITE: FV3_GFS_v16\n  EXPTDIR: '{{ workflow.EXPT_BASEDIR }}/{{ workflow.EXPT_SUBDIR }}'\nplatform:\n  NCORES_PER_NODE: ''\n",
        )
        .unwrap();
        fs::write(ush.join("machine").join("hera.yaml"), "platform:\n  NCORES_PER_NODE: 40\nuser:\n  ACCOUNT: an_account\n").unwrap();
        ush
    }

    #[test]
    fn test_load_merges_tiers() {
        let temp = TempDir::new().unwrap();
        let ush = write_layout(temp.path());
        let user = temp.path().join("config.yaml");
        fs::write(&user, "user:\n  MACHINE: hera\nworkflow:\n  EXPT_SUBDIR: test_expt\n").unwrap();

        let config = ConfigLoader::new(ConfigPaths::from_ushdir(&ush, &user))
            .with_source(Box::new(StaticVars::new()))
            .load()
            .unwrap();

        assert_eq!(config.get_str(&["user", "MACHINE"]), Some("HERA"));
        assert_eq!(config.get_str(&["user", "ACCOUNT"]), Some("an_account"));
        assert_eq!(config.get_path(&["platform", "NCORES_PER_NODE"]), Some(&json!(40)));
        let expected_base = normalize(&temp.path().join("expt_dirs"));
        assert_eq!(
            config.get_str(&["workflow", "EXPT_BASEDIR"]),
            Some(expected_base.to_str().unwrap())
        );
        assert_eq!(
            config.get_str(&["workflow", "EXPTDIR"]),
            Some(format!("{}/test_expt", expected_base.display()).as_str())
        );
    }

    #[test]
    fn test_missing_machine_is_error() {
        let temp = TempDir::new().unwrap();
        let ush = write_layout(temp.path());
        let user = temp.path().join("config.yaml");
        fs::write(&user, "workflow:\n  EXPT_SUBDIR: x\n").unwrap();
        let err = ConfigLoader::new(ConfigPaths::from_ushdir(&ush, &user)).load().unwrap_err();
        assert!(matches!(err, ConfigError::MissingMandatory(ref v) if v == "user.MACHINE"));
    }

    #[test]
    fn test_invalid_user_key() {
        let temp = TempDir::new().unwrap();
        let ush = write_layout(temp.path());
        let user = temp.path().join("config.yaml");
        fs::write(&user, "user:\n  MACHINE: hera\n  NOT_A_KEY: 1\n").unwrap();
        let err = ConfigLoader::new(ConfigPaths::from_ushdir(&ush, &user)).load().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidKey { ref key, .. } if key == "user.NOT_A_KEY"));
    }

    #[test]
    fn test_check_structure_allows_tasks() {
        let defaults = json!({"rocoto": {"tasks": {"task_a": {}}}});
        let user = json!({"rocoto": {"tasks": {"task_new": {"command": "x"}, "metatask_m": {}}}});
        assert!(check_structure(user.as_object().unwrap(), defaults.as_object().unwrap()).is_empty());
    }

    #[test]
    fn test_valid_values() {
        let config = Config::from_map(json!({"workflow": {"PREDEF_GRID_NAME": "RRFS_CONUS_3km", "FCST_LEN": 6}}).as_object().cloned().unwrap());
        let ok = json!({"valid_vals_PREDEF_GRID_NAME": ["RRFS_CONUS_3km", "RRFS_CONUS_25km"], "valid_vals_FCST_LEN": ["6", "12"]});
        check_valid_values(&config, ok.as_object().unwrap()).unwrap();

        let bad = json!({"valid_vals_PREDEF_GRID_NAME": ["RRFS_CONUS_25km"]});
        let err = check_valid_values(&config, bad.as_object().unwrap()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "PREDEF_GRID_NAME"));
    }

    #[test]
    fn test_null_task_is_pruned() {
        let temp = TempDir::new().unwrap();
        let ush = write_layout(temp.path());
        fs::write(
            ush.join("config_defaults.yaml"),
            "user:\n  MACHINE: ''\nworkflow:\n  EXPT_SUBDIR: ''\nplatform:\n  NCORES_PER_NODE: ''\nrocoto:\n  tasks:\n    task_a: {command: a}\n    task_b: {command: b}\n",
        )
        .unwrap();
        let user = temp.path().join("config.yaml");
        fs::write(&user, "user:\n  MACHINE: hera\nworkflow:\n  EXPT_SUBDIR: x\nrocoto:\n  tasks:\n    task_a: {walltime: null}\n    task_b: null\n").unwrap();
        let config = ConfigLoader::new(ConfigPaths::from_ushdir(&ush, &user))
            .with_source(Box::new(StaticVars::new()))
            .load()
            .unwrap();
        let tasks = config.get_path(&["rocoto", "tasks"]).unwrap();
        assert_eq!(tasks["task_a"], json!({"command": "a", "walltime": null}));
        assert!(tasks.get("task_b").is_none());
    }

    #[test]
    fn test_expt_basedir_absolute_or_relative() {
        let homedir = Path::new("/apps/ufs-srweather-app");
        let mut map = json!({"workflow": {"EXPT_BASEDIR": "/scratch/expts/../runs"}})
            .as_object()
            .cloned()
            .unwrap();
        resolve_expt_basedir(&mut map, homedir);
        assert_eq!(map["workflow"]["EXPT_BASEDIR"], json!("/scratch/runs"));

        map["workflow"]["EXPT_BASEDIR"] = json!("mine");
        resolve_expt_basedir(&mut map, homedir);
        assert_eq!(map["workflow"]["EXPT_BASEDIR"], json!("/apps/expt_dirs/mine"));
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(Path::new("/a/b/../c/./d")), PathBuf::from("/a/c/d"));
    }
}
