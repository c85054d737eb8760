//! A configuration document: a mapping plus where it came from.

use super::dereference::Dereferencer;
use super::formats::{self, FileFormat};
use super::merge::update_values;
use super::source::VariableSource;
use super::value::{self, ValueReport};
use crate::error::ConfigResult;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::info;

/// A loaded configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    data: Map<String, Value>,
    path: Option<PathBuf>,
    format: FileFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_map(Map::new())
    }
}

impl Config {
    /// Load a file, choosing the format from its suffix.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let (format, data) = formats::load_file(path)?;
        Ok(Self {
            data,
            path: Some(path.to_path_buf()),
            format,
        })
    }

    /// Load a file in an explicit format.
    pub fn load_as(path: impl AsRef<Path>, format: FileFormat) -> ConfigResult<Self> {
        let path = path.as_ref();
        Ok(Self {
            data: formats::load_with(path, format)?,
            path: Some(path.to_path_buf()),
            format,
        })
    }

    /// Parse YAML text that has no backing file.
    pub fn from_yaml_str(text: &str) -> ConfigResult<Self> {
        Ok(Self::from_map(formats::yaml::parse_str(text, Path::new("<string>"))?))
    }

    pub fn from_map(data: Map<String, Value>) -> Self {
        Self {
            data,
            path: None,
            format: FileFormat::Yaml,
        }
    }

    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.data
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.data
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn format(&self) -> FileFormat {
        self.format
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// A nested value by path, e.g. `["workflow", "EXPTDIR"]`.
    pub fn get_path(&self, keys: &[&str]) -> Option<&Value> {
        let (first, rest) = keys.split_first()?;
        rest.iter()
            .try_fold(self.data.get(*first)?, |v, k| v.as_object()?.get(*k))
    }

    /// A nested string value.
    pub fn get_str(&self, keys: &[&str]) -> Option<&str> {
        self.get_path(keys).and_then(Value::as_str)
    }

    /// Set a nested value, creating intermediate mappings.
    pub fn set_path(&mut self, keys: &[&str], value: Value) {
        let Some((last, parents)) = keys.split_last() else {
            return;
        };
        let mut map = &mut self.data;
        for key in parents {
            let entry = map
                .entry(key.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            let Value::Object(inner) = entry else { return };
            map = inner;
        }
        map.insert(last.to_string(), value);
    }

    /// Layer `other` on top of this config.
    pub fn update_values(&mut self, other: &Map<String, Value>) {
        update_values(&mut self.data, other);
    }

    /// Expand string `!INCLUDE` directives relative to this config's file.
    pub fn parse_include(&mut self) -> ConfigResult<()> {
        let base = self.path.clone().unwrap_or_default();
        formats::parse_includes(&mut self.data, &base, self.format)
    }

    /// One template resolution pass.
    pub fn dereference(&mut self, source: &dyn VariableSource) -> ConfigResult<()> {
        Dereferencer::new(source).dereference(&mut self.data)
    }

    /// Resolve templates until nothing changes.
    pub fn dereference_all(&mut self, source: &dyn VariableSource) -> ConfigResult<usize> {
        Dereferencer::new(source).dereference_all(&mut self.data)
    }

    /// Log and return section/key differences against `other`.
    pub fn compare(&self, other: &Map<String, Value>) -> Vec<String> {
        let diffs = value::compare(&self.data, other);
        for line in &diffs {
            info!("{}", line);
        }
        diffs
    }

    pub fn report(&self) -> ValueReport {
        ValueReport::from_map(&self.data)
    }

    pub fn depth(&self) -> usize {
        value::depth(&Value::Object(self.data.clone()))
    }

    pub fn flatten(&self) -> Map<String, Value> {
        value::flatten(&self.data)
    }

    /// Serialize in this config's own format.
    pub fn to_string_as(&self, format: FileFormat) -> ConfigResult<String> {
        format.handler().format_map(&self.data)
    }

    /// Write in this config's own format.
    pub fn dump(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        self.dump_as(self.format, path)
    }

    pub fn dump_as(&self, format: FileFormat, path: impl AsRef<Path>) -> ConfigResult<()> {
        format.handler().dump(&self.data, path.as_ref())
    }
}
