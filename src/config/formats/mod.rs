//! File formats a configuration can be read from or written to.
//!
//! Every format reads into and writes out of the same nested mapping. YAML
//! resolves `!INCLUDE` as a tag while parsing; the other formats carry the
//! directive as a string value that [`parse_includes`] expands after loading.

pub mod field_table;
pub mod ini;
pub mod json;
pub mod namelist;
pub mod shell;
pub mod yaml;

use super::merge::update_values;
use crate::error::{ConfigError, ConfigResult};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, error};

pub use field_table::FieldTableFormat;
pub use ini::IniFormat;
pub use json::JsonFormat;
pub use namelist::NamelistFormat;
pub use shell::ShellFormat;
pub use yaml::YamlFormat;

/// Prefix marking an include directive in non-YAML formats.
pub const INCLUDE_DIRECTIVE: &str = "!INCLUDE";

/// Read and write one on-disk representation of a config mapping.
pub trait ConfigFormat {
    /// Parse the file at `path`. Include directives are left for the caller.
    fn load(&self, path: &Path) -> ConfigResult<Map<String, Value>>;

    /// Serialize `map` into this format.
    fn format_map(&self, map: &Map<String, Value>) -> ConfigResult<String>;

    /// Write `map` to `path`.
    fn dump(&self, map: &Map<String, Value>, path: &Path) -> ConfigResult<()> {
        let text = self.format_map(map)?;
        std::fs::write(path, text).map_err(|e| ConfigError::io(path, e))
    }

    /// Whether `!INCLUDE` arrives as a string value needing a post-load scan.
    fn uses_string_includes(&self) -> bool {
        true
    }
}

/// Known configuration file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Yaml,
    Ini,
    Shell,
    Namelist,
    FieldTable,
    Json,
}

impl std::fmt::Display for FileFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileFormat::Yaml => write!(f, "yaml"),
            FileFormat::Ini => write!(f, "ini"),
            FileFormat::Shell => write!(f, "shell"),
            FileFormat::Namelist => write!(f, "nml"),
            FileFormat::FieldTable => write!(f, "field_table"),
            FileFormat::Json => write!(f, "json"),
        }
    }
}

impl FileFormat {
    /// Pick a format from a file suffix.
    pub fn from_path(path: &Path) -> ConfigResult<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "yaml" | "yml" => Ok(FileFormat::Yaml),
            "ini" | "cfg" | "conf" => Ok(FileFormat::Ini),
            "sh" | "bash" => Ok(FileFormat::Shell),
            "nml" => Ok(FileFormat::Namelist),
            "json" => Ok(FileFormat::Json),
            _ => Err(ConfigError::UnknownFileType(path.to_path_buf())),
        }
    }

    /// Parse a format name as used on the command line.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "yaml" | "yml" => Some(FileFormat::Yaml),
            "ini" | "cfg" => Some(FileFormat::Ini),
            "shell" | "sh" | "bash" => Some(FileFormat::Shell),
            "nml" | "namelist" | "f90" => Some(FileFormat::Namelist),
            "field_table" => Some(FileFormat::FieldTable),
            "json" => Some(FileFormat::Json),
            _ => None,
        }
    }

    pub fn handler(self) -> Box<dyn ConfigFormat> {
        match self {
            FileFormat::Yaml => Box::new(YamlFormat),
            FileFormat::Ini => Box::new(IniFormat::default()),
            FileFormat::Shell => Box::new(ShellFormat),
            FileFormat::Namelist => Box::new(NamelistFormat),
            FileFormat::FieldTable => Box::new(FieldTableFormat),
            FileFormat::Json => Box::new(JsonFormat),
        }
    }
}

/// Load `path` in `format`, expanding any include directives.
pub fn load_with(path: &Path, format: FileFormat) -> ConfigResult<Map<String, Value>> {
    let handler = format.handler();
    let mut map = handler.load(path).inspect_err(|e| {
        error!(path = %path.display(), "failed to load {} config: {}", format, e);
    })?;
    if handler.uses_string_includes() {
        parse_includes(&mut map, path, format)?;
    }
    Ok(map)
}

/// Load `path`, picking the format from its suffix.
pub fn load_file(path: &Path) -> ConfigResult<(FileFormat, Map<String, Value>)> {
    let format = FileFormat::from_path(path)?;
    Ok((format, load_with(path, format)?))
}

/// Expand `key = !INCLUDE [a, b]` values anywhere in `map`.
///
/// The included files are loaded relative to `including`'s directory and
/// merged into the mapping holding the directive, after which the directive
/// key is removed.
pub fn parse_includes(map: &mut Map<String, Value>, including: &Path, format: FileFormat) -> ConfigResult<()> {
    let directives: Vec<(String, Vec<String>)> = map
        .iter()
        .filter_map(|(k, v)| match v {
            Value::String(s) if s.trim_start().starts_with(INCLUDE_DIRECTIVE) => {
                Some((k.clone(), include_list(s)))
            }
            _ => None,
        })
        .collect();

    for value in map.values_mut() {
        if let Value::Object(inner) = value {
            parse_includes(inner, including, format)?;
        }
    }

    for (key, files) in directives {
        let paths = resolve_relative(including, &files);
        let included = load_paths(&paths, format)?;
        map.remove(&key);
        update_values(map, &included);
    }
    Ok(())
}

/// Load every path in turn, later files overriding earlier ones.
pub fn load_paths(paths: &[PathBuf], format: FileFormat) -> ConfigResult<Map<String, Value>> {
    let mut merged = Map::new();
    for path in paths {
        debug!(path = %path.display(), "including config file");
        let loaded = load_with(path, format)?;
        update_values(&mut merged, &loaded);
    }
    Ok(merged)
}

/// Paths relative to the including file's directory; absolute ones pass through.
pub fn resolve_relative(including: &Path, files: &[String]) -> Vec<PathBuf> {
    let base = including.parent().unwrap_or_else(|| Path::new(""));
    files
        .iter()
        .map(|f| {
            let p = Path::new(f);
            if p.is_absolute() { p.to_path_buf() } else { base.join(p) }
        })
        .collect()
}

/// `!INCLUDE [a.ini, "b.ini"]` -> `["a.ini", "b.ini"]`
fn include_list(value: &str) -> Vec<String> {
    value
        .trim()
        .trim_start_matches(INCLUDE_DIRECTIVE)
        .trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .split(',')
        .map(|s| s.trim().trim_matches(|c| c == '"' || c == '\'').to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Render a scalar the way shell-like formats expect it.
pub(crate) fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}
