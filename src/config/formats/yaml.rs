//! YAML configs, with `!INCLUDE [a.yaml, b.yaml]` resolved as a tag.

use super::{ConfigFormat, FileFormat, load_paths, resolve_relative};
use crate::error::{ConfigError, ConfigResult};
use serde_json::{Map, Number, Value};
use serde_yaml::Value as YamlValue;
use std::path::Path;
use tracing::error;

#[derive(Debug, Default, Clone, Copy)]
pub struct YamlFormat;

impl ConfigFormat for YamlFormat {
    fn load(&self, path: &Path) -> ConfigResult<Map<String, Value>> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?;
        parse_str(&text, path)
    }

    fn format_map(&self, map: &Map<String, Value>) -> ConfigResult<String> {
        serde_yaml::to_string(map).map_err(|source| ConfigError::Yaml {
            path: Default::default(),
            source,
        })
    }

    fn uses_string_includes(&self) -> bool {
        false
    }
}

/// Parse YAML text that came from `path`; includes resolve relative to it.
pub fn parse_str(text: &str, path: &Path) -> ConfigResult<Map<String, Value>> {
    let doc: YamlValue = serde_yaml::from_str(text).map_err(|source| {
        error!(path = %path.display(), "malformed YAML: {}", source);
        ConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        }
    })?;
    match convert(doc, path)? {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        other => Err(ConfigError::parse(
            path,
            format!("expected a mapping at the top level, found {}", kind(&other)),
        )),
    }
}

/// Convert a YAML node into a JSON value, expanding includes along the way.
fn convert(node: YamlValue, path: &Path) -> ConfigResult<Value> {
    Ok(match node {
        YamlValue::Null => Value::Null,
        YamlValue::Bool(b) => Value::Bool(b),
        YamlValue::Number(n) => yaml_number(&n),
        YamlValue::String(s) => Value::String(s),
        YamlValue::Sequence(items) => Value::Array(
            items
                .into_iter()
                .map(|item| convert(item, path))
                .collect::<ConfigResult<_>>()?,
        ),
        YamlValue::Mapping(mapping) => {
            let mut map = Map::new();
            for (key, value) in mapping {
                map.insert(key_string(key, path)?, convert(value, path)?);
            }
            Value::Object(map)
        }
        YamlValue::Tagged(tagged) => {
            let tag = tagged.tag.to_string();
            let tag = tag.trim_start_matches('!');
            if tag != "INCLUDE" {
                error!(tag, path = %path.display(), "unregistered YAML tag");
                return Err(ConfigError::UnknownTag {
                    tag: tag.to_string(),
                    path: path.to_path_buf(),
                });
            }
            let files: Vec<String> = match tagged.value {
                YamlValue::Sequence(items) => items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect(),
                YamlValue::String(s) => vec![s],
                _ => {
                    return Err(ConfigError::parse(path, "!INCLUDE expects a list of file paths"));
                }
            };
            Value::Object(load_paths(&resolve_relative(path, &files), FileFormat::Yaml)?)
        }
    })
}

fn key_string(key: YamlValue, path: &Path) -> ConfigResult<String> {
    match key {
        YamlValue::String(s) => Ok(s),
        YamlValue::Bool(b) => Ok(b.to_string()),
        YamlValue::Number(n) => Ok(n.to_string()),
        YamlValue::Null => Ok("null".to_string()),
        YamlValue::Mapping(_) | YamlValue::Sequence(_) => {
            error!(path = %path.display(), "templated value may need quoting");
            Err(ConfigError::UnquotedTemplate {
                path: path.to_path_buf(),
            })
        }
        YamlValue::Tagged(tagged) => key_string(tagged.value, path),
    }
}

fn yaml_number(n: &serde_yaml::Number) -> Value {
    if let Some(i) = n.as_i64() {
        Value::Number(i.into())
    } else if let Some(u) = n.as_u64() {
        Value::Number(u.into())
    } else {
        n.as_f64()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(n.to_string()))
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a sequence",
        Value::Object(_) => "a mapping",
    }
}
