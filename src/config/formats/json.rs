//! JSON configs.

use super::ConfigFormat;
use crate::error::{ConfigError, ConfigResult};
use serde_json::{Map, Value};
use std::path::Path;

#[derive(Debug, Default, Clone, Copy)]
pub struct JsonFormat;

impl ConfigFormat for JsonFormat {
    fn load(&self, path: &Path) -> ConfigResult<Map<String, Value>> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?;
        match serde_json::from_str::<Value>(&text) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(ConfigError::parse(path, "expected a JSON object")),
            Err(e) => Err(ConfigError::parse(path, e.to_string())),
        }
    }

    fn format_map(&self, map: &Map<String, Value>) -> ConfigResult<String> {
        serde_json::to_string_pretty(map).map_err(|e| ConfigError::parse("<json>", e.to_string()))
    }
}
