//! INI configs.
//!
//! Keys keep their case. Values stay strings, as an INI parser returns them.
//! A file without any section header is read as if it started with `[top]`
//! and comes back as a flat mapping.

use super::{ConfigFormat, scalar_to_string};
use crate::error::{ConfigError, ConfigResult};
use serde_json::{Map, Value};
use std::path::Path;

const IMPLICIT_SECTION: &str = "top";

#[derive(Debug, Clone, Copy)]
pub struct IniFormat {
    /// `key = value` when true, `key=value` when false (bash-style files).
    pub space_around_delimiters: bool,
}

impl Default for IniFormat {
    fn default() -> Self {
        Self {
            space_around_delimiters: true,
        }
    }
}

impl ConfigFormat for IniFormat {
    fn load(&self, path: &Path) -> ConfigResult<Map<String, Value>> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?;
        parse_str(&text).map_err(|message| ConfigError::parse(path, message))
    }

    fn format_map(&self, map: &Map<String, Value>) -> ConfigResult<String> {
        let delim = if self.space_around_delimiters { " = " } else { "=" };
        let mut out = String::new();

        // Sections only when every top-level value is a mapping; otherwise
        // plain key=value lines.
        if !map.is_empty() && map.values().all(Value::is_object) {
            for (section, items) in map {
                out.push_str(&format!("[{}]\n", section));
                if let Value::Object(items) = items {
                    for (key, value) in items {
                        out.push_str(&format!("{}{}{}\n", key, delim, ini_value(value)));
                    }
                }
                out.push('\n');
            }
        } else {
            for (key, value) in map {
                out.push_str(&format!("{}={}\n", key, ini_value(value)));
            }
        }
        Ok(out)
    }
}

fn ini_value(value: &Value) -> String {
    match value {
        Value::Array(items) => items.iter().map(scalar_to_string).collect::<Vec<_>>().join(", "),
        other => scalar_to_string(other),
    }
}

/// Parse INI text into sections, or a flat mapping if there are none.
pub fn parse_str(text: &str) -> Result<Map<String, Value>, String> {
    let mut sections: Map<String, Value> = Map::new();
    let mut current: Option<String> = None;
    let mut last_key: Option<String> = None;
    let mut saw_header = false;

    for (lineno, raw) in text.lines().enumerate() {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
            continue;
        }

        // Indented line continues the previous value.
        if raw.starts_with(char::is_whitespace) {
            if let (Some(section), Some(key)) = (&current, &last_key) {
                if let Some(Value::String(existing)) = sections
                    .get_mut(section)
                    .and_then(Value::as_object_mut)
                    .and_then(|s| s.get_mut(key))
                {
                    existing.push('\n');
                    existing.push_str(trimmed);
                    continue;
                }
            }
        }

        if trimmed.starts_with('[') && trimmed.ends_with(']') {
            let name = trimmed[1..trimmed.len() - 1].trim().to_string();
            sections.entry(name.clone()).or_insert_with(|| Value::Object(Map::new()));
            current = Some(name);
            last_key = None;
            saw_header = true;
            continue;
        }

        let Some(idx) = trimmed.find(['=', ':']) else {
            return Err(format!("line {}: expected 'key = value', found '{}'", lineno + 1, trimmed));
        };
        let key = trimmed[..idx].trim().to_string();
        let value = trimmed[idx + 1..].trim().to_string();

        let section = match &current {
            Some(s) => s.clone(),
            None => {
                let name = IMPLICIT_SECTION.to_string();
                sections.entry(name.clone()).or_insert_with(|| Value::Object(Map::new()));
                current = Some(name.clone());
                name
            }
        };
        if let Some(Value::Object(items)) = sections.get_mut(&section) {
            items.insert(key.clone(), Value::String(value));
        }
        last_key = Some(key);
    }

    if !saw_header {
        return Ok(match sections.remove(IMPLICIT_SECTION) {
            Some(Value::Object(flat)) => flat,
            _ => Map::new(),
        });
    }
    Ok(sections)
}
