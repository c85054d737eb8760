//! Shell `KEY=VALUE` files such as `var_defns.sh`.
//!
//! Loading understands plain and `export`ed assignments, single or double
//! quoting, and bash arrays written as `( "a" "b" )`, possibly spread over
//! several lines. Values are typed the same way rendered templates are.
//! Writing produces the experiment variable-definitions layout: nested
//! mappings become `# [section]` blocks.

use super::ConfigFormat;
use crate::error::{ConfigError, ConfigResult};
use crate::template::str_to_type;
use serde_json::{Map, Value};
use std::path::Path;

/// Arrays longer than this are written one element per line.
const ONE_LINE_ARRAY_MAX: usize = 4;

#[derive(Debug, Default, Clone, Copy)]
pub struct ShellFormat;

impl ConfigFormat for ShellFormat {
    fn load(&self, path: &Path) -> ConfigResult<Map<String, Value>> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?;
        parse_str(&text).map_err(|message| ConfigError::parse(path, message))
    }

    fn format_map(&self, map: &Map<String, Value>) -> ConfigResult<String> {
        Ok(to_shell_string(map))
    }
}

/// Parse shell assignments. Lines that are not assignments are ignored.
pub fn parse_str(text: &str) -> Result<Map<String, Value>, String> {
    let mut map = Map::new();
    let mut pending = String::new();

    for line in text.lines() {
        let line = if pending.is_empty() {
            line.trim().to_string()
        } else {
            format!("{} {}", pending, line.trim())
        };
        pending.clear();

        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(stripped) = line.strip_suffix('\\') {
            pending = stripped.trim_end().to_string();
            continue;
        }
        if opens_array(&line) {
            pending = line;
            continue;
        }

        let assignment = line.strip_prefix("export ").unwrap_or(&line).trim_start();
        let Some((key, value)) = assignment.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            continue;
        }
        map.insert(key.to_string(), str_to_list(value)?);
    }

    if !pending.is_empty() {
        return Err(format!("unterminated value: {}", pending));
    }
    Ok(map)
}

/// True while an array's opening `(` has no matching `)` on the line yet.
fn opens_array(line: &str) -> bool {
    let Some((_, value)) = line.split_once('=') else {
        return false;
    };
    let value = value.trim();
    value.starts_with('(') && !value.ends_with(')')
}

/// Parse one right-hand side: a bash array or a single scalar.
pub fn str_to_list(raw: &str) -> Result<Value, String> {
    let v = raw.trim();
    if v.is_empty() {
        return Ok(Value::Null);
    }
    if v.starts_with('(') && v.ends_with(')') {
        let items = split_words(&v[1..v.len() - 1])?
            .into_iter()
            .filter(|w| !w.trim().is_empty())
            .map(|w| {
                // Indexed form: ([0]=a [1]=b)
                let w = match (w.starts_with('['), w.find('=')) {
                    (true, Some(idx)) => w[idx + 1..].to_string(),
                    _ => w,
                };
                str_to_type(w.trim())
            })
            .collect();
        return Ok(Value::Array(items));
    }
    let words = split_words(v)?;
    Ok(str_to_type(&words.join(" ")))
}

/// Split on unquoted whitespace, removing quotes.
fn split_words(s: &str) -> Result<Vec<String>, String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(ch) => current.push(ch),
                        None => return Err(format!("unbalanced quote in {}", s)),
                    }
                }
            }
            '"' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => {
                            if let Some(ch) = chars.next() {
                                current.push(ch);
                            }
                        }
                        Some(ch) => current.push(ch),
                        None => return Err(format!("unbalanced quote in {}", s)),
                    }
                }
            }
            '\\' => {
                if let Some(ch) = chars.next() {
                    current.push(ch);
                    in_word = true;
                }
            }
            c if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            c => {
                current.push(c);
                in_word = true;
            }
        }
    }
    if in_word {
        words.push(current);
    }
    Ok(words)
}

/// Shell text for a scalar: booleans as TRUE/FALSE, null as empty.
pub fn type_to_str(value: &Value) -> String {
    match value {
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Right-hand side text for a value; sequences become bash arrays.
pub fn list_to_str(value: &Value, one_line: bool) -> String {
    match value {
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(type_to_str).collect();
            if one_line || items.len() <= ONE_LINE_ARRAY_MAX {
                format!("( \"{}\" )", items.join("\" \""))
            } else {
                format!("( \\\n\"{}\" \\\n)", items.join("\" \\\n\""))
            }
        }
        other => type_to_str(other),
    }
}

/// Write a mapping as shell assignments.
pub fn to_shell_string(map: &Map<String, Value>) -> String {
    let mut out = String::new();
    for (key, value) in map {
        match value {
            Value::Object(inner) => {
                out.push_str(&format!("# [{}]\n", key));
                out.push_str(&to_shell_string(inner));
                out.push('\n');
            }
            Value::Array(_) => out.push_str(&format!("{}={}\n", key, list_to_str(value, false))),
            other => out.push_str(&format!("{}='{}'\n", key, list_to_str(other, false))),
        }
    }
    out
}
