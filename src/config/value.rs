//! Read-only visitors over configuration trees.

use super::dereference::is_template;
use serde_json::{Map, Value};

/// Number of nested mapping levels. A scalar has depth 0, an empty mapping 1.
pub fn depth(value: &Value) -> usize {
    match value {
        Value::Object(map) => 1 + map.values().map(depth).max().unwrap_or(0),
        _ => 0,
    }
}

/// Collapse nested mappings into one level. Inner keys win over outer keys
/// with the same name, matching how a sourced var_defns file behaves.
pub fn flatten(map: &Map<String, Value>) -> Map<String, Value> {
    let mut flat = Map::new();
    for (key, value) in map {
        match value {
            Value::Object(inner) => flat.extend(flatten(inner)),
            other => {
                flat.insert(key.clone(), other.clone());
            }
        }
    }
    flat
}

/// Which keys are set, still templated, or empty.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ValueReport {
    pub set: Vec<String>,
    pub templated: Vec<String>,
    pub empty: Vec<String>,
}

impl ValueReport {
    /// Build the report for `map`. Keys are dotted paths.
    pub fn from_map(map: &Map<String, Value>) -> Self {
        let mut report = Self::default();
        report.visit(map, "");
        report
    }

    fn visit(&mut self, map: &Map<String, Value>, parent: &str) {
        for (key, value) in map {
            let name = format!("{}{}", parent, key);
            match value {
                Value::Object(inner) => {
                    self.set.push(name.clone());
                    self.visit(inner, &format!("{}.", name));
                }
                Value::Array(items) => {
                    self.set.push(name);
                    for item in items {
                        if let Value::Object(inner) = item {
                            self.visit(inner, parent);
                        }
                    }
                }
                Value::String(s) if is_template(s) => self.templated.push(format!("{}: {}", name, s)),
                Value::String(s) if s.is_empty() => self.empty.push(name),
                Value::Null => self.empty.push(name),
                _ => self.set.push(name),
            }
        }
    }

    /// Human-readable listing in the templater's `--values_needed` layout.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let sections = [
            ("Keys that are complete:", &self.set),
            ("Keys that have unfilled jinja2 templates:", &self.templated),
            ("Keys that are set to empty:", &self.empty),
        ];
        for (title, items) in sections {
            out.push_str(title);
            out.push('\n');
            for item in items.iter() {
                out.push_str("    ");
                out.push_str(item);
                out.push('\n');
            }
            out.push('\n');
        }
        out
    }
}

/// Compare two section/key trees, returning `section: key: - old + new` lines.
///
/// Only the first two levels are compared, which is how INI-like and
/// namelist-like configs are laid out.
pub fn compare(base: &Map<String, Value>, other: &Map<String, Value>) -> Vec<String> {
    let mut diffs: Vec<(String, String, String)> = Vec::new();
    let lookup = |map: &Map<String, Value>, sect: &str, key: &str| -> Option<Value> {
        map.get(sect).and_then(Value::as_object).and_then(|s| s.get(key)).cloned()
    };

    for (first, second, base_first) in [(base, other, true), (other, base, false)] {
        for (sect, items) in first {
            let Some(items) = items.as_object() else { continue };
            for (key, val) in items {
                let theirs = lookup(second, sect, key);
                if theirs.as_ref() == Some(val) {
                    continue;
                }
                if diffs.iter().any(|(s, k, _)| s == sect && k == key) {
                    continue;
                }
                let (old, new) = if base_first {
                    (Some(val.clone()), theirs)
                } else {
                    (theirs, Some(val.clone()))
                };
                diffs.push((sect.clone(), key.clone(), format!(" - {} + {}", show(&old), show(&new))));
            }
        }
    }

    diffs
        .into_iter()
        .map(|(sect, key, diff)| format!("{}: {:>15}: {}", sect, key, diff))
        .collect()
}

fn show(value: &Option<Value>) -> String {
    match value {
        None => "None".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(v) => v.to_string(),
    }
}
