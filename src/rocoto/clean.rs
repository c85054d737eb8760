//! Tidy a task dictionary before it is turned into XML.

use serde_json::{Map, Value, json};
use tracing::{debug, warn};

fn kind(key: &str) -> &str {
    key.split_once('_').map(|(k, _)| k).unwrap_or(key)
}

/// Remove tasks without a command and metatasks left with no tasks.
pub fn clean_rocoto_dict(tasks: &mut Map<String, Value>) {
    let keys: Vec<String> = tasks.keys().cloned().collect();
    for key in &keys {
        match kind(key) {
            "metatask" => {
                if let Some(Value::Object(inner)) = tasks.get_mut(key) {
                    clean_rocoto_dict(inner);
                }
            }
            "task" => {
                let has_command = tasks
                    .get(key)
                    .and_then(|t| t.get("command"))
                    .is_some_and(|c| !(c.is_null() || c.as_str() == Some("")));
                if !has_command {
                    let removed = tasks.remove(key);
                    warn!(task = %key, "invalid task removed due to empty/unset run command");
                    debug!(?removed, "removed entry");
                }
            }
            _ => {}
        }
    }

    let keys: Vec<String> = tasks.keys().cloned().collect();
    for key in keys {
        if kind(&key) != "metatask" {
            continue;
        }
        let valid = match tasks.get(&key) {
            Some(Value::Object(inner)) => inner
                .iter()
                .any(|(k, v)| kind(k) == "task" || (kind(k) == "metatask" && v.is_object())),
            _ => false,
        };
        if !valid {
            let removed = tasks.remove(&key);
            warn!(metatask = %key, "invalid/empty metatask removed");
            debug!(?removed, "removed entry");
        }
    }
}

/// Names of every metatask, at any depth.
pub fn list_metatasks(tasks: &Map<String, Value>) -> Vec<String> {
    let mut names = Vec::new();
    for (key, value) in tasks {
        if let Some(("metatask", name)) = key.split_once('_') {
            names.push(name.to_string());
        }
        if let Value::Object(inner) = value {
            names.extend(list_metatasks(inner));
        }
    }
    names
}

/// Replace `metataskdep` entries naming a missing metatask with a `streq`
/// that is always true. Returns the names that were replaced.
pub fn replace_bad_metataskdep(tasks: &mut Map<String, Value>, valid: &[String]) -> Vec<String> {
    let mut replaced = Vec::new();
    for (key, value) in tasks.iter_mut() {
        let Value::Object(inner) = value else { continue };
        match kind(key) {
            "metatask" => replaced.extend(replace_bad_metataskdep(inner, valid)),
            "task" => {
                if let Some(Value::Object(dep)) = inner.get_mut("dependency") {
                    replaced.extend(replace_bad_dep(dep, valid));
                }
            }
            _ => {}
        }
    }
    replaced
}

fn replace_bad_dep(dep: &mut Map<String, Value>, valid: &[String]) -> Vec<String> {
    let mut replaced = Vec::new();
    let keys: Vec<String> = dep.keys().cloned().collect();
    for key in keys {
        if key == "metataskdep" {
            let target = dep
                .get(&key)
                .and_then(|d| d.get("attrs"))
                .and_then(|a| a.get("metatask"))
                .and_then(Value::as_str)
                .map(str::to_string);
            if let Some(target) = target.filter(|t| !valid.contains(t)) {
                dep.remove(&key);
                warn!(metatask = %target, "invalid metataskdep removed");
                let placeholder = format!("Invalid metataskdep {} removed", target);
                dep.insert("streq".to_string(), json!({"left": placeholder, "right": placeholder}));
                replaced.push(target);
            }
        } else if let Some(Value::Object(inner)) = dep.get_mut(&key) {
            replaced.extend(replace_bad_dep(inner, valid));
        }
    }
    replaced
}
