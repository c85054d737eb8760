//! Build a Rocoto workflow document from its YAML description.
//!
//! The description is the `rocoto` section of an experiment config:
//!
//! ```yaml
//! rocoto:
//!   attrs: {realtime: F, scheduler: slurm}
//!   entities: {LOGDIR: /expt/log}
//!   cycledefs:
//!     forecast: {dates: "202401010000 202401020000 06:00:00"}
//!   log: "&LOGDIR;/FV3LAM_wflow.log"
//!   tasks:
//!     task_make_grid: {command: "&JOBSdir;/JREGIONAL_MAKE_GRID", walltime: "00:20:00"}
//!     metatask_run_post:
//!       var: {mem: "001 002"}
//!       task_run_post_mem#mem#: {command: post, dependency: {taskdep: {attrs: {task: make_grid}}}}
//! ```

use super::xml::{Element, escape_entity_value};
use crate::error::{ConfigError, ConfigResult};
use serde_json::{Map, Value};
use tracing::debug;

/// Task settings consumed by the experiment setup rather than Rocoto.
const SKIPPED_TASK_TAGS: [&str; 3] = ["nnodes", "ppn", "jobname"];

/// `<?xml ...?>` plus the `<!DOCTYPE workflow [...]>` entity block.
pub fn create_header(entities: &Map<String, Value>) -> String {
    let mut header = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<!DOCTYPE workflow [\n");
    for (name, value) in entities {
        header.push_str(&format!("<!ENTITY {} \"{}\">\n", name, escape_entity_value(&text_of(value))));
    }
    header.push_str("]>");
    header
}

/// The `<workflow>` root with its cycle definitions and log location.
pub fn create_workflow_tree(config: &Map<String, Value>) -> Element {
    let mut workflow = Element::new("workflow");
    apply_attrs(&mut workflow, config.get("attrs"));

    if let Some(Value::Object(cycledefs)) = config.get("cycledefs") {
        for (group, cd) in cycledefs {
            let mut cycle = Element::new("cycledef").with_attr("group", group.clone());
            match cd {
                Value::Object(cd) => {
                    for (k, v) in cd.iter().filter(|(k, _)| k.as_str() != "dates") {
                        cycle.set_attr(k.clone(), text_of(v));
                    }
                    if let Some(dates) = cd.get("dates") {
                        cycle.text = Some(text_of(dates));
                    }
                }
                other => cycle.text = Some(text_of(other)),
            }
            workflow.push(cycle);
        }
    }

    let mut log = Element::new("log");
    let mut cyclestr = Element::new("cyclestr");
    if let Some(value) = config.get("log") {
        cyclestr.text = Some(text_of(value));
    }
    log.push(cyclestr);
    workflow.push(log);
    workflow
}

/// Add every `task_*` and `metatask_*` entry of `tasks` under `parent`.
pub fn build_task_elements(tasks: &Map<String, Value>, parent: &mut Element) -> ConfigResult<()> {
    for (key, config) in tasks {
        let (kind, name) = split_task_key(key)?;
        let empty = Map::new();
        let config = config.as_object().unwrap_or(&empty);
        match kind {
            "metatask" => build_metatask(name, config, parent)?,
            "task" => build_task(name, config, parent),
            other => debug!(key = %key, kind = other, "skipping non-task entry"),
        }
    }
    Ok(())
}

/// Split `task_make_grid` into `("task", "make_grid")`.
pub fn split_task_key(key: &str) -> ConfigResult<(&str, &str)> {
    key.split_once('_')
        .ok_or_else(|| ConfigError::InvalidTaskKey(key.to_string()))
}

/// One `<task>` element. `attrs.name` overrides the name from the key.
pub fn build_task(name: &str, config: &Map<String, Value>, parent: &mut Element) {
    let mut task = Element::new("task");
    apply_attrs(&mut task, config.get("attrs"));
    if task.attr("name").is_none() {
        task.set_attr("name", name);
    }

    for (tag, value) in config {
        match tag.as_str() {
            "attrs" => {}
            "envars" => {
                if let Value::Object(vars) = value {
                    for (var, var_value) in vars {
                        let envar = task.push(Element::new("envar"));
                        envar.push(Element::new("name").with_text(var.clone()));
                        let value_el = envar.push(Element::new("value"));
                        element_or_text(var_value, value_el);
                    }
                }
            }
            "entities" => match value {
                Value::Array(items) => {
                    for item in items {
                        element_or_text(item, &mut task);
                    }
                }
                other => element_or_text(other, &mut task),
            },
            "dependency" => {
                let dep = task.push(Element::new("dependency"));
                if let Value::Object(tree) = value {
                    build_dependency_tree(tree, dep);
                }
            }
            t if SKIPPED_TASK_TAGS.contains(&t) => {}
            _ if value.is_null() => {}
            _ => {
                let el = task.push(Element::new(tag.clone()));
                element_or_text(value, el);
            }
        }
    }
    parent.push(task);
}

/// A `<metatask>` with its `<var>` list and nested tasks. As with tasks,
/// `attrs.name` overrides the name from the key.
pub fn build_metatask(name: &str, config: &Map<String, Value>, parent: &mut Element) -> ConfigResult<()> {
    let mut metatask = Element::new("metatask");
    apply_attrs(&mut metatask, config.get("attrs"));
    if metatask.attr("name").is_none() {
        metatask.set_attr("name", name);
    }

    if let Some(Value::Object(vars)) = config.get("var") {
        for (var, values) in vars {
            metatask.push(
                Element::new("var")
                    .with_attr("name", var.clone())
                    .with_text(text_of(values)),
            );
        }
    }

    let body: Map<String, Value> = config
        .iter()
        .filter(|(k, _)| !matches!(k.as_str(), "var" | "attrs"))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    build_task_elements(&body, &mut metatask)?;
    parent.push(metatask);
    Ok(())
}

/// Recursively mirror a dependency mapping as XML.
///
/// The tag is the key up to the first underscore, so `or_1` and `or_2` can
/// both produce `<or>`. A mapping value may carry `attrs` and `text`; its
/// other entries become child elements.
pub fn build_dependency_tree(tree: &Map<String, Value>, parent: &mut Element) {
    for (key, value) in tree {
        let tag = key.split('_').next().unwrap_or(key);
        let mut el = Element::new(tag);
        match value {
            Value::Object(inner) => {
                apply_attrs(&mut el, inner.get("attrs"));
                match inner.get("text") {
                    Some(Value::Object(nested)) => build_dependency_tree(nested, &mut el),
                    Some(Value::Null) | None => {}
                    Some(text) => el.text = Some(text_of(text)),
                }
                let rest: Map<String, Value> = inner
                    .iter()
                    .filter(|(k, _)| !matches!(k.as_str(), "attrs" | "text"))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                build_dependency_tree(&rest, &mut el);
            }
            Value::Null => {}
            other => el.text = Some(text_of(other)),
        }
        parent.push(el);
    }
}

/// Scalars become the parent's text; mappings become child elements.
fn element_or_text(value: &Value, parent: &mut Element) {
    match value {
        Value::Object(tree) => build_dependency_tree(tree, parent),
        Value::Null => {}
        other => parent.text = Some(text_of(other)),
    }
}

fn apply_attrs(el: &mut Element, attrs: Option<&Value>) {
    if let Some(Value::Object(attrs)) = attrs {
        for (k, v) in attrs {
            el.set_attr(k.clone(), text_of(v));
        }
    }
}

/// XML text for a config value. Lists join with spaces, as Rocoto expects
/// for `<var>` values.
fn text_of(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(true) => "T".to_string(),
        Value::Bool(false) => "F".to_string(),
        Value::Array(items) => items.iter().map(text_of).collect::<Vec<_>>().join(" "),
        other => other.to_string(),
    }
}

/// Full document text for a `rocoto` section.
pub fn create_xml(rocoto: &Map<String, Value>) -> ConfigResult<String> {
    let empty = Map::new();
    let entities = rocoto
        .get("entities")
        .and_then(Value::as_object)
        .unwrap_or(&empty);
    let header = create_header(entities);

    let mut workflow = create_workflow_tree(rocoto);
    if let Some(Value::Object(tasks)) = rocoto.get("tasks") {
        build_task_elements(tasks, &mut workflow)?;
    }
    Ok(format!("{}\n{}", header, workflow.to_pretty_string()))
}
