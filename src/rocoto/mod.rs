//! Rocoto workflow XML generation.

pub mod builder;
pub mod clean;
pub mod xml;

pub use builder::{
    build_dependency_tree, build_metatask, build_task, build_task_elements, create_header, create_workflow_tree,
    create_xml,
};
pub use clean::{clean_rocoto_dict, list_metatasks, replace_bad_metataskdep};
pub use xml::Element;

use crate::error::{ConfigError, ConfigResult};
use serde_json::{Map, Value};
use std::path::Path;
use tracing::info;

/// Render the `rocoto` section and write it to `outxml`, or log it when
/// `outxml` is absent or `dry_run` is set. Returns the document text.
pub fn write_workflow(rocoto: &Map<String, Value>, outxml: Option<&Path>, dry_run: bool) -> ConfigResult<String> {
    let xml = create_xml(rocoto)?;
    match outxml {
        Some(path) if !dry_run => {
            std::fs::write(path, &xml).map_err(|e| ConfigError::io(path, e))?;
            info!(path = %path.display(), "wrote Rocoto workflow");
        }
        _ => info!("{}", xml),
    }
    Ok(xml)
}

/// Remove invalid entries and patch dangling metatask dependencies in the
/// `tasks` mapping of a `rocoto` section.
pub fn prepare_tasks(rocoto: &mut Map<String, Value>) {
    if let Some(Value::Object(tasks)) = rocoto.get_mut("tasks") {
        clean_rocoto_dict(tasks);
        let valid = list_metatasks(tasks);
        replace_bad_metataskdep(tasks, &valid);
    }
}
