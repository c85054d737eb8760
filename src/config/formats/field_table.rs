//! FMS `field_table` output from a YAML description.
//!
//! Input is YAML shaped like:
//!
//! ```yaml
//! sphum:
//!   longname: specific humidity
//!   units: kg/kg
//!   profile_type:
//!     name: fixed
//!     surface_value: 1.e30
//! ```
//!
//! Each top-level key is a tracer. Nested mappings are methods whose `name`
//! goes in the second column and whose other entries are packed into one
//! quoted `key=value` list.

use super::{ConfigFormat, scalar_to_string, yaml};
use crate::error::{ConfigError, ConfigResult};
use serde_json::{Map, Value};
use std::path::Path;

#[derive(Debug, Default, Clone, Copy)]
pub struct FieldTableFormat;

impl ConfigFormat for FieldTableFormat {
    fn load(&self, path: &Path) -> ConfigResult<Map<String, Value>> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?;
        yaml::parse_str(&text, path)
    }

    fn format_map(&self, map: &Map<String, Value>) -> ConfigResult<String> {
        let mut lines: Vec<String> = Vec::new();
        for (field, settings) in map {
            let Value::Object(settings) = settings else {
                return Err(ConfigError::parse(
                    "<field_table>",
                    format!("tracer '{}' must be a mapping", field),
                ));
            };
            lines.push(format!(" \"TRACER\", \"atmos_mod\", \"{}\"", field));
            for (key, value) in settings {
                match value {
                    Value::Object(method) => {
                        let name = method.get("name").map(scalar_to_string).unwrap_or_default();
                        let controls: Vec<String> = method
                            .iter()
                            .filter(|(k, _)| k.as_str() != "name")
                            .map(|(k, v)| format!("{}={}", k, scalar_to_string(v)))
                            .collect();
                        lines.push(format!(
                            "{:7}\"{}\", \"{}\", \"{}\"",
                            " ",
                            key,
                            name,
                            controls.join(", ")
                        ));
                    }
                    other => lines.push(format!("{:11}\"{}\", \"{}\"", " ", key, scalar_to_string(other))),
                }
            }
            if let Some(last) = lines.last_mut() {
                last.push_str(" /");
            }
        }
        Ok(lines.join("\n"))
    }

    fn uses_string_includes(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_format_field_table() {
        let cfg = json!({
            "sphum": {
                "longname": "specific humidity",
                "units": "kg/kg",
                "profile_type": {"name": "fixed", "surface_value": "1.e30"}
            },
            "o3mr": {"longname": "ozone mixing ratio", "units": "kg/kg"}
        });
        let text = FieldTableFormat.format_map(cfg.as_object().unwrap()).unwrap();
        let expected = [
            " \"TRACER\", \"atmos_mod\", \"sphum\"",
            "           \"longname\", \"specific humidity\"",
            "           \"units\", \"kg/kg\"",
            "       \"profile_type\", \"fixed\", \"surface_value=1.e30\" /",
            " \"TRACER\", \"atmos_mod\", \"o3mr\"",
            "           \"longname\", \"ozone mixing ratio\"",
            "           \"units\", \"kg/kg\" /",
        ]
        .join("\n");
        assert_eq!(text, expected);
    }
}
