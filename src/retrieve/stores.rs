//! Data-store descriptions from a data-locations YAML file.
//!
//! The file maps each external model to its stores:
//!
//! ```yaml
//! FV3GFS:
//!   hpss:
//!     protocol: htar
//!     archive_path:
//!       - /NCEPPROD/hpssprod/runhistory/rh{yyyy}/{yyyymm}/{yyyymmdd}
//!     archive_file_names:
//!       grib2:
//!         fcst:
//!           - gpfs_dell1_nco_ops_com_gfs_prod_gfs.{yyyymmdd}_{hh}.gfs_pgrb2.tar
//!     file_names:
//!       grib2:
//!         anl:
//!           - gfs.t{hh}z.pgrb2.0p25.f000
//!         fcst:
//!           - gfs.t{hh}z.pgrb2.0p25.f{fcst_hr:03d}
//!   aws:
//!     protocol: download
//!     url: https://noaa-gfs-bdp-pds.s3.amazonaws.com/gfs.{yyyymmdd}/{hh}/atmos
//!     file_names: ...
//! ```

use crate::error::RetrievalError;
use clap::ValueEnum;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// Whether analysis or forecast files are wanted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AnlOrFcst {
    Anl,
    Fcst,
}

impl AnlOrFcst {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Anl => "anl",
            Self::Fcst => "fcst",
        }
    }
}

impl fmt::Display for AnlOrFcst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single string or a list of strings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            Self::One(s) => vec![s.clone()],
            Self::Many(v) => v.clone(),
        }
    }
}

/// How one store provides one model's data.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreSpecs {
    #[serde(default)]
    pub protocol: Option<String>,
    #[serde(default)]
    pub url: Option<OneOrMany>,
    /// Names by file type (optional) and then `anl`/`fcst`.
    #[serde(default)]
    pub file_names: Option<Value>,
    #[serde(default)]
    pub archive_path: Option<OneOrMany>,
    #[serde(default)]
    pub archive_file_names: Option<Value>,
    #[serde(default)]
    pub archive_internal_dir: Option<OneOrMany>,
    #[serde(default)]
    pub archive_format: Option<String>,
}

/// All models and their stores.
pub type DataLocations = BTreeMap<String, BTreeMap<String, StoreSpecs>>;

pub fn load_data_locations(path: &Path) -> Result<DataLocations, RetrievalError> {
    let text = std::fs::read_to_string(path)?;
    serde_yaml::from_str(&text).map_err(|e| RetrievalError::Locations {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

fn strings(value: &Value) -> Option<Vec<String>> {
    match value {
        Value::String(s) => Some(vec![s.clone()]),
        Value::Array(items) => items
            .iter()
            .map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => None,
    }
}

/// Narrow a names value by file type, then by `anl`/`fcst`.
fn narrow<'v>(value: &'v Value, file_type: Option<&str>, anl_or_fcst: AnlOrFcst) -> Option<&'v Value> {
    let value = match file_type {
        Some(ft) if value.get(ft).is_some() => value.get(ft)?,
        _ => value,
    };
    match value {
        Value::Object(map) => map.get(anl_or_fcst.as_str()),
        other => Some(other),
    }
}

/// Select the file names to retrieve.
pub fn select_file_names(names: &Value, file_type: Option<&str>, anl_or_fcst: AnlOrFcst) -> Option<Vec<String>> {
    narrow(names, file_type, anl_or_fcst).and_then(strings)
}

/// Select archive names, one entry per archive path. Each entry may itself
/// list several names; only the first is used to probe for the archive.
pub fn select_archive_names(
    names: &Value,
    file_type: Option<&str>,
    anl_or_fcst: AnlOrFcst,
) -> Option<Vec<Vec<String>>> {
    match narrow(names, file_type, anl_or_fcst)? {
        Value::Array(items) => items.iter().map(strings).collect(),
        Value::String(s) => Some(vec![vec![s.clone()]]),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_select_file_names() {
        let names = json!({"grib2": {"anl": "a.grib2", "fcst": ["f{fcst_hr:03d}"]}});
        assert_eq!(
            select_file_names(&names, Some("grib2"), AnlOrFcst::Anl),
            Some(vec!["a.grib2".to_string()])
        );
        assert_eq!(
            select_file_names(&names, Some("grib2"), AnlOrFcst::Fcst),
            Some(vec!["f{fcst_hr:03d}".to_string()])
        );
        let flat = json!({"anl": ["x"], "fcst": ["y"]});
        assert_eq!(select_file_names(&flat, None, AnlOrFcst::Fcst), Some(vec!["y".to_string()]));
        assert_eq!(select_file_names(&flat, Some("netcdf"), AnlOrFcst::Anl), Some(vec!["x".to_string()]));
    }

    #[test]
    fn test_select_archive_names() {
        let names = json!({"fcst": [["one.tar", "two.tar"], "three.tar"]});
        assert_eq!(
            select_archive_names(&names, None, AnlOrFcst::Fcst),
            Some(vec![
                vec!["one.tar".to_string(), "two.tar".to_string()],
                vec!["three.tar".to_string()]
            ])
        );
    }

    #[test]
    fn test_load_data_locations() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("data_locations.yml");
        std::fs::write(
            &path,
            "\
RAP:
  hpss:
    protocol: htar
    archive_path:
      - /NCEPPROD/hpssprod/runhistory/rh{yyyy}/{yyyymm}/{yyyymmdd}
    archive_internal_dir:
      - ./
    archive_file_names:
      anl: [rap.tar]
      fcst: [rap.tar]
    file_names:
      anl:
        - rap.t{hh}z.wrfnatf00.grib2
      fcst:
        - rap.t{hh}z.wrfnatf{fcst_hr:02d}.grib2
  aws:
    protocol: download
    url: https://noaa-rap-pds.s3.amazonaws.com/rap.{yyyymmdd}
    file_names:
      fcst:
        - rap.t{hh}z.wrfnatf{fcst_hr:02d}.grib2
",
        )
        .unwrap();
        let locations = load_data_locations(&path).unwrap();
        let rap = &locations["RAP"];
        assert_eq!(rap["hpss"].protocol.as_deref(), Some("htar"));
        assert_eq!(
            rap["aws"].url,
            Some(OneOrMany::One("https://noaa-rap-pds.s3.amazonaws.com/rap.{yyyymmdd}".into()))
        );
        assert_eq!(rap["hpss"].archive_internal_dir.as_ref().unwrap().to_vec(), vec!["./"]);
    }
}
