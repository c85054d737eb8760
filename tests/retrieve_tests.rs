//! Integration tests for data retrieval across stores.
//!
//! External tools (`wget`, `hsi`, `htar`) are replaced by a scripted
//! runner that records each call and fakes its effect on the output
//! directory.

use serde_json::json;
use srw_workflow::error::RetrievalError;
use srw_workflow::exec::{CommandOutput, CommandRunner};
use srw_workflow::retrieve::{AnlOrFcst, RetrieveRequest, Retriever, load_data_locations, parse_cycle};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::TempDir;

const LOCATIONS: &str = "\
FV3GFS:
  hpss:
    protocol: htar
    archive_path:
      - /NCEPPROD/hpssprod/runhistory/rh{yyyy}/{yyyymm}/{yyyymmdd}
      - /NCEPPROD/2year/rh{yyyy}/{yyyymm}/{yyyymmdd}
    archive_internal_dir:
      - ./gfs.{yyyymmdd}/{hh}/atmos
      - ./gfs.{yyyymmdd}/{hh}
    archive_file_names:
      grib2:
        fcst:
          - gfs_pgrb2.{yyyymmdd}_{hh}.tar
          - gfs_pgrb2_old.{yyyymmdd}_{hh}.tar
    file_names:
      grib2:
        anl:
          - gfs.t{hh}z.pgrb2.0p25.f000
        fcst:
          - gfs.t{hh}z.pgrb2.0p25.f{fcst_hr:03d}
  aws:
    protocol: download
    url:
      - https://mirror.example.com/gfs.{yyyymmdd}/{hh}/atmos
      - https://noaa-gfs-bdp-pds.s3.amazonaws.com/gfs.{yyyymmdd}/{hh}/atmos
    file_names:
      grib2:
        fcst:
          - gfs.t{hh}z.pgrb2.0p25.f{fcst_hr:03d}
";

/// Scripted stand-in for the external tools.
#[derive(Default)]
struct ScriptedRunner {
    /// URL prefixes that `wget` can fetch.
    reachable: Vec<String>,
    /// Archives that `hsi ls` reports as present.
    archives: Vec<String>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, program: &str, args: &[String], cwd: Option<&Path>) -> std::io::Result<CommandOutput> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(format!("{} {}", program, args.join(" ")));
        }
        let cwd = cwd.unwrap_or(Path::new("."));
        match program {
            "wget" => {
                let url = args.last().cloned().unwrap_or_default();
                if self.reachable.iter().any(|r| url.starts_with(r.as_str())) {
                    let name = url.rsplit('/').next().unwrap_or_default();
                    fs::write(cwd.join(name), "grib")?;
                    Ok(CommandOutput::ok(""))
                } else {
                    Ok(CommandOutput::failed(8))
                }
            }
            "hsi" if args.first().map(String::as_str) == Some("ls") => {
                let found = args.get(1).is_some_and(|a| self.archives.contains(a));
                Ok(if found { CommandOutput::ok("") } else { CommandOutput::failed(64) })
            }
            "htar" => {
                for member in args.iter().skip(2) {
                    let path = cwd.join(member);
                    if let Some(parent) = path.parent() {
                        fs::create_dir_all(parent)?;
                    }
                    fs::write(path, "grib")?;
                }
                Ok(CommandOutput::ok(""))
            }
            _ => Ok(CommandOutput::failed(1)),
        }
    }
}

fn request(output: &Path, stores: &[&str]) -> RetrieveRequest {
    RetrieveRequest {
        anl_or_fcst: AnlOrFcst::Fcst,
        cycle: parse_cycle("2022062712").unwrap(),
        data_stores: stores.iter().map(|s| s.to_string()).collect(),
        external_model: "FV3GFS".to_string(),
        fcst_hrs: vec![0, 6],
        output_path: output.join("{yyyymmddhh}").display().to_string(),
        file_type: Some("grib2".to_string()),
        file_names: None,
        input_file_path: Vec::new(),
    }
}

fn setup() -> (TempDir, PathBuf) {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("data_locations.yml");
    fs::write(&path, LOCATIONS).unwrap();
    (temp, path)
}

mod disk_store_tests {
    use super::*;

    #[test]
    fn test_disk_tries_each_path_in_turn() {
        let (temp, locations_path) = setup();
        let locations = load_data_locations(&locations_path).unwrap();
        let incomplete = temp.path().join("incomplete");
        let complete = temp.path().join("complete");
        fs::create_dir_all(&incomplete).unwrap();
        fs::create_dir_all(&complete).unwrap();
        fs::write(incomplete.join("gfs.t12z.pgrb2.0p25.f000"), "x").unwrap();
        for hr in ["000", "006"] {
            fs::write(complete.join(format!("gfs.t12z.pgrb2.0p25.f{}", hr)), "x").unwrap();
        }

        let mut req = request(&temp.path().join("out"), &["disk"]);
        req.input_file_path = vec![incomplete.display().to_string(), complete.display().to_string()];

        let runner = ScriptedRunner::default();
        let summary = Retriever::new(&runner, &locations).retrieve(&req).unwrap();
        assert_eq!(summary.data_store, "disk");
        let out = temp.path().join("out").join("2022062712");
        assert_eq!(
            summary.files,
            vec![
                out.join("gfs.t12z.pgrb2.0p25.f000"),
                out.join("gfs.t12z.pgrb2.0p25.f006")
            ]
        );
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_disk_file_names_override() {
        let (temp, locations_path) = setup();
        let locations = load_data_locations(&locations_path).unwrap();
        let input = temp.path().join("input");
        fs::create_dir_all(&input).unwrap();
        fs::write(input.join("custom_000.grib2"), "x").unwrap();

        let mut req = request(&temp.path().join("out"), &["disk"]);
        req.fcst_hrs = vec![0];
        req.file_names = Some(json!({"fcst": ["custom_{fcst_hr:03d}.grib2"]}));
        req.input_file_path = vec![input.display().to_string()];

        let runner = ScriptedRunner::default();
        let summary = Retriever::new(&runner, &locations).retrieve(&req).unwrap();
        assert_eq!(summary.files.len(), 1);
        assert!(summary.files[0].ends_with("custom_000.grib2"));
    }
}

mod fallback_tests {
    use super::*;

    #[test]
    fn test_falls_back_from_hpss_to_second_url() {
        let (temp, locations_path) = setup();
        let locations = load_data_locations(&locations_path).unwrap();
        let runner = ScriptedRunner {
            reachable: vec!["https://noaa-gfs-bdp-pds".to_string()],
            ..Default::default()
        };

        let req = request(&temp.path().join("out"), &["disk", "hpss", "aws"]);
        let summary = Retriever::new(&runner, &locations).retrieve(&req).unwrap();
        assert_eq!(summary.data_store, "aws");
        assert_eq!(summary.files.len(), 2);
        assert!(summary.files.iter().all(|f| f.is_file()));

        let calls = runner.calls();
        let hsi: Vec<_> = calls.iter().filter(|c| c.starts_with("hsi ls")).collect();
        assert_eq!(hsi.len(), 2);
        assert!(hsi[0].ends_with("/rh2022/202206/20220627/gfs_pgrb2.20220627_12.tar"));

        // The mirror fails on its first file, so only one wget goes there.
        let mirror = calls.iter().filter(|c| c.contains("mirror.example.com")).count();
        assert_eq!(mirror, 1);
        assert!(calls.iter().any(|c| c.starts_with("wget -c -T 30 -t 3 https://noaa-gfs-bdp-pds")));
    }

    #[test]
    fn test_hpss_second_archive_path() {
        let (temp, locations_path) = setup();
        let locations = load_data_locations(&locations_path).unwrap();
        let archive = "/NCEPPROD/2year/rh2022/202206/20220627/gfs_pgrb2_old.20220627_12.tar";
        let runner = ScriptedRunner {
            archives: vec![archive.to_string()],
            ..Default::default()
        };

        let req = request(&temp.path().join("out"), &["hpss"]);
        let summary = Retriever::new(&runner, &locations).retrieve(&req).unwrap();
        assert_eq!(summary.data_store, "hpss");

        let out = temp.path().join("out").join("2022062712");
        assert_eq!(
            summary.files,
            vec![
                out.join("gfs.t12z.pgrb2.0p25.f000"),
                out.join("gfs.t12z.pgrb2.0p25.f006")
            ]
        );
        assert!(!out.join("gfs.20220627").exists());

        let calls = runner.calls();
        let htar = calls.iter().find(|c| c.starts_with("htar")).unwrap();
        assert!(htar.contains(archive));
        assert!(htar.contains("./gfs.20220627/12/gfs.t12z.pgrb2.0p25.f006"));
    }

    #[test]
    fn test_unavailable_everywhere() {
        let (temp, locations_path) = setup();
        let locations = load_data_locations(&locations_path).unwrap();
        let runner = ScriptedRunner::default();
        let req = request(&temp.path().join("out"), &["hpss", "aws"]);
        let err = Retriever::new(&runner, &locations).retrieve(&req).unwrap_err();
        assert!(matches!(err, RetrievalError::Unavailable { ref cycle, .. } if cycle == "2022062712"));
    }

    #[test]
    fn test_unknown_store() {
        let (temp, locations_path) = setup();
        let locations = load_data_locations(&locations_path).unwrap();
        let runner = ScriptedRunner::default();
        let req = request(&temp.path().join("out"), &["nomads"]);
        let err = Retriever::new(&runner, &locations).retrieve(&req).unwrap_err();
        assert!(matches!(err, RetrievalError::NoStoreSpecs { .. }));
    }
}

mod summary_tests {
    use super::*;
    use srw_workflow::retrieve::RetrievalSummary;

    #[test]
    fn test_summary_yaml() {
        let temp = TempDir::new().unwrap();
        let summary = RetrievalSummary {
            data_store: "aws".to_string(),
            files: vec![PathBuf::from("/out/a.grib2")],
        };
        let path = temp.path().join("summary.yaml");
        summary.write_yaml(&path).unwrap();
        let value: serde_json::Value = serde_yaml::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value, json!({"data_store": "aws", "files": ["/out/a.grib2"]}));
    }
}
