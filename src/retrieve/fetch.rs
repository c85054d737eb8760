//! Retrieving files from disk, URLs or HPSS in priority order.

use super::stores::{AnlOrFcst, DataLocations, StoreSpecs, select_archive_names, select_file_names};
use super::template::{fill_template, join_location};
use crate::error::RetrievalError;
use crate::exec::{CommandRunner, command_line};
use chrono::NaiveDateTime;
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// What to retrieve and where to put it.
#[derive(Debug, Clone)]
pub struct RetrieveRequest {
    pub anl_or_fcst: AnlOrFcst,
    pub cycle: NaiveDateTime,
    /// Store names, highest priority first.
    pub data_stores: Vec<String>,
    pub external_model: String,
    pub fcst_hrs: Vec<i64>,
    /// Output directory; may contain date templates.
    pub output_path: String,
    pub file_type: Option<String>,
    /// Names for the `disk` store, overriding the `hpss` names.
    pub file_names: Option<Value>,
    /// Directories searched by the `disk` store.
    pub input_file_path: Vec<String>,
}

/// Files obtained from the store that satisfied a request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalSummary {
    pub data_store: String,
    pub files: Vec<PathBuf>,
}

impl RetrievalSummary {
    pub fn write_yaml(&self, path: &Path) -> Result<(), RetrievalError> {
        let text = serde_yaml::to_string(self).map_err(|e| RetrievalError::Io(std::io::Error::other(e)))?;
        std::fs::write(path, text)?;
        Ok(())
    }
}

/// Runs a [`RetrieveRequest`] against the configured stores.
pub struct Retriever<'a> {
    runner: &'a dyn CommandRunner,
    locations: &'a DataLocations,
}

impl<'a> Retriever<'a> {
    pub fn new(runner: &'a dyn CommandRunner, locations: &'a DataLocations) -> Self {
        Self { runner, locations }
    }

    /// Try every store in order until one provides all requested files.
    pub fn retrieve(&self, req: &RetrieveRequest) -> Result<RetrievalSummary, RetrievalError> {
        let empty = Default::default();
        let known = self.locations.get(&req.external_model).unwrap_or(&empty);
        let output = PathBuf::from(fill_template(&req.output_path, &req.cycle, 0)?);
        std::fs::create_dir_all(&output)?;
        info!(path = %output.display(), "retrieved files will be placed here");

        for store in &req.data_stores {
            info!(store = %store, model = %req.external_model, "checking data store");
            let found = if store == "disk" {
                let names = req
                    .file_names
                    .as_ref()
                    .or_else(|| known.get("hpss").and_then(|s| s.file_names.as_ref()))
                    .ok_or_else(|| self.no_names(req, store))?;
                let names = select_file_names(names, req.file_type.as_deref(), req.anl_or_fcst)
                    .ok_or_else(|| self.no_names(req, store))?;
                self.copy_from_disk(req, &req.input_file_path, &names, &output)?
            } else {
                let specs = known.get(store).ok_or_else(|| RetrievalError::NoStoreSpecs {
                    model: req.external_model.clone(),
                    store: store.clone(),
                })?;
                match specs.protocol.as_deref() {
                    Some("download") => self.download(req, store, specs, &output)?,
                    Some("htar") => self.from_hpss(req, store, specs, &output)?,
                    other => {
                        warn!(store = %store, protocol = ?other, "unsupported protocol");
                        None
                    }
                }
            };

            if let Some(files) = found {
                return Ok(RetrievalSummary {
                    data_store: store.clone(),
                    files,
                });
            }
            warn!(store = %store, "requested files are unavailable");
        }

        error!("could not find any of the requested files");
        Err(RetrievalError::Unavailable {
            model: req.external_model.clone(),
            cycle: req.cycle.format("%Y%m%d%H").to_string(),
        })
    }

    fn no_names(&self, req: &RetrieveRequest, store: &str) -> RetrievalError {
        RetrievalError::NoFileNames {
            model: req.external_model.clone(),
            store: store.to_string(),
            anl_or_fcst: req.anl_or_fcst.to_string(),
        }
    }

    /// Every (forecast hour, name) pair, filled, under `base`.
    fn locations_under(&self, req: &RetrieveRequest, base: &str, names: &[String]) -> Result<Vec<String>, RetrievalError> {
        let mut out = Vec::new();
        for &fcst_hr in &req.fcst_hrs {
            for name in names {
                out.push(fill_template(&join_location(base, name), &req.cycle, fcst_hr)?);
            }
        }
        Ok(out)
    }

    fn copy_from_disk(
        &self,
        req: &RetrieveRequest,
        bases: &[String],
        names: &[String],
        output: &Path,
    ) -> Result<Option<Vec<PathBuf>>, RetrievalError> {
        'bases: for base in bases {
            let mut copied = Vec::new();
            for source in self.locations_under(req, base, names)? {
                let source = PathBuf::from(source);
                let Some(file_name) = source.file_name() else {
                    continue 'bases;
                };
                if !source.is_file() {
                    info!(path = %source.display(), "file does not exist on disk");
                    continue 'bases;
                }
                let target = output.join(file_name);
                info!(from = %source.display(), to = %target.display(), "copying");
                if let Err(e) = std::fs::copy(&source, &target) {
                    info!(error = %e, "copy failed");
                    continue 'bases;
                }
                copied.push(target);
            }
            return Ok(Some(copied));
        }
        Ok(None)
    }

    fn download(
        &self,
        req: &RetrieveRequest,
        store: &str,
        specs: &StoreSpecs,
        output: &Path,
    ) -> Result<Option<Vec<PathBuf>>, RetrievalError> {
        let names = specs
            .file_names
            .as_ref()
            .and_then(|n| select_file_names(n, req.file_type.as_deref(), req.anl_or_fcst))
            .ok_or_else(|| self.no_names(req, store))?;
        let urls = specs.url.as_ref().map(|u| u.to_vec()).unwrap_or_default();

        'urls: for base in &urls {
            let mut downloaded = Vec::new();
            for url in self.locations_under(req, base, &names)? {
                let args = vec![
                    "-c".to_string(),
                    "-T".to_string(),
                    "30".to_string(),
                    "-t".to_string(),
                    "3".to_string(),
                    url.clone(),
                ];
                info!(command = %command_line("wget", &args), "running");
                let result = self
                    .runner
                    .run("wget", &args, Some(output))
                    .map_err(|source| RetrievalError::Spawn {
                        command: command_line("wget", &args),
                        source,
                    })?;
                if !result.success() {
                    // The first missing file means the rest are missing too.
                    info!(url = %url, status = ?result.status, "download failed");
                    continue 'urls;
                }
                let name = url.rsplit('/').next().unwrap_or(&url);
                downloaded.push(output.join(name));
            }
            return Ok(Some(downloaded));
        }
        Ok(None)
    }

    fn run_checked(&self, program: &str, args: Vec<String>, cwd: &Path) -> Result<bool, RetrievalError> {
        let command = command_line(program, &args);
        info!(command = %command, "running");
        let result = self
            .runner
            .run(program, &args, Some(cwd))
            .map_err(|source| RetrievalError::Spawn { command, source })?;
        Ok(result.success())
    }

    /// Locate the first archive set that exists for this cycle.
    fn find_archive(
        &self,
        req: &RetrieveRequest,
        paths: &[String],
        names: &[Vec<String>],
        output: &Path,
    ) -> Result<Option<(String, usize)>, RetrievalError> {
        for (index, (path, set)) in paths.iter().zip(names).enumerate() {
            let Some(first) = set.first() else { continue };
            let archive = fill_template(&join_location(path, first), &req.cycle, 0)?;
            if self.run_checked("hsi", vec!["ls".to_string(), archive.clone()], output)? {
                info!(archive = %archive, "found HPSS file");
                return Ok(Some((archive, index)));
            }
            warn!(archive = %archive, "not available");
        }
        Ok(None)
    }

    fn from_hpss(
        &self,
        req: &RetrieveRequest,
        store: &str,
        specs: &StoreSpecs,
        output: &Path,
    ) -> Result<Option<Vec<PathBuf>>, RetrievalError> {
        let paths = specs.archive_path.as_ref().map(|p| p.to_vec()).unwrap_or_default();
        let archive_names = specs
            .archive_file_names
            .as_ref()
            .and_then(|n| select_archive_names(n, req.file_type.as_deref(), req.anl_or_fcst))
            .ok_or_else(|| self.no_names(req, store))?;
        debug!(?paths, ?archive_names, "looking for archives");

        let Some((archive, index)) = self.find_archive(req, &paths, &archive_names, output)? else {
            warn!("no archive files were found");
            return Ok(None);
        };

        let names = specs
            .file_names
            .as_ref()
            .and_then(|n| select_file_names(n, req.file_type.as_deref(), req.anl_or_fcst))
            .ok_or_else(|| self.no_names(req, store))?;
        let internal_dir = specs
            .archive_internal_dir
            .as_ref()
            .and_then(|d| d.to_vec().get(index).cloned())
            .unwrap_or_default();
        let internal_dir = fill_template(&internal_dir, &req.cycle, 0)?;
        let members = self.locations_under(req, &internal_dir, &names)?;

        let local_archive = archive.rsplit('/').next().unwrap_or(&archive).to_string();
        let extracted = if specs.archive_format.as_deref() == Some("zip") {
            self.run_checked("hsi", vec!["get".to_string(), archive.clone()], output)?
                && self.run_checked(
                    "unzip",
                    std::iter::once("-o".to_string())
                        .chain(std::iter::once(local_archive.clone()))
                        .chain(members.iter().cloned())
                        .collect(),
                    output,
                )?
        } else {
            self.run_checked(
                "htar",
                std::iter::once("-xvf".to_string())
                    .chain(std::iter::once(archive.clone()))
                    .chain(members.iter().cloned())
                    .collect(),
                output,
            )?
        };
        if !extracted {
            warn!(archive = %archive, "extraction failed");
            return Ok(None);
        }

        clean_up_output_dir(output, &internal_dir, &local_archive, &members)
    }
}

/// Move extracted members up into `output`, then remove the archive's
/// internal directories and any local copy of the archive. Returns `None`
/// if a member is missing.
pub fn clean_up_output_dir(
    output: &Path,
    internal_dir: &str,
    local_archive: &str,
    members: &[String],
) -> Result<Option<Vec<PathBuf>>, RetrievalError> {
    let mut files = Vec::new();
    let mut missing = false;
    for member in members {
        let extracted = output.join(member);
        if !extracted.exists() {
            info!(path = %extracted.display(), "file does not exist");
            missing = true;
            continue;
        }
        let Some(name) = extracted.file_name() else {
            continue;
        };
        let target = output.join(name);
        if extracted != target {
            info!(from = %extracted.display(), to = %target.display(), "moving");
            std::fs::rename(&extracted, &target)?;
        }
        files.push(target);
    }

    let trimmed = internal_dir.trim_start_matches("./").trim_end_matches('/');
    if !trimmed.is_empty() {
        // Remove now-empty directories from the innermost outward.
        let mut dir = output.join(trimmed);
        while dir.starts_with(output) && dir != output {
            if std::fs::remove_dir(&dir).is_err() {
                break;
            }
            info!(path = %dir.display(), "removed");
            match dir.parent() {
                Some(parent) => dir = parent.to_path_buf(),
                None => break,
            }
        }
    }

    let archive = output.join(local_archive);
    if archive.is_file() {
        std::fs::remove_file(archive)?;
    }

    Ok(if missing { None } else { Some(files) })
}
