//! Retrieve subcommand: pull external model or observation data.

use crate::exec::SystemRunner;
use crate::retrieve::{
    AnlOrFcst, DataLocations, RetrievalSummary, RetrieveRequest, Retriever, fhr_list, load_data_locations,
    parse_cycle,
};
use anyhow::{Result, anyhow};
use chrono::NaiveDateTime;
use clap::Args;
use serde_json::Value;
use std::path::PathBuf;
use tracing::info;

/// Arguments for the retrieve subcommand
#[derive(Args, Debug)]
pub struct RetrieveArgs {
    /// Whether analysis or forecast files are wanted
    #[arg(long = "anl_or_fcst", value_enum)]
    pub anl_or_fcst: AnlOrFcst,

    /// Cycle date as YYYYMMDDHH
    #[arg(long = "cycle_date", value_parser = parse_cycle, value_name = "YYYYMMDDHH")]
    pub cycle_date: NaiveDateTime,

    /// Stores to try, highest priority first (disk, hpss, aws, ...)
    #[arg(long = "data_stores", num_args = 1.., required = true)]
    pub data_stores: Vec<String>,

    /// Model or observation source, as named in the data-locations file
    #[arg(long = "external_model", value_name = "NAME")]
    pub external_model: String,

    /// Forecast hours: one hour, `start stop [step]`, or an explicit list
    #[arg(long = "fcst_hrs", num_args = 1.., required = true, allow_negative_numbers = true)]
    pub fcst_hrs: Vec<i64>,

    /// Output directory; may contain date templates
    #[arg(long = "output_path", value_name = "DIR")]
    pub output_path: String,

    /// Data-locations YAML describing each store
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// File type key in the data-locations file (e.g. grib2, netcdf)
    #[arg(long = "file_type")]
    pub file_type: Option<String>,

    /// YAML string with file names for the disk store
    #[arg(long = "file_names", value_name = "YAML")]
    pub file_names: Option<String>,

    /// Directories searched by the disk store
    #[arg(long = "input_file_path", num_args = 1.., value_name = "DIR")]
    pub input_file_path: Vec<String>,

    /// Write a YAML summary of the retrieved files here
    #[arg(long = "summary_file", value_name = "FILE")]
    pub summary_file: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,
}

impl RetrieveArgs {
    /// The request these arguments describe.
    pub fn request(&self) -> Result<RetrieveRequest> {
        let file_names = self
            .file_names
            .as_deref()
            .map(serde_yaml::from_str::<Value>)
            .transpose()
            .map_err(|e| anyhow!("invalid --file_names: {}", e))?;
        Ok(RetrieveRequest {
            anl_or_fcst: self.anl_or_fcst,
            cycle: self.cycle_date,
            data_stores: self.data_stores.clone(),
            external_model: self.external_model.clone(),
            fcst_hrs: fhr_list(&self.fcst_hrs)?,
            output_path: self.output_path.clone(),
            file_type: self.file_type.clone(),
            file_names,
            input_file_path: self.input_file_path.clone(),
        })
    }
}

/// Run the retrieve command.
pub fn run_retrieve(args: &RetrieveArgs) -> Result<RetrievalSummary> {
    let request = args.request()?;
    let locations = match &args.config {
        Some(path) => load_data_locations(path)?,
        None => DataLocations::new(),
    };
    let runner = SystemRunner;
    let summary = Retriever::new(&runner, &locations).retrieve(&request)?;
    info!(
        store = %summary.data_store,
        count = summary.files.len(),
        "retrieved {} {} data",
        request.external_model,
        request.anl_or_fcst
    );
    if let Some(path) = &args.summary_file {
        summary.write_yaml(path)?;
        info!(path = %path.display(), "wrote retrieval summary");
    }
    Ok(summary)
}
