//! Create-xml subcommand: build a Rocoto workflow XML from a config file.

use crate::config::{Config, ProcessEnv};
use crate::rocoto::{prepare_tasks, write_workflow};
use anyhow::{Result, bail};
use clap::Args;
use serde_json::Value;
use std::path::PathBuf;

/// Arguments for the create-xml subcommand
#[derive(Args, Debug)]
pub struct CreateXmlArgs {
    /// Config file with a top-level rocoto section
    #[arg(short, long, value_name = "FILE")]
    pub config: PathBuf,

    /// Where to write the workflow XML
    #[arg(short, long, value_name = "FILE")]
    pub outxml: Option<PathBuf>,

    /// Log the XML instead of writing it
    #[arg(long)]
    pub dryrun: bool,
}

/// Run the create-xml command, returning the XML text.
pub fn run_create_xml(args: &CreateXmlArgs) -> Result<String> {
    let mut config = Config::load(&args.config)?;
    config.dereference_all(&ProcessEnv)?;
    let Some(Value::Object(rocoto)) = config.data_mut().remove("rocoto") else {
        bail!("{} has no rocoto section", args.config.display());
    };
    let mut rocoto = rocoto;
    prepare_tasks(&mut rocoto);
    Ok(write_workflow(&rocoto, args.outxml.as_deref(), args.dryrun)?)
}
