//! Convert subcommand: print a config file in another format.

use crate::config::{Config, FileFormat};
use anyhow::Result;
use clap::{Args, ValueEnum};
use std::path::PathBuf;

/// Output format for the convert subcommand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputType {
    Shell,
    #[default]
    Yaml,
    Ini,
    Json,
}

impl From<OutputType> for FileFormat {
    fn from(kind: OutputType) -> Self {
        match kind {
            OutputType::Shell => FileFormat::Shell,
            OutputType::Yaml => FileFormat::Yaml,
            OutputType::Ini => FileFormat::Ini,
            OutputType::Json => FileFormat::Json,
        }
    }
}

/// Arguments for the convert subcommand
#[derive(Args, Debug)]
pub struct ConvertArgs {
    /// Config file to read; the format comes from its suffix
    #[arg(short, long, value_name = "FILE")]
    pub cfg: PathBuf,

    /// Format to print
    #[arg(short, long = "output-type", value_enum, default_value_t = OutputType::Yaml)]
    pub output_type: OutputType,
}

/// Convert the file and return the text, which is also printed to stdout.
pub fn run_convert(args: &ConvertArgs) -> Result<String> {
    let config = Config::load(&args.cfg)?;
    let text = config.to_string_as(args.output_type.into())?;
    println!("{}", text);
    Ok(text)
}
