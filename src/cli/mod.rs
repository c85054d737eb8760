//! CLI command definitions for the SRW workflow tools
//!
//! This module defines the CLI structure using clap's derive macros.
//! The main entry point is the `Cli` struct which contains subcommands.

pub mod convert;
pub mod generate;
pub mod monitor;
pub mod namelist;
pub mod retrieve;
pub mod run_tests;
pub mod template;
pub mod xml;

use clap::{Parser, Subcommand};
use convert::ConvertArgs;
use generate::GenerateArgs;
use monitor::MonitorArgs;
use namelist::SetNamelistArgs;
use retrieve::RetrieveArgs;
use run_tests::RunTestsArgs;
use std::path::PathBuf;
use template::TemplateArgs;
use xml::CreateXmlArgs;

/// Short-Range Weather App workflow tools
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Append log output to this file instead of stderr
    #[arg(short, long = "log_file", value_name = "FILE", global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Render a Jinja2 template with values from a config file and the command line
    Template(TemplateArgs),

    /// Update a Fortran namelist with settings from YAML
    SetNamelist(SetNamelistArgs),

    /// Create a Rocoto workflow XML from the rocoto section of a config
    CreateXml(CreateXmlArgs),

    /// Retrieve external model or observation data
    Retrieve(RetrieveArgs),

    /// Monitor a set of experiments until they finish
    Monitor(MonitorArgs),

    /// Generate an experiment directory from a user config
    Generate(GenerateArgs),

    /// Generate and monitor a suite of end-to-end tests
    RunTests(RunTestsArgs),

    /// Print a config file in another format
    Convert(ConvertArgs),
}

impl Command {
    /// Whether the subcommand asked for debug output on its own.
    pub fn debug(&self) -> bool {
        match self {
            Command::Retrieve(args) => args.debug,
            Command::Monitor(args) => args.debug,
            Command::RunTests(args) => args.debug,
            _ => false,
        }
    }
}
