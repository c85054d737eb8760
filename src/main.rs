//! SRW workflow tools
//!
//! Command-line entry point: parses arguments, sets up logging and runs
//! the chosen subcommand. Any error ends the process with status 1 after a
//! `FATAL ERROR:` block on stderr.

use anyhow::Result;
use clap::Parser;
use srw_workflow::cli::convert::run_convert;
use srw_workflow::cli::generate::run_generate;
use srw_workflow::cli::monitor::run_monitor;
use srw_workflow::cli::namelist::run_set_namelist;
use srw_workflow::cli::retrieve::run_retrieve;
use srw_workflow::cli::run_tests::run_tests;
use srw_workflow::cli::template::run_template;
use srw_workflow::cli::xml::run_create_xml;
use srw_workflow::cli::{Cli, Command};
use srw_workflow::exec::SystemRunner;
use srw_workflow::logging::init_logging;
use srw_workflow::monitor::{RocotoClient, SystemRocoto};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::debug;

async fn run(cli: Cli) -> Result<()> {
    let rocoto = || -> Arc<dyn RocotoClient> { Arc::new(SystemRocoto::new(SystemRunner)) };
    match &cli.command {
        Command::Template(args) => {
            run_template(args)?;
        }
        Command::SetNamelist(args) => {
            run_set_namelist(args)?;
        }
        Command::CreateXml(args) => {
            run_create_xml(args)?;
        }
        Command::Retrieve(args) => {
            run_retrieve(args)?;
        }
        Command::Monitor(args) => {
            run_monitor(args, rocoto()).await?;
        }
        Command::Generate(args) => {
            run_generate(args)?;
        }
        Command::RunTests(args) => {
            run_tests(args, rocoto()).await?;
        }
        Command::Convert(args) => {
            run_convert(args)?;
        }
    }
    Ok(())
}

fn fatal(err: &anyhow::Error) {
    let mut message = String::from("\nFATAL ERROR:\n");
    for (depth, cause) in err.chain().enumerate() {
        if depth == 0 {
            message.push_str(&format!("  {}\n", cause));
        } else {
            message.push_str(&format!("  caused by: {}\n", cause));
        }
    }
    eprintln!("{}", message);
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let verbose = cli.verbose || cli.command.debug();
    if let Err(e) = init_logging(verbose, cli.quiet, cli.log_file.as_deref()) {
        eprintln!("failed to initialize logging: {:#}", e);
        return ExitCode::FAILURE;
    }
    debug!(?cli, "parsed command line");

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            fatal(&e);
            ExitCode::FAILURE
        }
    }
}
