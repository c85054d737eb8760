//! Template subcommand: render a Jinja2 template file.
//!
//! Values come from a config file, or from the environment when no config
//! file is given, overridden by `KEY=VALUE` pairs on the command line. Every name the template needs must be
//! provided unless `--values_needed` is given, which only lists them.

use crate::config::{Config, ProcessEnv, VariableSource};
use crate::error::ConfigError;
use crate::template::{Renderer, parse_key_value_pairs};
use anyhow::{Context, Result, bail};
use clap::Args;
use serde_json::{Map, Value};
use std::path::PathBuf;
use tracing::{debug, info};

/// Arguments for the template subcommand
#[derive(Args, Debug)]
pub struct TemplateArgs {
    /// Where to write the rendered template (stdout if omitted)
    #[arg(short, long, value_name = "FILE")]
    pub outfile: Option<PathBuf>,

    /// Template file to render
    #[arg(short, long = "input_template", value_name = "FILE")]
    pub input_template: PathBuf,

    /// Config file providing values for the template
    #[arg(short, long = "config_file", value_name = "FILE")]
    pub config_file: Option<PathBuf>,

    /// Values overriding the config file
    #[arg(value_name = "KEY=VALUE")]
    pub key_eq_val_pairs: Vec<String>,

    /// Log the rendered text instead of writing it
    #[arg(short, long = "dry_run")]
    pub dry_run: bool,

    /// List the values the template needs and exit
    #[arg(long = "values_needed")]
    pub values_needed: bool,
}

/// Build the rendering context from the config file (or `env` without
/// one) and the overrides.
pub fn template_context(args: &TemplateArgs, env: &dyn VariableSource) -> Result<Map<String, Value>> {
    let mut context = match &args.config_file {
        Some(path) => Config::load(path)?.into_map(),
        None => env.variables(),
    };
    let overrides = parse_key_value_pairs(&args.key_eq_val_pairs)
        .map_err(|pair| anyhow::anyhow!("'{}' is not a KEY=VALUE pair", pair))?;
    for (key, value) in overrides {
        debug!(key = %key, value = %value, "overriding template value");
        context.insert(key, value);
    }
    Ok(context)
}

/// Run the template command, returning the rendered text (or the list of
/// needed values with `--values_needed`).
pub fn run_template(args: &TemplateArgs) -> Result<String> {
    render_template(args, &ProcessEnv)
}

/// [`run_template`] with an explicit variable source.
pub fn render_template(args: &TemplateArgs, env: &dyn VariableSource) -> Result<String> {
    if !args.input_template.is_file() {
        bail!("template file {} does not exist", args.input_template.display());
    }
    let source = std::fs::read_to_string(&args.input_template)
        .with_context(|| format!("failed to read {}", args.input_template.display()))?;
    let renderer = Renderer::new();

    if args.values_needed {
        let needed = renderer.undeclared_variables(&source)?;
        let listing = needed.into_iter().collect::<Vec<_>>().join("\n");
        info!("values needed for this template are:\n{}", listing);
        println!("{}", listing);
        return Ok(listing);
    }

    let context = template_context(args, env)?;
    let missing = renderer.missing_values(&source, &context)?;
    if !missing.is_empty() {
        return Err(ConfigError::MissingValues(missing).into());
    }

    let rendered = renderer.render_text(&args.input_template.display().to_string(), &source, &context)?;
    if args.dry_run {
        info!("rendered template:\n{}", rendered);
    } else if let Some(outfile) = &args.outfile {
        std::fs::write(outfile, &rendered).with_context(|| format!("failed to write {}", outfile.display()))?;
        info!(path = %outfile.display(), "wrote rendered template");
    } else {
        print!("{}", rendered);
    }
    Ok(rendered)
}
