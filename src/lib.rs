//! Short-Range Weather App workflow toolkit
//!
//! Layered experiment configuration with Jinja2 templates, Fortran namelist
//! updates, Rocoto workflow XML generation, external data retrieval and
//! monitoring of running experiments. The `srw` binary exposes each piece
//! as a subcommand; this library exports them for testing and reuse.

pub mod cli;
pub mod config;
pub mod error;
pub mod exec;
pub mod experiment;
pub mod logging;
pub mod monitor;
pub mod preexist;
pub mod retrieve;
pub mod rocoto;
pub mod template;
