//! tracelink CLI library.
//!
//! This crate provides the `tl` command-line interface over the session
//! index, transcript search and commit attribution.

mod cli;
pub mod commands;
mod config;

pub use cli::{Cli, Commands};
pub use config::{Config, SourcesConfig};
