//! Command-line front end for the tile generation pipeline
//!
//! This module is only available when the "cli" feature is enabled.

mod backend_factory;
mod config;
#[path = "main.rs"]
mod main_impl;
mod request;

pub use main_impl::{main, Cli, Command, GenerateArgs, LogFormat, SUMMARY_FILE};
pub use request::{EdgeConstraintSpec, RequestFile};
