//! # veil-cli
//!
//! Veilguard command-line interface.
//!
//! Provides commands for:
//! - Organization registration and login
//! - Node listing
//! - Connecting to and disconnecting from a node
//! - Interface and subscription status
//!
//! Settings are read from an optional TOML file ([`config::Settings`]) and
//! overridden by flags and `VEILGUARD_*` environment variables.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod interrupt;
pub mod output;

pub use cli::{Cli, Commands, Format, LogFormat};
pub use config::Settings;
pub use error::CliError;
pub use output::OutputFormat;
