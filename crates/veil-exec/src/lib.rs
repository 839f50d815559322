//! Command execution port for Veilguard.
//!
//! Every privileged host operation (key generation, `wg-quick`, iproute2,
//! DNS, connectivity probes) is described as a [`CommandSpec`] and run by an
//! injected [`CommandExecutor`]. Production code uses [`SystemExecutor`];
//! tests use [`FakeExecutor`] to simulate missing tools, failures and hangs.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod command;
pub mod error;
pub mod fake;

pub use command::{
    validate_argument, AllowedProgram, CommandExecutor, CommandOutput,
    CommandSpec, SystemExecutor, DEFAULT_COMMAND_TIMEOUT,
};
pub use error::{CommandError, ValidationError};
pub use fake::{FakeExecutor, FakeResponse, Invocation};
