//! CLI command implementations.
//!
//! - [`tunnel`] - connect and disconnect
//! - [`nodes`] - node directory listing
//! - [`account`] - organization registration and login
//! - [`status`] - interface and subscription status

pub mod account;
pub mod nodes;
pub mod status;
pub mod tunnel;

pub use account::AccountCommand;
pub use nodes::NodesCommand;
pub use status::StatusCommand;
pub use tunnel::TunnelCommand;
