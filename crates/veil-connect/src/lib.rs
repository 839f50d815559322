//! Connection orchestration for Veilguard.
//!
//! [`ConnectionOrchestrator`] sequences one connection attempt: it checks for
//! the `wg` tool, confirms the requested node is active, generates fresh key
//! material, provisions the client with the node, writes the tunnel config
//! and brings the interface up. Each failure is reported as the
//! [`ConnectError`] variant for the step that failed.
//!
//! # Example
//!
//! ```rust,ignore
//! use veil_api::{AuthToken, HttpControlPlane};
//! use veil_connect::ConnectionOrchestrator;
//! use veil_exec::SystemExecutor;
//! use veil_wireguard::TunnelOptions;
//!
//! let api = HttpControlPlane::new("https://api.example.com", std::time::Duration::from_secs(15))?;
//! let orchestrator = ConnectionOrchestrator::new(SystemExecutor::new(), api, TunnelOptions::default());
//! let tunnel = orchestrator.connect(&AuthToken::new("token"), "node-a").await?;
//! println!("up via {}", tunnel.path);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod orchestrator;

pub use error::{ConnectError, Result};
pub use orchestrator::{ConnectedTunnel, ConnectionOrchestrator};
