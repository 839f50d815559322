//! Connection error taxonomy.

use thiserror::Error;
use veil_api::ApiError;
use veil_wireguard::WireGuardError;

/// Result type alias for orchestrator operations.
pub type Result<T> = std::result::Result<T, ConnectError>;

/// Why a connection attempt stopped.
///
/// Each variant corresponds to one step of [`crate::ConnectionOrchestrator::connect`];
/// nothing after the failing step has run.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// The `wg` tool is missing on this host.
    #[error("WireGuard tooling unavailable")]
    ToolNotFound(#[source] WireGuardError),

    /// The node directory could not be queried.
    #[error("node directory unavailable")]
    Directory(#[source] ApiError),

    /// The directory lists no active nodes.
    #[error("no active nodes available")]
    NoActiveNodes,

    /// The requested node is not in the active set.
    #[error("node {node_id} is unknown or inactive")]
    UnknownOrInactiveNode {
        /// The requested node id.
        node_id: String,
    },

    /// Key material could not be generated.
    #[error("key generation failed")]
    KeyGen(#[source] WireGuardError),

    /// The node refused or botched client provisioning.
    #[error("provisioning failed")]
    Provisioning(#[source] ApiError),

    /// The tunnel configuration could not be built or written.
    #[error("tunnel configuration failed")]
    Config(#[source] WireGuardError),

    /// Neither bring-up path produced a working interface.
    #[error("interface bring-up failed")]
    BringUp(#[source] WireGuardError),

    /// The attempt was cancelled before bring-up started.
    #[error("connection attempt cancelled")]
    Cancelled,
}

impl ConnectError {
    /// Returns `true` if the caller picked a node it may not use.
    #[must_use]
    pub fn is_node_selection_error(&self) -> bool {
        matches!(self, Self::NoActiveNodes | Self::UnknownOrInactiveNode { .. })
    }

    /// Returns `true` if the host was modified before the failure.
    ///
    /// Only bring-up touches the network stack, and it rolls back itself.
    #[must_use]
    pub fn touched_host(&self) -> bool {
        matches!(self, Self::BringUp(_))
    }
}
