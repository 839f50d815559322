//! Node directory listing.

use std::io::Write;

use veil_api::{AuthToken, ControlPlane};

use crate::error::CliError;
use crate::output::{NodeList, OutputFormat};

/// Lists nodes from the control plane.
pub struct NodesCommand<C> {
    api: C,
}

impl<C: ControlPlane> NodesCommand<C> {
    /// Create a new nodes command.
    #[must_use]
    pub fn new(api: C) -> Self {
        Self { api }
    }

    /// Execute the nodes command.
    ///
    /// Inactive nodes are listed too; only active ones accept connections.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory call or output fails.
    pub async fn execute<W: Write>(
        &self,
        writer: &mut W,
        format: &OutputFormat,
        token: &AuthToken,
    ) -> Result<(), CliError> {
        let nodes = self.api.list_active_nodes(token).await?;
        format.write(writer, &NodeList { nodes })
    }
}
