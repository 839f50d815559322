//! Connect and disconnect sequencing.

use std::path::PathBuf;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use veil_api::{ApiError, AuthToken, ControlPlane, Node};
use veil_exec::CommandExecutor;
use veil_wireguard::{
    BringUpPath, ConfigSynthesizer, InterfaceHandle, InterfaceLock, InterfaceManager,
    InterfaceState, KeyMaterialGenerator, ProvisioningResult, PublicKey, TeardownReport,
    TunnelOptions, WireGuardError,
};
use zeroize::Zeroizing;

use crate::error::{ConnectError, Result};

/// A tunnel that came up.
#[derive(Debug)]
pub struct ConnectedTunnel {
    /// The interface, in the `Up` state.
    pub handle: InterfaceHandle,
    /// Node the tunnel terminates on.
    pub node_id: String,
    /// Public key registered for this attempt.
    pub public_key: PublicKey,
    /// Which bring-up path configured the interface.
    pub path: BringUpPath,
    /// Why `wg-quick` failed, if the fallback path was used.
    pub primary_error: Option<WireGuardError>,
    /// Non-fatal problems seen after bring-up.
    pub warnings: Vec<WireGuardError>,
}

/// Everything `connect` needs before touching the network stack.
struct Prepared {
    public_key: PublicKey,
    lock: InterfaceLock,
    path: PathBuf,
}

/// Drives one tunnel from node selection to a configured interface.
pub struct ConnectionOrchestrator<E, C> {
    api: C,
    keygen: KeyMaterialGenerator<E>,
    synthesizer: ConfigSynthesizer,
    interfaces: InterfaceManager<E>,
    cancel: CancellationToken,
}

impl<E, C> ConnectionOrchestrator<E, C>
where
    E: CommandExecutor + Clone,
    C: ControlPlane,
{
    /// Creates an orchestrator running host commands through `executor`.
    pub fn new(executor: E, api: C, options: TunnelOptions) -> Self {
        let keygen = KeyMaterialGenerator::new(executor.clone()).with_timeout(options.command_timeout());
        let interfaces = InterfaceManager::new(executor, options.clone());
        Self {
            api,
            keygen,
            synthesizer: ConfigSynthesizer::new(options),
            interfaces,
            cancel: CancellationToken::new(),
        }
    }

    /// Uses `cancel` to abort in-flight connection attempts.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Stages key and low-level configuration scratch files under `root`.
    #[must_use]
    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        self.keygen = self.keygen.with_scratch_root(root.clone());
        self.interfaces = self.interfaces.with_scratch_root(root);
        self
    }

    /// The host options in effect.
    #[must_use]
    pub fn options(&self) -> &TunnelOptions {
        self.synthesizer.options()
    }

    /// The control-plane collaborator.
    #[must_use]
    pub fn api(&self) -> &C {
        &self.api
    }

    /// Token that cancels in-flight connection attempts.
    #[must_use]
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Connects to `node_id`.
    ///
    /// Steps run strictly in order and the first failure ends the attempt.
    /// Fresh key material is generated for every call and dropped when it
    /// returns. The interface lock is taken before the configuration file is
    /// written and held until bring-up finishes, so concurrent attempts on
    /// one interface never bring up each other's configuration.
    ///
    /// Cancelling the token before bring-up starts returns
    /// [`ConnectError::Cancelled`] with the host untouched; cancelling during
    /// bring-up rolls the interface back and returns
    /// [`ConnectError::BringUp`].
    ///
    /// # Errors
    ///
    /// Returns the [`ConnectError`] variant naming the step that failed.
    #[instrument(
        skip(self, token),
        fields(interface = %self.options().interface_name, node = %node_id)
    )]
    pub async fn connect(&self, token: &AuthToken, node_id: &str) -> Result<ConnectedTunnel> {
        let prepared = tokio::select! {
            biased;
            () = self.cancel.cancelled() => {
                info!("connect cancelled before bring-up");
                return Err(ConnectError::Cancelled);
            }
            prepared = self.prepare(token, node_id) => prepared?,
        };

        let mut handle = InterfaceHandle::new(&self.options().interface_name, prepared.path);
        let report = self
            .interfaces
            .bring_up_locked(&prepared.lock, &mut handle, &self.cancel)
            .await;
        drop(prepared.lock);
        for warning in &report.warnings {
            warn!(warning = %warning, "post bring-up check failed");
        }
        let path = report.outcome.map_err(ConnectError::BringUp)?;

        info!(path = %path, "tunnel connected");
        Ok(ConnectedTunnel {
            handle,
            node_id: node_id.to_string(),
            public_key: prepared.public_key,
            path,
            primary_error: report.primary_error,
            warnings: report.warnings,
        })
    }

    /// Runs every step up to bring-up and returns holding the interface lock.
    async fn prepare(&self, token: &AuthToken, node_id: &str) -> Result<Prepared> {
        self.options().validate().map_err(ConnectError::Config)?;

        self.keygen
            .ensure_tool_available()
            .await
            .map_err(ConnectError::ToolNotFound)?;

        let nodes = self
            .api
            .list_active_nodes(token)
            .await
            .map_err(ConnectError::Directory)?;
        select_node(&nodes, node_id)?;
        debug!(candidates = nodes.len(), "node accepted");

        let keys = self.keygen.generate_key_pair().await.map_err(ConnectError::KeyGen)?;
        let psk = self
            .keygen
            .generate_preshared_key()
            .await
            .map_err(ConnectError::KeyGen)?;
        let psk_b64 = Zeroizing::new(psk.to_base64());

        let peer = self
            .api
            .provision_client(token, node_id, &keys.public_key().to_base64(), &psk_b64)
            .await
            .map_err(ConnectError::Provisioning)?;
        if peer.is_empty() {
            return Err(ConnectError::Provisioning(ApiError::empty(format!(
                "/nodes/{node_id}/clients"
            ))));
        }
        info!(address = %peer.client_address, endpoint = %peer.endpoint, "client provisioned");

        let provisioning = ProvisioningResult {
            client_address: peer.client_address,
            server_public_key: peer.server_public_key,
            server_preshared_key: peer.server_preshared_key,
            endpoint: peer.endpoint,
            private_key: keys.private_key().clone(),
        };
        let config = self
            .synthesizer
            .synthesize(&provisioning, &keys, &psk)
            .map_err(ConnectError::Config)?;

        let lock = self
            .interfaces
            .lock_interface(&self.options().interface_name)
            .await
            .map_err(ConnectError::BringUp)?;
        let path = self
            .synthesizer
            .persist(&config, &self.options().config_path())
            .await
            .map_err(ConnectError::Config)?;

        Ok(Prepared {
            public_key: *keys.public_key(),
            lock,
            path,
        })
    }

    /// Tears the tunnel down.
    ///
    /// `config_path` overrides the configured path and must match the one
    /// used to connect. Never fails; problems are listed in the report.
    #[instrument(skip(self), fields(interface = %self.options().interface_name))]
    pub async fn disconnect(&self, config_path: Option<PathBuf>) -> TeardownReport {
        let path = config_path.unwrap_or_else(|| self.options().config_path());
        let mut handle = InterfaceHandle::new(&self.options().interface_name, path);
        let report = self.interfaces.tear_down(&mut handle).await;
        info!(
            skipped = report.skipped,
            ignored = report.swallowed.len(),
            "tunnel disconnected"
        );
        report
    }

    /// Whether the configured interface currently exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the host could not be queried.
    pub async fn status(&self) -> std::result::Result<InterfaceState, WireGuardError> {
        self.interfaces.status(&self.options().interface_name).await
    }
}

/// Checks that `node_id` is among the active nodes.
fn select_node(nodes: &[Node], node_id: &str) -> Result<()> {
    let mut active = nodes.iter().filter(|n| n.is_active()).peekable();
    if active.peek().is_none() {
        return Err(ConnectError::NoActiveNodes);
    }
    if active.any(|n| n.id == node_id) {
        Ok(())
    } else {
        Err(ConnectError::UnknownOrInactiveNode {
            node_id: node_id.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use veil_api::NodeStatus;

    #[test]
    fn select_requires_active_membership() {
        let nodes = vec![
            Node::new("a", NodeStatus::Active),
            Node::new("b", NodeStatus::Inactive),
            Node::new("c", NodeStatus::Unknown),
        ];
        assert!(select_node(&nodes, "a").is_ok());
        assert!(matches!(
            select_node(&nodes, "b"),
            Err(ConnectError::UnknownOrInactiveNode { .. })
        ));
        assert!(matches!(
            select_node(&nodes, "c"),
            Err(ConnectError::UnknownOrInactiveNode { .. })
        ));
        assert!(matches!(
            select_node(&nodes, "zz"),
            Err(ConnectError::UnknownOrInactiveNode { .. })
        ));
    }

    #[test]
    fn select_with_no_active_nodes() {
        let nodes = vec![Node::new("a", NodeStatus::Inactive)];
        assert!(matches!(select_node(&nodes, "a"), Err(ConnectError::NoActiveNodes)));
        assert!(matches!(select_node(&[], "a"), Err(ConnectError::NoActiveNodes)));
    }
}
