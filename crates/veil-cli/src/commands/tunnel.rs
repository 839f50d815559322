//! Connect and disconnect.

use std::io::Write;
use std::path::PathBuf;

use veil_api::{AuthToken, ControlPlane};
use veil_connect::ConnectionOrchestrator;
use veil_exec::CommandExecutor;

use crate::error::CliError;
use crate::output::{ConnectSummary, DisconnectSummary, OutputFormat};

/// Tunnel lifecycle commands.
pub struct TunnelCommand<E, C> {
    orchestrator: ConnectionOrchestrator<E, C>,
}

impl<E, C> TunnelCommand<E, C>
where
    E: CommandExecutor + Clone,
    C: ControlPlane,
{
    /// Create a new tunnel command.
    #[must_use]
    pub fn new(orchestrator: ConnectionOrchestrator<E, C>) -> Self {
        Self { orchestrator }
    }

    /// Connects to `node_id` and prints a summary.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection attempt or output fails.
    pub async fn connect<W: Write>(
        &self,
        writer: &mut W,
        format: &OutputFormat,
        token: &AuthToken,
        node_id: &str,
    ) -> Result<(), CliError> {
        let tunnel = self.orchestrator.connect(token, node_id).await?;
        let summary = ConnectSummary {
            interface: tunnel.handle.name().to_string(),
            node_id: tunnel.node_id,
            bring_up: tunnel.path.to_string(),
            public_key: tunnel.public_key.to_base64(),
            config_path: tunnel.handle.config_path().to_path_buf(),
            warnings: tunnel.warnings.iter().map(ToString::to_string).collect(),
        };
        format.write(writer, &summary)
    }

    /// Tears the tunnel down and prints what happened.
    ///
    /// # Errors
    ///
    /// Returns an error only if output fails.
    pub async fn disconnect<W: Write>(
        &self,
        writer: &mut W,
        format: &OutputFormat,
        config_path: Option<PathBuf>,
    ) -> Result<(), CliError> {
        let report = self.orchestrator.disconnect(config_path).await;
        let summary = DisconnectSummary {
            interface: self.orchestrator.options().interface_name.clone(),
            skipped: report.skipped,
            ignored: report.swallowed.iter().map(ToString::to_string).collect(),
        };
        format.write(writer, &summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Format;
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;
    use veil_api::{FakeControlPlane, Node, NodeStatus, ProvisionedPeer};
    use veil_connect::ConnectError;
    use veil_exec::{AllowedProgram, FakeExecutor};
    use veil_wireguard::{PresharedKey, PrivateKey, TunnelOptions, KEY_SIZE};

    type Fixture = (TempDir, FakeExecutor, TunnelCommand<FakeExecutor, FakeControlPlane>);

    fn command(interface: &str) -> Fixture {
        command_with(interface, CancellationToken::new())
    }

    fn command_with(interface: &str, cancel: CancellationToken) -> Fixture {
        let dir = tempfile::tempdir().expect("tempdir");
        let options = TunnelOptions::new(interface)
            .with_config_path(dir.path().join(format!("{interface}.conf")))
            .with_lock_dir(dir.path().join("locks"));

        let private = PrivateKey::from_bytes_array([5; KEY_SIZE]);
        let fake = FakeExecutor::new();
        fake.succeed(AllowedProgram::Wg, &["genkey"], &private.to_base64());
        fake.succeed(AllowedProgram::Wg, &["pubkey"], &private.public_key().to_base64());
        fake.succeed(
            AllowedProgram::Wg,
            &["genpsk"],
            &PresharedKey::from_bytes_array([6; KEY_SIZE]).to_base64(),
        );

        let api = FakeControlPlane::new()
            .with_nodes(vec![Node::new("node-a", NodeStatus::Active)])
            .with_peer(ProvisionedPeer {
                client_address: "10.8.0.9".into(),
                server_public_key: PrivateKey::from_bytes_array([9; KEY_SIZE])
                    .public_key()
                    .to_base64(),
                server_preshared_key: String::new(),
                endpoint: "vpn.example.com".into(),
            });

        let orchestrator = ConnectionOrchestrator::new(fake.clone(), api, options)
            .with_scratch_root(dir.path())
            .with_cancellation(cancel);
        (dir, fake, TunnelCommand::new(orchestrator))
    }

    #[tokio::test]
    async fn connect_prints_summary() {
        let (_dir, _fake, cmd) = command("cli-conn");
        let mut out = Vec::<u8>::new();

        cmd.connect(
            &mut out,
            &OutputFormat::new(Format::Json),
            &AuthToken::new("t"),
            "node-a",
        )
        .await
        .expect("connect");

        let value: serde_json::Value = serde_json::from_slice(&out).expect("json");
        assert_eq!(value["interface"], "cli-conn");
        assert_eq!(value["node_id"], "node-a");
        assert_eq!(value["bring_up"], "primary");
        assert_eq!(
            value["public_key"],
            PrivateKey::from_bytes_array([5; KEY_SIZE]).public_key().to_base64()
        );
    }

    #[tokio::test]
    async fn connect_to_unknown_node_fails() {
        let (_dir, fake, cmd) = command("cli-unknown");
        let mut out = Vec::<u8>::new();

        let err = cmd
            .connect(&mut out, &OutputFormat::default(), &AuthToken::new("t"), "node-z")
            .await
            .expect_err("unknown node");

        assert!(matches!(
            err,
            CliError::Connect(ConnectError::UnknownOrInactiveNode { .. })
        ));
        assert_eq!(fake.count_matching("wg genkey"), 0);
    }

    #[tokio::test]
    async fn interrupted_connect_prints_nothing() {
        let cancel = CancellationToken::new();
        let (_dir, fake, cmd) = command_with("cli-intr", cancel.clone());
        cancel.cancel();
        let mut out = Vec::<u8>::new();

        let err = cmd
            .connect(&mut out, &OutputFormat::default(), &AuthToken::new("t"), "node-a")
            .await
            .expect_err("cancelled");

        assert!(matches!(err, CliError::Connect(ConnectError::Cancelled)));
        assert!(out.is_empty());
        assert_eq!(fake.count_matching("wg-quick up"), 0);
    }

    #[tokio::test]
    async fn disconnect_without_tunnel_succeeds() {
        let (_dir, fake, cmd) = command("cli-down");
        fake.fail(AllowedProgram::WgQuick, &["down"], "not a WireGuard interface");
        fake.fail(AllowedProgram::Ip, &["link", "delete"], "Cannot find device");
        let mut out = Vec::<u8>::new();

        cmd.disconnect(&mut out, &OutputFormat::default(), None)
            .await
            .expect("disconnect never fails");

        let text = String::from_utf8(out).expect("utf-8");
        assert!(text.starts_with("Disconnected cli-down"));
        assert!(text.contains("Ignored:"));
    }
}
