//! Interface and subscription status.

use std::io::Write;

use veil_api::{AuthToken, ControlPlane};
use veil_connect::ConnectionOrchestrator;
use veil_exec::CommandExecutor;

use crate::error::CliError;
use crate::output::{OutputFormat, StatusReport};

/// Status command executor.
pub struct StatusCommand<E, C> {
    orchestrator: ConnectionOrchestrator<E, C>,
}

impl<E, C> StatusCommand<E, C>
where
    E: CommandExecutor + Clone,
    C: ControlPlane,
{
    /// Create a new status command.
    #[must_use]
    pub fn new(orchestrator: ConnectionOrchestrator<E, C>) -> Self {
        Self { orchestrator }
    }

    /// Execute the status command.
    ///
    /// The subscription is only queried when `token` is given.
    ///
    /// # Errors
    ///
    /// Returns an error if the host or control plane cannot be queried.
    pub async fn execute<W: Write>(
        &self,
        writer: &mut W,
        format: &OutputFormat,
        token: Option<&AuthToken>,
    ) -> Result<(), CliError> {
        let state = self.orchestrator.status().await?;
        let subscription = match token {
            Some(token) => Some(self.orchestrator.api().subscription_status(token).await?),
            None => None,
        };

        let report = StatusReport {
            interface: self.orchestrator.options().interface_name.clone(),
            state,
            subscription,
        };
        format.write(writer, &report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Format;
    use veil_api::FakeControlPlane;
    use veil_exec::{AllowedProgram, FakeExecutor};
    use veil_wireguard::TunnelOptions;

    fn command(fake: &FakeExecutor) -> StatusCommand<FakeExecutor, FakeControlPlane> {
        StatusCommand::new(ConnectionOrchestrator::new(
            fake.clone(),
            FakeControlPlane::new(),
            TunnelOptions::new("cli-status"),
        ))
    }

    #[tokio::test]
    async fn reports_down_interface_without_subscription() {
        let fake = FakeExecutor::new();
        fake.fail(AllowedProgram::Ip, &["link", "show"], "Device \"cli-status\" does not exist.");
        let mut out = Vec::<u8>::new();

        command(&fake)
            .execute(&mut out, &OutputFormat::new(Format::Json), None)
            .await
            .expect("status");

        let value: serde_json::Value = serde_json::from_slice(&out).expect("json");
        assert_eq!(value["interface"], "cli-status");
        assert_eq!(value["state"], "down");
        assert!(value.get("subscription").is_none());
    }

    #[tokio::test]
    async fn includes_subscription_with_token() {
        let fake = FakeExecutor::new();
        let mut out = Vec::<u8>::new();

        command(&fake)
            .execute(&mut out, &OutputFormat::default(), Some(&AuthToken::new("t")))
            .await
            .expect("status");

        let text = String::from_utf8(out).expect("utf-8");
        assert!(text.contains("cli-status (up)"));
        assert!(text.contains("Subscription:  active"));
    }

    #[tokio::test]
    async fn missing_ip_tool_is_host_error() {
        let fake = FakeExecutor::new();
        fake.remove_program(AllowedProgram::Ip);

        let err = command(&fake)
            .execute(&mut Vec::<u8>::new(), &OutputFormat::default(), None)
            .await
            .expect_err("ip missing");
        assert!(matches!(err, CliError::Host(_)));
    }
}
