//! Organization registration and login.

use std::io::Write;

use tracing::info;
use veil_api::ControlPlane;

use crate::error::CliError;
use crate::output::{Credential, OutputFormat};

/// Account commands against the control plane.
pub struct AccountCommand<C> {
    api: C,
}

impl<C: ControlPlane> AccountCommand<C> {
    /// Create a new account command.
    #[must_use]
    pub fn new(api: C) -> Self {
        Self { api }
    }

    /// Creates an organization and prints its API key.
    ///
    /// # Errors
    ///
    /// Returns an error if the control plane refuses or output fails.
    pub async fn register<W: Write>(&self, writer: &mut W, format: &OutputFormat) -> Result<(), CliError> {
        let org = self.api.create_organization().await?;
        info!("organization created");
        format.write(
            writer,
            &Credential {
                kind: "api_key",
                value: org.api_key,
            },
        )
    }

    /// Exchanges `api_key` for a bearer token and prints it.
    ///
    /// # Errors
    ///
    /// Returns an error if authentication or output fails.
    pub async fn login<W: Write>(
        &self,
        writer: &mut W,
        format: &OutputFormat,
        api_key: &str,
    ) -> Result<(), CliError> {
        let token = self.api.authenticate(api_key).await?;
        format.write(
            writer,
            &Credential {
                kind: "token",
                value: token.as_str().to_string(),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use veil_api::FakeControlPlane;

    #[tokio::test]
    async fn register_then_login() {
        let api = FakeControlPlane::new();
        let cmd = AccountCommand::new(api);
        let format = OutputFormat::default();

        let mut out = Vec::<u8>::new();
        cmd.register(&mut out, &format).await.expect("register");
        let api_key = String::from_utf8(out).expect("utf-8").trim().to_string();
        assert!(!api_key.is_empty());

        let mut out = Vec::<u8>::new();
        cmd.login(&mut out, &format, &api_key).await.expect("login");
        assert!(!String::from_utf8(out).expect("utf-8").trim().is_empty());
    }

    #[tokio::test]
    async fn login_with_unknown_key_fails() {
        let cmd = AccountCommand::new(FakeControlPlane::new());
        let err = cmd
            .login(&mut Vec::<u8>::new(), &OutputFormat::default(), "nope")
            .await
            .expect_err("unknown key");
        assert!(matches!(err, CliError::Api(ref e) if e.is_unauthorized()));
    }
}
