//! Key generation through the host `wg` tool.
//!
//! Keys come from `wg genkey`, `wg pubkey` and `wg genpsk` rather than an
//! in-process RNG so the tunnel uses exactly the key material the kernel
//! tooling produces. The derived public key is still checked against the
//! x25519 derivation of the private key before it is handed out.

use std::path::PathBuf;
use std::time::Duration;

use tempfile::TempDir;
use tracing::{debug, warn};
use veil_exec::{AllowedProgram, CommandError, CommandExecutor, CommandSpec, DEFAULT_COMMAND_TIMEOUT};
use zeroize::Zeroizing;

use crate::config::write_private_file;
use crate::error::{Result, WireGuardError};
use crate::keys::{KeyPair, PresharedKey, PrivateKey, PublicKey};

const WG_TOOL: &str = "wg";

/// Produces fresh key material for a single connection attempt.
#[derive(Debug, Clone)]
pub struct KeyMaterialGenerator<E> {
    executor: E,
    timeout: Duration,
    scratch_root: Option<PathBuf>,
}

impl<E: CommandExecutor> KeyMaterialGenerator<E> {
    /// Creates a generator that runs `wg` through `executor`.
    pub fn new(executor: E) -> Self {
        Self {
            executor,
            timeout: DEFAULT_COMMAND_TIMEOUT,
            scratch_root: None,
        }
    }

    /// Sets the time budget for each `wg` invocation.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Creates scratch directories under `root` instead of the system temp dir.
    #[must_use]
    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = Some(root.into());
        self
    }

    /// Checks that the `wg` tool is installed and runnable.
    ///
    /// # Errors
    ///
    /// Returns `ToolNotFound` if `wg --version` cannot be run or fails.
    pub async fn ensure_tool_available(&self) -> Result<()> {
        let spec = CommandSpec::new(AllowedProgram::Wg)
            .arg("--version")
            .timeout(self.timeout);

        match self.executor.run_checked(&spec).await {
            Ok(output) => {
                debug!(version = %output.stdout_lossy().trim(), "wg tool available");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "wg tool unavailable");
                Err(WireGuardError::ToolNotFound {
                    tool: WG_TOOL.to_string(),
                })
            }
        }
    }

    /// Generates a key pair with `wg genkey` and `wg pubkey`.
    ///
    /// The private key is handed to `wg pubkey` through a file inside a
    /// fresh owner-only scratch directory, which is removed before this
    /// returns on every path.
    ///
    /// # Errors
    ///
    /// Returns `ToolInvocation` if either command fails or times out, and
    /// `KeyRead` if the output is empty, undecodable, or the two halves do
    /// not belong together.
    pub async fn generate_key_pair(&self) -> Result<KeyPair> {
        let private_b64 = self
            .run_tool("generate private key", CommandSpec::new(AllowedProgram::Wg).arg("genkey"))
            .await?;
        let private = PrivateKey::from_base64(&private_b64)
            .map_err(|e| WireGuardError::key_read("private key", e.to_string()))?;

        let scratch = self.scratch_dir()?;
        let key_path = scratch.path().join("private.key");
        write_private_file(&key_path, Zeroizing::new(private_b64.as_bytes().to_vec()))
            .await
            .map_err(|e| WireGuardError::key_read("private key", format!("staging failed: {e}")))?;

        let public_b64 = self
            .run_tool(
                "derive public key",
                CommandSpec::new(AllowedProgram::Wg)
                    .arg("pubkey")
                    .stdin_file(&key_path),
            )
            .await;
        drop(scratch);

        let public = PublicKey::from_base64(&public_b64?)
            .map_err(|e| WireGuardError::key_read("public key", e.to_string()))?;

        let pair = KeyPair::from_parts(private, public)?;
        debug!(public_key = ?pair.public_key(), "generated key pair");
        Ok(pair)
    }

    /// Generates a preshared key with `wg genpsk`.
    ///
    /// # Errors
    ///
    /// Returns `ToolInvocation` if the command fails and `KeyRead` if its
    /// output is not a 32-byte base64 key.
    pub async fn generate_preshared_key(&self) -> Result<PresharedKey> {
        let psk_b64 = self
            .run_tool("generate preshared key", CommandSpec::new(AllowedProgram::Wg).arg("genpsk"))
            .await?;
        PresharedKey::from_base64(&psk_b64)
            .map_err(|e| WireGuardError::key_read("preshared key", e.to_string()))
    }

    fn scratch_dir(&self) -> Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("veil-keygen-");
        let dir = match &self.scratch_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        };
        dir.map_err(|e| WireGuardError::key_read("private key", format!("scratch directory: {e}")))
    }

    /// Runs a `wg` subcommand and returns its trimmed, non-empty stdout.
    async fn run_tool(&self, operation: &str, spec: CommandSpec) -> Result<Zeroizing<String>> {
        let spec = spec.timeout(self.timeout);
        let output = self
            .executor
            .run_checked(&spec)
            .await
            .map_err(|e| map_command_error(operation, e))?;

        let stdout = Zeroizing::new(output.stdout_lossy());
        let trimmed = stdout.trim();
        if trimmed.is_empty() {
            return Err(WireGuardError::key_read(operation, "tool produced no output"));
        }
        Ok(Zeroizing::new(trimmed.to_string()))
    }
}

fn map_command_error(operation: &str, error: CommandError) -> WireGuardError {
    if error.is_not_found() {
        WireGuardError::ToolNotFound {
            tool: WG_TOOL.to_string(),
        }
    } else {
        WireGuardError::tool_invocation(operation, error.to_string())
    }
}
