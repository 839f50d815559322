//! Error types for tunnel key material, configuration and interface lifecycle.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::interface::FallbackStep;

/// Result type alias for tunnel operations.
pub type Result<T> = std::result::Result<T, WireGuardError>;

/// Errors that can occur while preparing or managing the tunnel interface.
#[derive(Debug, Error)]
pub enum WireGuardError {
    /// A required host tool is not installed.
    #[error("required tool not found: {tool}")]
    ToolNotFound {
        /// The missing tool.
        tool: String,
    },

    /// A host tool could not be run or exited unsuccessfully.
    #[error("{operation} failed: {message}")]
    ToolInvocation {
        /// What the tool was asked to do.
        operation: String,
        /// Underlying failure.
        message: String,
    },

    /// Generated key material was missing, empty or undecodable.
    #[error("could not read {what}: {message}")]
    KeyRead {
        /// Which piece of key material.
        what: String,
        /// Description of the problem.
        message: String,
    },

    /// Invalid key format.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Invalid base64 encoding.
    #[error("invalid base64 encoding: {0}")]
    InvalidBase64(String),

    /// Invalid key length.
    #[error("invalid key length: expected 32, got {0}")]
    InvalidKeyLength(usize),

    /// Tunnel options failed validation.
    #[error("invalid tunnel options: {0}")]
    InvalidOptions(String),

    /// The provisioning response lacked or garbled a required field.
    #[error("malformed provisioning data: {field}: {message}")]
    MalformedProvisioningData {
        /// The offending field.
        field: String,
        /// Description of the problem.
        message: String,
    },

    /// The provisioning response does not belong to this connection attempt.
    #[error("provisioning integrity check failed: {0}")]
    ProvisioningIntegrity(String),

    /// Writing the configuration file failed.
    #[error("failed to write {}: {message}", path.display())]
    ConfigWrite {
        /// Destination path.
        path: PathBuf,
        /// Underlying failure.
        message: String,
    },

    /// Reading the configuration file failed.
    #[error("failed to read {}: {message}", path.display())]
    ConfigRead {
        /// Source path.
        path: PathBuf,
        /// Underlying failure.
        message: String,
    },

    /// Configuration text could not be parsed.
    #[error("config parse error at line {line}: {message}")]
    ConfigParse {
        /// One-based line number (0 when not tied to a line).
        line: usize,
        /// Description of the problem.
        message: String,
    },

    /// A required configuration key was absent.
    #[error("missing {key} in [{section}] section")]
    MissingConfigField {
        /// Section name.
        section: String,
        /// Key name.
        key: String,
    },

    /// The high-level bring-up tool failed; the fallback path follows.
    #[error("primary bring-up failed: {0}")]
    PrimaryBringup(String),

    /// A step of the manual bring-up sequence failed.
    #[error("fallback bring-up failed at step {step}: {reason}")]
    FallbackStep {
        /// The step that failed.
        step: FallbackStep,
        /// Underlying failure.
        reason: String,
    },

    /// The post bring-up connectivity probe failed.
    #[error("connectivity probe failed: {0}")]
    Connectivity(String),

    /// Per-link DNS configuration failed.
    #[error("DNS configuration failed: {0}")]
    Dns(String),

    /// A teardown step failed.
    #[error("teardown step failed: {0}")]
    Disconnect(String),

    /// Another bring-up or teardown held the interface for too long.
    #[error("timed out after {}s waiting for lock on interface {interface}", timeout.as_secs())]
    LockTimeout {
        /// The contended interface.
        interface: String,
        /// How long we waited.
        timeout: Duration,
    },

    /// The lock file could not be created or locked.
    #[error("lock error on {}: {message}", path.display())]
    Lock {
        /// The lock file path.
        path: PathBuf,
        /// Underlying failure.
        message: String,
    },

    /// The operation was cancelled by the caller.
    #[error("operation cancelled")]
    Cancelled,
}

impl WireGuardError {
    /// Creates a `KeyRead` error.
    #[must_use]
    pub fn key_read(what: impl Into<String>, message: impl Into<String>) -> Self {
        Self::KeyRead {
            what: what.into(),
            message: message.into(),
        }
    }

    /// Creates a `ToolInvocation` error.
    #[must_use]
    pub fn tool_invocation(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolInvocation {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Creates a `MalformedProvisioningData` error.
    #[must_use]
    pub fn malformed(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedProvisioningData {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates a `ConfigParse` error.
    #[must_use]
    pub fn parse(line: usize, message: impl Into<String>) -> Self {
        Self::ConfigParse {
            line,
            message: message.into(),
        }
    }

    /// Creates a `MissingConfigField` error.
    #[must_use]
    pub fn missing_field(section: impl Into<String>, key: impl Into<String>) -> Self {
        Self::MissingConfigField {
            section: section.into(),
            key: key.into(),
        }
    }

    /// Creates a `FallbackStep` error.
    #[must_use]
    pub fn fallback_step(step: FallbackStep, reason: impl Into<String>) -> Self {
        Self::FallbackStep {
            step,
            reason: reason.into(),
        }
    }

    /// The failing fallback step, if this is a `FallbackStep` error.
    #[must_use]
    pub fn failed_step(&self) -> Option<FallbackStep> {
        match self {
            Self::FallbackStep { step, .. } => Some(*step),
            _ => None,
        }
    }

    /// Returns `true` for errors that are logged but never fail an operation.
    #[must_use]
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            Self::PrimaryBringup(_) | Self::Connectivity(_) | Self::Dns(_) | Self::Disconnect(_)
        )
    }

    /// Returns `true` if key generation produced the error.
    #[must_use]
    pub fn is_key_generation_error(&self) -> bool {
        matches!(
            self,
            Self::ToolNotFound { .. } | Self::ToolInvocation { .. } | Self::KeyRead { .. }
        )
    }
}
