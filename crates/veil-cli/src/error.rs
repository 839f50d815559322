//! CLI error types.

use thiserror::Error;
use veil_api::ApiError;
use veil_connect::ConnectError;
use veil_wireguard::WireGuardError;

/// CLI-specific errors.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid settings or overrides.
    #[error("configuration error: {0}")]
    Config(String),

    /// A control-plane call failed.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// The connection attempt failed.
    #[error(transparent)]
    Connect(#[from] ConnectError),

    /// A host query failed.
    #[error(transparent)]
    Host(#[from] WireGuardError),

    /// Output formatting error.
    #[error("format error: {0}")]
    Format(String),

    /// Writing output failed.
    #[error("failed to write output")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_error_display_config() {
        let err = CliError::Config("api.base_url cannot be empty".into());
        assert_eq!(err.to_string(), "configuration error: api.base_url cannot be empty");
    }

    #[test]
    fn connect_errors_pass_through() {
        let err = CliError::from(ConnectError::NoActiveNodes);
        assert_eq!(err.to_string(), "no active nodes available");
    }

    #[test]
    fn cli_error_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let cli_err = CliError::from(io_err);
        assert!(matches!(cli_err, CliError::Io(_)));
        assert_eq!(
            std::error::Error::source(&cli_err).map(ToString::to_string).as_deref(),
            Some("file not found")
        );
    }
}
