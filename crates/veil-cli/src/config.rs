//! CLI settings.
//!
//! Settings come from an optional TOML file with two sections:
//! - `[api]`: control-plane base URL and request timeout
//! - `[tunnel]`: host-side tunnel options
//!
//! Every field has a default, and command-line flags override the file.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use veil_api::DEFAULT_REQUEST_TIMEOUT;
use veil_wireguard::TunnelOptions;

use crate::error::CliError;

/// Default control-plane base URL.
pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8080";

/// Control-plane connection settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ApiSettings {
    /// Base URL of the control-plane API.
    pub base_url: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            timeout_secs: DEFAULT_REQUEST_TIMEOUT.as_secs(),
        }
    }
}

impl ApiSettings {
    /// Per-request timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Top-level settings file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Control-plane settings.
    pub api: ApiSettings,
    /// Tunnel settings.
    pub tunnel: TunnelOptions,
}

impl Settings {
    /// Load settings from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CliError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            CliError::Config(format!(
                "failed to read settings file '{}': {e}",
                path.as_ref().display()
            ))
        })?;

        Self::from_toml(&content)
    }

    /// Parse settings from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or fails validation.
    pub fn from_toml(content: &str) -> Result<Self, CliError> {
        let settings: Self =
            toml::from_str(content).map_err(|e| CliError::Config(format!("invalid TOML: {e}")))?;

        settings.validate()?;
        Ok(settings)
    }

    /// Loads `path` if given, otherwise the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be loaded.
    pub fn load(path: Option<&Path>) -> Result<Self, CliError> {
        path.map_or_else(|| Ok(Self::default()), Self::from_file)
    }

    /// Applies command-line overrides and revalidates.
    ///
    /// # Errors
    ///
    /// Returns an error if the result is invalid.
    pub fn with_overrides(
        mut self,
        api_url: Option<String>,
        interface: Option<String>,
    ) -> Result<Self, CliError> {
        if let Some(url) = api_url {
            self.api.base_url = url;
        }
        if let Some(name) = interface {
            self.tunnel.interface_name = name;
        }
        self.validate()?;
        Ok(self)
    }

    /// Validate the settings.
    ///
    /// # Errors
    ///
    /// Returns an error if any value is invalid.
    pub fn validate(&self) -> Result<(), CliError> {
        if self.api.base_url.trim().is_empty() {
            return Err(CliError::Config("api.base_url cannot be empty".to_string()));
        }
        if !self.api.base_url.starts_with("http://") && !self.api.base_url.starts_with("https://") {
            return Err(CliError::Config(
                "api.base_url must start with http:// or https://".to_string(),
            ));
        }
        if self.api.timeout_secs == 0 {
            return Err(CliError::Config(
                "api.timeout_secs must be greater than 0".to_string(),
            ));
        }

        self.tunnel
            .validate()
            .map_err(|e| CliError::Config(format!("tunnel: {e}")))
    }
}
