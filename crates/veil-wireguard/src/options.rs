//! Host-side tunnel settings.
//!
//! [`TunnelOptions`] carries everything about the tunnel that the control
//! plane does not decide: the interface name, where the configuration lives,
//! DNS servers, routing, MTU, probe target and the time budgets for host
//! commands and the interface lock.

use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;

use ipnet::IpNet;
use serde::{Deserialize, Serialize};

use crate::error::{Result, WireGuardError};

/// Default interface name.
pub const DEFAULT_INTERFACE_NAME: &str = "veil0";

/// Default `WireGuard` port appended to endpoints that lack one.
pub const DEFAULT_ENDPOINT_PORT: u16 = 51820;

/// Default persistent keepalive interval.
pub const DEFAULT_KEEPALIVE_SECS: u16 = 25;

/// Default MTU for the manual bring-up path.
pub const DEFAULT_MTU: u16 = 1420;

/// Maximum Linux interface name length (`IFNAMSIZ - 1`).
const MAX_INTERFACE_NAME_LEN: usize = 15;

/// Settings for the managed tunnel interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TunnelOptions {
    /// Name of the tunnel interface.
    pub interface_name: String,
    /// Configuration file path; defaults to `<temp dir>/<interface>.conf`.
    pub config_path: Option<PathBuf>,
    /// DNS servers written into the configuration, in order.
    pub dns_servers: Vec<IpAddr>,
    /// Networks routed through the peer, in order.
    pub allowed_ips: Vec<IpNet>,
    /// Port used when the provisioned endpoint has none.
    pub endpoint_port: u16,
    /// Persistent keepalive interval in seconds.
    pub keepalive_secs: u16,
    /// MTU set by the manual bring-up path.
    pub mtu: u16,
    /// Address pinged after bring-up.
    pub probe_address: IpAddr,
    /// Seconds to wait for the probe reply.
    pub probe_timeout_secs: u64,
    /// Time budget for each host command, in seconds.
    pub command_timeout_secs: u64,
    /// Directory holding the cross-process interface lock file.
    pub lock_dir: PathBuf,
    /// Seconds to wait for the interface lock.
    pub lock_timeout_secs: u64,
}

impl Default for TunnelOptions {
    fn default() -> Self {
        Self {
            interface_name: DEFAULT_INTERFACE_NAME.to_string(),
            config_path: None,
            dns_servers: vec![
                IpAddr::V4(Ipv4Addr::new(1, 1, 1, 1)),
                IpAddr::V4(Ipv4Addr::new(1, 0, 0, 1)),
            ],
            allowed_ips: vec![
                IpNet::V4(ipnet::Ipv4Net::default()),
                IpNet::V6(ipnet::Ipv6Net::default()),
            ],
            endpoint_port: DEFAULT_ENDPOINT_PORT,
            keepalive_secs: DEFAULT_KEEPALIVE_SECS,
            mtu: DEFAULT_MTU,
            probe_address: IpAddr::V4(Ipv4Addr::new(1, 1, 1, 1)),
            probe_timeout_secs: 5,
            command_timeout_secs: 30,
            lock_dir: std::env::temp_dir(),
            lock_timeout_secs: 30,
        }
    }
}

impl TunnelOptions {
    /// Creates options for the given interface name with defaults elsewhere.
    #[must_use]
    pub fn new(interface_name: impl Into<String>) -> Self {
        Self {
            interface_name: interface_name.into(),
            ..Self::default()
        }
    }

    /// Sets an explicit configuration path.
    #[must_use]
    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    /// Sets the lock directory.
    #[must_use]
    pub fn with_lock_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.lock_dir = dir.into();
        self
    }

    /// Replaces the DNS servers.
    #[must_use]
    pub fn with_dns_servers(mut self, servers: Vec<IpAddr>) -> Self {
        self.dns_servers = servers;
        self
    }

    /// Sets the per-command timeout.
    #[must_use]
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout_secs = timeout.as_secs().max(1);
        self
    }

    /// Sets the lock wait timeout.
    #[must_use]
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout_secs = timeout.as_secs();
        self
    }

    /// The effective configuration path.
    ///
    /// `wg-quick` derives the interface name from the file stem, so the
    /// default is named after the interface.
    #[must_use]
    pub fn config_path(&self) -> PathBuf {
        self.config_path.clone().unwrap_or_else(|| {
            std::env::temp_dir().join(format!("{}.conf", self.interface_name))
        })
    }

    /// Time budget for each host command.
    #[must_use]
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    /// Time to wait for the interface lock.
    #[must_use]
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }

    /// Validates the options.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOptions` describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        validate_interface_name(&self.interface_name)?;

        if self.dns_servers.is_empty() {
            return Err(WireGuardError::InvalidOptions(
                "dns_servers cannot be empty".to_string(),
            ));
        }
        if self.allowed_ips.is_empty() {
            return Err(WireGuardError::InvalidOptions(
                "allowed_ips cannot be empty".to_string(),
            ));
        }
        if self.endpoint_port == 0 {
            return Err(WireGuardError::InvalidOptions(
                "endpoint_port must be greater than 0".to_string(),
            ));
        }
        if self.mtu < 1280 {
            return Err(WireGuardError::InvalidOptions(format!(
                "mtu {} is below the IPv6 minimum of 1280",
                self.mtu
            )));
        }
        if self.command_timeout_secs == 0 || self.probe_timeout_secs == 0 {
            return Err(WireGuardError::InvalidOptions(
                "command and probe timeouts must be greater than 0".to_string(),
            ));
        }
        if let Some(path) = &self.config_path {
            if path.file_stem().and_then(|s| s.to_str()) != Some(self.interface_name.as_str()) {
                return Err(WireGuardError::InvalidOptions(format!(
                    "config_path {} must be named {}.conf",
                    path.display(),
                    self.interface_name
                )));
            }
        }

        Ok(())
    }
}

/// Validates a Linux interface name the way `wg-quick` does.
///
/// # Errors
///
/// Returns `InvalidOptions` if the name is empty, longer than 15 bytes, or
/// contains characters outside `[A-Za-z0-9_=+.-]`.
pub fn validate_interface_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > MAX_INTERFACE_NAME_LEN {
        return Err(WireGuardError::InvalidOptions(format!(
            "interface name must be 1-{MAX_INTERFACE_NAME_LEN} characters: {name:?}"
        )));
    }
    if name == "." || name == ".." {
        return Err(WireGuardError::InvalidOptions(format!(
            "invalid interface name: {name:?}"
        )));
    }
    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '=' | '+' | '.' | '-')))
    {
        return Err(WireGuardError::InvalidOptions(format!(
            "interface name contains invalid character {c:?}"
        )));
    }
    Ok(())
}
