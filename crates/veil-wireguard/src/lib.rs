//! `WireGuard` tunnel plumbing for Veilguard.
//!
//! This crate owns everything between "the control plane gave us a peer" and
//! "the interface is up":
//!
//! - [`KeyMaterialGenerator`] produces fresh key pairs and preshared keys with
//!   the host `wg` tool.
//! - [`ConfigSynthesizer`] merges provisioning data with local keys into a
//!   [`TunnelConfig`] and persists it owner-only.
//! - [`InterfaceManager`] brings the interface up (`wg-quick`, then a manual
//!   `ip`/`wg` fallback with rollback) and tears it down idempotently, under
//!   a per-interface [`InterfaceLock`].
//!
//! All host commands go through an injected [`veil_exec::CommandExecutor`].

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod interface;
pub mod keygen;
pub mod keys;
pub mod lock;
pub mod options;

pub use config::{ConfigSynthesizer, FallbackFields, ProvisioningResult, TunnelConfig, PRIVATE_FILE_MODE};
pub use error::{Result, WireGuardError};
pub use interface::{
    BringUpPath, BringUpReport, FallbackStep, InterfaceHandle, InterfaceManager, InterfaceState,
    TeardownReport,
};
pub use keygen::KeyMaterialGenerator;
pub use keys::{KeyPair, PresharedKey, PrivateKey, PublicKey, KEY_SIZE};
pub use lock::InterfaceLock;
pub use options::{
    validate_interface_name, TunnelOptions, DEFAULT_ENDPOINT_PORT, DEFAULT_INTERFACE_NAME,
    DEFAULT_KEEPALIVE_SECS, DEFAULT_MTU,
};
