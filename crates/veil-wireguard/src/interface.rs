//! Tunnel interface lifecycle.
//!
//! [`InterfaceManager`] brings an interface up from a persisted configuration
//! and tears it down again. Bring-up tries `wg-quick` first; if that fails it
//! drives the interface by hand with `ip` and `wg setconf`, one step at a
//! time, and removes whatever it created when any step fails or the caller
//! cancels. Teardown is idempotent and never fails.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use veil_exec::{AllowedProgram, CommandError, CommandExecutor, CommandSpec};
use zeroize::Zeroizing;

use crate::config::{write_private_file, FallbackFields};
use crate::error::{Result, WireGuardError};
use crate::lock::InterfaceLock;
use crate::options::TunnelOptions;

/// Lifecycle state of the managed interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterfaceState {
    /// No interface exists.
    #[default]
    Down,
    /// Bring-up is in progress.
    BringingUp,
    /// The interface is configured and up.
    Up,
    /// Teardown is in progress.
    TearingDown,
}

impl fmt::Display for InterfaceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Down => "down",
            Self::BringingUp => "bringing_up",
            Self::Up => "up",
            Self::TearingDown => "tearing_down",
        };
        write!(f, "{s}")
    }
}

/// The interface a bring-up or teardown operates on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterfaceHandle {
    name: String,
    state: InterfaceState,
    config_path: PathBuf,
}

impl InterfaceHandle {
    /// Creates a handle in the `Down` state.
    #[must_use]
    pub fn new(name: impl Into<String>, config_path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            state: InterfaceState::Down,
            config_path: config_path.into(),
        }
    }

    /// Interface name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> InterfaceState {
        self.state
    }

    /// Path of the configuration file for this interface.
    #[must_use]
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Returns `true` if the interface is up.
    #[must_use]
    pub fn is_up(&self) -> bool {
        self.state == InterfaceState::Up
    }
}

/// One step of the manual bring-up sequence, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FallbackStep {
    /// `ip link add dev <if> type wireguard`
    CreateDevice,
    /// `wg setconf <if> <file>`
    ApplyConfig,
    /// `ip address add <cidr> dev <if>`
    AssignAddress,
    /// `ip link set mtu <mtu> up dev <if>`
    LinkUp,
    /// `ip route add default dev <if>`
    DefaultRoute,
}

impl FallbackStep {
    /// All steps in the order they run.
    pub const ALL: [Self; 5] = [
        Self::CreateDevice,
        Self::ApplyConfig,
        Self::AssignAddress,
        Self::LinkUp,
        Self::DefaultRoute,
    ];

    /// Short name used in logs and errors.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateDevice => "create-device",
            Self::ApplyConfig => "apply-config",
            Self::AssignAddress => "assign-address",
            Self::LinkUp => "link-up",
            Self::DefaultRoute => "default-route",
        }
    }
}

impl fmt::Display for FallbackStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which bring-up path configured the interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BringUpPath {
    /// `wg-quick up` succeeded.
    Primary,
    /// The manual `ip`/`wg` sequence succeeded after `wg-quick` failed.
    Fallback,
}

impl fmt::Display for BringUpPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => write!(f, "primary"),
            Self::Fallback => write!(f, "fallback"),
        }
    }
}

/// Everything that happened during one bring-up.
#[derive(Debug)]
pub struct BringUpReport {
    /// The path that succeeded, or why neither did.
    pub outcome: std::result::Result<BringUpPath, WireGuardError>,
    /// Why `wg-quick` failed, when the fallback path was taken.
    pub primary_error: Option<WireGuardError>,
    /// Non-fatal problems (DNS, connectivity probe).
    pub warnings: Vec<WireGuardError>,
}

impl BringUpReport {
    fn failed(error: WireGuardError) -> Self {
        Self {
            outcome: Err(error),
            primary_error: None,
            warnings: Vec::new(),
        }
    }

    /// Returns `true` if the interface is up.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.outcome.is_ok()
    }

    /// The successful path, if any.
    #[must_use]
    pub fn path(&self) -> Option<BringUpPath> {
        self.outcome.as_ref().ok().copied()
    }

    /// The fatal error, if bring-up failed.
    #[must_use]
    pub fn error(&self) -> Option<&WireGuardError> {
        self.outcome.as_ref().err()
    }

    /// Consumes the report, keeping only the outcome.
    ///
    /// # Errors
    ///
    /// Returns the fatal error if bring-up failed.
    pub fn into_result(self) -> Result<BringUpPath> {
        self.outcome
    }
}

/// Everything that happened during one teardown.
#[derive(Debug, Default)]
pub struct TeardownReport {
    /// Failures that were logged and ignored.
    pub swallowed: Vec<WireGuardError>,
    /// `true` if the lock could not be taken and the host was left alone.
    pub skipped: bool,
}

impl TeardownReport {
    /// Returns `true` if every teardown step ran and succeeded.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        !self.skipped && self.swallowed.is_empty()
    }
}

/// Brings the tunnel interface up and down through a [`CommandExecutor`].
#[derive(Debug, Clone)]
pub struct InterfaceManager<E> {
    executor: E,
    options: TunnelOptions,
    scratch_root: Option<PathBuf>,
}

impl<E: CommandExecutor> InterfaceManager<E> {
    /// Creates a manager for the interface described by `options`.
    pub fn new(executor: E, options: TunnelOptions) -> Self {
        Self {
            executor,
            options,
            scratch_root: None,
        }
    }

    /// Stages low-level configuration files under `root`.
    #[must_use]
    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = Some(root.into());
        self
    }

    /// The options this manager applies.
    #[must_use]
    pub fn options(&self) -> &TunnelOptions {
        &self.options
    }

    /// A `Down` handle for the configured interface and path.
    #[must_use]
    pub fn handle(&self) -> InterfaceHandle {
        InterfaceHandle::new(&self.options.interface_name, self.options.config_path())
    }

    /// Brings the interface up from `handle.config_path()`.
    ///
    /// Never panics and never returns early with an error: every outcome,
    /// including lock timeouts and cancellation, is described by the report.
    /// On any failure the interface is removed again.
    pub async fn bring_up(
        &self,
        handle: &mut InterfaceHandle,
        cancel: &CancellationToken,
    ) -> BringUpReport {
        handle.state = InterfaceState::BringingUp;
        let lock = match self.lock_interface(&handle.name).await {
            Ok(lock) => lock,
            Err(e) => {
                warn!(interface = %handle.name, error = %e, "bring-up aborted");
                handle.state = InterfaceState::Down;
                return BringUpReport::failed(e);
            }
        };
        self.bring_up_locked(&lock, handle, cancel).await
    }

    /// Takes exclusive ownership of `name`, waiting up to the configured
    /// lock timeout.
    ///
    /// Callers that must write the configuration file and bring the
    /// interface up as one step hold this across both and then call
    /// [`InterfaceManager::bring_up_locked`].
    ///
    /// # Errors
    ///
    /// Returns `LockTimeout` or `Lock`.
    pub async fn lock_interface(&self, name: &str) -> Result<InterfaceLock> {
        InterfaceLock::acquire(name, &self.options.lock_dir, self.options.lock_timeout()).await
    }

    /// Same as [`InterfaceManager::bring_up`] for a caller that already holds
    /// the interface lock.
    ///
    /// A lock taken for a different interface fails the report without
    /// touching the host.
    pub async fn bring_up_locked(
        &self,
        lock: &InterfaceLock,
        handle: &mut InterfaceHandle,
        cancel: &CancellationToken,
    ) -> BringUpReport {
        if lock.interface() != handle.name {
            handle.state = InterfaceState::Down;
            return BringUpReport::failed(WireGuardError::Lock {
                path: lock.path().to_path_buf(),
                message: format!("held for {}, not {}", lock.interface(), handle.name),
            });
        }

        handle.state = InterfaceState::BringingUp;
        info!(interface = %handle.name, path = %handle.config_path.display(), "bringing interface up");

        let mut stale = Vec::new();
        self.remove_interface(handle, &mut stale).await;
        debug!(interface = %handle.name, ignored = stale.len(), "pre bring-up cleanup done");

        let mut primary_error = None;
        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(WireGuardError::Cancelled),
            result = self.activate(handle, &mut primary_error) => result,
        };

        let mut report = BringUpReport {
            outcome,
            primary_error,
            warnings: Vec::new(),
        };

        match &report.outcome {
            Ok(path) => {
                info!(interface = %handle.name, path = %path, "interface up");
                handle.state = InterfaceState::Up;
                self.post_bring_up(handle, &mut report.warnings).await;
            }
            Err(e) => {
                warn!(interface = %handle.name, error = %e, "bring-up failed, rolling back");
                self.rollback(handle).await;
                handle.state = InterfaceState::Down;
            }
        }

        report
    }

    /// Removes the interface and its `wg-quick` state.
    ///
    /// Idempotent: failures (including "does not exist") are recorded in the
    /// report and otherwise ignored. The handle always ends `Down`.
    pub async fn tear_down(&self, handle: &mut InterfaceHandle) -> TeardownReport {
        handle.state = InterfaceState::TearingDown;
        info!(interface = %handle.name, "tearing interface down");

        let mut report = TeardownReport::default();
        match self.lock_interface(&handle.name).await {
            Ok(_lock) => self.remove_interface(handle, &mut report.swallowed).await,
            Err(e) => {
                warn!(interface = %handle.name, error = %e, "teardown skipped");
                report.skipped = true;
                report.swallowed.push(e);
            }
        }

        for e in &report.swallowed {
            debug!(interface = %handle.name, error = %e, "teardown error ignored");
        }
        handle.state = InterfaceState::Down;
        report
    }

    /// Reports whether the interface currently exists on the host.
    ///
    /// # Errors
    ///
    /// Returns `ToolNotFound` if `ip` is missing and `ToolInvocation` if it
    /// could not be run.
    pub async fn status(&self, name: &str) -> Result<InterfaceState> {
        let spec = self.command(AllowedProgram::Ip).args(["link", "show", "dev", name]);
        match self.executor.run(&spec).await {
            Ok(output) if output.success() => Ok(InterfaceState::Up),
            Ok(_) => Ok(InterfaceState::Down),
            Err(CommandError::NotFound { program }) => Err(WireGuardError::ToolNotFound { tool: program }),
            Err(e) => Err(WireGuardError::tool_invocation("query interface", e.to_string())),
        }
    }

    fn command(&self, program: AllowedProgram) -> CommandSpec {
        CommandSpec::new(program).timeout(self.options.command_timeout())
    }

    async fn activate(
        &self,
        handle: &InterfaceHandle,
        primary_error: &mut Option<WireGuardError>,
    ) -> Result<BringUpPath> {
        let up = self
            .command(AllowedProgram::WgQuick)
            .arg("up")
            .arg(handle.config_path.to_string_lossy());

        match self.executor.run_checked(&up).await {
            Ok(_) => return Ok(BringUpPath::Primary),
            Err(e) => {
                let e = WireGuardError::PrimaryBringup(e.to_string());
                warn!(interface = %handle.name, error = %e, "wg-quick failed, trying manual bring-up");
                *primary_error = Some(e);
            }
        }

        self.fallback(handle).await?;
        Ok(BringUpPath::Fallback)
    }

    async fn fallback(&self, handle: &InterfaceHandle) -> Result<()> {
        let fields = FallbackFields::load(&handle.config_path).await?;

        let mut builder = tempfile::Builder::new();
        builder.prefix("veil-setconf-");
        let scratch = match &self.scratch_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
        .map_err(|e| WireGuardError::ConfigWrite {
            path: self.scratch_root.clone().unwrap_or_else(std::env::temp_dir),
            message: e.to_string(),
        })?;

        let artifact = scratch.path().join(format!("{}.setconf", handle.name));
        let low_level = Zeroizing::new(fields.render_low_level().into_bytes());
        write_private_file(&artifact, low_level)
            .await
            .map_err(|e| WireGuardError::ConfigWrite {
                path: artifact.clone(),
                message: e.to_string(),
            })?;

        for step in FallbackStep::ALL {
            for spec in self.step_commands(step, handle, &fields, &artifact) {
                self.executor
                    .run_checked(&spec)
                    .await
                    .map_err(|e| WireGuardError::fallback_step(step, e.to_string()))?;
            }
            debug!(interface = %handle.name, step = %step, "fallback step done");
        }

        Ok(())
    }

    fn step_commands(
        &self,
        step: FallbackStep,
        handle: &InterfaceHandle,
        fields: &FallbackFields,
        artifact: &Path,
    ) -> Vec<CommandSpec> {
        let name = handle.name.as_str();
        match step {
            FallbackStep::CreateDevice => vec![
                self.command(AllowedProgram::Ip)
                    .args(["link", "add", "dev", name, "type", "wireguard"]),
            ],
            FallbackStep::ApplyConfig => vec![
                self.command(AllowedProgram::Wg)
                    .args(["setconf", name])
                    .arg(artifact.to_string_lossy()),
            ],
            FallbackStep::AssignAddress => fields
                .addresses
                .iter()
                .map(|addr| {
                    self.command(AllowedProgram::Ip)
                        .args(["address", "add"])
                        .arg(addr.to_string())
                        .args(["dev", name])
                })
                .collect(),
            FallbackStep::LinkUp => vec![
                self.command(AllowedProgram::Ip)
                    .args(["link", "set", "mtu"])
                    .arg(self.options.mtu.to_string())
                    .args(["up", "dev", name]),
            ],
            FallbackStep::DefaultRoute => vec![
                self.command(AllowedProgram::Ip)
                    .args(["route", "add", "default", "dev", name]),
            ],
        }
    }

    async fn post_bring_up(&self, handle: &InterfaceHandle, warnings: &mut Vec<WireGuardError>) {
        let name = handle.name.as_str();
        let servers: Vec<String> = self.options.dns_servers.iter().map(ToString::to_string).collect();

        let dns = self
            .command(AllowedProgram::Resolvectl)
            .args(["dns", name])
            .args(&servers);
        let domain = self
            .command(AllowedProgram::Resolvectl)
            .args(["domain", name, "~."]);

        for spec in [dns, domain] {
            if let Err(e) = self.executor.run_checked(&spec).await {
                let e = WireGuardError::Dns(e.to_string());
                warn!(interface = %name, error = %e, "DNS correction failed");
                warnings.push(e);
                break;
            }
        }

        let probe = self
            .command(AllowedProgram::Ping)
            .args(["-c", "1", "-W"])
            .arg(self.options.probe_timeout_secs.to_string())
            .arg(self.options.probe_address.to_string());
        match self.executor.run_checked(&probe).await {
            Ok(_) => debug!(interface = %name, target = %self.options.probe_address, "connectivity probe ok"),
            Err(e) => {
                let e = WireGuardError::Connectivity(e.to_string());
                warn!(interface = %name, error = %e, "connectivity probe failed");
                warnings.push(e);
            }
        }
    }

    async fn rollback(&self, handle: &InterfaceHandle) {
        let spec = self
            .command(AllowedProgram::Ip)
            .args(["link", "delete", "dev", handle.name.as_str()]);
        if let Err(e) = self.executor.run_checked(&spec).await {
            debug!(interface = %handle.name, error = %e, "rollback delete failed");
        }
    }

    async fn remove_interface(&self, handle: &InterfaceHandle, errors: &mut Vec<WireGuardError>) {
        let down = self
            .command(AllowedProgram::WgQuick)
            .arg("down")
            .arg(handle.config_path.to_string_lossy());
        let delete = self
            .command(AllowedProgram::Ip)
            .args(["link", "delete", "dev", handle.name.as_str()]);

        for spec in [down, delete] {
            if let Err(e) = self.executor.run_checked(&spec).await {
                errors.push(WireGuardError::Disconnect(e.to_string()));
            }
        }
    }
}
