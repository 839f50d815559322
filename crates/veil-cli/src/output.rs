//! Output formatting for CLI commands.
//!
//! Supports table (human-readable) and JSON output formats.

use std::io::Write;
use std::path::PathBuf;

use serde::Serialize;
use veil_api::{Node, SubscriptionStatus};
use veil_wireguard::InterfaceState;

use crate::cli::Format;
use crate::error::CliError;

/// Output formatter that handles both table and JSON output.
#[derive(Debug, Clone)]
pub struct OutputFormat {
    format: Format,
}

impl OutputFormat {
    /// Create a new output formatter.
    #[must_use]
    pub const fn new(format: Format) -> Self {
        Self { format }
    }

    /// Check if JSON format is selected.
    #[must_use]
    pub const fn is_json(&self) -> bool {
        matches!(self.format, Format::Json)
    }

    /// Write a serializable value to the output.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write<W, T>(&self, writer: &mut W, value: &T) -> Result<(), CliError>
    where
        W: Write,
        T: Serialize + TableDisplay,
    {
        match self.format {
            Format::Json => {
                serde_json::to_writer_pretty(&mut *writer, value)
                    .map_err(|e| CliError::Format(format!("JSON serialization failed: {e}")))?;
                writeln!(writer)?;
            }
            Format::Table => value.write_table(writer)?,
        }
        Ok(())
    }
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self::new(Format::Table)
    }
}

/// Trait for types that can be displayed as a table.
pub trait TableDisplay {
    /// Write the value as a human-readable table.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError>;
}

/// Nodes returned by the directory.
#[derive(Debug, Clone, Serialize)]
pub struct NodeList {
    /// All listed nodes, active or not.
    pub nodes: Vec<Node>,
}

impl TableDisplay for NodeList {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        if self.nodes.is_empty() {
            writeln!(writer, "No nodes available.")?;
            return Ok(());
        }

        writeln!(writer, "{:<24} {:<10} {:<20} LOCATION", "ID", "STATUS", "NAME")?;
        for node in &self.nodes {
            writeln!(
                writer,
                "{:<24} {:<10} {:<20} {}",
                node.id,
                node.status,
                node.name.as_deref().unwrap_or("-"),
                node.location.as_deref().unwrap_or("-"),
            )?;
        }
        Ok(())
    }
}

/// Result of a successful `connect`.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectSummary {
    /// Interface name.
    pub interface: String,
    /// Node the tunnel terminates on.
    pub node_id: String,
    /// `primary` or `fallback`.
    pub bring_up: String,
    /// Client public key registered with the node.
    pub public_key: String,
    /// Where the tunnel configuration was written.
    pub config_path: PathBuf,
    /// Non-fatal problems seen after bring-up.
    pub warnings: Vec<String>,
}

impl TableDisplay for ConnectSummary {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        writeln!(writer, "Connected")?;
        writeln!(writer, "  Interface:   {}", self.interface)?;
        writeln!(writer, "  Node:        {}", self.node_id)?;
        writeln!(writer, "  Bring-up:    {}", self.bring_up)?;
        writeln!(writer, "  Public key:  {}", self.public_key)?;
        writeln!(writer, "  Config:      {}", self.config_path.display())?;
        for warning in &self.warnings {
            writeln!(writer, "  Warning:     {warning}")?;
        }
        Ok(())
    }
}

/// Result of a `disconnect`.
#[derive(Debug, Clone, Serialize)]
pub struct DisconnectSummary {
    /// Interface name.
    pub interface: String,
    /// Whether teardown was skipped because the lock was busy.
    pub skipped: bool,
    /// Errors that were ignored during teardown.
    pub ignored: Vec<String>,
}

impl TableDisplay for DisconnectSummary {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        if self.skipped {
            writeln!(writer, "Skipped teardown of {}: interface is busy", self.interface)?;
        } else {
            writeln!(writer, "Disconnected {}", self.interface)?;
        }
        for e in &self.ignored {
            writeln!(writer, "  Ignored: {e}")?;
        }
        Ok(())
    }
}

/// Result of `login` or `register`.
#[derive(Debug, Clone, Serialize)]
pub struct Credential {
    /// `token` or `api_key`.
    pub kind: &'static str,
    /// The credential itself.
    pub value: String,
}

impl TableDisplay for Credential {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        writeln!(writer, "{}", self.value)?;
        Ok(())
    }
}

/// Result of `status`.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    /// Interface name.
    pub interface: String,
    /// Whether the interface exists on the host.
    pub state: InterfaceState,
    /// Subscription, when a token was given.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription: Option<SubscriptionStatus>,
}

impl TableDisplay for StatusReport {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        writeln!(writer, "Interface:     {} ({})", self.interface, self.state)?;
        if let Some(sub) = &self.subscription {
            let state = if sub.active { "active" } else { "inactive" };
            writeln!(writer, "Subscription:  {state}")?;
            if let Some(plan) = &sub.plan {
                writeln!(writer, "  Plan:        {plan}")?;
            }
            if let Some(expires) = &sub.expires_at {
                writeln!(writer, "  Expires:     {expires}")?;
            }
        }
        Ok(())
    }
}
