//! Veilguard CLI binary entrypoint.

use std::io;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use veil_api::{AuthToken, HttpControlPlane};
use veil_cli::cli::{Cli, Commands, LogFormat};
use veil_cli::commands::{AccountCommand, NodesCommand, StatusCommand, TunnelCommand};
use veil_cli::interrupt;
use veil_cli::{OutputFormat, Settings};
use veil_connect::ConnectionOrchestrator;
use veil_exec::SystemExecutor;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_format);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool, format: LogFormat) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let settings = Settings::load(cli.config.as_deref())?
        .with_overrides(cli.api_url, cli.interface)?;
    let format = OutputFormat::new(cli.format);
    let mut stdout = io::stdout().lock();

    let api = HttpControlPlane::new(&settings.api.base_url, settings.api.timeout())
        .context("invalid control-plane URL")?;
    let cancel = CancellationToken::new();
    let orchestrator = || {
        ConnectionOrchestrator::new(SystemExecutor::new(), api.clone(), settings.tunnel.clone())
            .with_cancellation(cancel.clone())
    };

    match cli.command {
        Commands::Connect { token, node } => {
            let listener = interrupt::cancel_on(tokio::signal::ctrl_c(), cancel.clone());
            let result = TunnelCommand::new(orchestrator())
                .connect(&mut stdout, &format, &AuthToken::new(token), &node)
                .await;
            listener.abort();
            result.with_context(|| format!("connecting to node {node}"))?;
        }
        Commands::Disconnect { config_path } => {
            TunnelCommand::new(orchestrator())
                .disconnect(&mut stdout, &format, config_path)
                .await?;
        }
        Commands::Nodes { token } => {
            NodesCommand::new(api.clone())
                .execute(&mut stdout, &format, &AuthToken::new(token))
                .await?;
        }
        Commands::Login { api_key } => {
            AccountCommand::new(api.clone())
                .login(&mut stdout, &format, &api_key)
                .await?;
        }
        Commands::Register => {
            AccountCommand::new(api.clone()).register(&mut stdout, &format).await?;
        }
        Commands::Status { token } => {
            let token = token.map(AuthToken::new);
            StatusCommand::new(orchestrator())
                .execute(&mut stdout, &format, token.as_ref())
                .await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use veil_cli::cli::Format;

    #[test]
    fn cli_parses_connect() {
        let cli = Cli::parse_from(["veilguard", "connect", "--token", "t", "--node", "node-a"]);
        assert!(matches!(
            cli.command,
            Commands::Connect { ref token, ref node } if token == "t" && node == "node-a"
        ));
    }

    #[test]
    fn cli_parses_disconnect_with_path() {
        let cli = Cli::parse_from(["veilguard", "disconnect", "--config-path", "/tmp/veil0.conf"]);
        assert!(matches!(
            cli.command,
            Commands::Disconnect { config_path: Some(ref p) } if *p == PathBuf::from("/tmp/veil0.conf")
        ));
    }

    #[test]
    fn cli_parses_status_without_token() {
        let cli = Cli::parse_from(["veilguard", "status"]);
        assert!(matches!(cli.command, Commands::Status { token: None }));
    }

    #[test]
    fn cli_respects_global_flags() {
        let cli = Cli::parse_from([
            "veilguard",
            "--format",
            "json",
            "--log-format",
            "json",
            "-v",
            "-i",
            "veil3",
            "register",
        ]);
        assert_eq!(cli.format, Format::Json);
        assert_eq!(cli.log_format, LogFormat::Json);
        assert!(cli.verbose);
        assert_eq!(cli.interface.as_deref(), Some("veil3"));
        assert!(matches!(cli.command, Commands::Register));
    }

    #[test]
    fn cli_rejects_connect_without_node() {
        assert!(Cli::try_parse_from(["veilguard", "connect", "--token", "t"]).is_err());
    }

    #[tokio::test]
    async fn run_with_invalid_settings_fails() {
        let cli = Cli::parse_from(["veilguard", "--api-url", "ftp://example.com", "register"]);
        assert!(run(cli).await.is_err());
    }

    #[tokio::test]
    async fn run_without_control_plane_fails() {
        let cli = Cli::parse_from(["veilguard", "--api-url", "http://127.0.0.1:1", "register"]);
        assert!(run(cli).await.is_err());
    }
}
