//! Allowlisted, validated command execution.
//!
//! Every host mutation Veilguard performs goes through a [`CommandSpec`]
//! handed to a [`CommandExecutor`]. A command can only name programs from the
//! [`AllowedProgram`] allowlist, arguments are validated while the command is
//! built, and every run carries a timeout so a hung subprocess cannot stall
//! bring-up or teardown.
//!
//! No shell is ever invoked: arguments are passed to the program directly.
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), veil_exec::CommandError> {
//! use veil_exec::{AllowedProgram, CommandExecutor, CommandSpec, SystemExecutor};
//!
//! let executor = SystemExecutor::new();
//! let output = executor
//!     .run_checked(&CommandSpec::new(AllowedProgram::Wg).arg("genkey"))
//!     .await?;
//! println!("{}", output.stdout_lossy().trim());
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command as TokioCommand;
use tracing::debug;

use crate::error::{CommandError, ValidationError};

/// Timeout applied when a command does not set one.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Programs Veilguard is allowed to execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum AllowedProgram {
    /// The `wg` tool (key generation, low-level configuration).
    Wg,
    /// The `wg-quick` one-shot interface tool.
    WgQuick,
    /// The iproute2 `ip` tool.
    Ip,
    /// `ping`, used for the post bring-up connectivity probe.
    Ping,
    /// `resolvectl`, used for per-link DNS configuration.
    Resolvectl,
}

impl AllowedProgram {
    /// Returns the program name looked up on `PATH`.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wg => "wg",
            Self::WgQuick => "wg-quick",
            Self::Ip => "ip",
            Self::Ping => "ping",
            Self::Resolvectl => "resolvectl",
        }
    }
}

impl fmt::Display for AllowedProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Characters that are never allowed in command arguments.
const FORBIDDEN_CHARS: &[char] = &['\0', '\n', '\r'];

/// Validates a single command argument.
///
/// # Errors
///
/// Returns an error if the argument contains a null byte or a line break.
pub fn validate_argument(arg: &str, field_name: &str) -> Result<(), ValidationError> {
    match arg.chars().find(|c| FORBIDDEN_CHARS.contains(c)) {
        Some(c) => Err(ValidationError::forbidden_character(field_name, c)),
        None => Ok(()),
    }
}

/// Output of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Standard output.
    pub stdout: Vec<u8>,
    /// Standard error.
    pub stderr: Vec<u8>,
    /// Exit status code (`-1` when terminated by a signal).
    pub exit_code: i32,
}

impl CommandOutput {
    /// Creates a successful output with the given stdout.
    #[must_use]
    pub fn success_with(stdout: impl Into<Vec<u8>>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: Vec::new(),
            exit_code: 0,
        }
    }

    /// Creates a failed output with the given exit code and stderr.
    #[must_use]
    pub fn failure_with(exit_code: i32, stderr: impl Into<Vec<u8>>) -> Self {
        Self {
            stdout: Vec::new(),
            stderr: stderr.into(),
            exit_code,
        }
    }

    /// Stdout as UTF-8, replacing invalid sequences.
    #[must_use]
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// Stderr as UTF-8, replacing invalid sequences.
    #[must_use]
    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }

    /// Returns `true` if the command exited with code 0.
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// A validated description of one program invocation.
///
/// Invalid arguments do not panic or fail the builder; they are collected and
/// reported when the command is run, so call sites can stay linear.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    program: AllowedProgram,
    args: Vec<String>,
    stdin_file: Option<PathBuf>,
    timeout: Duration,
    validation_errors: Vec<ValidationError>,
}

impl CommandSpec {
    /// Creates a command for the given program with the default timeout.
    #[must_use]
    pub fn new(program: AllowedProgram) -> Self {
        Self {
            program,
            args: Vec::new(),
            stdin_file: None,
            timeout: DEFAULT_COMMAND_TIMEOUT,
            validation_errors: Vec::new(),
        }
    }

    /// Appends one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl AsRef<str>) -> Self {
        let arg = arg.as_ref();
        match validate_argument(arg, "argument") {
            Ok(()) => self.args.push(arg.to_string()),
            Err(e) => self.validation_errors.push(e),
        }
        self
    }

    /// Appends several arguments.
    #[must_use]
    pub fn args<I, S>(self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        args.into_iter().fold(self, Self::arg)
    }

    /// Feeds the contents of `path` to the process on stdin.
    #[must_use]
    pub fn stdin_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdin_file = Some(path.into());
        self
    }

    /// Sets the time budget for the process.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The program this command runs.
    #[must_use]
    pub fn program(&self) -> AllowedProgram {
        self.program
    }

    /// The validated arguments.
    #[must_use]
    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    /// The stdin source, if any.
    #[must_use]
    pub fn stdin_path(&self) -> Option<&Path> {
        self.stdin_file.as_deref()
    }

    /// The time budget for the process.
    #[must_use]
    pub fn time_budget(&self) -> Duration {
        self.timeout
    }

    /// Returns the first collected validation error, if any.
    ///
    /// # Errors
    ///
    /// Returns the first argument that failed validation.
    pub fn validate(&self) -> Result<(), CommandError> {
        match self.validation_errors.first() {
            Some(e) => Err(CommandError::Validation(e.clone())),
            None => Ok(()),
        }
    }

    /// Human-readable command line for logs and errors.
    #[must_use]
    pub fn description(&self) -> String {
        let program = self.program.as_str();
        if self.args.is_empty() {
            program.to_string()
        } else {
            format!("{program} {}", self.args.join(" "))
        }
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description())
    }
}

/// Capability to run host commands.
///
/// Implementations return `Ok` for any process that ran to completion,
/// whatever its exit code; [`CommandExecutor::run_checked`] turns a non-zero
/// exit into an error.
#[allow(async_fn_in_trait)]
pub trait CommandExecutor {
    /// Runs the command and returns its output.
    async fn run(&self, command: &CommandSpec) -> Result<CommandOutput, CommandError>;

    /// Runs the command and fails on a non-zero exit code.
    async fn run_checked(&self, command: &CommandSpec) -> Result<CommandOutput, CommandError> {
        let output = self.run(command).await?;
        if output.success() {
            Ok(output)
        } else {
            Err(CommandError::non_zero_exit(
                command.description(),
                output.exit_code,
                output.stderr_lossy().trim(),
            ))
        }
    }
}

/// Executor that spawns real processes with `tokio::process`.
///
/// Processes are killed if their timeout elapses or the awaiting future is
/// dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemExecutor;

impl SystemExecutor {
    /// Creates a new system executor.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl CommandExecutor for SystemExecutor {
    async fn run(&self, command: &CommandSpec) -> Result<CommandOutput, CommandError> {
        command.validate()?;

        let description = command.description();
        debug!(command = %description, timeout_ms = command.timeout.as_millis(), "running command");

        let mut cmd = TokioCommand::new(command.program.as_str());
        cmd.args(&command.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        match &command.stdin_file {
            Some(path) => {
                let file = tokio::fs::File::open(path).await?.into_std().await;
                cmd.stdin(Stdio::from(file));
            }
            None => {
                cmd.stdin(Stdio::null());
            }
        }

        let output = match tokio::time::timeout(command.timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CommandError::NotFound {
                    program: command.program.as_str().to_string(),
                });
            }
            Ok(Err(e)) => return Err(CommandError::spawn(description, e.to_string())),
            Err(_) => return Err(CommandError::timeout(description, command.timeout)),
        };

        let result = CommandOutput {
            stdout: output.stdout,
            stderr: output.stderr,
            exit_code: output.status.code().unwrap_or(-1),
        };
        debug!(command = %description, exit_code = result.exit_code, "command finished");
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(AllowedProgram::Wg, "wg")]
    #[test_case(AllowedProgram::WgQuick, "wg-quick")]
    #[test_case(AllowedProgram::Ip, "ip")]
    #[test_case(AllowedProgram::Ping, "ping")]
    #[test_case(AllowedProgram::Resolvectl, "resolvectl")]
    fn program_names(program: AllowedProgram, expected: &str) {
        assert_eq!(program.as_str(), expected);
        assert_eq!(program.to_string(), expected);
    }

    #[test]
    fn description_joins_arguments() {
        let spec = CommandSpec::new(AllowedProgram::Ip).args(["link", "delete", "dev", "veil0"]);
        assert_eq!(spec.description(), "ip link delete dev veil0");
        assert_eq!(spec.to_string(), "ip link delete dev veil0");
    }

    #[test]
    fn description_without_arguments() {
        assert_eq!(CommandSpec::new(AllowedProgram::Wg).description(), "wg");
    }

    #[test]
    fn newline_argument_is_collected_not_pushed() {
        let spec = CommandSpec::new(AllowedProgram::Ip).arg("addr\nflush");
        assert!(spec.arguments().is_empty());
        let err = spec.validate().expect_err("newline must be rejected");
        assert!(err.is_validation_error());
    }

    #[test]
    fn metacharacters_pass_argument_validation() {
        // No shell is involved, so `;` is just a byte.
        assert!(validate_argument("a;b", "argument").is_ok());
    }

    #[test]
    fn default_timeout_applies() {
        let spec = CommandSpec::new(AllowedProgram::Ping);
        assert_eq!(spec.time_budget(), DEFAULT_COMMAND_TIMEOUT);
        let spec = spec.timeout(Duration::from_secs(2));
        assert_eq!(spec.time_budget(), Duration::from_secs(2));
    }

    #[test]
    fn output_helpers() {
        let ok = CommandOutput::success_with("abc\n");
        assert!(ok.success());
        assert_eq!(ok.stdout_lossy(), "abc\n");

        let failed = CommandOutput::failure_with(1, "boom");
        assert!(!failed.success());
        assert_eq!(failed.stderr_lossy(), "boom");
    }

    #[tokio::test]
    async fn system_executor_rejects_invalid_spec_without_spawning() {
        let spec = CommandSpec::new(AllowedProgram::Ip).arg("bad\0arg");
        let result = SystemExecutor::new().run(&spec).await;
        assert!(matches!(result, Err(CommandError::Validation(_))));
    }

    #[tokio::test]
    async fn system_executor_reports_unreadable_stdin_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let spec = CommandSpec::new(AllowedProgram::Wg)
            .arg("pubkey")
            .stdin_file(dir.path().join("missing.key"));
        let result = SystemExecutor::new().run(&spec).await;
        assert!(matches!(result, Err(CommandError::Io(_))));
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn printable_arguments_always_accepted(arg in "[ -~]{0,64}") {
                prop_assert!(validate_argument(&arg, "argument").is_ok());
            }

            #[test]
            fn arguments_with_newline_rejected(prefix in "[a-z]{0,8}", suffix in "[a-z]{0,8}") {
                let arg = format!("{prefix}\n{suffix}");
                prop_assert!(validate_argument(&arg, "argument").is_err());
            }
        }
    }
}
