//! Error types for command execution.

use std::time::Duration;

use thiserror::Error;

/// Reasons a command argument was rejected before execution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A value contained a character that could break argument handling.
    #[error("{field} contains forbidden character {found:?}")]
    ForbiddenCharacter {
        /// Name of the offending field.
        field: String,
        /// The rejected character.
        found: char,
    },

}

impl ValidationError {
    /// Creates a `ForbiddenCharacter` error.
    #[must_use]
    pub fn forbidden_character(field: impl Into<String>, found: char) -> Self {
        Self::ForbiddenCharacter {
            field: field.into(),
            found,
        }
    }

}

/// Errors that can occur while running an external command.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Validation of the command failed before anything was spawned.
    #[error("argument validation failed")]
    Validation(#[from] ValidationError),

    /// The program does not exist on this host.
    #[error("program not found: {program}")]
    NotFound {
        /// The program that could not be located.
        program: String,
    },

    /// The process could not be started.
    #[error("failed to spawn '{command}': {message}")]
    Spawn {
        /// The command line that was attempted.
        command: String,
        /// Description of the failure.
        message: String,
    },

    /// The process did not finish within its time budget and was killed.
    #[error("'{command}' timed out after {}ms", timeout.as_millis())]
    Timeout {
        /// The command line that was attempted.
        command: String,
        /// The configured timeout.
        timeout: Duration,
    },

    /// The process exited unsuccessfully.
    #[error("'{command}' exited with code {exit_code}: {stderr}")]
    NonZeroExit {
        /// The command line that was executed.
        command: String,
        /// The exit code (`-1` when killed by a signal).
        exit_code: i32,
        /// Trimmed standard error output.
        stderr: String,
    },

    /// Preparing stdin for the process failed.
    #[error("stdin preparation failed")]
    Io(#[from] std::io::Error),
}

impl CommandError {
    /// Creates a `Spawn` error.
    #[must_use]
    pub fn spawn(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Spawn {
            command: command.into(),
            message: message.into(),
        }
    }

    /// Creates a `Timeout` error.
    #[must_use]
    pub fn timeout(command: impl Into<String>, timeout: Duration) -> Self {
        Self::Timeout {
            command: command.into(),
            timeout,
        }
    }

    /// Creates a `NonZeroExit` error.
    #[must_use]
    pub fn non_zero_exit(
        command: impl Into<String>,
        exit_code: i32,
        stderr: impl Into<String>,
    ) -> Self {
        Self::NonZeroExit {
            command: command.into(),
            exit_code,
            stderr: stderr.into(),
        }
    }

    /// Returns `true` if the program is missing from the host.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns `true` if the process was killed for exceeding its timeout.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Returns `true` if the command never reached the host because its
    /// arguments were rejected.
    #[must_use]
    pub fn is_validation_error(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}
