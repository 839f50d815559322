//! Scripted executor for exercising host-mutating code without a host.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::command::{AllowedProgram, CommandExecutor, CommandOutput, CommandSpec};
use crate::error::CommandError;

/// What a scripted command does when it is run.
#[derive(Debug, Clone)]
pub enum FakeResponse {
    /// Exit 0 with the given stdout.
    Success(String),
    /// Exit with the given code and stderr.
    Failure {
        /// Exit code to report.
        exit_code: i32,
        /// Stderr to report.
        stderr: String,
    },
    /// Never finish on its own; resolves to a timeout after the command's budget.
    Hang,
    /// Wait, then behave like the inner response.
    Delayed(Duration, Box<FakeResponse>),
}

impl FakeResponse {
    /// Successful response with stdout.
    #[must_use]
    pub fn stdout(stdout: impl Into<String>) -> Self {
        Self::Success(stdout.into())
    }

    /// Failed response with exit code 1 and stderr.
    #[must_use]
    pub fn failure(stderr: impl Into<String>) -> Self {
        Self::Failure {
            exit_code: 1,
            stderr: stderr.into(),
        }
    }
}

/// One recorded call to [`FakeExecutor::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Program that was run.
    pub program: AllowedProgram,
    /// Arguments it was given.
    pub args: Vec<String>,
    /// Contents of the stdin file at the time of the call, if one was set.
    pub stdin: Option<String>,
}

impl Invocation {
    /// The invocation as a single command line.
    #[must_use]
    pub fn command_line(&self) -> String {
        if self.args.is_empty() {
            self.program.to_string()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

#[derive(Debug, Clone)]
struct Rule {
    program: AllowedProgram,
    prefix: Vec<String>,
    response: FakeResponse,
}

impl Rule {
    fn matches(&self, spec: &CommandSpec) -> bool {
        self.program == spec.program()
            && spec.arguments().len() >= self.prefix.len()
            && self
                .prefix
                .iter()
                .zip(spec.arguments())
                .all(|(expected, actual)| expected == actual)
    }
}

#[derive(Debug, Default)]
struct FakeState {
    rules: Vec<Rule>,
    missing: HashSet<AllowedProgram>,
    invocations: Vec<Invocation>,
}

/// A [`CommandExecutor`] driven by scripted rules.
///
/// Rules match on program plus an argument prefix; the most recently added
/// matching rule wins. Unmatched commands succeed with empty output. Every
/// call is recorded, including calls for missing programs.
#[derive(Debug, Clone, Default)]
pub struct FakeExecutor {
    state: Arc<Mutex<FakeState>>,
}

impl FakeExecutor {
    /// Creates an executor where every command succeeds silently.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the response for commands starting with `prefix`.
    pub fn respond<S: AsRef<str>>(&self, program: AllowedProgram, prefix: &[S], response: FakeResponse) {
        self.state.lock().rules.push(Rule {
            program,
            prefix: prefix.iter().map(|s| s.as_ref().to_string()).collect(),
            response,
        });
    }

    /// Scripts a successful stdout for commands starting with `prefix`.
    pub fn succeed<S: AsRef<str>>(&self, program: AllowedProgram, prefix: &[S], stdout: &str) {
        self.respond(program, prefix, FakeResponse::stdout(stdout));
    }

    /// Scripts a failure for commands starting with `prefix`.
    pub fn fail<S: AsRef<str>>(&self, program: AllowedProgram, prefix: &[S], stderr: &str) {
        self.respond(program, prefix, FakeResponse::failure(stderr));
    }

    /// Makes every invocation of `program` fail as if it were not installed.
    pub fn remove_program(&self, program: AllowedProgram) {
        self.state.lock().missing.insert(program);
    }

    /// All invocations so far, in call order.
    #[must_use]
    pub fn invocations(&self) -> Vec<Invocation> {
        self.state.lock().invocations.clone()
    }

    /// All invocations rendered as command lines.
    #[must_use]
    pub fn command_lines(&self) -> Vec<String> {
        self.state
            .lock()
            .invocations
            .iter()
            .map(Invocation::command_line)
            .collect()
    }

    /// Number of invocations whose command line starts with `prefix`.
    #[must_use]
    pub fn count_matching(&self, prefix: &str) -> usize {
        self.command_lines()
            .iter()
            .filter(|line| line.starts_with(prefix))
            .count()
    }

    fn record(&self, spec: &CommandSpec) -> Result<Option<FakeResponse>, CommandError> {
        let stdin = match spec.stdin_path() {
            Some(path) => Some(std::fs::read_to_string(path)?),
            None => None,
        };

        let mut state = self.state.lock();
        state.invocations.push(Invocation {
            program: spec.program(),
            args: spec.arguments().to_vec(),
            stdin,
        });

        if state.missing.contains(&spec.program()) {
            return Err(CommandError::NotFound {
                program: spec.program().to_string(),
            });
        }

        Ok(state
            .rules
            .iter()
            .rev()
            .find(|rule| rule.matches(spec))
            .map(|rule| rule.response.clone()))
    }
}

impl CommandExecutor for FakeExecutor {
    async fn run(&self, command: &CommandSpec) -> Result<CommandOutput, CommandError> {
        command.validate()?;

        let mut response = match self.record(command)? {
            Some(response) => response,
            None => return Ok(CommandOutput::default()),
        };

        loop {
            match response {
                FakeResponse::Success(stdout) => return Ok(CommandOutput::success_with(stdout)),
                FakeResponse::Failure { exit_code, stderr } => {
                    return Ok(CommandOutput::failure_with(exit_code, stderr));
                }
                FakeResponse::Hang => {
                    tokio::time::sleep(command.time_budget()).await;
                    return Err(CommandError::timeout(command.description(), command.time_budget()));
                }
                FakeResponse::Delayed(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    response = *inner;
                }
            }
        }
    }
}
