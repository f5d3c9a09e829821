//! Command execution for account primitives
//!
//! Commands are always executed as an argv vector, never through a shell.

use std::fmt;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use adsync_core::domain::AccountError;

/// A program and its arguments
#[derive(Clone, PartialEq, Eq)]
pub struct CommandLine {
    program: String,
    args: Vec<String>,
    mutating: bool,
    secret: Option<String>,
}

impl CommandLine {
    /// A command that changes the account store
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            mutating: true,
            secret: None,
        }
    }

    /// A read-only command; still executed during a dry run
    pub fn query(program: impl Into<String>) -> Self {
        Self {
            mutating: false,
            ..Self::new(program)
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Hides `secret` wherever it appears when the command is displayed
    pub fn redact(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into()).filter(|s| !s.is_empty());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    pub fn is_mutating(&self) -> bool {
        self.mutating
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            let arg = match &self.secret {
                Some(secret) => arg.replace(secret.as_str(), "<redacted>"),
                None => arg.clone(),
            };
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " '{arg}'")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CommandLine").field(&self.to_string()).finish()
    }
}

/// Captured output of a successful command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Runs account primitives
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs `command` to completion
    ///
    /// # Errors
    /// [`AccountError::CommandFailed`] if the program cannot be started or
    /// exits unsuccessfully.
    async fn run(&self, command: &CommandLine) -> Result<CommandOutput, AccountError>;

    /// Returns true if mutating commands are only printed
    fn is_dry_run(&self) -> bool {
        false
    }
}

// ============================================================================
// SystemCommandRunner
// ============================================================================

/// Executes commands with `tokio::process`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandRunner;

#[async_trait]
impl CommandRunner for SystemCommandRunner {
    async fn run(&self, command: &CommandLine) -> Result<CommandOutput, AccountError> {
        debug!(command = %command, "Executing");

        let output = tokio::process::Command::new(command.program())
            .args(command.get_args())
            .stdin(std::process::Stdio::null())
            .output()
            .await
            .map_err(|e| AccountError::CommandFailed {
                command: command.to_string(),
                message: format!("failed to start: {e}"),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            warn!(command = %command, status = %output.status, "Command failed");
            return Err(AccountError::CommandFailed {
                command: command.to_string(),
                message: format!("{}: {}", output.status, stderr.trim()),
            });
        }

        Ok(CommandOutput { stdout, stderr })
    }
}

// ============================================================================
// DryRunCommandRunner
// ============================================================================

/// Prints mutating commands instead of running them
///
/// Queries are passed to the inner runner so the backend still sees the
/// real account store.
#[derive(Debug, Clone, Default)]
pub struct DryRunCommandRunner<R = SystemCommandRunner> {
    inner: R,
}

impl<R: CommandRunner> DryRunCommandRunner<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<R: CommandRunner> CommandRunner for DryRunCommandRunner<R> {
    async fn run(&self, command: &CommandLine) -> Result<CommandOutput, AccountError> {
        if !command.is_mutating() {
            return self.inner.run(command).await;
        }
        println!("{command}");
        info!(command = %command, "Dry run, not executed");
        Ok(CommandOutput::default())
    }

    fn is_dry_run(&self) -> bool {
        true
    }
}
