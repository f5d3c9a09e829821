//! Post-creation hook
//!
//! A user-configured command run after every successful account creation.
//! The username is appended as the last argument and both names are exported
//! as `ADSYNC_USERNAME` and `ADSYNC_DISPLAY_NAME`.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing::{debug, info};

use adsync_core::domain::Principal;

/// Upper bound on a single hook run
const HOOK_TIMEOUT: Duration = Duration::from_secs(300);

/// A command run after each account creation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostCreateHook {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl PostCreateHook {
    /// Builds a hook from an argv vector
    ///
    /// # Returns
    /// `None` if `argv` is empty
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
            timeout: HOOK_TIMEOUT,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Runs the hook for a freshly created account
    ///
    /// # Errors
    /// Returns an error if the program cannot be started, exits
    /// unsuccessfully, or exceeds its timeout.
    pub async fn run(&self, principal: &Principal) -> Result<()> {
        let username = principal.principal_name();
        debug!(hook = %self.program, account = username, "Running post-create hook");

        let child = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .arg(username)
            .env("ADSYNC_USERNAME", username)
            .env("ADSYNC_DISPLAY_NAME", principal.display_name())
            .stdin(std::process::Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, child)
            .await
            .with_context(|| format!("Hook {} timed out after {:?}", self.program, self.timeout))?
            .with_context(|| format!("Failed to start hook {}", self.program))?;

        if !output.status.success() {
            bail!(
                "Hook {} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        info!(hook = %self.program, account = username, "Post-create hook completed");
        Ok(())
    }
}
