//! External command invocation
//!
//! Every read and write of firewall state is an external process: the
//! PowerShell bridge for rules and `netsh` for profile and global settings.
//! [`CommandRunner`] is the seam between the reconciler and the OS so tests
//! can record invocations instead of spawning processes.
//!
//! # Environment Variables
//!
//! - `WINFW_NETSH_COMMAND`: path to a replacement for `netsh` (applied via
//!   [`crate::config::load_config`])

use crate::core::bridge::Bridge;
use crate::core::error::{Error, Result};
use std::future::Future;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, error};

/// Default OS firewall CLI
pub const DEFAULT_NETSH: &str = "netsh";

/// Captured result of one finished process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Successful output with the given stdout
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Failed output with the given stderr
    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code: Some(exit_code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// stdout and stderr joined, for logging and error matching
    pub fn combined(&self) -> String {
        match (self.stdout.trim(), self.stderr.trim()) {
            ("", err) => err.to_string(),
            (out, "") => out.to_string(),
            (out, err) => format!("{out}\n{err}"),
        }
    }

    /// Converts a failed run into `Error::Invocation`, keeping the captured output.
    pub fn into_error(self, verb: &str, target: &str) -> Error {
        let combined = self.combined();
        let message = if combined.is_empty() {
            format!("exited with status {:?}", self.exit_code)
        } else {
            combined
        };
        Error::Invocation {
            verb: verb.to_string(),
            target: target.to_string(),
            message,
            stderr: (!self.stderr.is_empty()).then_some(self.stderr),
            exit_code: self.exit_code,
        }
    }
}

/// Runs an external program to completion.
///
/// Implementations return `Ok` for any process that ran, whatever its exit
/// status; `Err` means the process could not be started at all.
pub trait CommandRunner {
    fn run(&self, program: &str, args: &[String]) -> impl Future<Output = Result<CommandOutput>>;
}

/// Spawns real processes via `tokio::process`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput> {
        debug!("Running {program} {args:?}");

        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                error!("Failed to spawn {program}: {e}");
                Error::Invocation {
                    verb: args.first().cloned().unwrap_or_default(),
                    target: program.to_string(),
                    message: format!("failed to spawn: {e}"),
                    stderr: None,
                    exit_code: None,
                }
            })?;

        Ok(CommandOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

/// The two external tools winfw drives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tools {
    pub bridge: Bridge,
    pub netsh: String,
}

impl Tools {
    pub fn new(bridge: Bridge, netsh: impl Into<String>) -> Self {
        Self {
            bridge,
            netsh: netsh.into(),
        }
    }
}
