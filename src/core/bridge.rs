//! Bridge script resolution
//!
//! All rule reads and writes go through a PowerShell bridge script invoked as
//! `powershell.exe -File <script> <verb> ...`. Where the script lives depends
//! on how winfw was installed:
//!
//! - **user**: an interactive run; check installed modules, then the cache
//! - **apply**: a local module install is required
//! - **agent**: only the synchronized cache is searched
//!
//! The run mode is configuration passed in by the caller, never process-wide
//! state. An explicit script path skips the search entirely.

use crate::core::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Directory of the firewall module inside an environment or module path
pub const MODULE_DIR: &str = "windows_firewall/lib";

/// Bridge script, relative to [`MODULE_DIR`] or to the cache directory
pub const SCRIPT_PATH: &str = "ps/windows_firewall/ps-bridge.ps1";

/// Interpreter used when none is configured
pub const DEFAULT_INTERPRETER: &str = "powershell.exe";

/// How winfw was launched; decides where the bridge script is searched
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum RunMode {
    #[default]
    User,
    Apply,
    Agent,
}

impl RunMode {
    /// Parses a run mode name.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnknownMode` for anything but `user`, `apply` or `agent`.
    pub fn parse(name: &str) -> Result<Self> {
        name.trim()
            .parse()
            .map_err(|_| Error::UnknownMode(name.trim().to_string()))
    }
}

/// Where to look for the bridge script
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub interpreter: String,
    /// Explicit script path; bypasses the run-mode search
    pub script: Option<PathBuf>,
    pub run_mode: RunMode,
    /// Active environment directory, searched first in `user`/`apply` mode
    pub environment_dir: Option<PathBuf>,
    /// Module paths searched in order after the environment directory
    pub module_paths: Vec<PathBuf>,
    /// Synchronized library cache, searched in `user`/`agent` mode
    pub cache_dir: Option<PathBuf>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            interpreter: DEFAULT_INTERPRETER.to_string(),
            script: None,
            run_mode: RunMode::default(),
            environment_dir: None,
            module_paths: Vec::new(),
            cache_dir: None,
        }
    }
}

/// A resolved bridge: interpreter plus script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bridge {
    pub interpreter: String,
    pub script: PathBuf,
}

impl Bridge {
    /// Arguments placed before the bridge verb
    pub fn prefix_args(&self) -> Vec<String> {
        vec!["-File".to_string(), self.script.display().to_string()]
    }

    /// Full argument vector for a bridge invocation
    pub fn command_args(&self, verb_args: &[String]) -> Vec<String> {
        let mut args = self.prefix_args();
        args.extend_from_slice(verb_args);
        args
    }
}

fn existing(candidate: PathBuf) -> Option<PathBuf> {
    debug!("Checking for bridge script at {}", candidate.display());
    candidate.is_file().then_some(candidate)
}

fn find_in_modules(config: &BridgeConfig) -> Option<PathBuf> {
    config
        .environment_dir
        .iter()
        .chain(config.module_paths.iter())
        .filter(|dir| !dir.as_os_str().is_empty())
        .find_map(|dir| existing(dir.join(MODULE_DIR).join(SCRIPT_PATH)))
}

fn find_in_cache(config: &BridgeConfig) -> Option<PathBuf> {
    config
        .cache_dir
        .as_deref()
        .and_then(|dir| existing(dir.join(SCRIPT_PATH)))
}

/// Locates the bridge script.
///
/// # Errors
///
/// Returns `Error::Resolution` if no candidate exists on disk.
pub fn resolve(config: &BridgeConfig) -> Result<Bridge> {
    let script = match config.script.as_deref() {
        Some(explicit) => existing(explicit.to_path_buf()),
        None => match config.run_mode {
            RunMode::User => find_in_modules(config).or_else(|| find_in_cache(config)),
            RunMode::Apply => find_in_modules(config),
            RunMode::Agent => find_in_cache(config),
        },
    };

    let script = script.ok_or_else(|| {
        Error::Resolution(format!(
            "unable to find {} for run mode '{}'",
            config
                .script
                .as_deref()
                .map_or_else(|| SCRIPT_PATH.to_string(), |p: &Path| p.display().to_string()),
            config.run_mode
        ))
    })?;

    debug!("Resolved bridge script: {}", script.display());
    Ok(Bridge {
        interpreter: config.interpreter.clone(),
        script,
    })
}
