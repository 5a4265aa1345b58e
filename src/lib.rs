//! winfw - Windows Firewall reconciliation
//!
//! Converges live Windows Firewall rules, profile settings and global
//! settings to a declared desired state, by driving a PowerShell bridge
//! script and `netsh`.
//!
//! # Architecture
//!
//! - [`core`] - Rule model, parsing, diffing and the reconciliation driver
//! - [`invoker`] - External process execution behind a testable trait
//! - [`audit`] - Audit logging for every firewall mutation
//! - [`validators`] - Desired-state validation
//! - [`config`] - Configuration persistence
//! - [`utils`] - Utility functions (platform directories, etc.)
//!
//! # Convergence
//!
//! - The live rule listing is fetched once per pass
//! - Rules already in sync are never touched
//! - Drifted rules are deleted and recreated whole
//! - Invalid desired state is rejected before any invocation

// Allow pedantic clippy warnings that are not worth fixing for this codebase
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::needless_lifetimes)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]

pub mod audit;
pub mod config;
pub mod core;
pub mod invoker;
pub mod utils;
pub mod validators;

// Re-export commonly used types
pub use core::error::{Error, Result};
pub use core::reconcile::{PassReport, Reconciler};
pub use core::rule::Rule;
