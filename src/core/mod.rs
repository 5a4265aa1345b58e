//! Core reconciliation functionality
//!
//! This module contains the rule model and the logic that converges live
//! Windows Firewall state to a desired state.
//! It provides:
//!
//! - [`codec`]: Field naming and value encoding between winfw and the bridge
//! - [`rule`]: The typed firewall rule model
//! - [`parser`]: Bridge listing and `netsh` settings parsers
//! - [`diff`]: Idempotency check and per-rule decisions
//! - [`args`]: Bridge and `netsh` argument vectors
//! - [`reconcile`]: The reconciliation driver
//! - [`settings`]: Profile and global settings
//! - [`group`]: Read-only rule groups
//! - [`bridge`]: Bridge script resolution
//! - [`manifest`]: Desired-state manifests
//! - [`error`]: Error types for firewall operations
//! - [`rule_constraints`]: Business rules for valid field combinations

pub mod args;
pub mod bridge;
pub mod codec;
pub mod diff;
pub mod error;
pub mod group;
pub mod manifest;
pub mod parser;
pub mod reconcile;
pub mod rule;
pub mod rule_constraints;
pub mod settings;

#[cfg(test)]
pub mod test_helpers;
