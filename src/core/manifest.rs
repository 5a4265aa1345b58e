//! Desired-state manifests
//!
//! A manifest is a JSON document listing the rules winfw manages plus
//! optional profile and global settings:
//!
//! ```json
//! {
//!   "rules": [
//!     { "name": "Allow-HTTP", "direction": "inbound", "protocol": "tcp",
//!       "local_port": "80", "action": "allow" },
//!     { "name": "Legacy-Telnet", "ensure": "absent" }
//!   ],
//!   "profiles": [ { "name": "public", "settings": { "state": "on" } } ],
//!   "global": { "name": "global", "settings": { "saidletimemin": "5" } }
//! }
//! ```
//!
//! Loading normalizes every rule and validates the whole document, so a
//! manifest that loads is safe to hand to the reconciler.

use crate::core::error::{Error, Result};
use crate::core::rule::Rule;
use crate::core::rule_constraints::{combination_warnings, has_icmp_compound};
use crate::core::settings::DesiredSettings;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Manifest {
    pub rules: Vec<Rule>,
    pub profiles: Vec<DesiredSettings>,
    pub global: Option<DesiredSettings>,
}

impl Manifest {
    /// Normalizes rules and drops attributes the firewall would never report back.
    fn normalize(&mut self) {
        for rule in &mut self.rules {
            rule.normalize();

            for warning in combination_warnings(rule) {
                warn!("Rule '{}': {warning}", rule.name);
            }
            // a lone type or code is never emitted, so it could never be in sync either
            if !has_icmp_compound(rule) && (rule.icmp_type.is_some() || rule.protocol_code.is_some()) {
                rule.icmp_type = None;
                rule.protocol_code = None;
            }
        }
    }
}

/// Parses, normalizes and validates a manifest.
///
/// # Errors
///
/// Returns `Error::Serialization` for malformed JSON or unknown attributes
/// and `Error::Validation` for invariant violations.
pub fn parse_manifest(json: &str) -> Result<Manifest> {
    let mut manifest: Manifest = serde_json::from_str(json)?;
    manifest.normalize();
    crate::validators::validate_manifest(&manifest)?;
    debug!(
        "Loaded manifest: {} rules, {} profiles, global: {}",
        manifest.rules.len(),
        manifest.profiles.len(),
        manifest.global.is_some()
    );
    Ok(manifest)
}

/// Reads and parses a manifest file.
///
/// # Async
/// Uses `tokio::fs` for non-blocking file I/O.
pub async fn load_manifest(path: &Path) -> Result<Manifest> {
    let json = tokio::fs::read_to_string(path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("manifest not found: {}", path.display()),
            ))
        } else {
            Error::Io(e)
        }
    })?;
    parse_manifest(&json)
}
