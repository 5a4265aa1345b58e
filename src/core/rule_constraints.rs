//! Rule constraint functions for firewall rules
//!
//! Centralizes knowledge about which attribute combinations the Windows
//! Firewall accepts, so the command builder and validators agree.
//!
//! # Examples
//!
//! ```
//! use winfw::core::rule_constraints::*;
//!
//! assert!(protocol_is_icmp("icmpv4"));
//! assert!(!protocol_is_icmp("tcp"));
//! assert!(protocol_supports_ports("udp"));
//! assert!(!protocol_supports_ports("icmpv6"));
//! ```

use super::rule::Rule;

// ═══════════════════════════════════════════════════════════════════════════
// Protocol Constraints
// ═══════════════════════════════════════════════════════════════════════════

/// Returns `true` if the protocol is an ICMP variant (`icmpv4`, `icmpv6`, or IANA 1/58).
#[inline]
pub fn protocol_is_icmp(protocol: &str) -> bool {
    matches!(
        protocol.trim().to_lowercase().as_str(),
        "icmp" | "icmpv4" | "icmpv6" | "1" | "58"
    )
}

/// Returns `true` if the protocol accepts local/remote port filters.
#[inline]
pub fn protocol_supports_ports(protocol: &str) -> bool {
    matches!(protocol.trim().to_lowercase().as_str(), "tcp" | "udp" | "6" | "17")
}

// ═══════════════════════════════════════════════════════════════════════════
// Rule-level checks
// ═══════════════════════════════════════════════════════════════════════════

/// Returns `true` if the rule carries a complete ICMP type/code pair next to a protocol.
///
/// Only then are the three values emitted together; a lone type or code is dropped.
pub fn has_icmp_compound(rule: &Rule) -> bool {
    rule.protocol.is_some() && rule.icmp_type.is_some() && rule.protocol_code.is_some()
}

/// Describes attribute combinations the firewall will likely reject.
///
/// These are reported as warnings, not errors: the firewall has the final word.
pub fn combination_warnings(rule: &Rule) -> Vec<String> {
    let mut warnings = Vec::new();

    let has_icmp_fields = rule.icmp_type.is_some() || rule.protocol_code.is_some();
    match rule.protocol.as_deref() {
        Some(protocol) => {
            if has_icmp_fields && !protocol_is_icmp(protocol) {
                warnings.push(format!(
                    "icmp_type/protocol_code are ignored with protocol '{protocol}'"
                ));
            }
            let has_ports = rule.local_port.is_some() || rule.remote_port.is_some();
            if has_ports && !protocol_supports_ports(protocol) {
                warnings.push(format!("ports are not supported with protocol '{protocol}'"));
            }
        }
        None if has_icmp_fields => {
            warnings.push("icmp_type/protocol_code require a protocol".to_string());
        }
        None => {}
    }

    if has_icmp_fields && !has_icmp_compound(rule) {
        warnings.push("icmp_type and protocol_code must be given together".to_string());
    }

    warnings
}
