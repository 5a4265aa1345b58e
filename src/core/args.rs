//! Command builder
//!
//! Turns rules and settings into argument vectors for the bridge script and
//! for `netsh`. Nothing here executes a process.

use crate::core::codec::{Field, argument_flag, encode};
use crate::core::rule::Rule;
use crate::core::rule_constraints::has_icmp_compound;
use crate::core::settings::SettingsScope;
use strum::IntoEnumIterator;

pub const SHOW_VERB: &str = "show";
pub const CREATE_VERB: &str = "create";
pub const DELETE_VERB: &str = "delete";

/// `show`: list every rule as JSON
pub fn show_args() -> Vec<String> {
    vec![SHOW_VERB.to_string()]
}

/// `create -Name <name> [-<Flag> <value> ...]`
///
/// Properties follow [`Field`] declaration order. `none` values are skipped.
/// An ICMP type/code pair is only emitted as one unit after `-Protocol`.
pub fn create_args(rule: &Rule) -> Vec<String> {
    let mut args = vec![
        CREATE_VERB.to_string(),
        argument_flag(Field::Name),
        rule.name.clone(),
    ];

    for field in Field::iter().filter(|f| !f.is_excluded_from_flags()) {
        let Some(value) = rule.get(field) else {
            continue;
        };
        if value.is_none_sentinel() {
            continue;
        }
        args.push(argument_flag(field));
        args.push(encode(field, &value));

        if field == Field::Protocol
            && has_icmp_compound(rule)
            && let (Some(icmp_type), Some(code)) = (&rule.icmp_type, &rule.protocol_code)
        {
            args.push(argument_flag(Field::IcmpType));
            args.push(format!("\"{icmp_type}:{code}\""));
        }
    }

    args
}

/// `delete <name>`
pub fn delete_args(name: &str) -> Vec<String> {
    vec![DELETE_VERB.to_string(), name.to_string()]
}

/// `advfirewall show <scope>`
pub fn show_settings_args(scope: SettingsScope) -> Vec<String> {
    vec!["advfirewall".to_string(), "show".to_string(), scope.to_string()]
}

/// `advfirewall set <scope> <lookup words...> <value>`
pub fn set_settings_args(scope: SettingsScope, key: &str, value: &str) -> Vec<String> {
    let mut args = vec!["advfirewall".to_string(), "set".to_string(), scope.to_string()];
    args.extend(scope.argument_lookup(key));
    args.push(value.to_string());
    args
}
