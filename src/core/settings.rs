//! Firewall profile and global settings
//!
//! `netsh advfirewall show <scope>` prints a flat list of `Key  Value` lines
//! for each of the three network profiles and for the machine-wide IPsec
//! settings. Both are modelled as [`Settings`] bags keyed by a normalized
//! setting name; desired values come from the manifest as
//! [`DesiredSettings`].

use crate::core::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Name of the single global settings entity
pub const GLOBAL_NAME: &str = "global";

/// Scope argument for `netsh advfirewall show|set`
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    strum::Display,
    strum::EnumIter,
    strum::AsRefStr,
)]
#[strum(serialize_all = "lowercase")]
pub enum SettingsScope {
    PublicProfile,
    DomainProfile,
    PrivateProfile,
    Global,
}

impl SettingsScope {
    /// The three network profiles, in the order they are queried
    pub const PROFILES: [SettingsScope; 3] = [
        SettingsScope::PublicProfile,
        SettingsScope::DomainProfile,
        SettingsScope::PrivateProfile,
    ];

    /// Resolves an entity name (`public`, `publicprofile`, `global`) to its scope.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` for anything else.
    pub fn from_name(name: &str) -> Result<Self> {
        match name.trim().to_lowercase().as_str() {
            "public" | "publicprofile" => Ok(Self::PublicProfile),
            "domain" | "domainprofile" => Ok(Self::DomainProfile),
            "private" | "privateprofile" => Ok(Self::PrivateProfile),
            GLOBAL_NAME => Ok(Self::Global),
            other => Err(Error::validation(
                "name",
                format!("unknown settings scope '{other}' (use domain, private, public or global)"),
            )),
        }
    }

    /// Entity name as reported by the parser (`public`, `global`)
    pub const fn entity_name(self) -> &'static str {
        match self {
            Self::PublicProfile => "public",
            Self::DomainProfile => "domain",
            Self::PrivateProfile => "private",
            Self::Global => GLOBAL_NAME,
        }
    }

    /// Maps a setting key to the words `netsh advfirewall set <scope>` expects.
    ///
    /// Unknown keys pass through as a single word.
    pub fn argument_lookup(self, key: &str) -> Vec<String> {
        let words = match self {
            Self::Global => match key {
                "keylifetime" => "mainmode mmkeylifetime",
                "secmethods" => "mainmode mmsecmethods",
                "forcedh" => "mainmode mmforcedh",
                "strongcrlcheck" => "ipsec strongcrlcheck",
                "saidletimemin" => "ipsec saidletimemin",
                "defaultexemptions" => "ipsec defaultexemptions",
                "ipsecthroughnat" => "ipsec ipsecthroughnat",
                "authzcomputergrp" => "ipsec authzcomputergrp",
                "authzusergrp" => "ipsec authzusergrp",
                other => other,
            },
            Self::PublicProfile | Self::DomainProfile | Self::PrivateProfile => match key {
                "localfirewallrules" => "settings localfirewallrules",
                "localconsecrules" => "settings localconsecrules",
                "inboundusernotification" => "settings inboundusernotification",
                "remotemanagement" => "settings remotemanagement",
                "unicastresponsetomulticast" => "settings unicastresponsetomulticast",
                "logallowedconnections" => "logging allowedconnections",
                "logdroppedconnections" => "logging droppedconnections",
                "filename" => "logging filename",
                "maxfilesize" => "logging maxfilesize",
                other => other,
            },
        };
        words.split_whitespace().map(str::to_string).collect()
    }
}

/// A single parsed setting value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Text(String),
    /// Sorted for stable comparison (`defaultexemptions`)
    List(Vec<String>),
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingValue::Text(s) => f.write_str(s),
            SettingValue::List(items) => f.write_str(&items.join(",")),
        }
    }
}

/// Live settings of one profile or of the global scope
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Settings {
    pub name: String,
    pub values: BTreeMap<String, SettingValue>,
}

impl Settings {
    pub fn get(&self, key: &str) -> Option<&SettingValue> {
        self.values.get(key)
    }
}

/// Desired settings for one profile or the global scope, as written in a manifest
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DesiredSettings {
    pub name: String,
    #[serde(default)]
    pub settings: BTreeMap<String, String>,
}

/// One setting that differs between desired and live state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingChange {
    pub key: String,
    pub current: Option<SettingValue>,
    /// Value exactly as written in the manifest, passed to netsh unchanged
    pub desired: String,
}

/// Normalizes a raw value the way `netsh advfirewall show` output is normalized.
///
/// `value` must already be trimmed and lowercased.
pub fn normalize_value(scope: SettingsScope, key: &str, value: &str) -> SettingValue {
    if scope != SettingsScope::Global {
        return SettingValue::Text(value.to_string());
    }

    match key {
        // shown as DHGroup2-AES128-SHA1 but set as DHGroup2:AES128-SHA1
        "secmethods" => SettingValue::Text(
            value
                .split(',')
                .map(|e| e.replacen('-', ":", 1))
                .collect::<Vec<_>>()
                .join(","),
        ),
        // shown as "0:Disabled", set as "0"
        "strongcrlcheck" => {
            SettingValue::Text(value.split(':').next().unwrap_or_default().to_string())
        }
        "defaultexemptions" => {
            let mut items: Vec<String> = value.split(',').map(str::to_string).collect();
            items.sort();
            SettingValue::List(items)
        }
        "saidletimemin" => {
            SettingValue::Text(value.strip_suffix("min").unwrap_or(value).to_string())
        }
        "ipsecthroughnat" => {
            SettingValue::Text(value.chars().filter(|c| !c.is_whitespace()).collect())
        }
        _ => SettingValue::Text(value.to_string()),
    }
}

/// Lists the desired settings whose normalized value differs from the live one.
///
/// Desired keys are matched case-insensitively; keys missing from the live
/// output always count as drift.
pub fn settings_drift(
    scope: SettingsScope,
    desired: &DesiredSettings,
    live: &Settings,
) -> Vec<SettingChange> {
    desired
        .settings
        .iter()
        .filter_map(|(key, value)| {
            let key = key.trim().to_lowercase();
            let normalized = normalize_value(scope, &key, &value.trim().to_lowercase());
            let current = live.get(&key);
            if current == Some(&normalized) {
                None
            } else {
                Some(SettingChange {
                    key,
                    current: current.cloned(),
                    desired: value.clone(),
                })
            }
        })
        .collect()
}
