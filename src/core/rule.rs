//! Firewall rule data structures
//!
//! A [`Rule`] is one Windows Firewall rule keyed by its (case-insensitive)
//! name. Every attribute other than `name` and `ensure` is optional: a desired
//! rule only manages the properties it sets, and a live rule only carries the
//! properties the bridge reported.
//!
//! Enumerated attributes are real enums so invalid values are rejected when a
//! manifest is loaded rather than when the bridge runs.
//!
//! # Example
//!
//! ```
//! use winfw::core::rule::{Action, Direction, Rule};
//!
//! let mut rule = Rule::new("Allow-HTTP");
//! rule.direction = Some(Direction::Inbound);
//! rule.action = Some(Action::Allow);
//! rule.protocol = Some("TCP".to_string());
//! rule.local_port = Some("80".to_string());
//! rule.normalize();
//!
//! assert_eq!(rule.name, "allow-http");
//! assert_eq!(rule.protocol.as_deref(), Some("tcp"));
//! ```

use crate::core::codec::{Field, PropertyValue};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

/// Rule name the firewall reserves as a wildcard
pub const RESERVED_NAME: &str = "any";

/// Desired value meaning "leave this property alone"
pub const NONE_SENTINEL: &str = "none";

/// Whether the rule should exist
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Default,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Ensure {
    #[default]
    Present,
    Absent,
}

/// Rule enabled flag
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum Enabled {
    /// Get-NetFirewallRule reports `True`/`False`; netsh reports `Yes`/`No`
    #[strum(to_string = "yes", serialize = "true")]
    Yes,
    #[strum(to_string = "no", serialize = "false")]
    No,
}

/// Traffic direction the rule applies to
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Direction {
    Inbound,
    Outbound,
}

/// Network profile a rule belongs to
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ProfileKind {
    Domain,
    Private,
    Public,
    Any,
}

/// Handling of edge-traversal (Teredo) traffic
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum EdgeTraversalPolicy {
    #[strum(to_string = "yes")]
    Yes,
    /// The bridge reports `DeferApp`, which decodes to `defer_app`
    #[serde(alias = "defer_app")]
    #[strum(to_string = "deferapp", serialize = "defer_app")]
    DeferApp,
    #[serde(alias = "defer_user")]
    #[strum(to_string = "deferuser", serialize = "defer_user")]
    DeferUser,
    #[strum(to_string = "no")]
    No,
}

/// What happens to matching traffic
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Action {
    Block,
    Allow,
}

/// Interface class the rule is restricted to
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum InterfaceType {
    Wireless,
    Lan,
    Ras,
    Any,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Rule {
    pub name: String,
    pub ensure: Ensure,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<Enabled>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<Direction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<BTreeSet<ProfileKind>>,
    /// Read-only: reported by the firewall, never written
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grouping: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    /// ICMP type, only meaningful with an ICMPv4/ICMPv6 protocol
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icmp_type: Option<String>,
    /// ICMP code, only meaningful with an ICMPv4/ICMPv6 protocol
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_port: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_port: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edge_traversal_policy: Option<EdgeTraversalPolicy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub program: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interface_type: Option<InterfaceType>,

    /// Live attributes winfw does not model, kept verbatim under their normalized key
    #[serde(skip)]
    pub extra: BTreeMap<String, String>,
}

impl Rule {
    /// Creates a present rule with only a name set
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Lowercases the case-insensitive attributes.
    /// Must be called after deserialization or any field modification.
    pub fn normalize(&mut self) {
        self.name = self.name.to_lowercase();
        for value in [
            &mut self.protocol,
            &mut self.program,
            &mut self.icmp_type,
            &mut self.protocol_code,
        ]
        .into_iter()
        .flatten()
        {
            *value = value.to_lowercase();
        }
    }

    /// Lookup key used to match desired and live rules
    pub fn key(&self) -> String {
        self.name.to_lowercase()
    }

    pub fn is_present(&self) -> bool {
        self.ensure == Ensure::Present
    }

    /// Returns the internal value of a field, or `None` if it is not set.
    pub fn get(&self, field: Field) -> Option<PropertyValue> {
        fn text(s: &str) -> PropertyValue {
            PropertyValue::Text(s.to_string())
        }

        match field {
            Field::Name => Some(text(&self.name)),
            Field::Ensure => Some(text(self.ensure.as_ref())),
            Field::Enabled => self.enabled.map(|v| text(v.as_ref())),
            Field::DisplayName => self.display_name.as_deref().map(text),
            Field::Description => self.description.as_deref().map(text),
            Field::Direction => self.direction.map(|v| text(v.as_ref())),
            Field::Profile => self.profile.as_ref().map(|set| {
                PropertyValue::List(set.iter().map(|p| p.as_ref().to_string()).collect())
            }),
            Field::Grouping => self.grouping.as_deref().map(text),
            Field::LocalIp => self.local_ip.as_deref().map(text),
            Field::RemoteIp => self.remote_ip.as_deref().map(text),
            Field::Protocol => self.protocol.as_deref().map(text),
            Field::IcmpType => self.icmp_type.as_deref().map(text),
            Field::ProtocolCode => self.protocol_code.as_deref().map(text),
            Field::LocalPort => self.local_port.as_deref().map(text),
            Field::RemotePort => self.remote_port.as_deref().map(text),
            Field::EdgeTraversalPolicy => self.edge_traversal_policy.map(|v| text(v.as_ref())),
            Field::Action => self.action.map(|v| text(v.as_ref())),
            Field::Program => self.program.as_deref().map(text),
            Field::InterfaceType => self.interface_type.map(|v| text(v.as_ref())),
        }
    }

    /// Sets a field from its internal (decoded) value.
    ///
    /// # Errors
    ///
    /// Returns `Err` with a description if an enumerated field receives a
    /// value outside its allowed set.
    pub fn set(&mut self, field: Field, value: PropertyValue) -> Result<(), String> {
        match field {
            Field::Name => self.name = value.to_string(),
            Field::Ensure => self.ensure = parse_enum(field, &value)?,
            Field::Enabled => self.enabled = Some(parse_enum(field, &value)?),
            Field::DisplayName => self.display_name = Some(value.to_string()),
            Field::Description => self.description = Some(value.to_string()),
            Field::Direction => self.direction = Some(parse_enum(field, &value)?),
            Field::Profile => {
                let set = value
                    .items()
                    .map(|item| {
                        ProfileKind::from_str(item.trim())
                            .map_err(|_| format!("invalid {field} value '{item}'"))
                    })
                    .collect::<Result<BTreeSet<_>, _>>()?;
                self.profile = Some(set);
            }
            Field::Grouping => self.grouping = Some(value.to_string()),
            Field::LocalIp => self.local_ip = Some(value.to_string()),
            Field::RemoteIp => self.remote_ip = Some(value.to_string()),
            Field::Protocol => self.protocol = Some(value.to_string()),
            Field::IcmpType => self.icmp_type = Some(value.to_string()),
            Field::ProtocolCode => self.protocol_code = Some(value.to_string()),
            Field::LocalPort => self.local_port = Some(value.to_string()),
            Field::RemotePort => self.remote_port = Some(value.to_string()),
            Field::EdgeTraversalPolicy => {
                self.edge_traversal_policy = Some(parse_enum(field, &value)?);
            }
            Field::Action => self.action = Some(parse_enum(field, &value)?),
            Field::Program => self.program = Some(value.to_string()),
            Field::InterfaceType => self.interface_type = Some(parse_enum(field, &value)?),
        }
        Ok(())
    }
}

fn parse_enum<T: FromStr>(field: Field, value: &PropertyValue) -> Result<T, String> {
    let raw = value.to_string();
    T::from_str(raw.trim()).map_err(|_| format!("invalid {field} value '{raw}'"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_normalize_lowercases_case_insensitive_fields() {
        let mut rule = Rule::new("My Rule");
        rule.protocol = Some("ICMPv4".into());
        rule.program = Some("C:\\Program Files\\App.EXE".into());
        rule.icmp_type = Some("Echo".into());
        rule.description = Some("Keep Case".into());
        rule.normalize();

        assert_eq!(rule.name, "my rule");
        assert_eq!(rule.protocol.as_deref(), Some("icmpv4"));
        assert_eq!(rule.program.as_deref(), Some("c:\\program files\\app.exe"));
        assert_eq!(rule.icmp_type.as_deref(), Some("echo"));
        assert_eq!(rule.description.as_deref(), Some("Keep Case"));
    }

    #[test]
    fn test_get_set_every_field() {
        let mut rule = Rule::new("r");
        for field in Field::iter() {
            let value = match field {
                Field::Ensure => PropertyValue::from("absent"),
                Field::Enabled => PropertyValue::from("no"),
                Field::Direction => PropertyValue::from("outbound"),
                Field::Profile => PropertyValue::List(vec!["private".into(), "domain".into()]),
                Field::EdgeTraversalPolicy => PropertyValue::from("deferuser"),
                Field::Action => PropertyValue::from("block"),
                Field::InterfaceType => PropertyValue::from("ras"),
                _ => PropertyValue::from("value"),
            };
            rule.set(field, value).unwrap();
            assert!(rule.get(field).is_some(), "{field} should be set");
        }
        assert_eq!(
            rule.get(Field::Profile),
            Some(PropertyValue::List(vec!["domain".into(), "private".into()]))
        );
        assert_eq!(rule.ensure, Ensure::Absent);
    }

    #[test]
    fn test_set_rejects_out_of_range_values() {
        let mut rule = Rule::new("r");
        assert!(rule.set(Field::Direction, "sideways".into()).is_err());
        assert!(rule.set(Field::Profile, PropertyValue::List(vec!["work".into()])).is_err());
        assert!(rule.direction.is_none());
        assert!(rule.profile.is_none());
    }

    #[test]
    fn test_enabled_accepts_powershell_booleans() {
        assert_eq!(Enabled::from_str("True").unwrap(), Enabled::Yes);
        assert_eq!(Enabled::from_str("false").unwrap(), Enabled::No);
        assert_eq!(Enabled::Yes.to_string(), "yes");
    }

    #[test]
    fn test_edge_traversal_accepts_decoded_camel_case() {
        assert_eq!(
            EdgeTraversalPolicy::from_str("defer_app").unwrap(),
            EdgeTraversalPolicy::DeferApp
        );
        assert_eq!(
            EdgeTraversalPolicy::from_str("deferuser").unwrap(),
            EdgeTraversalPolicy::DeferUser
        );
        assert_eq!(EdgeTraversalPolicy::DeferApp.as_ref(), "deferapp");
    }

    #[test]
    fn test_manifest_rule_deserializes_with_defaults() {
        let rule: Rule = serde_json::from_str(
            r#"{"name": "web", "direction": "inbound", "profile": ["public", "domain"]}"#,
        )
        .unwrap();
        assert_eq!(rule.ensure, Ensure::Present);
        assert_eq!(rule.direction, Some(Direction::Inbound));
        assert_eq!(
            rule.profile,
            Some(BTreeSet::from([ProfileKind::Domain, ProfileKind::Public]))
        );
    }

    #[test]
    fn test_manifest_rule_rejects_unknown_fields() {
        let result: Result<Rule, _> = serde_json::from_str(r#"{"name": "web", "colour": "red"}"#);
        assert!(result.is_err());
    }
}
