//! Bidirectional field codec between winfw's normalized rule model and the
//! naming/encoding conventions of the PowerShell bridge
//!
//! Internally every attribute is a lowercase `snake_case` symbol (`local_port`,
//! `inbound`, `icmpv4`). The bridge speaks `CamelCase` (`-LocalPort`,
//! `Inbound`, `ICMPv4`). Each [`Field`] is bound to exactly one [`Converter`],
//! and unregistered fields pass through unchanged.
//!
//! # Example
//!
//! ```
//! use winfw::core::codec::{argument_flag, decode, encode, Field, PropertyValue};
//!
//! let external = encode(Field::Protocol, &PropertyValue::from("icmpv4"));
//! assert_eq!(external, "ICMPv4");
//! assert_eq!(decode(Field::Protocol, &external), PropertyValue::from("icmpv4"));
//! assert_eq!(argument_flag(Field::EdgeTraversalPolicy), "-EdgeTraversalPolicy");
//! ```

use std::fmt;

/// Prefix the bridge expects on every named argument
pub const FLAG_MARKER: &str = "-";

/// Closed set of rule attributes known to the codec.
///
/// Declaration order is the order properties are emitted on the bridge command line.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::AsRefStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum Field {
    Name,
    Ensure,
    Enabled,
    DisplayName,
    Description,
    Direction,
    Profile,
    Grouping,
    LocalIp,
    RemoteIp,
    Protocol,
    IcmpType,
    ProtocolCode,
    LocalPort,
    RemotePort,
    EdgeTraversalPolicy,
    Action,
    Program,
    InterfaceType,
}

impl Field {
    /// Looks up a field by its normalized (snake_case) key.
    pub fn from_key(key: &str) -> Option<Self> {
        key.parse().ok()
    }

    /// Returns the converter registered for this field.
    pub const fn converter(self) -> Converter {
        match self {
            Field::Enabled
            | Field::Action
            | Field::Direction
            | Field::InterfaceType
            | Field::EdgeTraversalPolicy => Converter::CamelCase,
            Field::Profile => Converter::ProfileList,
            Field::Protocol => Converter::Protocol,
            Field::LocalPort | Field::RemotePort => Converter::Quoted,
            Field::Name
            | Field::Ensure
            | Field::DisplayName
            | Field::Description
            | Field::Grouping
            | Field::LocalIp
            | Field::RemoteIp
            | Field::IcmpType
            | Field::ProtocolCode
            | Field::Program => Converter::Identity,
        }
    }

    /// Fields that never go through the generic property-to-flag loop.
    ///
    /// `ensure` decides the verb, `grouping` is read-only and the ICMP pair is
    /// only ever emitted together with `protocol`.
    pub const fn is_excluded_from_flags(self) -> bool {
        matches!(
            self,
            Field::Name | Field::Ensure | Field::Grouping | Field::IcmpType | Field::ProtocolCode
        )
    }
}

/// Conversion applied to a field's value in each direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Converter {
    /// `defer_app` <-> `DeferApp`
    CamelCase,
    /// `{domain, public}` <-> `Domain,Public`
    ProfileList,
    /// `icmpv4` <-> `ICMPv4`
    Protocol,
    /// `80` -> `"80"` (ports may be ranges or keywords)
    Quoted,
    Identity,
}

/// Value of a single property in its internal form
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    Text(String),
    List(Vec<String>),
}

impl PropertyValue {
    /// Iterates the elements (a single element for `Text`)
    pub fn items(&self) -> impl Iterator<Item = &str> {
        let slice: &[String] = match self {
            PropertyValue::Text(s) => std::slice::from_ref(s),
            PropertyValue::List(items) => items,
        };
        slice.iter().map(String::as_str)
    }

    /// Returns `true` for the `none` sentinel meaning "do not manage this property"
    pub fn is_none_sentinel(&self) -> bool {
        matches!(self, PropertyValue::Text(s) if s.eq_ignore_ascii_case(crate::core::rule::NONE_SENTINEL))
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::Text(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::Text(value)
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Text(s) => f.write_str(s),
            PropertyValue::List(items) => f.write_str(&items.join(",")),
        }
    }
}

/// Converts an internal value into the bridge's representation.
pub fn encode(field: Field, value: &PropertyValue) -> String {
    match field.converter() {
        Converter::CamelCase => camel_case(&value.to_string()),
        Converter::ProfileList => {
            let mut members: Vec<String> = value.items().map(camel_case).collect();
            members.sort();
            members.join(",")
        }
        Converter::Protocol => value.to_string().to_uppercase().replacen('V', "v", 1),
        Converter::Quoted => format!("\"{value}\""),
        Converter::Identity => value.to_string(),
    }
}

/// Converts a raw value reported by the bridge into its internal form.
pub fn decode(field: Field, raw: &str) -> PropertyValue {
    match field.converter() {
        Converter::CamelCase => PropertyValue::Text(snake_case(raw.trim())),
        Converter::ProfileList => PropertyValue::List(
            raw.split(',')
                .map(str::trim)
                .filter(|e| !e.is_empty())
                .map(snake_case)
                .collect(),
        ),
        Converter::Protocol => PropertyValue::Text(raw.trim().to_lowercase()),
        Converter::Quoted => PropertyValue::Text(raw.trim().trim_matches('"').to_string()),
        Converter::Identity => PropertyValue::Text(raw.to_string()),
    }
}

/// Builds the bridge's command-line flag for a field (`local_port` -> `-LocalPort`).
pub fn argument_flag(field: Field) -> String {
    format!("{FLAG_MARKER}{}", camel_case(field.as_ref()))
}

/// Converts a `snake_case` symbol to `CamelCase`.
pub fn camel_case(input: &str) -> String {
    input.split('_').map(capitalize).collect()
}

/// Uppercases the first character and lowercases the rest.
fn capitalize(segment: &str) -> String {
    let mut chars = segment.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

/// Converts `CamelCase` to a `snake_case` symbol.
///
/// An underscore is inserted only where a lowercase ASCII letter is directly
/// followed by an uppercase one, so acronyms stay together (`ICMPv4` -> `icmpv4`).
pub fn snake_case(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + 4);
    let mut prev_lower = false;
    for c in input.chars() {
        if prev_lower && c.is_ascii_uppercase() {
            out.push('_');
        }
        prev_lower = c.is_ascii_lowercase();
        out.extend(c.to_lowercase());
    }
    out
}

/// Normalizes an external key (`DisplayName`, `Display Name`, `Rule Name`) to a symbol.
pub fn normalize_key(input: &str) -> String {
    let spaced: String = input
        .trim()
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect();
    snake_case(&spaced)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rule::{
        Action, Direction, EdgeTraversalPolicy, Enabled, InterfaceType, ProfileKind,
    };
    use proptest::prelude::*;
    use strum::IntoEnumIterator;

    fn round_trip(field: Field, symbol: &str) -> PropertyValue {
        decode(field, &encode(field, &PropertyValue::from(symbol)))
    }

    #[test]
    fn test_enum_fields_round_trip() {
        for v in Enabled::iter() {
            assert_eq!(round_trip(Field::Enabled, v.as_ref()), PropertyValue::from(v.as_ref()));
        }
        for v in Direction::iter() {
            assert_eq!(round_trip(Field::Direction, v.as_ref()), PropertyValue::from(v.as_ref()));
        }
        for v in Action::iter() {
            assert_eq!(round_trip(Field::Action, v.as_ref()), PropertyValue::from(v.as_ref()));
        }
        for v in InterfaceType::iter() {
            assert_eq!(
                round_trip(Field::InterfaceType, v.as_ref()),
                PropertyValue::from(v.as_ref())
            );
        }
        for v in EdgeTraversalPolicy::iter() {
            assert_eq!(
                round_trip(Field::EdgeTraversalPolicy, v.as_ref()),
                PropertyValue::from(v.as_ref())
            );
        }
    }

    #[test]
    fn test_direction_encoding() {
        assert_eq!(encode(Field::Direction, &"inbound".into()), "Inbound");
        assert_eq!(decode(Field::Direction, "Inbound"), "inbound".into());
    }

    #[test]
    fn test_protocol_encoding() {
        assert_eq!(encode(Field::Protocol, &"icmpv6".into()), "ICMPv6");
        assert_eq!(encode(Field::Protocol, &"icmpv4".into()), "ICMPv4");
        assert_eq!(encode(Field::Protocol, &"tcp".into()), "TCP");
        assert_eq!(decode(Field::Protocol, "ICMPv6"), "icmpv6".into());
    }

    #[test]
    fn test_profile_encoding_is_sorted() {
        let value = PropertyValue::List(vec!["public".into(), "domain".into()]);
        assert_eq!(encode(Field::Profile, &value), "Domain,Public");
    }

    #[test]
    fn test_profile_decoding_trims_elements() {
        assert_eq!(
            decode(Field::Profile, "Domain, Private ,Public"),
            PropertyValue::List(vec!["domain".into(), "private".into(), "public".into()])
        );
    }

    #[test]
    fn test_ports_are_quoted() {
        assert_eq!(encode(Field::LocalPort, &"8080-8090".into()), "\"8080-8090\"");
        assert_eq!(encode(Field::RemotePort, &"443".into()), "\"443\"");
        assert_eq!(decode(Field::LocalPort, "\"443\""), "443".into());
    }

    #[test]
    fn test_unregistered_fields_pass_through() {
        assert_eq!(encode(Field::Program, &"c:\\app.exe".into()), "c:\\app.exe");
        assert_eq!(decode(Field::Description, "Mixed Case"), "Mixed Case".into());
    }

    #[test]
    fn test_argument_flags() {
        assert_eq!(argument_flag(Field::Name), "-Name");
        assert_eq!(argument_flag(Field::LocalPort), "-LocalPort");
        assert_eq!(argument_flag(Field::DisplayName), "-DisplayName");
        assert_eq!(argument_flag(Field::InterfaceType), "-InterfaceType");
    }

    #[test]
    fn test_snake_case_keeps_acronyms() {
        assert_eq!(snake_case("DeferApp"), "defer_app");
        assert_eq!(snake_case("ICMPv4"), "icmpv4");
        assert_eq!(snake_case("LocalIP"), "local_ip");
        assert_eq!(snake_case("EdgeTraversalPolicy"), "edge_traversal_policy");
    }

    #[test]
    fn test_normalize_key_handles_spaces() {
        assert_eq!(normalize_key("Display Name"), "display_name");
        assert_eq!(normalize_key("DisplayName"), "display_name");
        assert_eq!(normalize_key("Rule Name"), "rule_name");
        assert_eq!(Field::from_key(&normalize_key("EdgeTraversalPolicy")), Some(Field::EdgeTraversalPolicy));
        assert_eq!(Field::from_key("unknown_thing"), None);
    }

    #[test]
    fn test_known_symbols_survive_case_conversion() {
        let mut symbols: Vec<String> = Vec::new();
        symbols.extend(Enabled::iter().map(|v| v.as_ref().to_string()));
        symbols.extend(Direction::iter().map(|v| v.as_ref().to_string()));
        symbols.extend(ProfileKind::iter().map(|v| v.as_ref().to_string()));
        symbols.extend(EdgeTraversalPolicy::iter().map(|v| v.as_ref().to_string()));
        symbols.extend(Action::iter().map(|v| v.as_ref().to_string()));
        symbols.extend(InterfaceType::iter().map(|v| v.as_ref().to_string()));
        for symbol in &symbols {
            assert_eq!(&snake_case(&camel_case(symbol)), symbol);
        }

        for field in Field::iter() {
            let flag = argument_flag(field);
            let key = normalize_key(flag.trim_start_matches(FLAG_MARKER));
            assert_eq!(Field::from_key(&key), Some(field), "{flag}");
        }
    }

    #[test]
    fn test_single_letter_segments_merge() {
        // only a lowercase-to-uppercase step starts a new segment
        assert_eq!(camel_case("a_b"), "AB");
        assert_eq!(snake_case("AB"), "ab");
    }

    #[test]
    fn test_none_sentinel() {
        assert!(PropertyValue::from("none").is_none_sentinel());
        assert!(PropertyValue::from("None").is_none_sentinel());
        assert!(!PropertyValue::from("nonexistent").is_none_sentinel());
        assert!(!PropertyValue::List(vec!["none".into()]).is_none_sentinel());
    }

    proptest! {
        #[test]
        fn prop_camel_snake_round_trip(symbol in "[a-z]{2,8}(_[a-z]{2,8}){0,3}") {
            prop_assert_eq!(snake_case(&camel_case(&symbol)), symbol);
        }

        #[test]
        fn prop_profile_order_is_irrelevant(members in proptest::sample::subsequence(
            vec!["domain", "private", "public", "any"], 1..=4
        )) {
            let forward: Vec<String> = members.iter().map(|s| s.to_string()).collect();
            let backward: Vec<String> = forward.iter().rev().cloned().collect();
            let forward = encode(Field::Profile, &PropertyValue::List(forward));
            let backward = encode(Field::Profile, &PropertyValue::List(backward));
            prop_assert_eq!(forward, backward);
        }

        #[test]
        fn prop_codec_never_panics(raw in ".{0,40}") {
            for field in <Field as strum::IntoEnumIterator>::iter() {
                let decoded = decode(field, &raw);
                let _ = encode(field, &decoded);
            }
        }
    }
}
