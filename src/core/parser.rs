//! Parsers for bridge and netsh output
//!
//! - [`parse_rules`]: the bridge's `show` verb prints every rule as a JSON
//!   array of objects with PowerShell-style keys (`DisplayName`, `Enabled`).
//! - [`parse_profile`] / [`parse_global`]: `netsh advfirewall show` prints
//!   human-oriented `Key   Value` text.
//!
//! Every parser returns a complete result or an error; partial listings are
//! never handed to the reconciler.

use crate::core::codec::{Field, decode, normalize_key};
use crate::core::error::{Error, Result, is_no_match};
use crate::core::rule::{Ensure, Rule};
use crate::core::settings::{Settings, SettingsScope, normalize_value};
use serde_json::Value;
use tracing::{debug, warn};

/// Older bridge/netsh key spellings mapped to their current field name
fn canonical_key(key: String) -> String {
    match key.as_str() {
        "rule_name" => "name".to_string(),
        "profiles" => "profile".to_string(),
        "edge_traversal" => "edge_traversal_policy".to_string(),
        _ => key,
    }
}

/// Parses the bridge's rule listing.
///
/// Accepts a JSON array, a single object (PowerShell unwraps one-element
/// arrays), `null`, or empty output. Output reporting that no rules match
/// yields an empty listing.
///
/// # Errors
///
/// Returns `Error::Parse` if the output is not valid JSON, is not made of
/// objects, or contains a rule without a name.
pub fn parse_rules(output: &str) -> Result<Vec<Rule>> {
    let trimmed = output.trim();
    if trimmed.is_empty() || is_no_match(trimmed) {
        debug!("Bridge reported no rules");
        return Ok(Vec::new());
    }

    let parsed: Value = serde_json::from_str(trimmed)
        .map_err(|e| Error::parse("rule listing", format!("invalid JSON: {e}")))?;

    let records = match parsed {
        Value::Null => Vec::new(),
        Value::Array(items) => items,
        object @ Value::Object(_) => vec![object],
        other => {
            return Err(Error::parse(
                "rule listing",
                format!("expected an array of rule objects, got {other}"),
            ));
        }
    };

    let rules = records
        .into_iter()
        .enumerate()
        .map(|(index, record)| parse_rule_record(index, record))
        .collect::<Result<Vec<_>>>()?;

    debug!("Parsed {} rules from bridge listing", rules.len());
    Ok(rules)
}

fn parse_rule_record(index: usize, record: Value) -> Result<Rule> {
    let Value::Object(map) = record else {
        return Err(Error::parse(
            "rule listing",
            format!("entry {index} is not an object"),
        ));
    };

    let mut rule = Rule::default();
    for (raw_key, raw_value) in map {
        let Some(value) = scalar_to_string(raw_value) else {
            continue;
        };
        let key = canonical_key(normalize_key(&raw_key));

        match Field::from_key(&key) {
            Some(field) => {
                if let Err(e) = rule.set(field, decode(field, &value)) {
                    warn!("Rule entry {index}: {e}; keeping raw value");
                    rule.extra.insert(key, value);
                }
            }
            None => {
                rule.extra.insert(key, value);
            }
        }
    }

    if rule.name.trim().is_empty() {
        return Err(Error::parse(
            "rule listing",
            format!("entry {index} has no name"),
        ));
    }

    // being listed is what makes a rule present
    rule.ensure = Ensure::Present;
    rule.normalize();
    Ok(rule)
}

/// Flattens a JSON value to the text the codec expects. `null` means "not set".
fn scalar_to_string(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        Value::Bool(true) => Some("True".to_string()),
        Value::Bool(false) => Some("False".to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(items) => Some(
            items
                .into_iter()
                .filter_map(scalar_to_string)
                .collect::<Vec<_>>()
                .join(","),
        ),
        other @ Value::Object(_) => Some(other.to_string()),
    }
}

/// Normalizes a settings key: lowercase, whitespace runs become `_`.
pub fn key_name(input: &str) -> String {
    input
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}

fn is_separator(line: &str) -> bool {
    line.contains("---")
}

/// Splits a settings line at its first whitespace run into key and value.
fn split_setting(line: &str) -> Option<(&str, &str)> {
    let line = line.trim();
    let split_at = line.find(char::is_whitespace)?;
    let (key, rest) = line.split_at(split_at);
    let value = rest.trim();
    if key.is_empty() || value.is_empty() {
        None
    } else {
        Some((key, value))
    }
}

/// Section captions such as `Logging:` or `Main Mode:`
fn is_section_caption(line: &str) -> bool {
    line.trim_end().ends_with(':')
}

fn content_lines(input: &str) -> impl Iterator<Item = &str> {
    input
        .lines()
        .filter(|line| !is_separator(line) && !line.trim().is_empty())
}

/// Parses `netsh advfirewall show <profile>` output.
///
/// The first content line names the profile (`Public Profile Settings:` ->
/// `public`); every following `Key  Value` line becomes a setting.
///
/// # Errors
///
/// Returns `Error::Parse` if the output has no header line.
pub fn parse_profile(input: &str) -> Result<Settings> {
    let mut lines = content_lines(input);
    let header = lines
        .next()
        .ok_or_else(|| Error::parse("profile settings", "empty output"))?;
    let caption = header.split_whitespace().next().unwrap_or_default();
    let scope = SettingsScope::from_name(caption)
        .map_err(|_| Error::parse("profile settings", format!("unexpected header '{header}'")))?;

    let mut settings = Settings {
        name: scope.entity_name().to_string(),
        ..Settings::default()
    };

    for line in lines {
        if is_section_caption(line) {
            continue;
        }
        // "Firewall Policy" is the only two-word key, and netsh sets it as `firewallpolicy`
        let line = line.replacen("Firewall Policy", "firewallpolicy", 1);
        if let Some((key, value)) = split_setting(&line) {
            let key = key_name(key);
            let value = normalize_value(scope, &key, &value.to_lowercase());
            settings.values.insert(key, value);
        }
    }

    debug!("Parsed firewall profile: {settings:?}");
    Ok(settings)
}

/// Parses `netsh advfirewall show global` output.
///
/// # Errors
///
/// Returns `Error::Parse` if the output is empty.
pub fn parse_global(input: &str) -> Result<Settings> {
    let mut lines = content_lines(input);
    lines
        .next()
        .ok_or_else(|| Error::parse("global settings", "empty output"))?;

    let mut settings = Settings {
        name: SettingsScope::Global.entity_name().to_string(),
        ..Settings::default()
    };

    for line in lines {
        if is_section_caption(line) {
            continue;
        }
        if let Some((key, value)) = split_setting(line) {
            let key = key_name(key);
            let value = normalize_value(SettingsScope::Global, &key, &value.to_lowercase());
            settings.values.insert(key, value);
        }
    }

    debug!("Parsed firewall globals: {settings:?}");
    Ok(settings)
}
