//! Validation of desired state
//!
//! Everything here runs before any external invocation: a manifest that
//! fails validation never reaches the bridge or `netsh`.

use crate::core::error::{Error, Result};
use crate::core::manifest::Manifest;
use crate::core::rule::{RESERVED_NAME, Rule};
use crate::core::settings::{DesiredSettings, SettingsScope};
use std::collections::BTreeSet;

/// Fixed message for any attempt to manage `grouping`
pub const GROUPING_READ_ONLY: &str = "grouping is read-only and cannot be set";

/// Validates a rule name.
///
/// # Errors
///
/// Returns `Error::Validation` if the name is empty, contains control
/// characters, or is the reserved wildcard `any` (in any case).
///
/// # Examples
///
/// ```
/// use winfw::validators::validate_rule_name;
///
/// assert!(validate_rule_name("Allow-HTTP").is_ok());
/// assert!(validate_rule_name("Any").is_err());
/// ```
pub fn validate_rule_name(name: &str) -> Result<()> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(Error::validation("name", "rule name must not be empty"));
    }
    if trimmed.eq_ignore_ascii_case(RESERVED_NAME) {
        return Err(Error::validation(
            "name",
            format!("'{name}' is a reserved rule name"),
        ));
    }
    // names travel as a single argument to PowerShell
    if name.chars().any(char::is_control) {
        return Err(Error::validation(
            "name",
            "rule name contains control characters",
        ));
    }
    Ok(())
}

/// Validates a desired rule's static invariants.
///
/// # Errors
///
/// Returns `Error::Validation` for a bad name, any `grouping` value, or an
/// empty `profile` set.
pub fn validate_rule(rule: &Rule) -> Result<()> {
    validate_rule_name(&rule.name)?;

    if rule.grouping.is_some() {
        return Err(Error::validation("grouping", GROUPING_READ_ONLY));
    }

    if rule.profile.as_ref().is_some_and(BTreeSet::is_empty) {
        return Err(Error::validation(
            "profile",
            format!("rule '{}' has an empty profile set", rule.name),
        ));
    }

    Ok(())
}

/// Validates a settings key: a single lowercase-able word.
///
/// # Errors
///
/// Returns `Error::Validation` if the key is empty or not alphanumeric.
pub fn validate_setting_key(key: &str) -> Result<()> {
    if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(Error::validation(
            "settings",
            format!("invalid setting key '{key}'"),
        ));
    }
    Ok(())
}

fn validate_settings(desired: &DesiredSettings, expect_global: bool) -> Result<SettingsScope> {
    let scope = SettingsScope::from_name(&desired.name)?;
    if (scope == SettingsScope::Global) != expect_global {
        return Err(Error::validation(
            "name",
            format!(
                "'{}' is not a valid {} name",
                desired.name,
                if expect_global { "global" } else { "profile" }
            ),
        ));
    }

    for (key, value) in &desired.settings {
        validate_setting_key(key)?;
        if value.trim().is_empty() || value.chars().any(char::is_control) {
            return Err(Error::validation(
                "settings",
                format!("invalid value for '{key}'"),
            ));
        }
    }
    Ok(scope)
}

/// Validates a whole manifest: every rule, no duplicate names (case-insensitive),
/// and settings blocks naming each scope at most once.
///
/// # Errors
///
/// Returns the first `Error::Validation` found.
pub fn validate_manifest(manifest: &Manifest) -> Result<()> {
    let mut names = BTreeSet::new();
    for rule in &manifest.rules {
        validate_rule(rule)?;
        if !names.insert(rule.key()) {
            return Err(Error::validation(
                "name",
                format!("rule '{}' is declared more than once", rule.name),
            ));
        }
    }

    let mut scopes = Vec::new();
    for profile in &manifest.profiles {
        let scope = validate_settings(profile, false)?;
        if scopes.contains(&scope) {
            return Err(Error::validation(
                "profiles",
                format!("profile '{}' is declared more than once", profile.name),
            ));
        }
        scopes.push(scope);
    }

    if let Some(global) = &manifest.global {
        validate_settings(global, true)?;
    }

    Ok(())
}
