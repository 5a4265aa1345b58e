//! Rule differ
//!
//! Decides, for one desired rule and the live listing, whether the firewall
//! already matches and what to do when it does not. Convergence is
//! delete-then-create: the firewall has no reliable partial update for
//! arbitrary attribute combinations, so a drifted rule is replaced whole.

use crate::core::codec::{Field, PropertyValue, decode, encode};
use crate::core::rule::{ProfileKind, Rule};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write;
use std::str::FromStr;
use strum::IntoEnumIterator;

/// What the reconciler has to do for one desired rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    Create(Rule),
    /// Name of the live rule to remove
    Delete(String),
    /// Live rule drifted: delete it by name, then create the desired rule
    Replace { delete: String, create: Rule },
    Unchanged,
}

impl Change {
    pub fn is_unchanged(&self) -> bool {
        matches!(self, Change::Unchanged)
    }
}

/// Decides the action for `desired` given its live counterpart (if any).
pub fn decide(desired: &Rule, live: Option<&Rule>) -> Change {
    match (desired.is_present(), live) {
        (true, None) => Change::Create(desired.clone()),
        (true, Some(current)) => {
            if drift(desired, current).is_empty() {
                Change::Unchanged
            } else {
                Change::Replace {
                    delete: current.name.clone(),
                    create: desired.clone(),
                }
            }
        }
        (false, Some(current)) => Change::Delete(current.name.clone()),
        (false, None) => Change::Unchanged,
    }
}

/// Fields `desired` manages whose live value differs.
///
/// `name` and `ensure` decide matching, not drift; `grouping` is informational.
pub fn drift(desired: &Rule, live: &Rule) -> Vec<Field> {
    Field::iter()
        .filter(|field| !matches!(field, Field::Name | Field::Ensure | Field::Grouping))
        .filter(|&field| {
            desired
                .get(field)
                .is_some_and(|should| !property_in_sync(field, &should, live.get(field).as_ref()))
        })
        .collect()
}

/// Per-property equality used by the idempotency check.
///
/// A `none` sentinel is unmanaged and always in sync. Profiles compare as
/// sets; text compares after decoding both sides the same way.
pub fn property_in_sync(field: Field, should: &PropertyValue, is: Option<&PropertyValue>) -> bool {
    if should.is_none_sentinel() {
        return true;
    }
    let Some(is) = is else {
        return false;
    };

    match field {
        Field::Profile => {
            let should = profile_set(should.items());
            profile_in_sync(&should, &is.to_string())
        }
        _ => decode(field, &should.to_string()) == decode(field, &is.to_string()),
    }
}

/// Order- and case-insensitive comparison of a desired profile set with the
/// live value in either form (`Domain,Public` or `domain,public`).
///
/// Unrecognized live members never match.
pub fn profile_in_sync(should: &BTreeSet<ProfileKind>, is_raw: &str) -> bool {
    let PropertyValue::List(items) = decode(Field::Profile, is_raw) else {
        return false;
    };
    let members: Vec<&str> = items.iter().map(String::as_str).collect();
    let is = profile_set(members.iter().copied());
    is.len() == members.len() && &is == should
}

fn profile_set<'a>(items: impl Iterator<Item = &'a str>) -> BTreeSet<ProfileKind> {
    items
        .filter_map(|item| ProfileKind::from_str(item.trim()).ok())
        .collect()
}

/// Live rules of one pass, indexed by lowercase name
#[derive(Debug, Clone, Default)]
pub struct LiveRules {
    rules: BTreeMap<String, Rule>,
}

impl LiveRules {
    /// Indexes a listing. A later duplicate replaces an earlier one.
    pub fn from_rules(rules: impl IntoIterator<Item = Rule>) -> Self {
        let mut live = Self::default();
        for rule in rules {
            live.insert(rule);
        }
        live
    }

    pub fn get(&self, name: &str) -> Option<&Rule> {
        self.rules.get(&name.to_lowercase())
    }

    pub fn insert(&mut self, rule: Rule) {
        self.rules.insert(rule.key(), rule);
    }

    pub fn remove(&mut self, name: &str) -> Option<Rule> {
        self.rules.remove(&name.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.values()
    }
}

/// One `field: value` line per field `desired` manages, in emission order.
fn property_lines(desired: &Rule, rule: Option<&Rule>) -> String {
    let mut out = String::new();
    let Some(rule) = rule else {
        return out;
    };
    for field in Field::iter().filter(|f| !matches!(f, Field::Ensure | Field::Grouping)) {
        if desired.get(field).is_none() {
            continue;
        }
        if let Some(value) = rule.get(field) {
            let _ = writeln!(out, "{field}: {}", encode(field, &value));
        }
    }
    out
}

/// Renders a line diff between the live rule and the desired rule, limited to
/// the properties the desired rule manages. Returns `None` when in sync.
pub fn render_drift(desired: &Rule, live: Option<&Rule>) -> Option<String> {
    let target = desired.is_present().then_some(desired);
    let old_text = property_lines(desired, live);
    let new_text = property_lines(desired, target);

    if old_text == new_text {
        return None;
    }

    let diff = similar::TextDiff::from_lines(&old_text, &new_text);
    let mut result = String::new();
    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            similar::ChangeTag::Delete => "- ",
            similar::ChangeTag::Insert => "+ ",
            similar::ChangeTag::Equal => "  ",
        };
        let _ = write!(result, "{sign}{change}");
    }
    Some(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rule::{Action, Ensure};
    use crate::core::test_helpers::{live_rule, rule_with_action};

    #[test]
    fn test_create_when_missing() {
        let desired = rule_with_action("r2", Action::Allow);
        assert_eq!(decide(&desired, None), Change::Create(desired.clone()));
    }

    #[test]
    fn test_replace_on_drift() {
        let live = rule_with_action("r1", Action::Allow);
        let desired = rule_with_action("r1", Action::Block);
        assert_eq!(
            decide(&desired, Some(&live)),
            Change::Replace {
                delete: "r1".to_string(),
                create: desired.clone(),
            }
        );
        assert_eq!(drift(&desired, &live), vec![Field::Action]);
    }

    #[test]
    fn test_unchanged_when_in_sync() {
        let mut live = rule_with_action("r1", Action::Allow);
        live.description = Some("managed elsewhere".into());
        live.grouping = Some("Core Networking".into());
        let desired = rule_with_action("r1", Action::Allow);
        assert!(decide(&desired, Some(&live)).is_unchanged());
    }

    #[test]
    fn test_delete_and_absent_noop() {
        let mut desired = Rule::new("r3");
        desired.ensure = Ensure::Absent;
        let live = live_rule("r3");
        assert_eq!(decide(&desired, Some(&live)), Change::Delete("r3".into()));
        assert!(decide(&desired, None).is_unchanged());
    }

    #[test]
    fn test_unspecified_property_in_live_is_drift_free() {
        let desired = Rule::new("r");
        let mut live = live_rule("r");
        live.action = Some(Action::Block);
        assert!(drift(&desired, &live).is_empty());
    }

    #[test]
    fn test_property_missing_from_live_is_drift() {
        let mut desired = Rule::new("r");
        desired.local_port = Some("80".into());
        assert_eq!(drift(&desired, &live_rule("r")), vec![Field::LocalPort]);
    }

    #[test]
    fn test_none_sentinel_is_unmanaged() {
        let mut desired = Rule::new("r");
        desired.remote_ip = Some("none".into());
        let mut live = live_rule("r");
        live.remote_ip = Some("10.0.0.0/8".into());
        assert!(drift(&desired, &live).is_empty());
    }

    #[test]
    fn test_profile_set_equality() {
        let should = BTreeSet::from([ProfileKind::Public, ProfileKind::Domain]);
        assert!(profile_in_sync(&should, "Domain,Public"));
        assert!(profile_in_sync(&should, "Public, Domain"));
        assert!(profile_in_sync(&should, "public,domain"));
        assert!(!profile_in_sync(&should, "Domain"));
        assert!(!profile_in_sync(&should, "Domain,Public,Private"));
        assert!(!profile_in_sync(&should, "Domain,Public,Work"));
    }

    #[test]
    fn test_profile_drift_through_rules() {
        let mut desired = Rule::new("r");
        desired.profile = Some(BTreeSet::from([ProfileKind::Public, ProfileKind::Domain]));
        let mut live = live_rule("r");
        live.profile = Some(BTreeSet::from([ProfileKind::Domain, ProfileKind::Public]));
        assert!(drift(&desired, &live).is_empty());

        live.profile = Some(BTreeSet::from([ProfileKind::Domain]));
        assert_eq!(drift(&desired, &live), vec![Field::Profile]);
    }

    #[test]
    fn test_live_rules_index_is_case_insensitive() {
        let mut live = LiveRules::from_rules([live_rule("alpha"), live_rule("beta")]);
        assert!(live.get("ALPHA").is_some());
        assert!(live.remove("Beta").is_some());
        assert_eq!(live.len(), 1);
        live.insert(live_rule("gamma"));
        assert_eq!(live.iter().count(), 2);
    }

    #[test]
    fn test_render_drift() {
        let live = rule_with_action("r1", Action::Allow);
        let desired = rule_with_action("r1", Action::Block);
        let rendered = render_drift(&desired, Some(&live)).unwrap();
        assert!(rendered.contains("- action: Allow"));
        assert!(rendered.contains("+ action: Block"));
        assert!(rendered.contains("  name: r1"));

        assert!(render_drift(&desired, Some(&desired)).is_none());
    }
}
