//! Rule groups
//!
//! A group is derived from the rules sharing a `grouping` value. It is
//! read-only: there is no way to converge a group, only to report it.

use crate::core::rule::{Enabled, Rule};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Group {
    pub name: String,
    /// `yes` only if every member rule is enabled
    pub enabled: Enabled,
    pub members: usize,
}

/// Aggregates rules into groups, sorted by group name.
///
/// Rules without a grouping are ignored. A member whose enabled flag is not
/// known counts as disabled.
pub fn aggregate_groups<'a>(rules: impl IntoIterator<Item = &'a Rule>) -> Vec<Group> {
    let mut groups: BTreeMap<&str, Group> = BTreeMap::new();

    for rule in rules {
        let Some(grouping) = rule.grouping.as_deref().filter(|g| !g.trim().is_empty()) else {
            continue;
        };
        let member_enabled = rule.enabled.unwrap_or(Enabled::No);
        let group = groups.entry(grouping).or_insert_with(|| Group {
            name: grouping.to_string(),
            enabled: Enabled::Yes,
            members: 0,
        });
        group.members += 1;
        if member_enabled == Enabled::No {
            group.enabled = Enabled::No;
        }
    }

    groups.into_values().collect()
}
