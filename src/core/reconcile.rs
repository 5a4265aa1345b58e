//! Reconciliation driver
//!
//! One [`Reconciler`] runs one pass: it lists the live rules once, decides
//! per desired rule what to do, and issues the bridge's `delete`/`create`
//! verbs. Mutations update the cached listing in place so a later entry in
//! the same pass sees the effect of an earlier one.
//!
//! Errors are isolated per rule: a failure on one rule is recorded in the
//! [`PassReport`] and the pass moves on. Only a failed listing stops the
//! pass, since no decision can be trusted without it.
//!
//! # Example
//!
//! ```no_run
//! use winfw::core::bridge::{resolve, BridgeConfig};
//! use winfw::core::reconcile::Reconciler;
//! use winfw::core::rule::{Action, Rule};
//! use winfw::invoker::{SystemRunner, Tools};
//!
//! # async fn example() -> winfw::Result<()> {
//! let tools = Tools::new(resolve(&BridgeConfig::default())?, "netsh");
//! let mut reconciler = Reconciler::new(SystemRunner, tools);
//!
//! let mut rule = Rule::new("allow-http");
//! rule.action = Some(Action::Allow);
//! let report = reconciler.reconcile(&[rule]).await?;
//! assert!(report.is_success());
//! # Ok(())
//! # }
//! ```

use crate::audit::{AuditLog, EventType, rule_event, setting_event};
use crate::core::args::{create_args, delete_args, set_settings_args, show_args, show_settings_args};
use crate::core::diff::{Change, LiveRules, decide, render_drift};
use crate::core::error::{Error, Result, is_no_match};
use crate::core::group::{Group, aggregate_groups};
use crate::core::manifest::Manifest;
use crate::core::parser::{parse_global, parse_profile, parse_rules};
use crate::core::rule::Rule;
use crate::core::settings::{
    DesiredSettings, SettingChange, Settings, SettingsScope, settings_drift,
};
use crate::invoker::{CommandOutput, CommandRunner, Tools};
use crate::validators::{validate_rule, validate_setting_key};
use tracing::{debug, error, info, warn};

/// What happened (or, in dry-run mode, would happen) to one rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum ChangeKind {
    Created,
    Deleted,
    Replaced,
    Unchanged,
}

impl From<&Change> for ChangeKind {
    fn from(change: &Change) -> Self {
        match change {
            Change::Create(_) => ChangeKind::Created,
            Change::Delete(_) => ChangeKind::Deleted,
            Change::Replace { .. } => ChangeKind::Replaced,
            Change::Unchanged => ChangeKind::Unchanged,
        }
    }
}

#[derive(Debug)]
pub struct RuleOutcome {
    pub name: String,
    pub result: Result<ChangeKind>,
}

#[derive(Debug)]
pub struct SettingsOutcome {
    pub scope: SettingsScope,
    pub result: Result<Vec<SettingChange>>,
}

/// Outcome of one pass
#[derive(Debug, Default)]
pub struct PassReport {
    pub dry_run: bool,
    pub rules: Vec<RuleOutcome>,
    pub settings: Vec<SettingsOutcome>,
}

impl PassReport {
    pub fn is_success(&self) -> bool {
        self.rules.iter().all(|o| o.result.is_ok())
            && self.settings.iter().all(|o| o.result.is_ok())
    }

    /// Number of rules that were (or would be) changed
    pub fn changed(&self) -> usize {
        self.rules
            .iter()
            .filter(|o| matches!(o.result, Ok(kind) if kind != ChangeKind::Unchanged))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.rules.iter().filter(|o| o.result.is_err()).count()
            + self.settings.iter().filter(|o| o.result.is_err()).count()
    }
}

/// Decision for one rule plus a rendering of the drift behind it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub change: Change,
    pub drift: Option<String>,
}

pub struct Reconciler<R> {
    runner: R,
    tools: Tools,
    audit: Option<AuditLog>,
    dry_run: bool,
    live: Option<LiveRules>,
}

impl<R: CommandRunner> Reconciler<R> {
    pub fn new(runner: R, tools: Tools) -> Self {
        Self {
            runner,
            tools,
            audit: None,
            dry_run: false,
            live: None,
        }
    }

    /// Records every mutation in `audit`
    pub fn with_audit(mut self, audit: AuditLog) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Decides and logs but never invokes a mutating verb
    pub fn dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Starts a new pass: the next lookup lists live rules again.
    pub fn begin_pass(&mut self) {
        self.live = None;
    }

    async fn run_bridge(&self, args: &[String]) -> Result<CommandOutput> {
        let full = self.tools.bridge.command_args(args);
        self.runner.run(&self.tools.bridge.interpreter, &full).await
    }

    async fn run_netsh(&self, args: &[String]) -> Result<CommandOutput> {
        self.runner.run(&self.tools.netsh, args).await
    }

    /// Lists and parses every live rule, bypassing the pass cache.
    ///
    /// # Errors
    ///
    /// `Error::Invocation` if the bridge fails, `Error::Parse` if its output
    /// is malformed.
    pub async fn fetch_rules(&self) -> Result<Vec<Rule>> {
        let output = self.run_bridge(&show_args()).await?;
        if !output.success() {
            if is_no_match(&output.combined()) {
                return Ok(Vec::new());
            }
            return Err(output.into_error("show", "rules"));
        }
        let rules = parse_rules(&output.stdout)?;
        debug!("Parsed rules: {rules:#?}");
        Ok(rules)
    }

    /// Live rules of the current pass, listed on first use.
    pub async fn live_rules(&mut self) -> Result<&LiveRules> {
        if self.live.is_none() {
            let rules = self.fetch_rules().await?;
            info!("Listed {} live firewall rules", rules.len());
            self.live = Some(LiveRules::from_rules(rules));
        }
        Ok(self.live.get_or_insert_with(LiveRules::default))
    }

    /// Decides what reconciling `desired` would do, without changing anything.
    ///
    /// # Errors
    ///
    /// `Error::Validation` (before any invocation) or a listing error.
    pub async fn plan(&mut self, desired: &Rule) -> Result<Plan> {
        validate_rule(desired)?;
        let live = self.live_rules().await?.get(&desired.name);
        let change = decide(desired, live);
        let drift = if change.is_unchanged() {
            None
        } else {
            render_drift(desired, live)
        };
        Ok(Plan { change, drift })
    }

    /// Brings one live rule in line with `desired`.
    ///
    /// A delete that fails still lets the create run; the delete error is
    /// reported afterwards unless the rule simply did not exist.
    pub async fn reconcile_rule(&mut self, desired: &Rule) -> Result<ChangeKind> {
        validate_rule(desired)?;
        let change = decide(desired, self.live_rules().await?.get(&desired.name));
        let kind = ChangeKind::from(&change);

        match change {
            Change::Unchanged => {
                debug!("Rule '{}' is in sync", desired.name);
            }
            Change::Create(rule) => self.create(&rule).await?,
            Change::Delete(name) => self.delete(&name).await?,
            Change::Replace { delete, create } => {
                let deleted = self.delete(&delete).await;
                if let Err(e) = &deleted {
                    warn!("Delete of '{delete}' failed, creating anyway: {e}");
                }
                self.create(&create).await?;
                deleted?;
            }
        }

        Ok(kind)
    }

    /// Reconciles every rule in order and reports per-rule outcomes.
    ///
    /// # Errors
    ///
    /// Only a failed live listing aborts the pass.
    pub async fn reconcile(&mut self, rules: &[Rule]) -> Result<PassReport> {
        let mut report = PassReport {
            dry_run: self.dry_run,
            ..PassReport::default()
        };
        // invalid rules never cause an invocation, not even the listing
        let validations: Vec<Result<()>> = rules.iter().map(validate_rule).collect();
        if validations.iter().any(Result::is_ok) {
            self.live_rules().await?;
        }

        for (rule, validation) in rules.iter().zip(validations) {
            let result = match validation {
                Ok(()) => self.reconcile_rule(rule).await,
                Err(e) => Err(e),
            };
            if let Err(e) = &result {
                error!("Rule '{}' failed: {e}", rule.name);
            }
            report.rules.push(RuleOutcome {
                name: rule.name.clone(),
                result,
            });
        }

        info!(
            "Rules reconciled: {} changed, {} failed, {} total",
            report.changed(),
            report.rules.iter().filter(|o| o.result.is_err()).count(),
            rules.len()
        );
        Ok(report)
    }

    /// Reconciles the rules, then the profile and global settings of a manifest.
    pub async fn apply(&mut self, manifest: &Manifest) -> Result<PassReport> {
        self.begin_pass();
        let mut report = self.reconcile(&manifest.rules).await?;

        for desired in manifest.profiles.iter().chain(manifest.global.iter()) {
            let scope = match SettingsScope::from_name(&desired.name) {
                Ok(scope) => scope,
                Err(e) => {
                    error!("Settings '{}' skipped: {e}", desired.name);
                    continue;
                }
            };
            let result = self.reconcile_settings(scope, desired).await;
            if let Err(e) = &result {
                error!("Settings for {scope} failed: {e}");
            }
            report.settings.push(SettingsOutcome { scope, result });
        }

        Ok(report)
    }

    async fn delete(&mut self, name: &str) -> Result<()> {
        let args = delete_args(name);
        if self.dry_run {
            info!("would delete rule '{name}'");
            self.forget(name);
            return Ok(());
        }

        info!("deleting rule '{name}'");
        let result = match self.run_bridge(&args).await {
            Ok(output) if output.success() => {
                debug!("{}", output.combined());
                Ok(())
            }
            Ok(output) if is_no_match(&output.combined()) => {
                debug!("Rule '{name}' was already gone");
                Ok(())
            }
            Ok(output) => Err(output.into_error("delete", name)),
            Err(e) => Err(e),
        };

        self.audit_rule(EventType::DeleteRule, name, &args, &result)
            .await;
        if result.is_ok() {
            self.forget(name);
        }
        result
    }

    async fn create(&mut self, rule: &Rule) -> Result<()> {
        let args = create_args(rule);
        if self.dry_run {
            info!("would add rule '{}'", rule.name);
            self.remember(rule);
            return Ok(());
        }

        info!("adding rule '{}'", rule.name);
        debug!("Creating firewall rule with args: {args:?}");
        let result = match self.run_bridge(&args).await {
            Ok(output) if output.success() => {
                debug!("{}", output.combined());
                Ok(())
            }
            Ok(output) => Err(output.into_error("create", &rule.name)),
            Err(e) => Err(e),
        };

        self.audit_rule(EventType::CreateRule, &rule.name, &args, &result)
            .await;
        if result.is_ok() {
            self.remember(rule);
        }
        result
    }

    fn forget(&mut self, name: &str) {
        if let Some(live) = self.live.as_mut() {
            live.remove(name);
        }
    }

    fn remember(&mut self, rule: &Rule) {
        if let Some(live) = self.live.as_mut() {
            live.insert(rule.clone());
        }
    }

    async fn audit_rule(&self, event_type: EventType, name: &str, args: &[String], result: &Result<()>) {
        if let Some(audit) = &self.audit {
            let error = result.as_ref().err().map(ToString::to_string);
            audit.record(rule_event(event_type, name, args, error)).await;
        }
    }

    /// Derived, read-only rule groups of the current pass
    pub async fn groups(&mut self) -> Result<Vec<Group>> {
        Ok(aggregate_groups(self.live_rules().await?.iter()))
    }

    /// Live settings of one profile or of the global scope
    pub async fn settings(&self, scope: SettingsScope) -> Result<Settings> {
        let output = self.run_netsh(&show_settings_args(scope)).await?;
        if !output.success() {
            return Err(output.into_error("show", scope.as_ref()));
        }
        match scope {
            SettingsScope::Global => parse_global(&output.stdout),
            _ => parse_profile(&output.stdout),
        }
    }

    /// Live settings of the domain, private and public profiles
    pub async fn profiles(&self) -> Result<Vec<Settings>> {
        let mut profiles = Vec::with_capacity(SettingsScope::PROFILES.len());
        for scope in SettingsScope::PROFILES {
            profiles.push(self.settings(scope).await?);
        }
        Ok(profiles)
    }

    pub async fn global(&self) -> Result<Settings> {
        self.settings(SettingsScope::Global).await
    }

    /// Settings in `desired` that differ from the live ones
    pub async fn plan_settings(
        &self,
        scope: SettingsScope,
        desired: &DesiredSettings,
    ) -> Result<Vec<SettingChange>> {
        for key in desired.settings.keys() {
            validate_setting_key(key)?;
        }
        let live = self.settings(scope).await?;
        Ok(settings_drift(scope, desired, &live))
    }

    /// Sets every drifted setting with `netsh advfirewall set`.
    ///
    /// Stops at the first rejected setting.
    pub async fn reconcile_settings(
        &self,
        scope: SettingsScope,
        desired: &DesiredSettings,
    ) -> Result<Vec<SettingChange>> {
        let changes = self.plan_settings(scope, desired).await?;

        for change in &changes {
            let args = set_settings_args(scope, &change.key, &change.desired);
            if self.dry_run {
                info!("would set {scope} {} to '{}'", change.key, change.desired);
                continue;
            }

            info!("setting {scope} {} to '{}'", change.key, change.desired);
            let result = match self.run_netsh(&args).await {
                Ok(output) if output.success() => Ok(()),
                Ok(output) => Err(output.into_error("set", &format!("{scope} {}", change.key))),
                Err(e) => Err(e),
            };

            if let Some(audit) = &self.audit {
                let error = result.as_ref().err().map(ToString::to_string);
                audit
                    .record(setting_event(scope.as_ref(), &change.key, &change.desired, error))
                    .await;
            }
            result?;
        }

        Ok(changes)
    }
}

/// Returns `true` if an error came from validating desired state
pub fn is_validation_error(error: &Error) -> bool {
    matches!(error, Error::Validation { .. })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rule::{Action, Ensure};
    use crate::core::test_helpers::{RecordingRunner, rule_with_action, test_tools};
    use tempfile::TempDir;

    const LISTING: &str = r#"[
        {"Name": "r1", "Action": "Allow", "Enabled": "True"},
        {"Name": "r3", "Action": "Block"}
    ]"#;

    fn reconciler(runner: RecordingRunner) -> Reconciler<RecordingRunner> {
        Reconciler::new(runner, test_tools())
    }

    #[tokio::test]
    async fn test_listing_is_cached_per_pass() {
        let mut r = reconciler(RecordingRunner::with_listing(LISTING));
        r.live_rules().await.unwrap();
        r.live_rules().await.unwrap();
        assert_eq!(r.runner().bridge_calls(), vec![vec!["show"]]);

        r.begin_pass();
        r.live_rules().await.unwrap();
        assert_eq!(r.runner().bridge_calls().len(), 2);
    }

    #[tokio::test]
    async fn test_in_sync_rule_is_not_touched() {
        let mut r = reconciler(RecordingRunner::with_listing(LISTING));
        let kind = r.reconcile_rule(&rule_with_action("R1", Action::Allow)).await.unwrap();
        assert_eq!(kind, ChangeKind::Unchanged);
        assert_eq!(r.runner().bridge_calls(), vec![vec!["show"]]);
    }

    #[tokio::test]
    async fn test_cache_follows_mutations() {
        let mut r = reconciler(RecordingRunner::with_listing(LISTING));
        let rules = vec![
            rule_with_action("r1", Action::Block),
            rule_with_action("r1", Action::Block),
        ];
        let report = r.reconcile(&rules).await.unwrap();
        assert!(report.is_success());
        assert_eq!(report.rules[0].result.as_ref().ok(), Some(&ChangeKind::Replaced));
        assert_eq!(report.rules[1].result.as_ref().ok(), Some(&ChangeKind::Unchanged));
        assert_eq!(r.runner().bridge_calls().len(), 3);
    }

    #[tokio::test]
    async fn test_failed_delete_still_creates() {
        let runner = RecordingRunner::new(|program, args| {
            Ok(match RecordingRunner::bridge_verb(program, args) {
                Some("show") => CommandOutput::ok(LISTING),
                Some("delete") => CommandOutput::failed(1, "Access is denied."),
                _ => CommandOutput::ok(""),
            })
        });
        let mut r = reconciler(runner);
        let result = r.reconcile_rule(&rule_with_action("r1", Action::Block)).await;

        assert!(matches!(result, Err(Error::Invocation { ref verb, .. }) if verb == "delete"));
        let verbs: Vec<_> = r.runner().bridge_calls().into_iter().map(|c| c[0].clone()).collect();
        assert_eq!(verbs, vec!["show", "delete", "create"]);
    }

    #[tokio::test]
    async fn test_missing_rule_on_delete_is_benign() {
        let runner = RecordingRunner::new(|program, args| {
            Ok(match RecordingRunner::bridge_verb(program, args) {
                Some("show") => CommandOutput::ok(LISTING),
                Some("delete") => CommandOutput::failed(1, "No rules match the specified criteria."),
                _ => CommandOutput::ok(""),
            })
        });
        let mut r = reconciler(runner);
        let mut absent = Rule::new("r3");
        absent.ensure = Ensure::Absent;
        assert_eq!(r.reconcile_rule(&absent).await.unwrap(), ChangeKind::Deleted);
    }

    #[tokio::test]
    async fn test_per_rule_isolation() {
        let runner = RecordingRunner::new(|program, args| {
            Ok(match RecordingRunner::bridge_verb(program, args) {
                Some("show") => CommandOutput::ok("[]"),
                Some("create") if args.iter().any(|a| a == "bad") => {
                    CommandOutput::failed(1, "The parameter is incorrect.")
                }
                _ => CommandOutput::ok(""),
            })
        });
        let mut r = reconciler(runner);
        let report = r.reconcile(&[Rule::new("any")]).await.unwrap();
        assert_eq!(report.failed(), 1);
        assert!(r.runner().calls().is_empty());

        let rules = vec![Rule::new("any"), Rule::new("bad"), Rule::new("good")];
        let report = r.reconcile(&rules).await.unwrap();

        assert!(!report.is_success());
        assert_eq!(report.failed(), 2);
        assert!(matches!(&report.rules[0].result, Err(e) if is_validation_error(e)));
        assert!(matches!(report.rules[1].result, Err(Error::Invocation { .. })));
        assert_eq!(report.rules[2].result.as_ref().ok(), Some(&ChangeKind::Created));
    }

    #[tokio::test]
    async fn test_malformed_listing_aborts_pass() {
        let mut r = reconciler(RecordingRunner::with_listing("[{\"Name\":"));
        let result = r.reconcile(&[Rule::new("x")]).await;
        assert!(matches!(result, Err(Error::Parse { .. })));
        assert_eq!(r.runner().bridge_calls().len(), 1);
    }

    #[tokio::test]
    async fn test_dry_run_invokes_nothing_but_show() {
        let mut r = reconciler(RecordingRunner::with_listing(LISTING)).dry_run(true);
        let mut absent = Rule::new("r3");
        absent.ensure = Ensure::Absent;
        let report = r
            .reconcile(&[rule_with_action("r1", Action::Block), absent, Rule::new("new")])
            .await
            .unwrap();
        assert!(report.dry_run);
        assert_eq!(report.changed(), 3);
        assert_eq!(r.runner().bridge_calls(), vec![vec!["show"]]);
    }

    #[tokio::test]
    async fn test_plan_renders_drift() {
        let mut r = reconciler(RecordingRunner::with_listing(LISTING));
        let plan = r.plan(&rule_with_action("r1", Action::Block)).await.unwrap();
        assert!(matches!(plan.change, Change::Replace { .. }));
        assert!(plan.drift.unwrap().contains("+ action: Block"));
        assert_eq!(r.runner().bridge_calls().len(), 1);
    }

    #[tokio::test]
    async fn test_mutations_are_audited() {
        let dir = TempDir::new().unwrap();
        let audit = AuditLog::at(dir.path().join("audit.log"));
        let mut r = reconciler(RecordingRunner::with_listing(LISTING)).with_audit(audit.clone());
        r.reconcile_rule(&rule_with_action("r1", Action::Block)).await.unwrap();

        let events = audit.read_recent(10).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, EventType::CreateRule);
        assert_eq!(events[1].event_type, EventType::DeleteRule);
        assert!(events.iter().all(|e| e.success));
    }

    #[tokio::test]
    async fn test_groups() {
        let listing = r#"[
            {"Name": "a", "Grouping": "G", "Enabled": true},
            {"Name": "b", "Grouping": "G", "Enabled": false},
            {"Name": "c"}
        ]"#;
        let mut r = reconciler(RecordingRunner::with_listing(listing));
        let groups = r.groups().await.unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].enabled, crate::core::rule::Enabled::No);
    }

    const GLOBAL: &str = "Global Settings:\n---\nSAIdleTimeMin   5min\nForceDH   No\nOk.\n";

    #[tokio::test]
    async fn test_settings_convergence() {
        let runner = RecordingRunner::new(|program, args| {
            Ok(if program == "netsh" && args.get(1).is_some_and(|a| a == "show") {
                CommandOutput::ok(GLOBAL)
            } else {
                CommandOutput::ok("Ok.")
            })
        });
        let r = reconciler(runner);
        let desired = DesiredSettings {
            name: "global".into(),
            settings: [
                ("saidletimemin".to_string(), "5".to_string()),
                ("forcedh".to_string(), "yes".to_string()),
            ]
            .into_iter()
            .collect(),
        };

        let changes = r.reconcile_settings(SettingsScope::Global, &desired).await.unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(
            r.runner().netsh_calls(),
            vec![
                vec!["advfirewall", "show", "global"],
                vec!["advfirewall", "set", "global", "mainmode", "mmforcedh", "yes"],
            ]
        );
    }

    #[tokio::test]
    async fn test_settings_show_failure() {
        let runner = RecordingRunner::new(|_, _| Ok(CommandOutput::failed(1, "The requested operation requires elevation.")));
        let r = reconciler(runner);
        assert!(matches!(r.global().await, Err(Error::Invocation { .. })));
    }
}
