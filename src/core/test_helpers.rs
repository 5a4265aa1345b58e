//! Shared test utilities for core module tests
//!
//! Provides a recording [`CommandRunner`] and rule fixtures so tests never
//! spawn PowerShell or `netsh`. This module is only compiled in test mode.

use crate::core::bridge::Bridge;
use crate::core::error::Result;
use crate::core::rule::{Action, Enabled, Rule};
use crate::invoker::{CommandOutput, CommandRunner, Tools};
use std::cell::RefCell;
use std::path::PathBuf;

pub const TEST_INTERPRETER: &str = "powershell.exe";
pub const TEST_SCRIPT: &str = "ps-bridge.ps1";
pub const TEST_NETSH: &str = "netsh";

type Responder = Box<dyn Fn(&str, &[String]) -> Result<CommandOutput>>;

/// Records every invocation and answers from a scripted responder.
///
/// # Example
///
/// ```ignore
/// let runner = RecordingRunner::with_listing("[]");
/// let mut reconciler = Reconciler::new(runner, test_tools());
/// reconciler.reconcile(&rules).await?;
/// assert_eq!(reconciler.runner().bridge_calls()[0], vec!["show"]);
/// ```
pub struct RecordingRunner {
    calls: RefCell<Vec<(String, Vec<String>)>>,
    responder: Responder,
}

impl RecordingRunner {
    pub fn new(responder: impl Fn(&str, &[String]) -> Result<CommandOutput> + 'static) -> Self {
        Self {
            calls: RefCell::new(Vec::new()),
            responder: Box::new(responder),
        }
    }

    /// Bridge `show` returns `listing`; every other invocation succeeds silently.
    pub fn with_listing(listing: &str) -> Self {
        let listing = listing.to_string();
        Self::new(move |program, args| {
            Ok(match Self::bridge_verb(program, args) {
                Some("show") => CommandOutput::ok(listing.clone()),
                _ => CommandOutput::ok(""),
            })
        })
    }

    /// The bridge verb of an invocation, if it is a bridge invocation
    pub fn bridge_verb<'a>(program: &str, args: &'a [String]) -> Option<&'a str> {
        (program == TEST_INTERPRETER)
            .then(|| args.get(2).map(String::as_str))
            .flatten()
    }

    /// Every invocation as `(program, args)`
    pub fn calls(&self) -> Vec<(String, Vec<String>)> {
        self.calls.borrow().clone()
    }

    /// Bridge invocations without the `-File <script>` prefix
    pub fn bridge_calls(&self) -> Vec<Vec<String>> {
        self.calls
            .borrow()
            .iter()
            .filter(|(program, _)| program == TEST_INTERPRETER)
            .map(|(_, args)| args.iter().skip(2).cloned().collect())
            .collect()
    }

    pub fn netsh_calls(&self) -> Vec<Vec<String>> {
        self.calls
            .borrow()
            .iter()
            .filter(|(program, _)| program == TEST_NETSH)
            .map(|(_, args)| args.clone())
            .collect()
    }
}

impl CommandRunner for RecordingRunner {
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput> {
        self.calls
            .borrow_mut()
            .push((program.to_string(), args.to_vec()));
        (self.responder)(program, args)
    }
}

/// Tools pointing at fake program names
pub fn test_tools() -> Tools {
    Tools::new(
        Bridge {
            interpreter: TEST_INTERPRETER.to_string(),
            script: PathBuf::from(TEST_SCRIPT),
        },
        TEST_NETSH,
    )
}

/// A present rule as the parser would produce it, with only a name
pub fn live_rule(name: &str) -> Rule {
    let mut rule = Rule::new(name);
    rule.normalize();
    rule
}

/// A present rule with an action
pub fn rule_with_action(name: &str, action: Action) -> Rule {
    let mut rule = live_rule(name);
    rule.action = Some(action);
    rule
}

/// A live rule belonging to `grouping`
pub fn grouped_rule(name: &str, grouping: &str, enabled: Option<Enabled>) -> Rule {
    let mut rule = live_rule(name);
    rule.grouping = Some(grouping.to_string());
    rule.enabled = enabled;
    rule
}
