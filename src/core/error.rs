use thiserror::Error;

/// Core error types for winfw
#[derive(Debug, Error)]
pub enum Error {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The bridging script could not be located
    #[error("Bridge resolution error: {0}")]
    Resolution(String),

    /// External tool execution failed (non-zero exit or spawn failure)
    #[error("{verb} failed for '{target}': {message}")]
    Invocation {
        verb: String,
        target: String,
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    /// External tool output could not be parsed
    #[error("Failed to parse {source_name}: {message}")]
    Parse {
        source_name: String,
        message: String,
    },

    /// Desired state violates a static invariant
    #[error("Validation error in {field}: {message}")]
    Validation { field: String, message: String },

    /// The run mode used for bridge resolution is not recognised
    #[error("Don't know how to resolve the bridge script in run mode '{0}'")]
    UnknownMode(String),
}

impl Error {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn parse(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            source_name: source_name.into(),
            message: message.into(),
        }
    }
}

/// Output fragment the bridge and netsh print when a rule lookup finds nothing
pub const NO_RULES_MATCH: &str = "no rules match the specified criteria";

/// Returns `true` if captured tool output means "that rule does not exist".
pub fn is_no_match(output: &str) -> bool {
    let lower = output.to_lowercase();
    lower.contains(NO_RULES_MATCH) || lower.contains("no msft_netfirewallrule objects found")
}

/// Represents a translated error with helpful context
#[derive(Debug, Clone)]
pub struct ErrorTranslation {
    pub user_message: String,
    pub suggestions: Vec<String>,
    pub help_url: Option<String>,
}

impl ErrorTranslation {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            user_message: message.into(),
            suggestions: Vec::new(),
            help_url: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    pub fn with_help(mut self, url: impl Into<String>) -> Self {
        self.help_url = Some(url.into());
        self
    }
}

/// Database of netsh / PowerShell error patterns and their translations
pub struct ToolErrorPattern;

impl ToolErrorPattern {
    /// Matches captured tool output against known patterns and returns a user-friendly translation.
    pub fn match_error(msg: &str) -> ErrorTranslation {
        let lower = msg.to_lowercase();

        if lower.contains("requires elevation")
            || lower.contains("access is denied")
            || lower.contains("run as administrator")
        {
            return ErrorTranslation::new("Insufficient privileges to modify the Windows Firewall")
                .with_suggestion("Run winfw from an elevated (Administrator) prompt")
                .with_suggestion("Check that the account is a member of the local Administrators group");
        }

        if lower.contains("running scripts is disabled") || lower.contains("executionpolicy") {
            return ErrorTranslation::new("PowerShell refused to run the bridge script")
                .with_suggestion("Allow local scripts: Set-ExecutionPolicy RemoteSigned -Scope LocalMachine")
                .with_suggestion("Or unblock the bridge script: Unblock-File <path to ps-bridge.ps1>")
                .with_help("https://learn.microsoft.com/powershell/module/microsoft.powershell.core/about/about_execution_policies");
        }

        if lower.contains("is not recognized") || lower.contains("no such file") {
            return ErrorTranslation::new("netsh or PowerShell was not found")
                .with_suggestion("winfw only manages the Windows Firewall and must run on Windows")
                .with_suggestion("Override the tool paths with WINFW_NETSH_COMMAND or the config file");
        }

        if lower.contains(NO_RULES_MATCH) {
            return ErrorTranslation::new("No firewall rule matched the given name")
                .with_suggestion("The rule may already have been removed");
        }

        if lower.contains("already exists") {
            return ErrorTranslation::new("A firewall rule with this name already exists")
                .with_suggestion("Rule names are case-insensitive; check for a differently cased duplicate");
        }

        if lower.contains("the parameter is incorrect") || lower.contains("cannot bind parameter") {
            return ErrorTranslation::new("The firewall rejected one of the rule's values")
                .with_suggestion("Check enum values such as direction, action and profile")
                .with_suggestion("ICMP type/code can only be combined with an ICMPv4/ICMPv6 protocol")
                .with_help("https://learn.microsoft.com/powershell/module/netsecurity/new-netfirewallrule");
        }

        if lower.contains("service") && lower.contains("not running") {
            return ErrorTranslation::new("The Windows Firewall service is not running")
                .with_suggestion("Start it with: sc start mpssvc");
        }

        ErrorTranslation::new(format!("Firewall error: {msg}"))
            .with_suggestion("Check the captured tool output for more information")
            .with_suggestion("Verify the bridge works: powershell.exe -File ps-bridge.ps1 show")
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elevation_error() {
        let translation = ToolErrorPattern::match_error("The requested operation requires elevation.");
        assert!(translation.user_message.contains("privileges"));
        assert!(translation.suggestions.iter().any(|s| s.contains("Administrator")));
    }

    #[test]
    fn test_execution_policy_error() {
        let translation = ToolErrorPattern::match_error(
            "ps-bridge.ps1 cannot be loaded because running scripts is disabled on this system.",
        );
        assert!(translation.user_message.contains("PowerShell"));
        assert!(translation.help_url.is_some());
    }

    #[test]
    fn test_no_match_detection() {
        assert!(is_no_match("\nNo rules match the specified criteria.\n"));
        assert!(is_no_match(
            "Remove-NetFirewallRule : No MSFT_NetFirewallRule objects found with property 'Name' equal to 'x'"
        ));
        assert!(!is_no_match("Ok."));
    }

    #[test]
    fn test_generic_fallback_keeps_message() {
        let translation = ToolErrorPattern::match_error("something odd");
        assert!(translation.user_message.contains("something odd"));
        assert!(!translation.suggestions.is_empty());
    }

    #[test]
    fn test_validation_display() {
        let err = Error::validation("name", "reserved");
        assert_eq!(err.to_string(), "Validation error in name: reserved");
    }
}
