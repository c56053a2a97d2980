//! Rule-based permission engine for NanoForge
//!
//! Sits between the model's tool requests and their execution. A prioritized
//! rule list decides ALLOW / DENY / ASK for each pending call; ASK falls back
//! to an interactive confirmation through an injected [`ApprovalPrompt`]
//! capability, so nothing in this module touches a global terminal state.
//!
//! Rules match on a tool-name glob plus optional path and command globs
//! against the tool's input. Rules are evaluated in descending priority
//! order; ties keep insertion order. If no rule matches, the implicit
//! default is ASK.

use std::io::{BufRead, Write};
use std::sync::Arc;

use glob::Pattern;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::config::Config;

/// The permission outcome for a tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    /// Auto approve
    Allow,
    /// Auto deny
    Deny,
    /// Defer to interactive confirmation
    Ask,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Allow => write!(f, "allow"),
            Verdict::Deny => write!(f, "deny"),
            Verdict::Ask => write!(f, "ask"),
        }
    }
}

fn default_tool_pattern() -> String {
    "*".to_string()
}

fn default_verdict() -> Verdict {
    Verdict::Ask
}

/// An immutable permission rule.
///
/// A rule matches a `(tool name, input)` pair when the tool glob matches
/// and, if present, the path glob matches the input's `file_path`/`path`
/// (or its basename) and the command glob matches the input's `command`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionRule {
    /// Glob matched against the tool name ("write", "bash", "*", ...)
    #[serde(default = "default_tool_pattern")]
    pub tool_pattern: String,
    /// Optional glob matched against the input path ("/tmp/*", "*test*", ...)
    #[serde(default)]
    pub path_pattern: Option<String>,
    /// Optional glob matched against the input command ("cargo test*", ...)
    #[serde(default)]
    pub command_pattern: Option<String>,
    /// The decision this rule produces when it matches
    #[serde(default = "default_verdict")]
    pub verdict: Verdict,
    /// Human-readable rationale, recorded in the decision history
    #[serde(default)]
    pub description: String,
    /// Higher priority rules are evaluated first
    #[serde(default)]
    pub priority: i32,
}

impl PermissionRule {
    /// Create a rule matching a tool-name glob with the given verdict.
    pub fn new(tool_pattern: &str, verdict: Verdict) -> Self {
        Self {
            tool_pattern: tool_pattern.to_string(),
            path_pattern: None,
            command_pattern: None,
            verdict,
            description: String::new(),
            priority: 0,
        }
    }

    /// Restrict the rule to inputs whose path matches a glob.
    pub fn with_path(mut self, pattern: &str) -> Self {
        self.path_pattern = Some(pattern.to_string());
        self
    }

    /// Restrict the rule to inputs whose command matches a glob.
    pub fn with_command(mut self, pattern: &str) -> Self {
        self.command_pattern = Some(pattern.to_string());
        self
    }

    /// Set the rule's priority.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Set the rule's description.
    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    /// Check whether this rule matches a pending tool call.
    ///
    /// # Example
    /// ```
    /// use nanoforge::permissions::{PermissionRule, Verdict};
    /// use serde_json::json;
    ///
    /// let rule = PermissionRule::new("bash", Verdict::Deny).with_command("rm -rf *");
    /// assert!(rule.matches("bash", &json!({"command": "rm -rf /tmp/x"})));
    /// assert!(!rule.matches("bash", &json!({"command": "ls"})));
    /// ```
    pub fn matches(&self, tool_name: &str, context: &Value) -> bool {
        if !glob_matches(&self.tool_pattern, tool_name) {
            return false;
        }

        if let Some(path_pattern) = &self.path_pattern {
            let path = context
                .get("file_path")
                .or_else(|| context.get("path"))
                .and_then(Value::as_str);
            let Some(path) = path else { return false };
            // Also try the basename, so a pattern like "*test*.rs" matches
            // a path in any directory.
            let basename = path.rsplit('/').next().unwrap_or(path);
            if !glob_matches(path_pattern, path) && !glob_matches(path_pattern, basename) {
                return false;
            }
        }

        if let Some(command_pattern) = &self.command_pattern {
            let Some(command) = context.get("command").and_then(Value::as_str) else {
                return false;
            };
            if !glob_matches(command_pattern, command) {
                return false;
            }
        }

        true
    }
}

/// Glob match with invalid patterns treated as non-matching.
fn glob_matches(pattern: &str, value: &str) -> bool {
    Pattern::new(pattern)
        .map(|p| p.matches(value))
        .unwrap_or(false)
}

// ============================================================================
// Interactive confirmation
// ============================================================================

/// Capability for suspending interactive terminal output (e.g. a spinner)
/// while a confirmation prompt is displayed.
pub trait SpinnerControl: Send + Sync {
    fn pause(&self);
    fn resume(&self);
}

/// Capability for asking the user to approve a pending tool call.
///
/// Injected into the [`PermissionEngine`] so the ASK path is testable and
/// never reaches for a global terminal.
pub trait ApprovalPrompt: Send + Sync {
    /// Ask the user to approve. Returns `true` for approval.
    ///
    /// Implementations must treat end-of-input or interruption as denial,
    /// never as an error escaping to the caller.
    fn confirm(&self, tool_name: &str, details: &str, diff: Option<&str>) -> bool;
}

/// Terminal prompt: prints the request and reads a y/n answer from stdin,
/// looping on invalid input. EOF or interrupt during the prompt denies.
#[derive(Default)]
pub struct TerminalPrompt {
    spinner: Option<Arc<dyn SpinnerControl>>,
}

impl TerminalPrompt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a spinner to pause while the prompt is visible.
    pub fn with_spinner(mut self, spinner: Arc<dyn SpinnerControl>) -> Self {
        self.spinner = Some(spinner);
        self
    }

    fn read_answer(&self, tool_name: &str, details: &str, diff: Option<&str>) -> bool {
        eprintln!("\n!  Permission required: {}", tool_name);
        eprintln!("   {}", details);
        if let Some(diff) = diff {
            eprintln!("\n   Changes:");
            eprintln!("{}", format_diff(diff));
            eprintln!();
        }

        let stdin = std::io::stdin();
        let mut line = String::new();
        loop {
            eprint!("   Approve? [y/n]: ");
            let _ = std::io::stderr().flush();
            line.clear();
            match stdin.lock().read_line(&mut line) {
                // EOF or read failure: deny, never error out of the prompt
                Ok(0) | Err(_) => {
                    eprintln!("\n   Cancelled. Denying permission.");
                    return false;
                }
                Ok(_) => match line.trim().to_lowercase().as_str() {
                    "y" | "yes" => return true,
                    "n" | "no" => return false,
                    _ => eprintln!("   Invalid input. Please enter 'y' or 'n'"),
                },
            }
        }
    }
}

impl ApprovalPrompt for TerminalPrompt {
    fn confirm(&self, tool_name: &str, details: &str, diff: Option<&str>) -> bool {
        if let Some(spinner) = &self.spinner {
            spinner.pause();
        }
        let approved = self.read_answer(tool_name, details, diff);
        if let Some(spinner) = &self.spinner {
            spinner.resume();
        }
        approved
    }
}

/// Indent and normalize a unified diff for terminal display.
fn format_diff(diff: &str) -> String {
    diff.lines()
        .map(|line| {
            if line.starts_with("+++") || line.starts_with("---") || line.starts_with("@@") {
                format!("  {}", line)
            } else if let Some(rest) = line.strip_prefix('+') {
                format!("  + {}", rest)
            } else if let Some(rest) = line.strip_prefix('-') {
                format!("  - {}", rest)
            } else {
                format!("    {}", line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ============================================================================
// Engine
// ============================================================================

/// Rule-based permission engine.
///
/// Holds the rule list sorted by descending priority and an append-only
/// history of every decision (auto or interactive) for later audit.
pub struct PermissionEngine {
    enabled: bool,
    show_diff: bool,
    rules: Vec<PermissionRule>,
    history: Vec<(String, Verdict)>,
    prompt: Box<dyn ApprovalPrompt>,
}

impl PermissionEngine {
    /// Create an engine with the default rule set and a terminal prompt.
    pub fn new(enabled: bool) -> Self {
        let mut engine = Self {
            enabled,
            show_diff: true,
            rules: Self::default_rules(),
            history: Vec::new(),
            prompt: Box::new(TerminalPrompt::new()),
        };
        engine.sort_rules();
        engine
    }

    /// Create an engine from configuration: enabled/show_diff flags plus any
    /// user-supplied rules from the `permission_rules` key.
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.approval_enabled())
            .with_show_diff(config.show_diff())
            .with_rules(config.permission_rules())
    }

    /// Replace the interactive prompt implementation.
    pub fn with_prompt(mut self, prompt: Box<dyn ApprovalPrompt>) -> Self {
        self.prompt = prompt;
        self
    }

    /// Toggle diff display on ASK prompts.
    pub fn with_show_diff(mut self, show_diff: bool) -> Self {
        self.show_diff = show_diff;
        self
    }

    /// Add user-supplied rules on top of the current set.
    pub fn with_rules(mut self, rules: Vec<PermissionRule>) -> Self {
        self.rules.extend(rules);
        self.sort_rules();
        self
    }

    /// Add a single rule and re-sort.
    pub fn add_rule(&mut self, rule: PermissionRule) {
        self.rules.push(rule);
        self.sort_rules();
    }

    /// Whether the engine is enabled. A disabled engine approves everything.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn sort_rules(&mut self) {
        // Stable sort: equal priorities keep insertion order.
        self.rules.sort_by(|a, b| b.priority.cmp(&a.priority));
    }

    /// The default policy, tuned for code generation and testing:
    /// read-only tools always allowed, test writes and test/lint/format
    /// commands allowed, scratch-directory writes allowed, recursive deletes
    /// denied, everything else asks.
    pub fn default_rules() -> Vec<PermissionRule> {
        vec![
            // Read-only tools: always allow
            PermissionRule::new("read", Verdict::Allow)
                .with_priority(-100)
                .with_description("Reading files is safe"),
            PermissionRule::new("glob", Verdict::Allow)
                .with_priority(-100)
                .with_description("Finding files is safe"),
            PermissionRule::new("grep", Verdict::Allow)
                .with_priority(-100)
                .with_description("Searching files is safe"),
            // Test-related writes: auto approve
            PermissionRule::new("write", Verdict::Allow)
                .with_path("*test*")
                .with_priority(10)
                .with_description("Writing test files"),
            PermissionRule::new("write", Verdict::Allow)
                .with_path("tests/*")
                .with_priority(10)
                .with_description("Writing to tests directory"),
            // Test / lint / format commands: auto approve
            PermissionRule::new("bash", Verdict::Allow)
                .with_command("cargo test*")
                .with_priority(10)
                .with_description("Running cargo test"),
            PermissionRule::new("bash", Verdict::Allow)
                .with_command("cargo check*")
                .with_priority(10)
                .with_description("Running cargo check"),
            PermissionRule::new("bash", Verdict::Allow)
                .with_command("cargo clippy*")
                .with_priority(10)
                .with_description("Running cargo clippy"),
            PermissionRule::new("bash", Verdict::Allow)
                .with_command("cargo fmt*")
                .with_priority(10)
                .with_description("Running cargo fmt"),
            // Scratch directory: allow
            PermissionRule::new("write", Verdict::Allow)
                .with_path("/tmp/*")
                .with_priority(-50)
                .with_description("Writing to /tmp is safe"),
            // Dangerous commands: deny
            PermissionRule::new("bash", Verdict::Deny)
                .with_command("rm -rf *")
                .with_priority(100)
                .with_description("Dangerous recursive delete"),
            PermissionRule::new("bash", Verdict::Deny)
                .with_command("rm -r *")
                .with_priority(100)
                .with_description("Dangerous recursive delete"),
            // Default: ask user
            PermissionRule::new("*", Verdict::Ask)
                .with_priority(-1000)
                .with_description("Default: ask user"),
        ]
    }

    /// Evaluate the rules in priority order and return the verdict of the
    /// first matching rule, or ASK if none match.
    pub fn evaluate(&self, tool_name: &str, context: &Value) -> Verdict {
        for rule in &self.rules {
            if rule.matches(tool_name, context) {
                debug!(
                    tool = tool_name,
                    verdict = %rule.verdict,
                    rule = %rule.description,
                    "Permission rule matched"
                );
                return rule.verdict;
            }
        }
        Verdict::Ask
    }

    /// Check permission for a pending tool call: auto-decide or prompt.
    ///
    /// Returns `true` when the call is approved. Every decision is appended
    /// to the history.
    pub fn check(
        &mut self,
        tool_name: &str,
        details: &str,
        context: &Value,
        diff: Option<&str>,
    ) -> bool {
        if !self.enabled {
            return true;
        }

        let entry = format!("{}: {}", tool_name, details);
        match self.evaluate(tool_name, context) {
            Verdict::Allow => {
                self.history.push((entry, Verdict::Allow));
                true
            }
            Verdict::Deny => {
                self.history.push((entry, Verdict::Deny));
                false
            }
            Verdict::Ask => {
                let shown_diff = if self.show_diff { diff } else { None };
                let approved = self.prompt.confirm(tool_name, details, shown_diff);
                let verdict = if approved {
                    Verdict::Allow
                } else {
                    Verdict::Deny
                };
                self.history.push((entry, verdict));
                approved
            }
        }
    }

    /// The ordered decision history.
    pub fn history(&self) -> &[(String, Verdict)] {
        &self.history
    }

    /// Clear the decision history.
    pub fn clear_history(&mut self) {
        self.history.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Prompt stub with a fixed answer and a call counter.
    struct FixedPrompt {
        answer: bool,
        calls: Arc<AtomicUsize>,
    }

    impl ApprovalPrompt for FixedPrompt {
        fn confirm(&self, _tool: &str, _details: &str, _diff: Option<&str>) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answer
        }
    }

    fn engine_with_prompt(answer: bool) -> (PermissionEngine, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let engine = PermissionEngine::new(true).with_prompt(Box::new(FixedPrompt {
            answer,
            calls: calls.clone(),
        }));
        (engine, calls)
    }

    #[test]
    fn test_rule_matches_tool_glob() {
        let rule = PermissionRule::new("read", Verdict::Allow);
        assert!(rule.matches("read", &json!({})));
        assert!(!rule.matches("write", &json!({})));

        let wildcard = PermissionRule::new("*", Verdict::Ask);
        assert!(wildcard.matches("anything", &json!({})));
    }

    #[test]
    fn test_rule_matches_path_and_basename() {
        let rule = PermissionRule::new("write", Verdict::Allow).with_path("*test*");
        assert!(rule.matches("write", &json!({"file_path": "src/loop_test.rs"})));
        // basename match: absolute directory does not contain "test"
        assert!(rule.matches("write", &json!({"file_path": "/home/u/proj/test_io.rs"})));
        assert!(!rule.matches("write", &json!({"file_path": "/home/u/proj/main.rs"})));
        // no path in context: a path rule cannot match
        assert!(!rule.matches("write", &json!({})));
    }

    #[test]
    fn test_rule_matches_command() {
        let rule = PermissionRule::new("bash", Verdict::Deny).with_command("rm -rf *");
        assert!(rule.matches("bash", &json!({"command": "rm -rf /tmp/x"})));
        assert!(!rule.matches("bash", &json!({"command": "ls -la"})));
        assert!(!rule.matches("bash", &json!({})));
    }

    #[test]
    fn test_rule_serde_roundtrip() {
        let rule = PermissionRule::new("bash", Verdict::Deny)
            .with_command("rm -rf *")
            .with_priority(100)
            .with_description("no recursive deletes");
        let dict = serde_json::to_value(&rule).unwrap();
        assert_eq!(dict["verdict"], "deny");

        let restored: PermissionRule = serde_json::from_value(dict).unwrap();
        assert_eq!(restored.tool_pattern, "bash");
        assert_eq!(restored.verdict, Verdict::Deny);
        assert_eq!(restored.priority, 100);
    }

    #[test]
    fn test_rule_deserialize_defaults() {
        let rule: PermissionRule = serde_json::from_value(json!({})).unwrap();
        assert_eq!(rule.tool_pattern, "*");
        assert_eq!(rule.verdict, Verdict::Ask);
        assert_eq!(rule.priority, 0);
        assert!(rule.path_pattern.is_none());
    }

    #[test]
    fn test_evaluate_priority_wins_regardless_of_order() {
        let (mut engine, _) = engine_with_prompt(false);
        // Lower priority registered first, higher second
        engine.add_rule(
            PermissionRule::new("deploy", Verdict::Deny).with_priority(0),
        );
        engine.add_rule(
            PermissionRule::new("deploy", Verdict::Allow).with_priority(10),
        );
        assert_eq!(engine.evaluate("deploy", &json!({})), Verdict::Allow);

        // Same again with registration order flipped
        let (mut engine, _) = engine_with_prompt(false);
        engine.add_rule(
            PermissionRule::new("deploy", Verdict::Allow).with_priority(10),
        );
        engine.add_rule(
            PermissionRule::new("deploy", Verdict::Deny).with_priority(0),
        );
        assert_eq!(engine.evaluate("deploy", &json!({})), Verdict::Allow);
    }

    #[test]
    fn test_default_rules_read_only_allowed() {
        let engine = PermissionEngine::new(true);
        for tool in ["read", "glob", "grep"] {
            assert_eq!(engine.evaluate(tool, &json!({})), Verdict::Allow);
        }
    }

    #[test]
    fn test_default_rules_deny_overrides_catchall() {
        let engine = PermissionEngine::new(true);
        assert_eq!(
            engine.evaluate("bash", &json!({"command": "rm -rf /tmp/x"})),
            Verdict::Deny
        );
    }

    #[test]
    fn test_default_rules_cargo_test_allowed() {
        let engine = PermissionEngine::new(true);
        assert_eq!(
            engine.evaluate("bash", &json!({"command": "cargo test --all"})),
            Verdict::Allow
        );
        assert_eq!(
            engine.evaluate("bash", &json!({"command": "cargo publish"})),
            Verdict::Ask
        );
    }

    #[test]
    fn test_default_rules_tmp_write_allowed() {
        let engine = PermissionEngine::new(true);
        assert_eq!(
            engine.evaluate("write", &json!({"file_path": "/tmp/scratch.txt"})),
            Verdict::Allow
        );
        assert_eq!(
            engine.evaluate("write", &json!({"file_path": "/etc/passwd"})),
            Verdict::Ask
        );
    }

    #[test]
    fn test_unmatched_tool_defaults_to_ask() {
        // Even without the catch-all, no match means ASK
        let engine = PermissionEngine {
            enabled: true,
            show_diff: true,
            rules: Vec::new(),
            history: Vec::new(),
            prompt: Box::new(TerminalPrompt::new()),
        };
        assert_eq!(engine.evaluate("mystery", &json!({})), Verdict::Ask);
    }

    #[test]
    fn test_check_disabled_always_approves() {
        let mut engine = PermissionEngine::new(false);
        assert!(engine.check("bash", "rm", &json!({"command": "rm -rf /"}), None));
        // Disabled engine records nothing
        assert!(engine.history().is_empty());
    }

    #[test]
    fn test_check_records_history() {
        let (mut engine, _) = engine_with_prompt(false);
        engine.check("read", "Read /tmp/a", &json!({}), None);
        engine.check("bash", "rm -rf", &json!({"command": "rm -rf /x"}), None);

        let history = engine.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].1, Verdict::Allow);
        assert!(history[0].0.starts_with("read:"));
        assert_eq!(history[1].1, Verdict::Deny);
    }

    #[test]
    fn test_check_ask_routes_to_prompt() {
        let (mut engine, calls) = engine_with_prompt(true);
        let approved = engine.check("edit", "Edit main.rs", &json!({"file_path": "main.rs"}), None);
        assert!(approved);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(engine.history()[0].1, Verdict::Allow);

        let (mut engine, calls) = engine_with_prompt(false);
        let approved = engine.check("edit", "Edit main.rs", &json!({"file_path": "main.rs"}), None);
        assert!(!approved);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(engine.history()[0].1, Verdict::Deny);
    }

    #[test]
    fn test_check_allow_skips_prompt() {
        let (mut engine, calls) = engine_with_prompt(false);
        let approved = engine.check("read", "Read a file", &json!({}), None);
        assert!(approved);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_clear_history() {
        let (mut engine, _) = engine_with_prompt(false);
        engine.check("read", "Read a file", &json!({}), None);
        assert_eq!(engine.history().len(), 1);
        engine.clear_history();
        assert!(engine.history().is_empty());
    }

    #[test]
    fn test_format_diff_indents_lines() {
        let diff = "--- a.txt\n+++ a.txt\n-old line\n+new line\ncontext";
        let formatted = format_diff(diff);
        assert!(formatted.contains("  --- a.txt"));
        assert!(formatted.contains("  - old line"));
        assert!(formatted.contains("  + new line"));
        assert!(formatted.contains("    context"));
    }
}
