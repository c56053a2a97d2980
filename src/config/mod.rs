//! Configuration management for NanoForge
//!
//! A flat key→value store with layered precedence:
//! explicit override > environment variables (`NANOFORGE_*`) > project file
//! (`.nanoforge.json`) > global file (`~/.nanoforge/config.json`) > built-in
//! defaults. Invalid config files are ignored rather than fatal.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde_json::{json, Value};
use tracing::warn;

use crate::permissions::PermissionRule;

/// Environment variable prefix for config overrides.
const ENV_PREFIX: &str = "NANOFORGE_";

/// Layered flat configuration.
#[derive(Debug, Clone)]
pub struct Config {
    values: HashMap<String, Value>,
}

impl Config {
    /// Built-in defaults only -- no files, no environment. The base layer of
    /// [`Config::load`] and the standard constructor for tests.
    ///
    /// # Example
    /// ```
    /// use nanoforge::config::Config;
    ///
    /// let config = Config::defaults();
    /// assert_eq!(config.max_turns(), 20);
    /// ```
    pub fn defaults() -> Self {
        let mut values = HashMap::new();
        let defaults = json!({
            // LLM settings
            "provider": "claude",
            "model": "claude-sonnet-4-20250514",
            "max_tokens": 16384,

            // Agent settings
            "max_turns": 20,
            "max_output_length": 10_000,
            "context_limit": 100_000,
            "compact_threshold": 0.75,
            "preserve_recent_messages": 3,
            "enable_auto_compaction": true,
            "token_estimate_divisor": 4,

            // Permission settings
            "approval_enabled": true,
            "show_diff": true,
            "permission_rules": [],

            // Feature settings
            "debug": false,
        });
        if let Value::Object(map) = defaults {
            for (k, v) in map {
                values.insert(k, v);
            }
        }
        Self { values }
    }

    /// Load configuration with full precedence: defaults, then the global
    /// file, then the project file, then environment overrides.
    pub fn load() -> Self {
        let mut config = Self::defaults();
        config.merge_file(&Self::global_path());
        config.merge_file(&Self::project_path());
        config.merge_env();
        config
    }

    /// The global config file path (`~/.nanoforge/config.json`).
    pub fn global_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".nanoforge")
            .join("config.json")
    }

    /// The project config file path (`./.nanoforge.json`).
    pub fn project_path() -> PathBuf {
        PathBuf::from(".nanoforge.json")
    }

    /// Merge a JSON object file into the store. Missing or invalid files
    /// are ignored.
    fn merge_file(&mut self, path: &Path) {
        let Ok(content) = std::fs::read_to_string(path) else {
            return;
        };
        match serde_json::from_str::<Value>(&content) {
            Ok(Value::Object(map)) => {
                for (k, v) in map {
                    self.values.insert(k, v);
                }
            }
            Ok(_) => warn!(path = %path.display(), "Config file is not a JSON object, ignoring"),
            Err(e) => warn!(path = %path.display(), error = %e, "Invalid config file, ignoring"),
        }
    }

    /// Merge `NANOFORGE_*` environment variables, lowercasing the suffix.
    fn merge_env(&mut self) {
        for (key, value) in std::env::vars() {
            if let Some(suffix) = key.strip_prefix(ENV_PREFIX) {
                self.values
                    .insert(suffix.to_lowercase(), parse_env_value(&value));
            }
        }
    }

    /// Get a raw configuration value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Set an explicit override (highest precedence -- call after `load`).
    pub fn set(&mut self, key: &str, value: Value) {
        self.values.insert(key.to_string(), value);
    }

    /// Whether a key is present.
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    // ------------------------------------------------------------------
    // Typed accessors
    // ------------------------------------------------------------------

    fn get_str(&self, key: &str, default: &str) -> String {
        self.values
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or(default)
            .to_string()
    }

    fn get_usize(&self, key: &str, default: usize) -> usize {
        self.values
            .get(key)
            .and_then(Value::as_u64)
            .map(|v| v as usize)
            .unwrap_or(default)
    }

    fn get_f64(&self, key: &str, default: f64) -> f64 {
        self.values
            .get(key)
            .and_then(Value::as_f64)
            .unwrap_or(default)
    }

    fn get_bool(&self, key: &str, default: bool) -> bool {
        self.values
            .get(key)
            .and_then(Value::as_bool)
            .unwrap_or(default)
    }

    /// The model identifier sent to the provider.
    pub fn model(&self) -> String {
        self.get_str("model", "claude-sonnet-4-20250514")
    }

    /// Response token cap per LLM call.
    pub fn max_tokens(&self) -> u32 {
        self.get_usize("max_tokens", 16384) as u32
    }

    /// Turn budget per `run()` call.
    pub fn max_turns(&self) -> usize {
        self.get_usize("max_turns", 20)
    }

    /// Byte cap for tool output handed back to the model.
    pub fn max_output_length(&self) -> usize {
        self.get_usize("max_output_length", 10_000)
    }

    /// Context window budget in estimated tokens.
    pub fn context_limit(&self) -> usize {
        self.get_usize("context_limit", 100_000)
    }

    /// Fraction of the context limit that triggers compaction.
    pub fn compact_threshold(&self) -> f64 {
        self.get_f64("compact_threshold", 0.75)
    }

    /// How many recent messages compaction preserves verbatim.
    pub fn preserve_recent_messages(&self) -> usize {
        self.get_usize("preserve_recent_messages", 3)
    }

    /// Whether the loop compacts automatically between turns.
    pub fn enable_auto_compaction(&self) -> bool {
        self.get_bool("enable_auto_compaction", true)
    }

    /// Characters-per-token divisor for the token estimate heuristic.
    pub fn token_estimate_divisor(&self) -> usize {
        self.get_usize("token_estimate_divisor", 4).max(1)
    }

    /// Whether the permission gate is enabled.
    pub fn approval_enabled(&self) -> bool {
        self.get_bool("approval_enabled", true)
    }

    /// Whether approval prompts show diffs.
    pub fn show_diff(&self) -> bool {
        self.get_bool("show_diff", true)
    }

    /// Debug flag for verbose event logging.
    pub fn debug(&self) -> bool {
        self.get_bool("debug", false)
    }

    /// User-supplied permission rules from the `permission_rules` key.
    /// Invalid entries are skipped with a warning.
    pub fn permission_rules(&self) -> Vec<PermissionRule> {
        let Some(Value::Array(entries)) = self.values.get("permission_rules") else {
            return Vec::new();
        };
        entries
            .iter()
            .filter_map(|entry| match serde_json::from_value(entry.clone()) {
                Ok(rule) => Some(rule),
                Err(e) => {
                    warn!(error = %e, "Skipping invalid permission rule in config");
                    None
                }
            })
            .collect()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::defaults()
    }
}

/// Parse an environment variable into the closest JSON type:
/// bool, integer, float, then string.
fn parse_env_value(value: &str) -> Value {
    match value.to_lowercase().as_str() {
        "true" | "yes" | "1" => return Value::Bool(true),
        "false" | "no" | "0" => return Value::Bool(false),
        _ => {}
    }
    if let Ok(i) = value.parse::<i64>() {
        return json!(i);
    }
    if let Ok(f) = value.parse::<f64>() {
        return json!(f);
    }
    Value::String(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::defaults();
        assert_eq!(config.model(), "claude-sonnet-4-20250514");
        assert_eq!(config.max_turns(), 20);
        assert_eq!(config.context_limit(), 100_000);
        assert_eq!(config.compact_threshold(), 0.75);
        assert_eq!(config.preserve_recent_messages(), 3);
        assert_eq!(config.token_estimate_divisor(), 4);
        assert!(config.enable_auto_compaction());
        assert!(config.approval_enabled());
        assert!(config.show_diff());
        assert!(!config.debug());
        assert!(config.permission_rules().is_empty());
    }

    #[test]
    fn test_set_overrides() {
        let mut config = Config::defaults();
        config.set("max_turns", json!(5));
        config.set("model", json!("claude-haiku-4-5-20251001"));

        assert_eq!(config.max_turns(), 5);
        assert_eq!(config.model(), "claude-haiku-4-5-20251001");
    }

    #[test]
    fn test_get_and_contains() {
        let config = Config::defaults();
        assert!(config.contains("max_turns"));
        assert!(!config.contains("nonexistent"));
        assert_eq!(config.get("max_turns"), Some(&json!(20)));
    }

    #[test]
    fn test_wrong_type_falls_back_to_default() {
        let mut config = Config::defaults();
        config.set("max_turns", json!("not a number"));
        assert_eq!(config.max_turns(), 20);
    }

    #[test]
    fn test_divisor_never_zero() {
        let mut config = Config::defaults();
        config.set("token_estimate_divisor", json!(0));
        assert_eq!(config.token_estimate_divisor(), 1);
    }

    #[test]
    fn test_parse_env_value_types() {
        assert_eq!(parse_env_value("true"), json!(true));
        assert_eq!(parse_env_value("YES"), json!(true));
        assert_eq!(parse_env_value("false"), json!(false));
        assert_eq!(parse_env_value("0"), json!(false));
        assert_eq!(parse_env_value("42"), json!(42));
        assert_eq!(parse_env_value("0.5"), json!(0.5));
        assert_eq!(parse_env_value("hello"), json!("hello"));
    }

    #[test]
    fn test_merge_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"max_turns": 7, "debug": true}"#).unwrap();

        let mut config = Config::defaults();
        config.merge_file(&path);

        assert_eq!(config.max_turns(), 7);
        assert!(config.debug());
        // Untouched keys keep their defaults
        assert_eq!(config.context_limit(), 100_000);
    }

    #[test]
    fn test_merge_file_ignores_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "not json at all {").unwrap();

        let mut config = Config::defaults();
        config.merge_file(&path);
        assert_eq!(config.max_turns(), 20);
    }

    #[test]
    fn test_merge_file_missing_is_noop() {
        let mut config = Config::defaults();
        config.merge_file(Path::new("/definitely/not/here.json"));
        assert_eq!(config.max_turns(), 20);
    }

    #[test]
    fn test_env_override_beats_file() {
        // Env merge happens after file merge in load(); simulate the layers.
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"max_turns": 7}"#).unwrap();

        let mut config = Config::defaults();
        config.merge_file(&path);

        std::env::set_var("NANOFORGE_MAX_TURNS", "3");
        config.merge_env();
        std::env::remove_var("NANOFORGE_MAX_TURNS");

        assert_eq!(config.max_turns(), 3);
    }

    #[test]
    fn test_permission_rules_parsing() {
        let mut config = Config::defaults();
        config.set(
            "permission_rules",
            json!([
                {"tool_pattern": "bash", "command_pattern": "git *",
                 "verdict": "allow", "priority": 20},
                {"verdict": "not-a-verdict"},
            ]),
        );

        let rules = config.permission_rules();
        // The invalid entry is skipped
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].tool_pattern, "bash");
        assert_eq!(rules[0].priority, 20);
    }
}
