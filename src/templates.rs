//! Vendor CLI profiles.
//!
//! A [`CliTemplate`] holds everything the command-line session needs to
//! know about one device family: its prompts, its in-band error markers,
//! and the exact commands for entering config mode, committing, rolling
//! back and dumping the running configuration.

use std::path::Path;

use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::device::PromptMatcher;
use crate::error::VerifyError;

/// Built-in template names supported by this crate.
pub const BUILTIN_TEMPLATES: &[&str] = &["iosxr"];

/// Placeholder substituted by [`format_cmd`].
const PLACEHOLDER: &str = "{}";

/// Capability tags used to describe template compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TemplateCapability {
    /// Username/password login on the terminal itself.
    TerminalLogin,
    /// Two-stage configuration with an explicit commit.
    CommitModel,
    /// Rollback of the last N commits.
    CommitRollback,
    InteractiveInput,
}

/// Metadata for a built-in template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TemplateMetadata {
    pub name: String,
    pub vendor: String,
    pub family: String,
    pub template_version: String,
    pub capabilities: Vec<TemplateCapability>,
}

fn metadata_for(name: &str) -> Option<TemplateMetadata> {
    let meta = match name {
        "iosxr" => TemplateMetadata {
            name: "iosxr".to_string(),
            vendor: "Cisco".to_string(),
            family: "IOS XR".to_string(),
            template_version: "1.0.0".to_string(),
            capabilities: vec![
                TemplateCapability::TerminalLogin,
                TemplateCapability::CommitModel,
                TemplateCapability::CommitRollback,
                TemplateCapability::InteractiveInput,
            ],
        },
        _ => return None,
    };
    Some(meta)
}

/// Returns names of all built-in templates.
pub fn available_templates() -> &'static [&'static str] {
    BUILTIN_TEMPLATES
}

/// Returns metadata for all built-in templates.
pub fn template_catalog() -> Vec<TemplateMetadata> {
    BUILTIN_TEMPLATES
        .iter()
        .filter_map(|name| metadata_for(name))
        .collect()
}

/// Returns metadata for one template by name (case-insensitive).
pub fn template_metadata(name: &str) -> Result<TemplateMetadata, VerifyError> {
    let key = name.to_ascii_lowercase();
    metadata_for(&key).ok_or_else(|| VerifyError::TemplateNotFound(name.to_string()))
}

/// Command-line profile for one device family.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CliTemplate {
    pub name: String,

    /// Exec-mode prompt patterns.
    pub exec_prompts: Vec<String>,
    /// Configuration-mode prompt patterns, including sub-modes.
    pub config_prompts: Vec<String>,

    pub username_prompts: Vec<String>,
    pub password_prompts: Vec<String>,

    /// Yes/no questions the device may ask, e.g. on leaving config mode
    /// with uncommitted changes.
    #[serde(default)]
    pub confirm_prompts: Vec<String>,
    #[serde(default = "default_confirm_answer")]
    pub confirm_answer: String,

    #[serde(default)]
    pub more_patterns: Vec<String>,
    /// In-band error markers; a matching line fails the command.
    pub error_patterns: Vec<String>,
    #[serde(default)]
    pub ignore_errors: Vec<String>,

    /// Commands sent once after login, in exec mode.
    #[serde(default)]
    pub terminal_setup: Vec<String>,

    pub enter_config: String,
    pub commit: String,
    pub end: String,
    /// Leaves config mode dropping the uncommitted buffer.
    pub discard: String,
    /// Rollback command; `{}` is replaced with the number of commits.
    pub rollback: String,

    pub show_config: String,
    /// Line marking the start of the show-config output.
    pub show_config_begin: String,
    /// Line marking the end of the show-config output.
    pub show_config_end: String,

    /// Commit output meaning nothing was committed.
    pub no_changes: String,
}

fn default_confirm_answer() -> String {
    "no".to_string()
}

impl CliTemplate {
    /// Loads a template from a JSON file and validates its patterns.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, VerifyError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let template: CliTemplate = serde_json::from_str(&text).map_err(|e| {
            VerifyError::InvalidConfig(format!("template file {}: {e}", path.display()))
        })?;
        template.validate()?;
        Ok(template)
    }

    /// Checks that every pattern compiles and the rollback command has a
    /// commit-count placeholder.
    pub fn validate(&self) -> Result<(), VerifyError> {
        if !self.rollback.contains(PLACEHOLDER) {
            return Err(VerifyError::InvalidPromptConfig(format!(
                "rollback command '{}' has no '{PLACEHOLDER}' placeholder",
                self.rollback
            )));
        }
        self.no_changes_regex()?;
        PromptMatcher::from_template(self, Default::default())?;
        Ok(())
    }

    pub fn rollback_command(&self, commits: usize) -> String {
        format_cmd(&self.rollback, &commits.to_string())
    }

    /// Compiles the pattern for commit output that says nothing was
    /// committed.
    pub fn no_changes_regex(&self) -> Result<Regex, VerifyError> {
        Regex::new(&self.no_changes).map_err(|e| {
            VerifyError::InvalidPromptConfig(format!("invalid no_changes pattern: {e}"))
        })
    }

    /// True if a configuration line is itself a commit.
    pub fn is_commit_line(&self, line: &str) -> bool {
        line.split_whitespace()
            .next()
            .map(|word| word == self.commit)
            .unwrap_or(false)
    }
}

/// Replaces the first `{}` in `template` with `arg`.
pub fn format_cmd(template: &str, arg: &str) -> String {
    template.replacen(PLACEHOLDER, arg, 1)
}

/// Creates a built-in template by name (case-insensitive).
pub fn by_name(name: &str) -> Result<CliTemplate, VerifyError> {
    match name.to_ascii_lowercase().as_str() {
        "iosxr" => Ok(iosxr()),
        _ => Err(VerifyError::TemplateNotFound(name.to_string())),
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Cisco IOS XR over the management terminal.
pub fn iosxr() -> CliTemplate {
    CliTemplate {
        name: "iosxr".to_string(),
        exec_prompts: strings(&[r"^[^\s()#]+#\s*$"]),
        config_prompts: strings(&[r"^[^\s()#]+\([^)]*\)#\s*$"]),
        username_prompts: strings(&[r"^\s*Username:\s*$"]),
        password_prompts: strings(&[r"^\s*Password:\s*$"]),
        confirm_prompts: strings(&[r"\(yes/no(/cancel)?\)\?\s*(\[\w+\])?:?\s*$"]),
        confirm_answer: default_confirm_answer(),
        more_patterns: strings(&[r"--More--"]),
        error_patterns: strings(&[r"^\s*%", r"Invalid input detected"]),
        ignore_errors: strings(&[r"^\s*%\s*No configuration changes to commit"]),
        terminal_setup: strings(&["terminal length 0"]),
        enter_config: "configure".to_string(),
        commit: "commit".to_string(),
        end: "end".to_string(),
        discard: "abort".to_string(),
        rollback: "rollback configuration last {}".to_string(),
        show_config: "show running-config".to_string(),
        show_config_begin: "Building configuration...".to_string(),
        show_config_end: "end".to_string(),
        no_changes: r"No configuration changes to commit".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn builtin_templates_are_valid() {
        for name in available_templates() {
            let template = by_name(name).expect("builtin template");
            template.validate().expect("valid template");
        }
    }

    #[test]
    fn template_lookup_is_case_insensitive() {
        assert_eq!(by_name("IOSXR").expect("template").name, "iosxr");
        assert_eq!(template_metadata("IosXr").expect("metadata").vendor, "Cisco");
    }

    #[test]
    fn unknown_template_is_reported() {
        assert!(matches!(by_name("nxos"), Err(VerifyError::TemplateNotFound(_))));
        assert!(matches!(
            template_metadata("nxos"),
            Err(VerifyError::TemplateNotFound(_))
        ));
    }

    #[test]
    fn catalog_lists_every_builtin() {
        let catalog = template_catalog();
        assert_eq!(catalog.len(), BUILTIN_TEMPLATES.len());
        assert!(
            catalog[0]
                .capabilities
                .contains(&TemplateCapability::CommitRollback)
        );
    }

    #[test]
    fn rollback_command_substitutes_commit_count() {
        assert_eq!(iosxr().rollback_command(2), "rollback configuration last 2");
        assert_eq!(format_cmd("show {}", "clock"), "show clock");
    }

    #[test]
    fn commit_line_detection_uses_first_word() {
        let template = iosxr();
        assert!(template.is_commit_line("commit"));
        assert!(template.is_commit_line("  commit comment initial"));
        assert!(!template.is_commit_line("description commit-me"));
        assert!(!template.is_commit_line(""));
    }

    #[test]
    fn no_changes_output_is_recognised() {
        let no_changes = iosxr().no_changes_regex().expect("pattern");
        assert!(no_changes.is_match("% No configuration changes to commit."));
        assert!(!no_changes.is_match(""));
    }

    #[test]
    fn rollback_without_placeholder_is_rejected() {
        let mut template = iosxr();
        template.rollback = "rollback configuration last 1".to_string();
        assert!(matches!(
            template.validate(),
            Err(VerifyError::InvalidPromptConfig(_))
        ));
    }

    #[test]
    fn template_loads_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        let json = serde_json::to_string(&iosxr()).expect("encode template");
        file.write_all(json.as_bytes()).expect("write template");

        let loaded = CliTemplate::from_json_file(file.path()).expect("load template");
        assert_eq!(loaded, iosxr());
    }

    #[test]
    fn malformed_template_file_is_a_config_error() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(b"{\"name\": 1}").expect("write template");
        assert!(matches!(
            CliTemplate::from_json_file(file.path()),
            Err(VerifyError::InvalidConfig(_))
        ));
    }
}
