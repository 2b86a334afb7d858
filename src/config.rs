//! Run configuration.
//!
//! Defaults match a lab IOS XR box: NETCONF on 830, the management
//! terminal on telnet 23. A JSON file can override any field and command
//! line flags override the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::VerifyError;
use crate::session::SecurityLevel;
use crate::validate::{DEFAULT_NOISE_NAMESPACES, VOLATILE_LINE_INDEX, Validator};

pub const DEFAULT_NETCONF_PORT: u16 = 830;
pub const DEFAULT_CLI_PORT: u16 = 23;
pub const DEFAULT_REQUEST_FILE: &str = "edit_config.txt";
pub const DEFAULT_LOG_FILE: &str = "logs.txt";

/// Settings for one verification run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct VerifierConfig {
    pub host: String,
    pub netconf_port: u16,
    pub cli_port: u16,
    pub username: String,
    pub password: String,

    /// Built-in CLI template name.
    pub template: String,
    /// JSON template file; takes precedence over `template`.
    pub template_file: Option<PathBuf>,

    /// SSH algorithm profile for the NETCONF session.
    pub security: SecurityLevel,

    /// Seconds allowed for opening a session.
    pub connect_timeout_secs: u64,
    /// Seconds allowed for one command or RPC reply.
    pub command_timeout_secs: u64,

    /// Where the transmitted edit request is recorded.
    pub request_file: PathBuf,
    /// Where the human-readable run log is written.
    pub log_file: PathBuf,

    /// Namespaces excluded from the exercised-model list.
    pub noise_namespaces: Vec<String>,
    /// Snapshot line dropped before the equivalence check.
    pub volatile_line_index: usize,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            netconf_port: DEFAULT_NETCONF_PORT,
            cli_port: DEFAULT_CLI_PORT,
            username: String::new(),
            password: String::new(),
            template: "iosxr".to_string(),
            template_file: None,
            security: SecurityLevel::Balanced,
            connect_timeout_secs: 30,
            command_timeout_secs: 60,
            request_file: PathBuf::from(DEFAULT_REQUEST_FILE),
            log_file: PathBuf::from(DEFAULT_LOG_FILE),
            noise_namespaces: DEFAULT_NOISE_NAMESPACES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            volatile_line_index: VOLATILE_LINE_INDEX,
        }
    }
}

impl VerifierConfig {
    /// Reads a configuration file; missing fields keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, VerifyError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|e| {
            VerifyError::InvalidConfig(format!("config file {}: {e}", path.display()))
        })
    }

    /// Checks the fields a run cannot start without.
    pub fn validate(&self) -> Result<(), VerifyError> {
        if self.host.trim().is_empty() {
            return Err(VerifyError::InvalidConfig("host is required".to_string()));
        }
        if self.username.is_empty() {
            return Err(VerifyError::InvalidConfig("username is required".to_string()));
        }
        if self.netconf_port == 0 || self.cli_port == 0 {
            return Err(VerifyError::InvalidConfig("ports must be non-zero".to_string()));
        }
        if self.connect_timeout_secs == 0 || self.command_timeout_secs == 0 {
            return Err(VerifyError::InvalidConfig(
                "timeouts must be at least one second".to_string(),
            ));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn validator(&self) -> Validator {
        Validator::new(self.volatile_line_index, self.noise_namespaces.clone())
    }
}
