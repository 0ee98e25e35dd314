//! Typed configuration from environment variables or a TOML file.
//!
//! Every key has a default, so an empty environment yields a working
//! configuration. Malformed values fail fast.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default marker set on script elements once the scanner has handled them.
pub const DEFAULT_PROCESSED_ATTRIBUTE: &str = "data-lifecycle-processed";
/// Default opt-out marker for one-time scripts.
pub const DEFAULT_SKIP_ATTRIBUTE: &str = "data-lifecycle-skip";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Explicit diagnostics switch. `None` means auto-detect from the host.
    pub debug: Option<bool>,
    /// Host suffixes that enable diagnostics automatically.
    pub staging_hosts: Vec<String>,
    pub processed_attribute: String,
    pub skip_attribute: String,
    /// `type` attribute values treated as executable. A missing `type` always is.
    pub script_types: Vec<String>,
    /// Per-action time limit. `None` waits forever.
    pub action_timeout_ms: Option<u64>,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            debug: None,
            staging_hosts: vec!["webflow.io".to_string()],
            processed_attribute: DEFAULT_PROCESSED_ATTRIBUTE.to_string(),
            skip_attribute: DEFAULT_SKIP_ATTRIBUTE.to_string(),
            script_types: vec![
                "text/javascript".to_string(),
                "application/javascript".to_string(),
                "module".to_string(),
            ],
            action_timeout_ms: None,
            log_level: "info".to_string(),
        }
    }
}

/// Top-level TOML wrapper.
#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    lifecycle: Config,
}

impl Config {
    /// Load a `.env` file from the working directory if one exists, then
    /// read the environment. Variables already set are not overridden.
    pub fn from_dotenv() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_env()
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(debug) = optional_var("LIFECYCLE_DEBUG") {
            config.debug = Some(parse_bool("LIFECYCLE_DEBUG", &debug)?);
        }
        if let Some(hosts) = optional_var("LIFECYCLE_STAGING_HOSTS") {
            config.staging_hosts = split_list(&hosts);
        }
        if let Some(attr) = optional_var("LIFECYCLE_PROCESSED_ATTR") {
            config.processed_attribute = attr;
        }
        if let Some(attr) = optional_var("LIFECYCLE_SKIP_ATTR") {
            config.skip_attribute = attr;
        }
        if let Some(ms) = optional_var("LIFECYCLE_ACTION_TIMEOUT_MS") {
            let ms = ms.parse::<u64>().map_err(|e| {
                Error::Config(format!("LIFECYCLE_ACTION_TIMEOUT_MS={ms:?} is not a number: {e}"))
            })?;
            config.action_timeout_ms = Some(ms);
        }
        if let Some(level) = optional_var("LOG_LEVEL") {
            config.log_level = level;
        }

        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document with an optional `[lifecycle]` table.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: ConfigFile =
            toml::from_str(content).map_err(|e| Error::Config(format!("bad config: {e}")))?;
        file.lifecycle.validate()?;
        Ok(file.lifecycle)
    }

    /// Read and parse a TOML config file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn action_timeout(&self) -> Option<Duration> {
        self.action_timeout_ms.map(Duration::from_millis)
    }

    /// Whether diagnostics should print for a page served from `host`.
    /// The explicit `debug` setting always wins.
    pub fn diagnostics_enabled_for(&self, host: &str) -> bool {
        self.debug.unwrap_or_else(|| self.is_staging_host(host))
    }

    /// Host matches a staging suffix exactly or as a subdomain. Port and
    /// case are ignored.
    pub fn is_staging_host(&self, host: &str) -> bool {
        let host = host.split(':').next().unwrap_or_default().to_ascii_lowercase();
        if host.is_empty() {
            return false;
        }
        self.staging_hosts.iter().any(|suffix| {
            let suffix = suffix.trim_start_matches('.').to_ascii_lowercase();
            !suffix.is_empty() && (host == suffix || host.ends_with(&format!(".{suffix}")))
        })
    }

    /// Whether a script `type` attribute value marks executable content.
    pub fn is_script_type(&self, ty: Option<&str>) -> bool {
        match ty.map(str::trim) {
            None | Some("") => true,
            Some(ty) => self.script_types.iter().any(|t| t.eq_ignore_ascii_case(ty)),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.processed_attribute.trim().is_empty() {
            return Err(Error::Config("processed_attribute must not be empty".into()));
        }
        if self.skip_attribute.trim().is_empty() {
            return Err(Error::Config("skip_attribute must not be empty".into()));
        }
        if self.processed_attribute == self.skip_attribute {
            return Err(Error::Config(
                "processed_attribute and skip_attribute must differ".into(),
            ));
        }
        Ok(())
    }
}

fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(Error::Config(format!("{name}={other:?} is not a boolean"))),
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
