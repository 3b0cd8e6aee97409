//! Agent configuration

use anyhow::{Context, Result};
use process_agent_lib::config::CheckConfig;
use process_agent_lib::scrubber::DataScrubber;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Agent configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Host name reported in every message
    pub host_name: String,

    /// API server port for health/metrics
    pub api_port: u16,

    /// Process check interval in seconds
    pub process_interval_secs: u64,

    /// Real-time check interval in seconds
    pub realtime_interval_secs: u64,

    pub realtime_enabled: bool,

    /// Maximum records per message
    pub max_per_message: usize,

    /// Regexes matched against the space-joined command line
    pub blacklist: Vec<String>,

    /// Mask sensitive command line arguments
    pub scrub_args: bool,

    /// Extra sensitive words, on top of the built-in ones
    pub custom_sensitive_words: Vec<String>,

    /// Worker threads used to read process files
    pub concurrency: usize,

    pub proc_root: PathBuf,
    pub cgroup_root: PathBuf,
    pub passwd_path: PathBuf,

    /// Write each message to stdout as a JSON line
    pub emit_json: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            host_name: std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string()),
            api_port: 8080,
            process_interval_secs: 10,
            realtime_interval_secs: 2,
            realtime_enabled: true,
            max_per_message: 100,
            blacklist: Vec::new(),
            scrub_args: true,
            custom_sensitive_words: Vec::new(),
            concurrency: 4,
            proc_root: PathBuf::from("/proc"),
            cgroup_root: PathBuf::from("/sys/fs/cgroup"),
            passwd_path: PathBuf::from("/etc/passwd"),
            emit_json: true,
        }
    }
}

impl AgentConfig {
    /// Load configuration from an optional config file, then `AGENT_*`
    /// environment variables
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix("AGENT")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("blacklist")
                    .with_list_parse_key("custom_sensitive_words"),
            )
            .build()
            .context("Failed to load configuration")?;

        config
            .try_deserialize()
            .context("Invalid agent configuration")
    }

    pub fn process_interval(&self) -> Duration {
        Duration::from_secs(self.process_interval_secs.max(1))
    }

    pub fn realtime_interval(&self) -> Duration {
        Duration::from_secs(self.realtime_interval_secs.max(1))
    }

    /// Build the configuration shared by both checks
    pub fn check_config(&self) -> Result<CheckConfig> {
        let scrubber = DataScrubber::builder()
            .enabled(self.scrub_args)
            .custom_sensitive_words(&self.custom_sensitive_words)
            .build();

        CheckConfig::builder(&self.host_name)
            .max_per_message(self.max_per_message)
            .blacklist(&self.blacklist)
            .scrubber(Arc::new(scrubber))
            .concurrency(self.concurrency)
            .build()
            .context("Invalid check configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(contents: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let config = AgentConfig::default();
        assert_eq!(config.api_port, 8080);
        assert_eq!(config.process_interval(), Duration::from_secs(10));
        assert_eq!(config.realtime_interval(), Duration::from_secs(2));
        assert_eq!(config.max_per_message, 100);
        assert_eq!(config.concurrency, 4);
        assert!(config.scrub_args);
        assert_eq!(config.proc_root, PathBuf::from("/proc"));
    }

    #[test]
    fn test_load_from_file() {
        let file = write_config(
            r#"
host_name = "db-1"
max_per_message = 25
blacklist = ["^/usr/sbin/cron", "sleep"]
custom_sensitive_words = ["token"]
realtime_enabled = false
"#,
        );

        let config = AgentConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.host_name, "db-1");
        assert_eq!(config.max_per_message, 25);
        assert_eq!(config.blacklist.len(), 2);
        assert!(!config.realtime_enabled);
        // Unset keys keep their defaults
        assert_eq!(config.api_port, 8080);
    }

    #[test]
    fn test_check_config_conversion() {
        let config = AgentConfig {
            host_name: "db-1".to_string(),
            blacklist: vec!["^sleep".to_string(), "[broken".to_string()],
            custom_sensitive_words: vec!["token".to_string()],
            ..AgentConfig::default()
        };

        let check = config.check_config().unwrap();
        assert_eq!(check.host_name, "db-1");
        assert_eq!(check.blacklist.len(), 1);
        assert!(check.is_blacklisted(&["sleep".to_string(), "5".to_string()]));

        let args = vec!["app".to_string(), "--token=abc".to_string()];
        assert_eq!(check.scrubber.scrub_cmdline(&args), vec!["app", "--token=********"]);
    }

    #[test]
    fn test_check_config_rejects_zero_capacity() {
        let config = AgentConfig {
            max_per_message: 0,
            ..AgentConfig::default()
        };
        assert!(config.check_config().is_err());
    }
}
