//! Configuration shared by the process and real-time checks

use crate::scrubber::DataScrubber;
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Default number of processes per message
pub const DEFAULT_MAX_PER_MESSAGE: usize = 100;

/// Default number of workers the snapshot provider may use
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Default length of the intra-sample CPU window
pub const DEFAULT_CPU_SAMPLE_WINDOW: Duration = Duration::from_secs(1);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("max_per_message must be greater than zero")]
    InvalidCapacity,

    #[error("concurrency must be greater than zero")]
    InvalidConcurrency,
}

/// Values the checks need for one cycle
#[derive(Debug, Clone)]
pub struct CheckConfig {
    /// Host name placed in every message envelope
    pub host_name: String,
    /// Maximum number of records per message
    pub max_per_message: usize,
    /// Processes whose joined command line matches any of these are dropped
    pub blacklist: Vec<Regex>,
    /// Shared, read-only command-line scrubber
    pub scrubber: Arc<DataScrubber>,
    /// Worker hint for the snapshot provider
    pub concurrency: usize,
    /// Time between the two CPU readings of one snapshot
    pub cpu_sample_window: Duration,
}

impl CheckConfig {
    pub fn builder(host_name: impl Into<String>) -> CheckConfigBuilder {
        CheckConfigBuilder::new(host_name)
    }

    pub fn is_blacklisted(&self, cmdline: &[String]) -> bool {
        is_blacklisted(cmdline, &self.blacklist)
    }
}

/// Returns true if the space-joined command line matches any pattern
pub fn is_blacklisted(cmdline: &[String], blacklist: &[Regex]) -> bool {
    if blacklist.is_empty() {
        return false;
    }
    let joined = cmdline.join(" ");
    blacklist.iter().any(|pattern| pattern.is_match(&joined))
}

/// Compile blacklist patterns, skipping (and logging) the invalid ones
pub fn compile_blacklist<I, S>(patterns: I) -> Vec<Regex>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    patterns
        .into_iter()
        .filter_map(|p| match Regex::new(p.as_ref()) {
            Ok(regex) => Some(regex),
            Err(e) => {
                warn!(pattern = %p.as_ref(), error = %e, "Skipping invalid blacklist pattern");
                None
            }
        })
        .collect()
}

/// Builder for [`CheckConfig`]
pub struct CheckConfigBuilder {
    host_name: String,
    max_per_message: usize,
    blacklist: Vec<Regex>,
    scrubber: Option<Arc<DataScrubber>>,
    concurrency: usize,
    cpu_sample_window: Duration,
}

impl CheckConfigBuilder {
    pub fn new(host_name: impl Into<String>) -> Self {
        Self {
            host_name: host_name.into(),
            max_per_message: DEFAULT_MAX_PER_MESSAGE,
            blacklist: Vec::new(),
            scrubber: None,
            concurrency: DEFAULT_CONCURRENCY,
            cpu_sample_window: DEFAULT_CPU_SAMPLE_WINDOW,
        }
    }

    /// Set the per-message record capacity
    pub fn max_per_message(mut self, max: usize) -> Self {
        self.max_per_message = max;
        self
    }

    /// Set the blacklist from raw patterns; invalid ones are dropped
    pub fn blacklist<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.blacklist = compile_blacklist(patterns);
        self
    }

    /// Set the shared scrubber
    pub fn scrubber(mut self, scrubber: Arc<DataScrubber>) -> Self {
        self.scrubber = Some(scrubber);
        self
    }

    /// Set the snapshot provider worker hint
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Set the intra-sample CPU window
    pub fn cpu_sample_window(mut self, window: Duration) -> Self {
        self.cpu_sample_window = window;
        self
    }

    pub fn build(self) -> Result<CheckConfig, ConfigError> {
        if self.max_per_message == 0 {
            return Err(ConfigError::InvalidCapacity);
        }
        if self.concurrency == 0 {
            return Err(ConfigError::InvalidConcurrency);
        }

        Ok(CheckConfig {
            host_name: self.host_name,
            max_per_message: self.max_per_message,
            blacklist: self.blacklist,
            scrubber: self.scrubber.unwrap_or_default(),
            concurrency: self.concurrency,
            cpu_sample_window: self.cpu_sample_window,
        })
    }
}
