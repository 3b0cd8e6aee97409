//! Process and container sources
//!
//! The checks only see the [`SnapshotProvider`] and [`ContainerSource`]
//! traits. This module also ships the Linux implementations: a `/proc`
//! reader and a cgroup scanner that supports both cgroup v2 (unified
//! hierarchy) and cgroup v1 (legacy hierarchy) with automatic detection.

mod cgroup;
mod procfs;


pub use cgroup::{detect_cgroup_version, extract_container_id, CgroupContainerSource, CgroupVersion};
pub use procfs::{parse_passwd, ProcfsProvider};

use crate::models::{Container, ProcessSnapshot, SystemCpuTimes, SystemInfo};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors reported by snapshot providers and container sources
#[derive(Debug, Error)]
pub enum CollectError {
    /// The facility does not exist on this host (e.g. no container runtime)
    #[error("not available: {0}")]
    Unavailable(String),

    #[error("collection failed: {0}")]
    Failed(String),

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CollectError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, CollectError::Unavailable(_))
    }
}

/// Point-in-time process sampling
pub trait SnapshotProvider: Send + Sync {
    /// Snapshot every process. CPU times are read twice, `interval` apart,
    /// and `concurrency` bounds how many workers read process files.
    fn sample(
        &self,
        interval: Duration,
        concurrency: usize,
    ) -> Result<HashMap<i32, ProcessSnapshot>, CollectError>;

    /// Host-wide cumulative CPU times
    fn cpu_times(&self) -> Result<SystemCpuTimes, CollectError>;

    /// Static host metadata
    fn system_info(&self) -> Result<SystemInfo, CollectError>;
}

/// Enumeration of live containers and their member processes
pub trait ContainerSource: Send + Sync {
    fn list(&self) -> Result<Vec<Container>, CollectError>;
}

/// Source used when container correlation is turned off
#[derive(Debug, Default, Clone, Copy)]
pub struct NoContainers;

impl ContainerSource for NoContainers {
    fn list(&self) -> Result<Vec<Container>, CollectError> {
        Err(CollectError::Unavailable(
            "container correlation disabled".to_string(),
        ))
    }
}
