//! cgroup-based container discovery
//!
//! Walks the runtime hierarchies of either cgroup version looking for
//! container scopes, then reads member pids and resource limits:
//! - v2: cgroup.procs, cpu.max, memory.max
//! - v1: cgroup.procs and memory.limit_in_bytes under the memory
//!   controller, cpu.cfs_quota_us / cpu.cfs_period_us under cpu

use super::{CollectError, ContainerSource};
use crate::models::Container;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Parent cgroups under which container runtimes create their scopes
const RUNTIME_HIERARCHIES: &[&str] = &["kubepods.slice", "kubepods", "system.slice", "docker"];

/// v1 reports "no limit" as a huge page-aligned value
const V1_UNLIMITED_MEMORY: u64 = 1 << 62;

/// Cgroup version detected on the system
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CgroupVersion {
    V1,
    V2,
    Unknown,
}

/// Detect which cgroup version is mounted at `cgroup_root`
pub fn detect_cgroup_version(cgroup_root: &Path) -> CgroupVersion {
    if cgroup_root.join("cgroup.controllers").exists() {
        return CgroupVersion::V2;
    }

    if cgroup_root.join("memory").is_dir() && cgroup_root.join("cpu").is_dir() {
        return CgroupVersion::V1;
    }

    CgroupVersion::Unknown
}

fn is_container_hash(s: &str) -> bool {
    s.len() == 64 && s.chars().all(|c| c.is_ascii_hexdigit())
}

/// Extract the container id from a cgroup directory name.
///
/// Handles:
/// - systemd driver: `docker-<id>.scope`, `crio-<id>.scope`,
///   `cri-containerd-<id>.scope`
/// - cgroupfs driver: bare 64 character hex id
pub fn extract_container_id(name: &str) -> Option<String> {
    if is_container_hash(name) {
        return Some(name.to_string());
    }

    let stem = name.strip_suffix(".scope").unwrap_or(name);
    ["cri-containerd-", "docker-", "crio-"]
        .iter()
        .find_map(|prefix| stem.strip_prefix(prefix))
        .filter(|id| is_container_hash(id))
        .map(str::to_string)
}

/// Runtime label for a container cgroup, from its name and location
fn runtime_label(name: &str, path: &Path) -> &'static str {
    if name.starts_with("crio-") {
        "cri-o"
    } else if name.starts_with("cri-containerd-") {
        "containerd"
    } else if name.starts_with("docker-") || path.components().any(|c| c.as_os_str() == "docker")
    {
        "docker"
    } else {
        "containerd"
    }
}

/// Container source that scans the cgroup filesystem
#[derive(Debug, Clone)]
pub struct CgroupContainerSource {
    cgroup_root: PathBuf,
}

impl CgroupContainerSource {
    pub fn new(cgroup_root: impl Into<PathBuf>) -> Self {
        Self {
            cgroup_root: cgroup_root.into(),
        }
    }

    /// Root of the hierarchy that holds `cgroup.procs` for containers
    fn membership_root(&self, version: CgroupVersion) -> PathBuf {
        match version {
            CgroupVersion::V1 => self.cgroup_root.join("memory"),
            _ => self.cgroup_root.clone(),
        }
    }

    /// Recursively collect container cgroup directories below `path`
    fn scan_dir(path: &Path, found: &mut Vec<(String, PathBuf)>) {
        let Ok(entries) = fs::read_dir(path) else {
            return;
        };

        for entry in entries.filter_map(|e| e.ok()) {
            let entry_path = entry.path();
            if !entry_path.is_dir() {
                continue;
            }

            let name = entry.file_name().to_string_lossy().into_owned();
            match extract_container_id(&name) {
                Some(id) => found.push((id, entry_path)),
                None => Self::scan_dir(&entry_path, found),
            }
        }
    }

    fn build_container(
        &self,
        version: CgroupVersion,
        id: String,
        path: &Path,
        membership_root: &Path,
    ) -> Container {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let pids = fs::read_to_string(path.join("cgroup.procs"))
            .map(|content| parse_cgroup_procs(&content))
            .unwrap_or_default();

        let (cpu_limit, memory_limit) = match version {
            CgroupVersion::V1 => {
                let cpu_dir = path
                    .strip_prefix(membership_root)
                    .map(|relative| self.cgroup_root.join("cpu").join(relative))
                    .unwrap_or_else(|_| path.to_path_buf());
                let quota = read_trimmed(&cpu_dir.join("cpu.cfs_quota_us"));
                let period = read_trimmed(&cpu_dir.join("cpu.cfs_period_us"));
                let cpu = match (quota, period) {
                    (Some(q), Some(p)) => parse_cfs_quota(&q, &p),
                    _ => 0.0,
                };
                let memory = read_trimmed(&path.join("memory.limit_in_bytes"))
                    .map(|v| parse_v1_memory_limit(&v))
                    .unwrap_or(0);
                (cpu, memory)
            }
            _ => {
                let cpu = read_trimmed(&path.join("cpu.max"))
                    .map(|v| parse_cpu_max(&v))
                    .unwrap_or(0.0);
                let memory = read_trimmed(&path.join("memory.max"))
                    .map(|v| parse_memory_max(&v))
                    .unwrap_or(0);
                (cpu, memory)
            }
        };

        Container {
            runtime: runtime_label(&name, path).to_string(),
            name: id.chars().take(12).collect(),
            id,
            image: String::new(),
            cpu_limit,
            memory_limit,
            pids,
        }
    }
}

impl ContainerSource for CgroupContainerSource {
    fn list(&self) -> Result<Vec<Container>, CollectError> {
        let version = detect_cgroup_version(&self.cgroup_root);
        if version == CgroupVersion::Unknown {
            return Err(CollectError::Unavailable(format!(
                "no cgroup hierarchy at {}",
                self.cgroup_root.display()
            )));
        }

        let membership_root = self.membership_root(version);
        let mut found = Vec::new();
        for hierarchy in RUNTIME_HIERARCHIES {
            let path = membership_root.join(hierarchy);
            if path.is_dir() {
                Self::scan_dir(&path, &mut found);
            }
        }

        if found.is_empty() {
            return Err(CollectError::Unavailable(
                "no container cgroups found".to_string(),
            ));
        }

        found.sort_by(|a, b| a.0.cmp(&b.0));
        found.dedup_by(|a, b| a.0 == b.0);

        let containers: Vec<Container> = found
            .into_iter()
            .map(|(id, path)| self.build_container(version, id, &path, &membership_root))
            .collect();

        debug!(
            version = ?version,
            containers = containers.len(),
            "Listed containers from cgroups"
        );

        Ok(containers)
    }
}

fn read_trimmed(path: &Path) -> Option<String> {
    fs::read_to_string(path).ok().map(|s| s.trim().to_string())
}

pub(crate) fn parse_cgroup_procs(content: &str) -> Vec<i32> {
    content
        .lines()
        .filter_map(|line| line.trim().parse().ok())
        .collect()
}

/// `cpu.max`: "<quota> <period>" or "max <period>"
pub(crate) fn parse_cpu_max(content: &str) -> f64 {
    let mut parts = content.split_whitespace();
    let quota = parts.next().and_then(|q| q.parse::<f64>().ok());
    let period = parts.next().and_then(|p| p.parse::<f64>().ok());
    match (quota, period) {
        (Some(q), Some(p)) if p > 0.0 => q / p,
        _ => 0.0,
    }
}

/// `memory.max`: bytes or "max"
pub(crate) fn parse_memory_max(content: &str) -> u64 {
    content.trim().parse().unwrap_or(0)
}

/// `cpu.cfs_quota_us` is -1 when unlimited
pub(crate) fn parse_cfs_quota(quota: &str, period: &str) -> f64 {
    match (quota.parse::<i64>(), period.parse::<i64>()) {
        (Ok(q), Ok(p)) if q > 0 && p > 0 => q as f64 / p as f64,
        _ => 0.0,
    }
}

pub(crate) fn parse_v1_memory_limit(content: &str) -> u64 {
    match content.trim().parse::<u64>() {
        Ok(v) if v < V1_UNLIMITED_MEMORY => v,
        _ => 0,
    }
}
