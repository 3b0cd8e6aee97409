//! Core data models for the process agent

use serde::{Deserialize, Serialize};

/// Point-in-time record of one process, as returned by a snapshot provider
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessSnapshot {
    pub pid: i32,
    pub cmdline: Vec<String>,
    pub cwd: String,
    pub exe: String,
    pub ppid: i32,
    pub pgrp: i32,
    pub uids: Vec<u32>,
    pub gids: Vec<u32>,
    /// Login name for the first uid, when the provider could resolve it
    pub username: Option<String>,
    /// Creation time in milliseconds since the Unix epoch
    pub create_time: i64,
    pub memory: MemoryInfo,
    /// Extended memory breakdown (not available on every platform)
    pub memory_ex: Option<MemoryInfoEx>,
    /// CPU times at the start of the intra-sample window
    pub cpu_time_1: CpuTimes,
    /// CPU times at the end of the intra-sample window
    pub cpu_time_2: CpuTimes,
    pub num_threads: i32,
    pub nice: i32,
    pub open_fd_count: i32,
    /// Cumulative I/O counters, `None` when the platform does not expose them
    pub io: Option<IoCounters>,
    pub voluntary_ctx_switches: u64,
    pub involuntary_ctx_switches: u64,
    /// Lifecycle status code (e.g. "R", "S", "Z")
    pub status: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryInfo {
    pub rss: u64,
    pub vms: u64,
    pub swap: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryInfoEx {
    pub shared: u64,
    pub text: u64,
    pub lib: u64,
    pub data: u64,
    pub dirty: u64,
}

/// Cumulative CPU time of a process, in seconds
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CpuTimes {
    /// CPU label the reading refers to
    pub cpu: String,
    pub user: f64,
    pub system: f64,
    /// Wall-clock time of the reading in milliseconds since the Unix epoch
    pub timestamp_ms: i64,
}

impl CpuTimes {
    pub fn total(&self) -> f64 {
        self.user + self.system
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct IoCounters {
    pub read_count: u64,
    pub write_count: u64,
    pub read_bytes: u64,
    pub write_bytes: u64,
}

/// Host-wide cumulative CPU time in seconds, used as the differencing baseline
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemCpuTimes {
    pub user: f64,
    pub nice: f64,
    pub system: f64,
    pub idle: f64,
    pub iowait: f64,
    pub irq: f64,
    pub softirq: f64,
    pub steal: f64,
    pub guest: f64,
    pub guest_nice: f64,
}

impl SystemCpuTimes {
    /// Total time across all states. Guest time is already accounted in user
    /// and nice, so it is not added twice.
    pub fn total(&self) -> f64 {
        self.user
            + self.nice
            + self.system
            + self.idle
            + self.iowait
            + self.irq
            + self.softirq
            + self.steal
    }
}

/// Static host metadata shared by every message of a cycle
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemInfo {
    pub os_name: String,
    pub kernel_version: String,
    pub cpus: Vec<CpuInfo>,
    pub total_memory: u64,
}

impl SystemInfo {
    /// Number of logical CPUs, never less than one
    pub fn num_cpus(&self) -> usize {
        self.cpus.len().max(1)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CpuInfo {
    pub number: i32,
    pub vendor: String,
    pub model_name: String,
    pub mhz: f64,
    pub cores: i32,
}

/// A live container and the processes running inside it
///
/// `Container::default()` is the "no container" value used for processes
/// that do not belong to any container.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Container {
    pub id: String,
    pub name: String,
    /// Runtime label (docker, containerd, cri-o)
    pub runtime: String,
    pub image: String,
    /// CPU limit in cores, 0 when unlimited
    pub cpu_limit: f64,
    /// Memory limit in bytes, 0 when unlimited
    pub memory_limit: u64,
    pub pids: Vec<i32>,
}

impl Container {
    pub fn is_empty(&self) -> bool {
        self.id.is_empty()
    }
}
