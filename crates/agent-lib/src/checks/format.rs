//! Turning raw snapshots into transport records
//!
//! The process check differences each snapshot against the same pid in the
//! previous cycle; the real-time check only uses the two CPU readings taken
//! inside one snapshot.

use super::containers::ContainerIndex;
use super::history::SampleHistory;
use crate::config::CheckConfig;
use crate::models::{Container, CpuTimes, IoCounters, ProcessSnapshot, SystemCpuTimes};
use crate::rates::{calculate_pct, calculate_rate, RateOutcome};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One process in one process-check cycle, scrubbed and with derived rates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessRecord {
    pub pid: i32,
    pub command: CommandStat,
    pub user: UserStat,
    pub memory: MemoryStat,
    pub cpu: CpuStat,
    pub create_time: i64,
    pub container: ContainerStat,
    pub open_fd_count: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub io: Option<IoStat>,
    pub voluntary_ctx_switches: u64,
    pub involuntary_ctx_switches: u64,
}

/// Numeric-only record emitted by the real-time check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessStat {
    pub pid: i32,
    pub create_time: i64,
    pub memory: MemoryStat,
    pub cpu: CpuStat,
    pub nice: i32,
    pub threads: i32,
    pub open_fd_count: i32,
    pub state: String,
    pub voluntary_ctx_switches: u64,
    pub involuntary_ctx_switches: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandStat {
    pub args: Vec<String>,
    pub cwd: String,
    pub exe: String,
    pub ppid: i32,
    pub pgroup: i32,
    pub state: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserStat {
    pub name: String,
    pub uid: u32,
    pub gid: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryStat {
    pub rss: u64,
    pub vms: u64,
    pub swap: u64,
    pub shared: u64,
    pub text: u64,
    pub lib: u64,
    pub data: u64,
    pub dirty: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CpuStat {
    pub last_cpu: String,
    pub total_pct: f32,
    pub user_pct: f32,
    pub system_pct: f32,
    pub num_threads: i32,
    pub nice: i32,
    /// Cumulative user time in whole seconds
    pub user_time: i64,
    /// Cumulative system time in whole seconds
    pub system_time: i64,
}

/// Per-second I/O rates; all fields `Unmeasured` when the platform has no counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct IoStat {
    pub read_rate: RateOutcome,
    pub write_rate: RateOutcome,
    pub read_bytes_rate: RateOutcome,
    pub write_bytes_rate: RateOutcome,
}

/// Container fields carried by a record; all empty when the process has no container
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerStat {
    pub id: String,
    pub name: String,
    pub runtime: String,
    pub image: String,
    pub cpu_limit: f32,
    pub memory_limit: u64,
}

/// Inputs of one differencing pass
pub struct CycleInputs<'a> {
    pub current: &'a HashMap<i32, ProcessSnapshot>,
    pub cpu_times: &'a SystemCpuTimes,
    pub containers: &'a ContainerIndex,
    pub history: &'a SampleHistory,
    /// Logical CPUs on the host
    pub num_cpus: usize,
    /// Seconds since the previous cycle, `None` when not measurable
    pub elapsed_secs: Option<f64>,
}

/// Format every process seen in both this cycle and the previous one.
///
/// Output is ordered by pid. Processes with an empty or blacklisted command
/// line, and processes that were not in the previous sample, are left out.
pub fn format_processes(config: &CheckConfig, inputs: &CycleInputs<'_>) -> Vec<ProcessRecord> {
    let mut pids: Vec<i32> = inputs.current.keys().copied().collect();
    pids.sort_unstable();

    let num_cpus = inputs.num_cpus as f64;
    let prev_cpu_times = inputs.history.cpu_times();
    let mut records = Vec::with_capacity(pids.len());

    for pid in pids {
        let fp = &inputs.current[&pid];
        if fp.cmdline.is_empty() || config.is_blacklisted(&fp.cmdline) {
            continue;
        }
        // Not in the last sample: no baseline to difference against
        let Some(prev) = inputs.history.process(pid) else {
            continue;
        };

        records.push(ProcessRecord {
            pid: fp.pid,
            command: format_command(fp, config),
            user: format_user(fp),
            memory: format_memory(fp),
            cpu: format_cpu(
                fp,
                &fp.cpu_time_2,
                &prev.cpu_time_2,
                inputs.cpu_times,
                prev_cpu_times,
                num_cpus,
            ),
            create_time: fp.create_time,
            container: format_container(inputs.containers.container_for(pid)),
            open_fd_count: fp.open_fd_count,
            io: format_io(fp.io.as_ref(), prev.io.as_ref(), inputs.elapsed_secs),
            voluntary_ctx_switches: fp.voluntary_ctx_switches,
            involuntary_ctx_switches: fp.involuntary_ctx_switches,
        });
    }

    records
}

/// Format real-time stats for every process, ordered by pid
pub fn format_real_time(
    current: &HashMap<i32, ProcessSnapshot>,
    num_cpus: usize,
) -> Vec<ProcessStat> {
    let mut pids: Vec<i32> = current.keys().copied().collect();
    pids.sort_unstable();

    pids.into_iter()
        .map(|pid| {
            let fp = &current[&pid];
            ProcessStat {
                pid: fp.pid,
                create_time: fp.create_time,
                memory: format_memory(fp),
                cpu: format_window_cpu(fp, num_cpus as f64),
                nice: fp.nice,
                threads: fp.num_threads,
                open_fd_count: fp.open_fd_count,
                state: fp.status.clone(),
                voluntary_ctx_switches: fp.voluntary_ctx_switches,
                involuntary_ctx_switches: fp.involuntary_ctx_switches,
            }
        })
        .collect()
}

fn format_command(fp: &ProcessSnapshot, config: &CheckConfig) -> CommandStat {
    CommandStat {
        args: config.scrubber.scrub_cmdline(&fp.cmdline),
        cwd: fp.cwd.clone(),
        exe: fp.exe.clone(),
        ppid: fp.ppid,
        pgroup: fp.pgrp,
        state: fp.status.clone(),
    }
}

fn format_user(fp: &ProcessSnapshot) -> UserStat {
    UserStat {
        name: fp.username.clone().unwrap_or_default(),
        uid: fp.uids.first().copied().unwrap_or(0),
        gid: fp.gids.first().copied().unwrap_or(0),
    }
}

pub(crate) fn format_memory(fp: &ProcessSnapshot) -> MemoryStat {
    let mut ms = MemoryStat {
        rss: fp.memory.rss,
        vms: fp.memory.vms,
        swap: fp.memory.swap,
        ..Default::default()
    };

    if let Some(ex) = &fp.memory_ex {
        ms.shared = ex.shared;
        ms.text = ex.text;
        ms.lib = ex.lib;
        ms.data = ex.data;
        ms.dirty = ex.dirty;
    }
    ms
}

/// CPU usage between two cycles, relative to host CPU time spent in between
pub(crate) fn format_cpu(
    fp: &ProcessSnapshot,
    t2: &CpuTimes,
    t1: &CpuTimes,
    sys2: &SystemCpuTimes,
    sys1: &SystemCpuTimes,
    num_cpus: f64,
) -> CpuStat {
    let delta_sys = sys2.total() - sys1.total();
    CpuStat {
        last_cpu: t2.cpu.clone(),
        total_pct: calculate_pct(t1.total(), t2.total(), delta_sys, num_cpus),
        user_pct: calculate_pct(t1.user, t2.user, delta_sys, num_cpus),
        system_pct: calculate_pct(t1.system, t2.system, delta_sys, num_cpus),
        num_threads: fp.num_threads,
        nice: fp.nice,
        user_time: t2.user as i64,
        system_time: t2.system as i64,
    }
}

/// CPU usage inside the sampling window of a single snapshot
pub(crate) fn format_window_cpu(fp: &ProcessSnapshot, num_cpus: f64) -> CpuStat {
    let (t1, t2) = (&fp.cpu_time_1, &fp.cpu_time_2);
    let window_secs = (t2.timestamp_ms - t1.timestamp_ms) as f64 / 1000.0;
    let delta = window_secs * num_cpus;
    CpuStat {
        last_cpu: t2.cpu.clone(),
        total_pct: calculate_pct(t1.total(), t2.total(), delta, num_cpus),
        user_pct: calculate_pct(t1.user, t2.user, delta, num_cpus),
        system_pct: calculate_pct(t1.system, t2.system, delta, num_cpus),
        num_threads: fp.num_threads,
        nice: fp.nice,
        user_time: t2.user as i64,
        system_time: t2.system as i64,
    }
}

/// I/O rates since the previous cycle.
///
/// No counters on this platform gives an empty stat; no measurable time
/// window gives `None`.
pub(crate) fn format_io(
    current: Option<&IoCounters>,
    previous: Option<&IoCounters>,
    elapsed_secs: Option<f64>,
) -> Option<IoStat> {
    let Some(cur) = current else {
        return Some(IoStat::default());
    };
    let secs = elapsed_secs?;

    let rate = |field: fn(&IoCounters) -> u64| match previous {
        Some(prev) => calculate_rate(field(prev), field(cur), secs),
        None => RateOutcome::Unmeasured,
    };

    Some(IoStat {
        read_rate: rate(|c| c.read_count),
        write_rate: rate(|c| c.write_count),
        read_bytes_rate: rate(|c| c.read_bytes),
        write_bytes_rate: rate(|c| c.write_bytes),
    })
}

pub(crate) fn format_container(container: &Container) -> ContainerStat {
    if container.is_empty() {
        return ContainerStat::default();
    }
    ContainerStat {
        id: container.id.clone(),
        name: container.name.clone(),
        runtime: container.runtime.clone(),
        image: container.image.clone(),
        cpu_limit: container.cpu_limit as f32,
        memory_limit: container.memory_limit,
    }
}
