//! Linux `/proc` snapshot provider
//!
//! Reads per-process files directly from procfs:
//! - stat (twice, for the intra-sample CPU window)
//! - status, cmdline, statm, io, fd, cwd, exe
//! and host-wide data from stat, cpuinfo, meminfo and sys/kernel.

use super::{CollectError, SnapshotProvider};
use crate::models::{
    CpuInfo, CpuTimes, IoCounters, MemoryInfo, MemoryInfoEx, ProcessSnapshot, SystemCpuTimes,
    SystemInfo,
};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Kernel clock ticks per second (USER_HZ)
const CLOCK_TICKS: f64 = 100.0;

const PAGE_SIZE: u64 = 4096;

/// Fields of `/proc/<pid>/stat` used by the provider
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ProcStat {
    pub state: char,
    pub ppid: i32,
    pub pgrp: i32,
    /// Clock ticks
    pub utime: u64,
    pub stime: u64,
    pub nice: i32,
    pub num_threads: i32,
    /// Clock ticks since boot
    pub starttime: u64,
    pub vsize: u64,
    /// Pages
    pub rss: u64,
}

/// Fields of `/proc/<pid>/status` used by the provider
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct ProcStatus {
    pub uids: Vec<u32>,
    pub gids: Vec<u32>,
    /// Bytes
    pub swap: u64,
    pub voluntary_ctx_switches: u64,
    pub involuntary_ctx_switches: u64,
}

/// Snapshot provider backed by a procfs mount
#[derive(Debug, Clone)]
pub struct ProcfsProvider {
    proc_root: PathBuf,
    passwd_path: Option<PathBuf>,
}

impl ProcfsProvider {
    pub fn new(proc_root: impl Into<PathBuf>) -> Self {
        Self {
            proc_root: proc_root.into(),
            passwd_path: None,
        }
    }

    /// Resolve usernames from this passwd file
    pub fn with_passwd(mut self, passwd_path: impl Into<PathBuf>) -> Self {
        self.passwd_path = Some(passwd_path.into());
        self
    }

    pub fn proc_root(&self) -> &Path {
        &self.proc_root
    }

    fn read(&self, relative: &str) -> Result<String, CollectError> {
        let path = self.proc_root.join(relative);
        fs::read_to_string(&path).map_err(|source| CollectError::Io { path, source })
    }

    fn list_pids(&self) -> Result<Vec<i32>, CollectError> {
        let entries = fs::read_dir(&self.proc_root).map_err(|e| {
            CollectError::Failed(format!("cannot list {}: {}", self.proc_root.display(), e))
        })?;

        let mut pids: Vec<i32> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().to_str()?.parse::<i32>().ok())
            .collect();
        pids.sort_unstable();
        Ok(pids)
    }

    fn boot_time(&self) -> Result<i64, CollectError> {
        let content = self.read("stat")?;
        parse_boot_time(&content)
            .ok_or_else(|| CollectError::Failed("btime missing from stat".to_string()))
    }

    fn users(&self) -> HashMap<u32, String> {
        let Some(path) = &self.passwd_path else {
            return HashMap::new();
        };
        match fs::read_to_string(path) {
            Ok(content) => parse_passwd(&content),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Cannot read passwd file");
                HashMap::new()
            }
        }
    }

    fn read_stat(&self, pid: i32) -> Option<ProcStat> {
        let content = fs::read_to_string(self.proc_root.join(format!("{}/stat", pid))).ok()?;
        parse_proc_stat(&content).ok()
    }

    /// Read everything but the first CPU reading. `None` when the process
    /// exited in the meantime.
    fn read_process(
        &self,
        pid: i32,
        cpu_time_1: CpuTimes,
        boot_time: i64,
        users: &HashMap<u32, String>,
    ) -> Option<ProcessSnapshot> {
        let dir = self.proc_root.join(pid.to_string());
        let stat = self.read_stat(pid)?;
        let cpu_time_2 = cpu_times_of(&stat, chrono::Utc::now().timestamp_millis());

        let status = fs::read_to_string(dir.join("status"))
            .ok()
            .map(|content| parse_proc_status(&content))
            .unwrap_or_default();

        let cmdline = fs::read(dir.join("cmdline"))
            .map(|raw| parse_cmdline(&raw))
            .unwrap_or_default();

        let memory_ex = fs::read_to_string(dir.join("statm"))
            .ok()
            .and_then(|content| parse_statm(&content));

        let io = io_counters_from(fs::read_to_string(dir.join("io")));

        let open_fd_count = fs::read_dir(dir.join("fd"))
            .map(|entries| entries.count() as i32)
            .unwrap_or(-1);

        let link = |name: &str| {
            fs::read_link(dir.join(name))
                .map(|target| target.to_string_lossy().into_owned())
                .unwrap_or_default()
        };

        let username = status.uids.first().and_then(|uid| users.get(uid)).cloned();
        let start_ms = (stat.starttime as f64 / CLOCK_TICKS * 1000.0) as i64;

        Some(ProcessSnapshot {
            pid,
            cmdline,
            cwd: link("cwd"),
            exe: link("exe"),
            ppid: stat.ppid,
            pgrp: stat.pgrp,
            uids: status.uids,
            gids: status.gids,
            username,
            create_time: boot_time * 1000 + start_ms,
            memory: MemoryInfo {
                rss: stat.rss * PAGE_SIZE,
                vms: stat.vsize,
                swap: status.swap,
            },
            memory_ex,
            cpu_time_1,
            cpu_time_2,
            num_threads: stat.num_threads,
            nice: stat.nice,
            open_fd_count,
            io,
            voluntary_ctx_switches: status.voluntary_ctx_switches,
            involuntary_ctx_switches: status.involuntary_ctx_switches,
            status: stat.state.to_string(),
        })
    }
}

impl SnapshotProvider for ProcfsProvider {
    fn sample(
        &self,
        interval: Duration,
        concurrency: usize,
    ) -> Result<HashMap<i32, ProcessSnapshot>, CollectError> {
        let pids = self.list_pids()?;
        let boot_time = self.boot_time()?;
        let users = self.users();

        let now_ms = chrono::Utc::now().timestamp_millis();
        let first: Vec<(i32, CpuTimes)> = pids
            .iter()
            .filter_map(|&pid| Some((pid, cpu_times_of(&self.read_stat(pid)?, now_ms))))
            .collect();

        if !interval.is_zero() {
            std::thread::sleep(interval);
        }

        let workers = concurrency.max(1);
        let per_worker = first.len().div_ceil(workers).max(1);

        let snapshots = std::thread::scope(|scope| {
            let handles: Vec<_> = first
                .chunks(per_worker)
                .map(|batch| {
                    let users = &users;
                    scope.spawn(move || {
                        batch
                            .iter()
                            .filter_map(|(pid, cpu)| {
                                self.read_process(*pid, cpu.clone(), boot_time, users)
                            })
                            .collect::<Vec<_>>()
                    })
                })
                .collect();

            let mut snapshots = HashMap::with_capacity(first.len());
            for handle in handles {
                let batch = handle
                    .join()
                    .map_err(|_| CollectError::Failed("process reader panicked".to_string()))?;
                snapshots.extend(batch.into_iter().map(|p| (p.pid, p)));
            }
            Ok::<_, CollectError>(snapshots)
        })?;

        let vanished = first.len() - snapshots.len();
        if vanished > 0 {
            debug!(vanished, "Processes exited during sampling");
        }

        Ok(snapshots)
    }

    fn cpu_times(&self) -> Result<SystemCpuTimes, CollectError> {
        let content = self.read("stat")?;
        parse_system_cpu_times(&content)
            .ok_or_else(|| CollectError::Failed("cpu line missing from stat".to_string()))
    }

    fn system_info(&self) -> Result<SystemInfo, CollectError> {
        let cpus = parse_cpuinfo(&self.read("cpuinfo")?);
        let total_memory = parse_mem_total(&self.read("meminfo")?).unwrap_or(0);
        let os_name = self
            .read("sys/kernel/ostype")
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|_| "Linux".to_string());
        let kernel_version = self
            .read("sys/kernel/osrelease")
            .map(|s| s.trim().to_string())
            .unwrap_or_default();

        Ok(SystemInfo {
            os_name,
            kernel_version,
            cpus,
            total_memory,
        })
    }
}

fn cpu_times_of(stat: &ProcStat, timestamp_ms: i64) -> CpuTimes {
    CpuTimes {
        cpu: "cpu".to_string(),
        user: stat.utime as f64 / CLOCK_TICKS,
        system: stat.stime as f64 / CLOCK_TICKS,
        timestamp_ms,
    }
}

/// Parse `/proc/<pid>/stat`. The command name may contain spaces and
/// parentheses, so fields are located relative to the last ')'.
pub(crate) fn parse_proc_stat(content: &str) -> Result<ProcStat, CollectError> {
    let content = content.trim();
    let malformed = |what: &str| CollectError::Failed(format!("malformed stat: {}", what));

    let open = content.find('(').ok_or_else(|| malformed("missing '('"))?;
    let close = content.rfind(')').ok_or_else(|| malformed("missing ')'"))?;
    if close <= open {
        return Err(malformed("invalid parentheses"));
    }

    content[..open]
        .trim()
        .parse::<i32>()
        .map_err(|_| malformed("invalid pid"))?;
    let fields: Vec<&str> = content[close + 1..].split_whitespace().collect();
    if fields.len() < 22 {
        return Err(malformed("not enough fields"));
    }

    let field = |idx: usize| -> Result<i64, CollectError> {
        fields[idx]
            .parse()
            .map_err(|_| malformed(&format!("invalid field {}", idx + 3)))
    };

    Ok(ProcStat {
        state: fields[0].chars().next().unwrap_or('?'),
        ppid: field(1)? as i32,
        pgrp: field(2)? as i32,
        utime: field(11)? as u64,
        stime: field(12)? as u64,
        nice: field(16)? as i32,
        num_threads: field(17)? as i32,
        starttime: field(19)? as u64,
        vsize: field(20)? as u64,
        rss: field(21)?.max(0) as u64,
    })
}

pub(crate) fn parse_proc_status(content: &str) -> ProcStatus {
    let mut status = ProcStatus::default();

    let ids = |rest: &str| -> Vec<u32> {
        rest.split_whitespace()
            .filter_map(|s| s.parse().ok())
            .collect()
    };
    let number = |rest: &str| -> u64 {
        rest.split_whitespace()
            .next()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0)
    };

    for line in content.lines() {
        let Some((key, rest)) = line.split_once(':') else {
            continue;
        };
        match key {
            "Uid" => status.uids = ids(rest),
            "Gid" => status.gids = ids(rest),
            "VmSwap" => status.swap = number(rest) * 1024,
            "voluntary_ctxt_switches" => status.voluntary_ctx_switches = number(rest),
            "nonvoluntary_ctxt_switches" => status.involuntary_ctx_switches = number(rest),
            _ => {}
        }
    }

    status
}

/// NUL-separated arguments; kernel threads have an empty cmdline
pub(crate) fn parse_cmdline(raw: &[u8]) -> Vec<String> {
    raw.split(|&b| b == 0)
        .filter(|arg| !arg.is_empty())
        .map(|arg| String::from_utf8_lossy(arg).into_owned())
        .collect()
}

/// `/proc/<pid>/statm`: size resident shared text lib data dt, in pages
pub(crate) fn parse_statm(content: &str) -> Option<MemoryInfoEx> {
    let values: Vec<u64> = content
        .split_whitespace()
        .map(|s| s.parse().ok())
        .collect::<Option<_>>()?;
    if values.len() < 7 {
        return None;
    }

    Some(MemoryInfoEx {
        shared: values[2] * PAGE_SIZE,
        text: values[3] * PAGE_SIZE,
        lib: values[4] * PAGE_SIZE,
        data: values[5] * PAGE_SIZE,
        dirty: values[6] * PAGE_SIZE,
    })
}

pub(crate) fn parse_proc_io(content: &str) -> Option<IoCounters> {
    let mut values: HashMap<&str, u64> = HashMap::new();
    for line in content.lines() {
        if let Some((key, value)) = line.split_once(':') {
            if let Ok(v) = value.trim().parse() {
                values.insert(key.trim(), v);
            }
        }
    }
    if values.is_empty() {
        return None;
    }

    let get = |key: &str| values.get(key).copied().unwrap_or(0);
    Some(IoCounters {
        read_count: get("syscr"),
        write_count: get("syscw"),
        read_bytes: get("read_bytes"),
        write_bytes: get("write_bytes"),
    })
}

/// Map a read of `/proc/<pid>/io` to counters. The file is owner-only, so a
/// permission error yields zeroed counters, which rate as unavailable.
pub(crate) fn io_counters_from(read: std::io::Result<String>) -> Option<IoCounters> {
    match read {
        Ok(content) => parse_proc_io(&content),
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            Some(IoCounters::default())
        }
        Err(_) => None,
    }
}

pub(crate) fn parse_boot_time(content: &str) -> Option<i64> {
    content
        .lines()
        .find_map(|line| line.strip_prefix("btime "))
        .and_then(|v| v.trim().parse().ok())
}

/// The aggregate `cpu ` line of `/proc/stat`, converted to seconds
pub(crate) fn parse_system_cpu_times(content: &str) -> Option<SystemCpuTimes> {
    let line = content.lines().find(|l| l.starts_with("cpu "))?;
    let values: Vec<f64> = line
        .split_whitespace()
        .skip(1)
        .map(|s| s.parse::<u64>().map(|v| v as f64 / CLOCK_TICKS))
        .collect::<Result<_, _>>()
        .ok()?;
    if values.len() < 4 {
        return None;
    }

    let at = |idx: usize| values.get(idx).copied().unwrap_or(0.0);
    Some(SystemCpuTimes {
        user: at(0),
        nice: at(1),
        system: at(2),
        idle: at(3),
        iowait: at(4),
        irq: at(5),
        softirq: at(6),
        steal: at(7),
        guest: at(8),
        guest_nice: at(9),
    })
}

/// One entry per `processor` block
pub(crate) fn parse_cpuinfo(content: &str) -> Vec<CpuInfo> {
    let mut cpus = Vec::new();
    let mut current: Option<CpuInfo> = None;

    for line in content.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "processor" => {
                cpus.extend(current.take());
                current = Some(CpuInfo {
                    number: value.parse().unwrap_or(0),
                    ..CpuInfo::default()
                });
            }
            "vendor_id" => {
                if let Some(cpu) = current.as_mut() {
                    cpu.vendor = value.to_string();
                }
            }
            "model name" => {
                if let Some(cpu) = current.as_mut() {
                    cpu.model_name = value.to_string();
                }
            }
            "cpu MHz" => {
                if let Some(cpu) = current.as_mut() {
                    cpu.mhz = value.parse().unwrap_or(0.0);
                }
            }
            "cpu cores" => {
                if let Some(cpu) = current.as_mut() {
                    cpu.cores = value.parse().unwrap_or(0);
                }
            }
            _ => {}
        }
    }
    cpus.extend(current);

    cpus
}

/// `MemTotal` in bytes
pub(crate) fn parse_mem_total(content: &str) -> Option<u64> {
    content
        .lines()
        .find_map(|line| line.strip_prefix("MemTotal:"))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|kb| kb.parse::<u64>().ok())
        .map(|kb| kb * 1024)
}

/// Map uid to login name from passwd-formatted content
pub fn parse_passwd(content: &str) -> HashMap<u32, String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let mut parts = line.split(':');
            let name = parts.next()?;
            let uid = parts.nth(1)?.parse().ok()?;
            Some((uid, name.to_string()))
        })
        .collect()
}
