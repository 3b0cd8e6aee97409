//! Splitting records into bounded messages
//!
//! Every message of a cycle carries the same group id and the total number
//! of messages in the group, so a receiver can tell when one went missing.

use super::format::{ProcessRecord, ProcessStat};
use crate::models::SystemInfo;
use serde::{Deserialize, Serialize};

/// Process-check message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectorProc {
    pub host_name: String,
    pub group_id: i32,
    pub group_size: i32,
    pub info: SystemInfo,
    pub processes: Vec<ProcessRecord>,
}

/// Real-time check message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectorRealTime {
    pub host_name: String,
    pub group_id: i32,
    pub group_size: i32,
    pub num_cpus: i32,
    pub total_memory: u64,
    pub stats: Vec<ProcessStat>,
}

/// A message ready for transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageBody {
    Process(CollectorProc),
    RealTime(CollectorRealTime),
}

impl MessageBody {
    pub fn group_id(&self) -> i32 {
        match self {
            MessageBody::Process(m) => m.group_id,
            MessageBody::RealTime(m) => m.group_id,
        }
    }

    pub fn group_size(&self) -> i32 {
        match self {
            MessageBody::Process(m) => m.group_size,
            MessageBody::RealTime(m) => m.group_size,
        }
    }

    /// Number of process records in this message
    pub fn len(&self) -> usize {
        match self {
            MessageBody::Process(m) => m.processes.len(),
            MessageBody::RealTime(m) => m.stats.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Split `records` into `ceil(len / capacity)` chunks of at most `capacity`
/// records, keeping their order.
///
/// Always returns at least one chunk, so an empty cycle still produces one
/// envelope. `capacity` must be greater than zero.
pub fn chunk<T>(records: Vec<T>, capacity: usize) -> Vec<Vec<T>> {
    assert!(capacity > 0, "chunk capacity must be greater than zero");

    if records.is_empty() {
        return vec![Vec::new()];
    }

    let mut chunks = Vec::with_capacity(records.len().div_ceil(capacity));
    let mut current = Vec::with_capacity(capacity.min(records.len()));

    for record in records {
        if current.len() == capacity {
            chunks.push(std::mem::replace(
                &mut current,
                Vec::with_capacity(capacity),
            ));
        }
        current.push(record);
    }
    chunks.push(current);

    chunks
}

/// Wrap process records into process-check messages. A zero capacity is
/// treated as one record per message.
pub fn process_messages(
    records: Vec<ProcessRecord>,
    capacity: usize,
    host_name: &str,
    group_id: i32,
    info: &SystemInfo,
) -> Vec<MessageBody> {
    let chunks = chunk(records, capacity.max(1));
    let group_size = chunks.len() as i32;

    chunks
        .into_iter()
        .map(|processes| {
            MessageBody::Process(CollectorProc {
                host_name: host_name.to_string(),
                group_id,
                group_size,
                info: info.clone(),
                processes,
            })
        })
        .collect()
}

/// Wrap real-time stats into real-time messages
pub fn real_time_messages(
    stats: Vec<ProcessStat>,
    capacity: usize,
    host_name: &str,
    group_id: i32,
    info: &SystemInfo,
) -> Vec<MessageBody> {
    let chunks = chunk(stats, capacity.max(1));
    let group_size = chunks.len() as i32;
    let num_cpus = info.cpus.len() as i32;

    chunks
        .into_iter()
        .map(|stats| {
            MessageBody::RealTime(CollectorRealTime {
                host_name: host_name.to_string(),
                group_id,
                group_size,
                num_cpus,
                total_memory: info.total_memory,
                stats,
            })
        })
        .collect()
}
