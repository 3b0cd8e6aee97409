//! Previous-cycle state kept by the process check

use crate::models::{Container, ProcessSnapshot, SystemCpuTimes};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Everything the process check remembers from the cycle before
#[derive(Debug, Clone)]
pub struct SampleHistory {
    processes: HashMap<i32, ProcessSnapshot>,
    containers: Vec<Container>,
    cpu_times: SystemCpuTimes,
    taken_at: DateTime<Utc>,
}

impl SampleHistory {
    pub fn new(
        processes: HashMap<i32, ProcessSnapshot>,
        containers: Vec<Container>,
        cpu_times: SystemCpuTimes,
        taken_at: DateTime<Utc>,
    ) -> Self {
        Self {
            processes,
            containers,
            cpu_times,
            taken_at,
        }
    }

    pub fn process(&self, pid: i32) -> Option<&ProcessSnapshot> {
        self.processes.get(&pid)
    }

    pub fn processes(&self) -> &HashMap<i32, ProcessSnapshot> {
        &self.processes
    }

    pub fn containers(&self) -> &[Container] {
        &self.containers
    }

    pub fn cpu_times(&self) -> &SystemCpuTimes {
        &self.cpu_times
    }

    pub fn taken_at(&self) -> DateTime<Utc> {
        self.taken_at
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }
}

/// Number of containers that appeared and disappeared between two cycles
pub fn container_churn(previous: &[Container], current: &[Container]) -> (usize, usize) {
    let started = current
        .iter()
        .filter(|c| !previous.iter().any(|p| p.id == c.id))
        .count();
    let stopped = previous
        .iter()
        .filter(|p| !current.iter().any(|c| c.id == p.id))
        .count();
    (started, stopped)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn container(id: &str) -> Container {
        Container {
            id: id.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_history_accessors() {
        let mut processes = HashMap::new();
        processes.insert(
            42,
            ProcessSnapshot {
                pid: 42,
                ..Default::default()
            },
        );
        let now = Utc::now();
        let history = SampleHistory::new(processes, vec![container("a")], SystemCpuTimes::default(), now);

        assert_eq!(history.len(), 1);
        assert!(!history.is_empty());
        assert!(history.process(42).is_some());
        assert!(history.process(7).is_none());
        assert_eq!(history.containers().len(), 1);
        assert_eq!(history.taken_at(), now);
    }

    #[test]
    fn test_container_churn() {
        let previous = vec![container("a"), container("b")];
        let current = vec![container("b"), container("c"), container("d")];
        assert_eq!(container_churn(&previous, &current), (2, 1));
        assert_eq!(container_churn(&current, &current), (0, 0));
    }
}
