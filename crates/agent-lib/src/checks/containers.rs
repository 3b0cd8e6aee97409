//! Process to container correlation

use crate::models::Container;
use std::collections::HashMap;

/// Reverse index from pid to the container the process runs in, rebuilt
/// once per cycle
#[derive(Debug, Default)]
pub struct ContainerIndex {
    containers: Vec<Container>,
    by_pid: HashMap<i32, usize>,
    none: Container,
}

impl ContainerIndex {
    pub fn correlate(containers: Vec<Container>) -> Self {
        let mut by_pid = HashMap::new();
        for (idx, container) in containers.iter().enumerate() {
            for pid in &container.pids {
                by_pid.insert(*pid, idx);
            }
        }

        Self {
            containers,
            by_pid,
            none: Container::default(),
        }
    }

    /// Container owning `pid`, or the empty "no container" value
    pub fn container_for(&self, pid: i32) -> &Container {
        self.by_pid
            .get(&pid)
            .map(|idx| &self.containers[*idx])
            .unwrap_or(&self.none)
    }

    pub fn containers(&self) -> &[Container] {
        &self.containers
    }

    /// Hand the container list back (it becomes the next cycle's history)
    pub fn into_containers(self) -> Vec<Container> {
        self.containers
    }

    /// Number of pids that belong to some container
    pub fn correlated_pids(&self) -> usize {
        self.by_pid.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn container(id: &str, pids: &[i32]) -> Container {
        Container {
            id: id.to_string(),
            name: format!("{}-name", id),
            runtime: "docker".to_string(),
            pids: pids.to_vec(),
            ..Default::default()
        }
    }

    #[test]
    fn test_correlate_maps_pids_to_containers() {
        let index = ContainerIndex::correlate(vec![
            container("web", &[10, 11]),
            container("db", &[20]),
        ]);

        assert_eq!(index.container_for(10).id, "web");
        assert_eq!(index.container_for(11).id, "web");
        assert_eq!(index.container_for(20).id, "db");
        assert_eq!(index.correlated_pids(), 3);
    }

    #[test]
    fn test_unknown_pid_gets_empty_container() {
        let index = ContainerIndex::correlate(vec![container("web", &[10])]);

        let none = index.container_for(99);
        assert!(none.is_empty());
        assert_eq!(none, &Container::default());
    }

    #[test]
    fn test_empty_container_list() {
        let index = ContainerIndex::correlate(Vec::new());
        assert!(index.container_for(1).is_empty());
        assert_eq!(index.correlated_pids(), 0);
        assert!(index.into_containers().is_empty());
    }
}
