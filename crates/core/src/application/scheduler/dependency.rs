//! Transient dependency edges between granted jobs
//!
//! An edge `job -> blocking` holds `job` back until `blocking` reached the
//! recorded threshold. Edges are rebuilt from list adjacency whenever jobs
//! are granted and never persisted.

use crate::domain::{JobClassification, JobData};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct Dependency {
    pub job: Arc<JobData>,
    pub blocking: Arc<JobData>,
    pub threshold: JobClassification,
}

#[derive(Debug, Default)]
pub struct DependencyGraph {
    edges: Vec<Dependency>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `job` waits for `blocking` to reach `threshold`.
    /// A job has at most one edge; a new edge replaces the old one.
    pub fn add(&mut self, job: Arc<JobData>, blocking: Arc<JobData>, threshold: JobClassification) {
        self.edges.retain(|edge| edge.job != job);
        self.edges.push(Dependency {
            job,
            blocking,
            threshold,
        });
    }

    /// True if `job` is held back by any dependency
    pub fn is_blocked(&self, job: &JobData) -> bool {
        self.edges.iter().any(|edge| *edge.job == *job)
    }

    pub fn is_blocked_by(&self, job: &JobData, blocking: &JobData) -> bool {
        self.edges
            .iter()
            .any(|edge| *edge.job == *job && *edge.blocking == *blocking)
    }

    /// Remove and return every job whose threshold on `blocking` is satisfied
    /// by `classification`, in the order the edges were recorded
    pub fn resolve(
        &mut self,
        blocking: &JobData,
        classification: JobClassification,
    ) -> Vec<Arc<JobData>> {
        let mut released = Vec::new();
        self.edges.retain(|edge| {
            if *edge.blocking == *blocking && classification >= edge.threshold {
                released.push(Arc::clone(&edge.job));
                false
            } else {
                true
            }
        });
        released
    }

    /// Drop the edge held by `job`
    pub fn remove(&mut self, job: &JobData) -> Option<Dependency> {
        let index = self.edges.iter().position(|edge| *edge.job == *job)?;
        Some(self.edges.remove(index))
    }

    /// Let every dependent of `from` wait for `to` instead, keeping thresholds
    pub fn retarget(&mut self, from: &JobData, to: &Arc<JobData>) {
        for edge in self.edges.iter_mut().filter(|edge| *edge.blocking == *from) {
            edge.blocking = Arc::clone(to);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Recipe;

    fn job(id: u64) -> Arc<JobData> {
        Arc::new(JobData::new(id, Arc::new(Recipe::production(1, "p")), 1))
    }

    #[test]
    fn test_resolve_honors_threshold() {
        let mut graph = DependencyGraph::new();
        let blocker = job(1);
        let follow_up = job(2);
        let prepared = job(3);

        graph.add(follow_up.clone(), blocker.clone(), JobClassification::Completing);
        graph.add(prepared.clone(), blocker.clone(), JobClassification::Completed);

        assert!(graph.resolve(&blocker, JobClassification::Running).is_empty());

        let released = graph.resolve(&blocker, JobClassification::Completing);
        assert_eq!(released, vec![follow_up]);
        assert!(graph.is_blocked_by(&prepared, &blocker));

        let released = graph.resolve(&blocker, JobClassification::Completed);
        assert_eq!(released, vec![prepared.clone()]);
        assert!(!graph.is_blocked(&prepared));
    }

    #[test]
    fn test_retarget_and_remove() {
        let mut graph = DependencyGraph::new();
        let first = job(1);
        let second = job(2);
        let third = job(3);

        graph.add(second.clone(), first.clone(), JobClassification::Completing);
        graph.add(third.clone(), second.clone(), JobClassification::Completing);

        // second is aborted while waiting
        let edge = graph.remove(&second).unwrap();
        graph.retarget(&second, &edge.blocking);

        assert!(graph.is_blocked_by(&third, &first));
        assert!(!graph.is_blocked_by(&third, &second));
        assert!(!graph.is_blocked(&second));
    }
}
