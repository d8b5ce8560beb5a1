//! Scheduler strategies - slot admission for queued jobs
//!
//! A strategy decides which idle jobs may be granted, assigns slots once the
//! orchestrator marked them ready and reacts to classification changes. It
//! never changes a classification itself.
//!
//! Strategies are owned by the orchestrator task queue and driven from one
//! task at a time, so they carry no internal locking.

mod dependency;
mod parallel;
mod seamless;

pub use dependency::{Dependency, DependencyGraph};
pub use parallel::ParallelScheduler;
pub use seamless::SeamlessScheduler;

use crate::application::job_list::JobList;
use crate::config::StrategyConfig;
use crate::domain::{JobClassification, JobData};
use std::sync::Arc;

/// Notification raised by a strategy
#[derive(Debug, Clone, PartialEq)]
pub enum SchedulerEvent {
    /// Job holds a slot and may start now
    Scheduled(Arc<JobData>),
    /// Job was granted but waits for a dependency; it must not start yet
    Suspended(Arc<JobData>),
    /// Capacity freed up, the candidate set should be evaluated again
    SlotAvailable,
}

pub trait JobScheduler: Send {
    fn name(&self) -> &'static str;

    /// Side-effect free filter over idle jobs in list order: which of them
    /// could be granted right now
    fn schedulable_jobs(&self, candidates: &[Arc<JobData>]) -> Vec<Arc<JobData>>;

    /// Jobs from `schedulable_jobs` were marked ready: assign slots and
    /// record dependencies
    fn jobs_ready(&mut self, jobs: &[Arc<JobData>]) -> crate::domain::error::Result<Vec<SchedulerEvent>>;

    /// React to a classification advance of a granted job
    fn job_updated(
        &mut self,
        job: &Arc<JobData>,
        classification: JobClassification,
    ) -> crate::domain::error::Result<Vec<SchedulerEvent>>;
}

/// Build the strategy selected by configuration
pub fn build_scheduler(config: &StrategyConfig, list: Arc<JobList>) -> Box<dyn JobScheduler> {
    match config {
        StrategyConfig::Parallel { slots } => Box::new(ParallelScheduler::new(list, *slots)),
        StrategyConfig::Seamless => Box::new(SeamlessScheduler::new(list)),
    }
}

/// True if `job` continues the slot chain of its list predecessor:
/// a follow-up of the same recipe, the job a setup prepares, or the cleanup
/// of the predecessor
pub(crate) fn joins_chain(previous: &JobData, job: &JobData) -> bool {
    job.same_recipe_as(previous) || previous.is_prepare_of(job) || job.is_cleanup_of(previous)
}

/// Classification `previous` must reach before `job` may start.
/// A prepared job waits for its setup to finish, everything else may start
/// once its predecessor winds down.
pub(crate) fn dependency_threshold(previous: &JobData, job: &JobData) -> JobClassification {
    if previous.is_prepare_of(job) {
        JobClassification::Completed
    } else {
        JobClassification::Completing
    }
}

/// True if `job` is a same-recipe follow-up of `head`, directly or through
/// a run of same-recipe predecessors
pub(crate) fn is_follow_up_of(list: &JobList, job: &JobData, head: &JobData) -> bool {
    if !job.same_recipe_as(head) || job == head {
        return false;
    }
    for previous in list.backward_from(job).iter().skip(1) {
        if **previous == *head {
            return true;
        }
        if !previous.same_recipe_as(head) {
            return false;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{JobPosition, Recipe};

    fn job(id: u64, recipe: Recipe) -> Arc<JobData> {
        Arc::new(JobData::new(id, Arc::new(recipe), 1))
    }

    #[test]
    fn test_chain_rules() {
        let production = job(1, Recipe::production(1, "p"));
        let follow_up = job(2, Recipe::production(1, "p"));
        let setup = job(3, Recipe::setup(10, "s", 1));
        let cleanup = job(4, Recipe::cleanup(11, "c", 1));
        let other = job(5, Recipe::production(2, "o"));

        assert!(joins_chain(&production, &follow_up));
        assert!(joins_chain(&setup, &production));
        assert!(joins_chain(&production, &cleanup));
        assert!(!joins_chain(&production, &other));
        assert!(!joins_chain(&cleanup, &other));

        assert_eq!(
            dependency_threshold(&setup, &production),
            JobClassification::Completed
        );
        assert_eq!(
            dependency_threshold(&production, &follow_up),
            JobClassification::Completing
        );
    }

    #[test]
    fn test_follow_up_through_predecessors() {
        let list = JobList::new();
        let head = job(1, Recipe::production(1, "p"));
        let second = job(2, Recipe::production(1, "p"));
        let third = job(3, Recipe::production(1, "p"));
        let other = job(4, Recipe::production(2, "o"));
        let late = job(5, Recipe::production(1, "p"));
        list.add(
            vec![head.clone(), second.clone(), third.clone(), other, late.clone()],
            JobPosition::Append,
            |_| Ok(()),
        )
        .unwrap();

        assert!(is_follow_up_of(&list, &second, &head));
        assert!(is_follow_up_of(&list, &third, &head));
        assert!(!is_follow_up_of(&list, &late, &head));
        assert!(!is_follow_up_of(&list, &head, &head));
    }
}
