//! Parallel scheduler - fixed pool of interchangeable slots
//!
//! A slot is held by a chain of jobs: an optional setup, the production job,
//! its same-recipe follow-ups and an optional cleanup. The chain hands the
//! slot along with `try_replace`; the slot is released when the last job of
//! the chain completes.

use super::{dependency_threshold, joins_chain, DependencyGraph, JobScheduler, SchedulerEvent};
use crate::application::job_list::JobList;
use crate::application::slot_pool::SlotPool;
use crate::domain::error::Result;
use crate::domain::{JobClassification, JobData};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct ParallelScheduler {
    list: Arc<JobList>,
    slots: SlotPool<Arc<JobData>>,
    dependencies: DependencyGraph,
    /// Granted chain heads that found no free slot, served FIFO
    slot_waiters: VecDeque<Arc<JobData>>,
    /// Slots added for resumed jobs beyond the configured capacity
    overbooked: usize,
}

impl ParallelScheduler {
    pub fn new(list: Arc<JobList>, slots: usize) -> Self {
        Self {
            list,
            slots: SlotPool::new(slots),
            dependencies: DependencyGraph::new(),
            slot_waiters: VecDeque::new(),
            overbooked: 0,
        }
    }

    pub fn available_slots(&self) -> usize {
        self.slots.available_slots()
    }

    pub fn holds_slot(&self, job: &Arc<JobData>) -> bool {
        self.slots.has_slot(job)
    }

    pub fn is_blocked(&self, job: &JobData) -> bool {
        self.dependencies.is_blocked(job)
    }

    fn is_tracked(&self, job: &Arc<JobData>) -> bool {
        self.slots.has_slot(job)
            || self.dependencies.is_blocked(job)
            || self.slot_waiters.contains(job)
    }

    /// Give `job` a slot of its own
    fn assign(&mut self, job: &Arc<JobData>, events: &mut Vec<SchedulerEvent>) {
        if self.slots.try_assign(Arc::clone(job)) {
            events.push(SchedulerEvent::Scheduled(Arc::clone(job)));
            return;
        }

        if job.has_progress() {
            // Resumed work occupies the line already, make room for it
            let size = self.slots.size();
            self.slots.try_resize(size + 1);
            self.slots.try_assign(Arc::clone(job));
            self.overbooked += 1;
            warn!(
                job_id = job.id(),
                overbooked = self.overbooked,
                "Resumed job overbooks the parallel slots"
            );
            events.push(SchedulerEvent::Scheduled(Arc::clone(job)));
            return;
        }

        debug!(job_id = job.id(), "No free slot, job queued for the next release");
        self.slot_waiters.push_back(Arc::clone(job));
        events.push(SchedulerEvent::Suspended(Arc::clone(job)));
    }

    fn slot_released(&mut self, events: &mut Vec<SchedulerEvent>) {
        if self.overbooked > 0 {
            let size = self.slots.size();
            if self.slots.try_resize(size - 1) {
                self.overbooked -= 1;
                return;
            }
        }

        while let Some(waiter) = self.slot_waiters.pop_front() {
            if waiter.classification() >= JobClassification::Completed {
                continue;
            }
            if self.slots.try_assign(Arc::clone(&waiter)) {
                events.push(SchedulerEvent::Scheduled(waiter));
                return;
            }
        }
        events.push(SchedulerEvent::SlotAvailable);
    }
}

impl JobScheduler for ParallelScheduler {
    fn name(&self) -> &'static str {
        "parallel"
    }

    fn schedulable_jobs(&self, candidates: &[Arc<JobData>]) -> Vec<Arc<JobData>> {
        let mut available = self.slots.available_slots();
        let mut granted: Vec<Arc<JobData>> = Vec::new();
        let mut exhausted = false;

        for candidate in candidates {
            // Resumed jobs are granted wherever they are listed
            if candidate.has_progress() {
                available = available.saturating_sub(1);
                granted.push(Arc::clone(candidate));
                continue;
            }
            if exhausted {
                continue;
            }

            let extends_chain = self.list.previous(candidate).is_some_and(|previous| {
                joins_chain(&previous, candidate)
                    && (self.is_tracked(&previous) || granted.contains(&previous))
            });
            if extends_chain {
                granted.push(Arc::clone(candidate));
            } else if available > 0 {
                available -= 1;
                granted.push(Arc::clone(candidate));
            } else {
                // Never grant past a job that has to wait for a slot
                exhausted = true;
            }
        }
        granted
    }

    fn jobs_ready(&mut self, jobs: &[Arc<JobData>]) -> Result<Vec<SchedulerEvent>> {
        let mut events = Vec::new();

        for job in jobs {
            let previous = self
                .list
                .previous(job)
                .filter(|previous| joins_chain(previous, job) && self.is_tracked(previous));

            match previous {
                Some(previous) if previous.classification() < dependency_threshold(&previous, job) => {
                    let threshold = dependency_threshold(&previous, job);
                    debug!(
                        job_id = job.id(),
                        blocking_id = previous.id(),
                        threshold = %threshold,
                        "Job waits for its predecessor"
                    );
                    self.dependencies.add(Arc::clone(job), previous, threshold);
                    events.push(SchedulerEvent::Suspended(Arc::clone(job)));
                }
                Some(previous) if self.slots.try_replace(&previous, Arc::clone(job)) => {
                    events.push(SchedulerEvent::Scheduled(Arc::clone(job)));
                }
                _ => self.assign(job, &mut events),
            }
        }
        Ok(events)
    }

    fn job_updated(
        &mut self,
        job: &Arc<JobData>,
        classification: JobClassification,
    ) -> Result<Vec<SchedulerEvent>> {
        let mut events = Vec::new();

        if classification >= JobClassification::Completed {
            // Aborted while held back: successors wait for what this job waited for
            if let Some(edge) = self.dependencies.remove(job) {
                self.dependencies.retarget(job, &edge.blocking);
            }
            self.slot_waiters.retain(|waiter| waiter != job);
        }

        for dependent in self.dependencies.resolve(job, classification) {
            if self.slots.try_replace(job, Arc::clone(&dependent)) {
                debug!(
                    job_id = dependent.id(),
                    from_id = job.id(),
                    "Slot handed over to successor"
                );
                events.push(SchedulerEvent::Scheduled(dependent));
            } else {
                self.assign(&dependent, &mut events);
            }
        }

        if classification >= JobClassification::Completed && self.slots.try_release(job) {
            debug!(job_id = job.id(), "Slot released");
            self.slot_released(&mut events);
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{JobPosition, ProgressUpdate, Recipe};

    struct Line {
        list: Arc<JobList>,
        scheduler: ParallelScheduler,
    }

    impl Line {
        fn new(slots: usize, jobs: &[Arc<JobData>]) -> Self {
            let list = Arc::new(JobList::new());
            list.add(jobs.to_vec(), JobPosition::Append, |_| Ok(()))
                .unwrap();
            let scheduler = ParallelScheduler::new(list.clone(), slots);
            Self { list, scheduler }
        }

        /// One scheduling pass the way the orchestrator runs it
        fn pass(&mut self) -> Vec<SchedulerEvent> {
            let granted = self.scheduler.schedulable_jobs(&self.list.idle_jobs());
            for job in &granted {
                job.set_classification(JobClassification::Waiting);
            }
            self.scheduler.jobs_ready(&granted).unwrap()
        }

        fn update(&mut self, job: &Arc<JobData>, classification: JobClassification) -> Vec<SchedulerEvent> {
            job.set_classification(classification);
            let events = self.scheduler.job_updated(job, classification).unwrap();
            if classification == JobClassification::Completed {
                self.list.remove(job, |_| Ok(())).unwrap();
            }
            events
        }
    }

    fn job(id: u64, recipe: Recipe) -> Arc<JobData> {
        Arc::new(JobData::new(id, Arc::new(recipe), 1))
    }

    fn scheduled(events: &[SchedulerEvent]) -> Vec<u64> {
        events
            .iter()
            .filter_map(|event| match event {
                SchedulerEvent::Scheduled(job) => Some(job.id()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_different_recipes_exclusive_with_one_slot() {
        let a = job(1, Recipe::production(1, "a"));
        let b = job(2, Recipe::production(2, "b"));
        let line = Line::new(1, &[a.clone(), b]);

        let granted = line.scheduler.schedulable_jobs(&line.list.idle_jobs());
        assert_eq!(granted, vec![a]);
    }

    #[test]
    fn test_follow_up_shares_slot() {
        let j1 = job(1, Recipe::production(1, "a"));
        let j2 = job(2, Recipe::production(1, "a"));
        let mut line = Line::new(1, &[j1.clone(), j2.clone()]);

        let granted = line.scheduler.schedulable_jobs(&line.list.idle_jobs());
        assert_eq!(granted, vec![j1.clone(), j2.clone()]);

        let events = line.pass();
        assert_eq!(scheduled(&events), vec![1]);
        assert!(events.contains(&SchedulerEvent::Suspended(j2.clone())));
        assert!(line.scheduler.is_blocked(&j2));

        assert!(line.update(&j1, JobClassification::Running).is_empty());

        let events = line.update(&j1, JobClassification::Completing);
        assert_eq!(scheduled(&events), vec![2]);
        assert!(line.scheduler.holds_slot(&j2));

        // j2 already holds the slot, completion of j1 raises nothing for it
        let events = line.update(&j1, JobClassification::Completed);
        assert!(events.is_empty());
        assert!(line.scheduler.holds_slot(&j2));
        assert_eq!(line.scheduler.available_slots(), 0);
    }

    #[test]
    fn test_slot_capacity() {
        let jobs: Vec<_> = (1..=3).map(|id| job(id, Recipe::production(id as u32, "p"))).collect();
        let mut line = Line::new(2, &jobs);

        let events = line.pass();
        assert_eq!(scheduled(&events), vec![1, 2]);
        assert!(line.pass().is_empty());

        let events = line.update(&jobs[0], JobClassification::Completed);
        assert_eq!(events, vec![SchedulerEvent::SlotAvailable]);

        let events = line.pass();
        assert_eq!(scheduled(&events), vec![3]);
    }

    #[test]
    fn test_setup_and_cleanup_chain_on_one_slot() {
        let setup = job(1, Recipe::setup(10, "s", 1));
        let production = job(2, Recipe::production(1, "p"));
        let cleanup = job(3, Recipe::cleanup(11, "c", 1));
        let mut line = Line::new(1, &[setup.clone(), production.clone(), cleanup.clone()]);

        let events = line.pass();
        assert_eq!(scheduled(&events), vec![1]);

        // Prepared job waits until the setup is done, not only winding down
        assert!(scheduled(&line.update(&setup, JobClassification::Completing)).is_empty());
        let events = line.update(&setup, JobClassification::Completed);
        assert_eq!(scheduled(&events), vec![2]);

        line.update(&production, JobClassification::Running);
        let events = line.update(&production, JobClassification::Completing);
        assert_eq!(scheduled(&events), vec![3]);

        assert!(line.update(&production, JobClassification::Completed).is_empty());
        let events = line.update(&cleanup, JobClassification::Completed);
        assert_eq!(events, vec![SchedulerEvent::SlotAvailable]);
        assert_eq!(line.scheduler.available_slots(), 1);
    }

    #[test]
    fn test_setup_without_successor_releases_slot() {
        let setup = job(1, Recipe::setup(10, "s", 1));
        let production = job(2, Recipe::production(1, "p"));
        let mut line = Line::new(1, &[setup.clone(), production.clone()]);
        line.pass();

        // Production aborted before it ever started
        assert!(line.update(&production, JobClassification::Completed).is_empty());
        assert!(!line.scheduler.is_blocked(&production));

        let events = line.update(&setup, JobClassification::Completed);
        assert_eq!(events, vec![SchedulerEvent::SlotAvailable]);
    }

    #[test]
    fn test_dependency_drains_only_at_threshold() {
        let setup = job(1, Recipe::setup(10, "s", 1));
        let production = job(2, Recipe::production(1, "p"));
        let mut line = Line::new(1, &[setup.clone(), production.clone()]);
        line.pass();

        for classification in [JobClassification::Running, JobClassification::Completing] {
            line.update(&setup, classification);
            assert!(line.scheduler.is_blocked(&production));
        }
        line.update(&setup, JobClassification::Completed);
        assert!(!line.scheduler.is_blocked(&production));
        assert!(line.scheduler.holds_slot(&production));
    }

    #[test]
    fn test_resumed_job_bypasses_order_and_capacity() {
        let fresh = job(1, Recipe::production(1, "a"));
        let resumed = job(2, Recipe::production(2, "b"));
        resumed.apply_progress(&ProgressUpdate {
            running_processes: Some(1),
            ..Default::default()
        });
        let mut line = Line::new(1, &[fresh.clone(), resumed.clone()]);

        let granted = line.scheduler.schedulable_jobs(&line.list.idle_jobs());
        assert_eq!(granted, vec![fresh.clone(), resumed.clone()]);

        let events = line.pass();
        assert_eq!(scheduled(&events), vec![1, 2]);

        // The overbooked slot disappears again instead of freeing capacity
        assert!(line.update(&resumed, JobClassification::Completed).is_empty());
        assert_eq!(line.scheduler.available_slots(), 0);
    }

    #[test]
    fn test_waiter_gets_released_slot() {
        let a = job(1, Recipe::production(1, "a"));
        let b = job(2, Recipe::production(2, "b"));
        let mut line = Line::new(1, &[a.clone(), b.clone()]);
        line.pass();

        // b is readied out of band while the slot is taken
        b.set_classification(JobClassification::Waiting);
        let events = line.scheduler.jobs_ready(&[b.clone()]).unwrap();
        assert_eq!(events, vec![SchedulerEvent::Suspended(b.clone())]);

        let events = line.update(&a, JobClassification::Completed);
        assert_eq!(events, vec![SchedulerEvent::Scheduled(b.clone())]);
    }
}
