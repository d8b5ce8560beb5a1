//! Seamless scheduler - one line, successive jobs overlap
//!
//! Exactly one job holds the running slot. A job that winds down
//! (`Completing`) is detached into a completing slot so its successor can
//! take the line while the last parts leave it. Jobs found with progress
//! after a restart are parked in resume slots until they report again.

use super::{
    dependency_threshold, is_follow_up_of, joins_chain, DependencyGraph, JobScheduler,
    SchedulerEvent,
};
use crate::application::job_list::JobList;
use crate::application::slot_pool::SlotPool;
use crate::domain::error::{DomainError, Result};
use crate::domain::{JobClassification, JobData};
use std::sync::Arc;
use tracing::{debug, warn};

pub struct SeamlessScheduler {
    list: Arc<JobList>,
    running: SlotPool<Arc<JobData>>,
    completing: SlotPool<Arc<JobData>>,
    resume: SlotPool<Arc<JobData>>,
    dependencies: DependencyGraph,
}

impl SeamlessScheduler {
    pub fn new(list: Arc<JobList>) -> Self {
        Self {
            list,
            running: SlotPool::new(1),
            completing: SlotPool::new(0),
            resume: SlotPool::new(0),
            dependencies: DependencyGraph::new(),
        }
    }

    /// Job holding the line
    pub fn running_job(&self) -> Option<Arc<JobData>> {
        self.running.first_occupant().cloned()
    }

    pub fn is_completing(&self, job: &Arc<JobData>) -> bool {
        self.completing.has_slot(job)
    }

    pub fn is_resuming(&self, job: &Arc<JobData>) -> bool {
        self.resume.has_slot(job)
    }

    pub fn is_blocked(&self, job: &JobData) -> bool {
        self.dependencies.is_blocked(job)
    }

    fn is_tracked(&self, job: &Arc<JobData>) -> bool {
        self.running.has_slot(job)
            || self.completing.has_slot(job)
            || self.resume.has_slot(job)
            || self.dependencies.is_blocked(job)
    }

    /// True if the running job winds down and its own cleanup is next in line
    fn cleanup_pending(&self, holder: &JobData) -> bool {
        holder.classification() >= JobClassification::Completing
            && self
                .list
                .next(holder)
                .is_some_and(|next| next.is_cleanup_of(holder))
    }

    /// True if the winding-down `holder` still has a reason to keep the line:
    /// the next job (ignoring `leaving`) waits on it, is prepared by it, is its
    /// cleanup or runs the same recipe.
    fn holds_line(&self, holder: &Arc<JobData>, leaving: Option<&Arc<JobData>>) -> bool {
        let next = self
            .list
            .forward_from(holder)
            .into_iter()
            .skip(1)
            .find(|next| leaving != Some(next));
        next.is_some_and(|next| {
            self.dependencies.is_blocked_by(&next, holder)
                || holder.is_prepare_of(&next)
                || next.is_cleanup_of(holder)
                || next.same_recipe_as(holder)
        })
    }

    /// Line free, or held only by a job that winds down
    fn line_open(&self) -> bool {
        self.running_job()
            .map_or(true, |holder| holder.classification() >= JobClassification::Completing)
    }

    /// Put `job` on the line. A holder that is still producing is never
    /// displaced; `job` waits for it to wind down instead.
    fn take_running(&mut self, job: &Arc<JobData>, events: &mut Vec<SchedulerEvent>) -> Result<()> {
        if let Some(holder) = self.running_job() {
            if holder.classification() < JobClassification::Completing {
                debug!(
                    job_id = job.id(),
                    running_id = holder.id(),
                    "Line busy, job waits for the running job"
                );
                self.dependencies
                    .add(Arc::clone(job), holder, JobClassification::Completing);
                events.push(SchedulerEvent::Suspended(Arc::clone(job)));
                return Ok(());
            }
            self.detach(&holder)?;
        }

        if !self.running.try_assign(Arc::clone(job)) {
            return Err(DomainError::InvalidOperation(format!(
                "running slot unavailable for job {}",
                job.id()
            )));
        }
        debug!(job_id = job.id(), "Job took the running slot");
        events.push(SchedulerEvent::Scheduled(Arc::clone(job)));
        Ok(())
    }

    /// Move the running job into a fresh completing slot
    fn detach(&mut self, job: &Arc<JobData>) -> Result<()> {
        self.park_completing(job)?;
        if !self.running.try_release(job) {
            return Err(DomainError::InvalidOperation(format!(
                "job {} does not hold the running slot",
                job.id()
            )));
        }
        debug!(job_id = job.id(), "Job detached into completing slot");
        Ok(())
    }

    fn park_completing(&mut self, job: &Arc<JobData>) -> Result<()> {
        let size = self.completing.size();
        if !self.completing.try_resize(size + 1) || !self.completing.try_assign(Arc::clone(job)) {
            return Err(DomainError::InvalidOperation(format!(
                "job {} cannot take a completing slot",
                job.id()
            )));
        }
        Ok(())
    }

    fn promote(&mut self, jobs: Vec<Arc<JobData>>, events: &mut Vec<SchedulerEvent>) -> Result<()> {
        if jobs.is_empty() {
            events.push(SchedulerEvent::SlotAvailable);
            return Ok(());
        }
        for job in &jobs {
            self.take_running(job, events)?;
        }
        Ok(())
    }

    fn running_updated(
        &mut self,
        job: &Arc<JobData>,
        classification: JobClassification,
        events: &mut Vec<SchedulerEvent>,
    ) -> Result<()> {
        match classification {
            JobClassification::Completing => {
                let promoted = self.dependencies.resolve(job, classification);
                if !promoted.is_empty() {
                    // Successor takes the line, the job winds down aside
                    self.detach(job)?;
                    return self.promote(promoted, events);
                }

                if !self.holds_line(job, None) {
                    self.detach(job)?;
                }
                events.push(SchedulerEvent::SlotAvailable);
                Ok(())
            }
            JobClassification::Completed => {
                self.running.try_release(job);
                let promoted = self.dependencies.resolve(job, classification);
                self.promote(promoted, events)
            }
            _ => Ok(()),
        }
    }

    fn completing_updated(
        &mut self,
        job: &Arc<JobData>,
        classification: JobClassification,
        events: &mut Vec<SchedulerEvent>,
    ) -> Result<()> {
        if classification < JobClassification::Completed {
            return Ok(());
        }
        self.completing.try_release(job);
        let size = self.completing.size();
        self.completing.try_resize(size.saturating_sub(1));

        let promoted = self.dependencies.resolve(job, classification);
        self.promote(promoted, events)
    }

    fn resume_updated(
        &mut self,
        job: &Arc<JobData>,
        classification: JobClassification,
        events: &mut Vec<SchedulerEvent>,
    ) -> Result<()> {
        if classification < JobClassification::Running {
            return Ok(());
        }

        self.resume.try_release(job);
        let size = self.resume.size();
        self.resume.try_resize(size.saturating_sub(1));

        match classification {
            JobClassification::Running => match self.running_job() {
                Some(holder) if holder.classification() < JobClassification::Completing => {
                    warn!(
                        job_id = job.id(),
                        running_id = holder.id(),
                        "Resumed job runs next to the running job"
                    );
                    self.park_completing(job)?;
                }
                holder => {
                    if let Some(holder) = holder {
                        self.detach(&holder)?;
                    }
                    self.running.try_assign(Arc::clone(job));
                    debug!(job_id = job.id(), "Resumed job took the running slot");
                }
            },
            JobClassification::Completing => self.park_completing(job)?,
            _ => {}
        }

        let promoted = self.dependencies.resolve(job, classification);
        if classification >= JobClassification::Completed {
            return self.promote(promoted, events);
        }
        if promoted.is_empty() {
            if self.line_open() {
                events.push(SchedulerEvent::SlotAvailable);
            }
            return Ok(());
        }
        for dependent in &promoted {
            self.take_running(dependent, events)?;
        }
        Ok(())
    }

    /// A job left the list without ever holding a slot. The running job may
    /// have kept the line only for it.
    fn unslotted_completed(
        &mut self,
        job: &Arc<JobData>,
        events: &mut Vec<SchedulerEvent>,
    ) -> Result<()> {
        // Aborted while held back: successors wait for what this job waited for
        if let Some(edge) = self.dependencies.remove(job) {
            self.dependencies.retarget(job, &edge.blocking);
        } else {
            let promoted = self.dependencies.resolve(job, JobClassification::Completed);
            for dependent in &promoted {
                self.take_running(dependent, events)?;
            }
        }

        let Some(holder) = self.running_job() else {
            return Ok(());
        };
        if holder.classification() < JobClassification::Completing {
            return Ok(());
        }
        if !self.holds_line(&holder, Some(job)) {
            debug!(
                job_id = holder.id(),
                left_id = job.id(),
                "Running job no longer holds the line"
            );
            self.detach(&holder)?;
        }
        events.push(SchedulerEvent::SlotAvailable);
        Ok(())
    }
}

impl JobScheduler for SeamlessScheduler {
    fn name(&self) -> &'static str {
        "seamless"
    }

    fn schedulable_jobs(&self, candidates: &[Arc<JobData>]) -> Vec<Arc<JobData>> {
        let Some(first) = candidates.first() else {
            return Vec::new();
        };

        // Resumed jobs go first and alone
        let resumed: Vec<_> = candidates
            .iter()
            .filter(|candidate| candidate.has_progress())
            .cloned()
            .collect();
        if !resumed.is_empty() {
            return resumed;
        }

        match self.running_job() {
            Some(holder) if !self.cleanup_pending(&holder) => candidates
                .iter()
                .filter(|candidate| is_follow_up_of(&self.list, candidate, &holder))
                .cloned()
                .collect(),
            _ => {
                // Line free: the first candidate and its direct same-recipe run
                let mut granted = vec![Arc::clone(first)];
                for candidate in &candidates[1..] {
                    let adjacent = self
                        .list
                        .previous(candidate)
                        .is_some_and(|previous| granted.last() == Some(&previous));
                    if !adjacent || !candidate.same_recipe_as(first) {
                        break;
                    }
                    granted.push(Arc::clone(candidate));
                }
                granted
            }
        }
    }

    fn jobs_ready(&mut self, jobs: &[Arc<JobData>]) -> Result<Vec<SchedulerEvent>> {
        let mut events = Vec::new();

        for job in jobs {
            if job.has_progress() {
                let size = self.resume.size();
                if !self.resume.try_resize(size + 1) || !self.resume.try_assign(Arc::clone(job)) {
                    return Err(DomainError::InvalidOperation(format!(
                        "job {} cannot take a resume slot",
                        job.id()
                    )));
                }
                debug!(job_id = job.id(), "Resumed job parked in resume slot");
                events.push(SchedulerEvent::Scheduled(Arc::clone(job)));
                continue;
            }

            let previous = self
                .list
                .previous(job)
                .filter(|previous| joins_chain(previous, job) && self.is_tracked(previous));
            if let Some(previous) = previous {
                let threshold = dependency_threshold(&previous, job);
                if previous.classification() < threshold || self.dependencies.is_blocked(&previous) {
                    debug!(
                        job_id = job.id(),
                        blocking_id = previous.id(),
                        threshold = %threshold,
                        "Job waits for its predecessor"
                    );
                    self.dependencies.add(Arc::clone(job), previous, threshold);
                    events.push(SchedulerEvent::Suspended(Arc::clone(job)));
                    continue;
                }
            }

            self.take_running(job, &mut events)?;
        }
        Ok(events)
    }

    fn job_updated(
        &mut self,
        job: &Arc<JobData>,
        classification: JobClassification,
    ) -> Result<Vec<SchedulerEvent>> {
        let mut events = Vec::new();

        if self.resume.has_slot(job) {
            self.resume_updated(job, classification, &mut events)?;
        } else if self.running.has_slot(job) {
            self.running_updated(job, classification, &mut events)?;
        } else if self.completing.has_slot(job) {
            self.completing_updated(job, classification, &mut events)?;
        } else if classification >= JobClassification::Completed {
            self.unslotted_completed(job, &mut events)?;
        }
        Ok(events)
    }
}
