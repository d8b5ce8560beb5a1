// Job Factory Port (creates and restores job entities)

use crate::domain::{JobData, JobId, JobProgress, JobTemplate, PersistedJob, Recipe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Job factory interface (allows deterministic ids in tests)
pub trait JobFactory: Send + Sync {
    /// Create a fresh job from a template
    fn create(&self, template: &JobTemplate) -> Arc<JobData>;

    /// Reconstruct a job from its persisted record
    fn restore(&self, record: &PersistedJob, recipe: Arc<Recipe>) -> Arc<JobData>;

    /// Make sure `id` is never handed out by `create`
    fn reserve(&self, id: JobId);

    /// Release a job that left the queue
    fn destroy(&self, job: &Arc<JobData>);
}

/// Sequential id factory (production)
pub struct DefaultJobFactory {
    next_id: AtomicU64,
}

impl DefaultJobFactory {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    pub fn starting_at(first_id: JobId) -> Self {
        Self {
            next_id: AtomicU64::new(first_id),
        }
    }
}

impl Default for DefaultJobFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl JobFactory for DefaultJobFactory {
    fn create(&self, template: &JobTemplate) -> Arc<JobData> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        Arc::new(JobData::new(id, Arc::clone(&template.recipe), template.amount))
    }

    /// Restored jobs start over as `Idle` with their counters intact, so the
    /// scheduler can tell them apart from fresh submissions.
    fn restore(&self, record: &PersistedJob, recipe: Arc<Recipe>) -> Arc<JobData> {
        self.reserve(record.id);

        let progress = JobProgress {
            success_count: record.success_count,
            failure_count: record.failure_count,
            rework_count: record.rework_count,
            running_processes: record.running_processes,
            ..Default::default()
        };
        Arc::new(JobData::with_progress(record.id, recipe, record.amount, progress))
    }

    fn reserve(&self, id: JobId) {
        self.next_id.fetch_max(id.saturating_add(1), Ordering::SeqCst);
    }

    fn destroy(&self, job: &Arc<JobData>) {
        job.detach();
        debug!(job_id = job.id(), "Job destroyed");
    }
}
