// Logging JobDispatcher
// Stands in for the machine-cell dispatch: logs and records every decision

use lineflow_core::domain::{Job, JobId};
use lineflow_core::port::JobDispatcher;
use parking_lot::Mutex;
use tracing::info;

#[derive(Default)]
pub struct LoggingDispatcher {
    started: Mutex<Vec<JobId>>,
    suspended: Mutex<Vec<JobId>>,
}

impl LoggingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids of started jobs in dispatch order
    pub fn started(&self) -> Vec<JobId> {
        self.started.lock().clone()
    }

    pub fn suspended(&self) -> Vec<JobId> {
        self.suspended.lock().clone()
    }
}

impl JobDispatcher for LoggingDispatcher {
    fn start(&self, job: &Job) {
        info!(
            job_id = job.id,
            recipe_id = job.recipe_id,
            recipe_kind = %job.recipe_kind,
            amount = job.amount,
            "Dispatch: start job"
        );
        self.started.lock().push(job.id);
    }

    fn suspend(&self, job: &Job) {
        info!(job_id = job.id, "Dispatch: hold job back");
        self.suspended.lock().push(job.id);
    }
}
