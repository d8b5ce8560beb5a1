// Task queue commands

use crate::application::job_list::JobListListener;
use crate::domain::{Job, JobClassification, JobCreationRequest, JobData};
use crate::error::Result;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

/// Unit of work executed by the orchestrator task queue
pub(super) enum Command {
    /// Create and place jobs; the caller waits on `reply`
    Add {
        request: JobCreationRequest,
        reply: oneshot::Sender<Result<Vec<Job>>>,
    },
    /// Offer idle jobs to the strategy
    UseAvailableSlots,
    Added(Vec<Arc<JobData>>),
    StateChanged {
        job: Arc<JobData>,
        previous: JobClassification,
        current: JobClassification,
    },
    ProgressChanged(Arc<JobData>),
    /// Restore persisted jobs
    Boot,
}

impl Command {
    pub(super) fn name(&self) -> &'static str {
        match self {
            Command::Add { .. } => "add",
            Command::UseAvailableSlots => "use_available_slots",
            Command::Added(_) => "added",
            Command::StateChanged { .. } => "state_changed",
            Command::ProgressChanged(_) => "progress_changed",
            Command::Boot => "boot",
        }
    }
}

/// Turns job list notifications into queued commands, so reactions run on
/// the task queue and never inside the caller that changed a job
pub(super) struct QueueRelay {
    commands: mpsc::UnboundedSender<Command>,
}

impl QueueRelay {
    pub(super) fn new(commands: mpsc::UnboundedSender<Command>) -> Self {
        Self { commands }
    }

    fn enqueue(&self, command: Command) {
        if self.commands.send(command).is_err() {
            debug!("Task queue closed, job notification dropped");
        }
    }
}

impl JobListListener for QueueRelay {
    fn added(&self, jobs: &[Arc<JobData>]) {
        self.enqueue(Command::Added(jobs.to_vec()));
    }

    fn progress_changed(&self, job: &Arc<JobData>) {
        self.enqueue(Command::ProgressChanged(Arc::clone(job)));
    }

    fn state_changed(
        &self,
        previous: JobClassification,
        current: JobClassification,
        job: &Arc<JobData>,
    ) {
        self.enqueue(Command::StateChanged {
            job: Arc::clone(job),
            previous,
            current,
        });
    }
}
