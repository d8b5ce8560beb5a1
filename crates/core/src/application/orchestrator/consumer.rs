// Task queue consumer - the only place the strategy is driven from

use super::command::Command;
use super::panic_guard::{execute_guarded, PanicGuardResult};
use super::shutdown::ShutdownToken;
use super::{OrchestratorDeps, OrchestratorEvent};
use crate::application::job_list::JobList;
use crate::application::scheduler::{JobScheduler, SchedulerEvent};
use crate::domain::{
    Job, JobClassification, JobCreationRequest, JobData, JobId, JobPosition,
    ModifiedJobsFragment, PersistedJob,
};
use crate::error::Result;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

/// Boot progress observed by `await_boot`
#[derive(Default)]
pub(super) struct BootState {
    booted: AtomicBool,
    resumed: Mutex<Vec<Arc<JobData>>>,
}

impl BootState {
    /// True once boot ran and every resumed job reached `Running` or left
    /// the list
    pub(super) fn is_settled(&self, list: &JobList) -> bool {
        self.booted.load(Ordering::SeqCst)
            && self.resumed.lock().iter().all(|job| {
                job.classification() >= JobClassification::Running || !list.contains(job.id())
            })
    }

    fn finish(&self, resumed: Vec<Arc<JobData>>) {
        *self.resumed.lock() = resumed;
        self.booted.store(true, Ordering::SeqCst);
    }
}

pub(super) struct Consumer {
    pub(super) list: Arc<JobList>,
    pub(super) scheduler: Box<dyn JobScheduler>,
    pub(super) deps: Arc<OrchestratorDeps>,
    pub(super) commands: mpsc::UnboundedSender<Command>,
    pub(super) events: broadcast::Sender<OrchestratorEvent>,
    pub(super) boot: Arc<BootState>,
    pub(super) shutdown: ShutdownToken,
}

impl Consumer {
    pub(super) async fn run(mut self, mut receiver: mpsc::UnboundedReceiver<Command>) {
        let mut shutdown = self.shutdown.clone();
        info!(strategy = self.scheduler.name(), "Task queue running");

        loop {
            tokio::select! {
                command = receiver.recv() => match command {
                    Some(command) => self.process(command).await,
                    None => break,
                },
                _ = shutdown.wait() => {
                    // Finish what was queued before the stop, passes are skipped
                    while let Ok(command) = receiver.try_recv() {
                        self.process(command).await;
                    }
                    break;
                }
            }
        }

        info!(strategy = self.scheduler.name(), "Task queue stopped");
    }

    async fn process(&mut self, command: Command) {
        debug!(command = command.name(), "Processing command");

        match command {
            Command::Add { request, reply } => {
                let result = self.add(request);
                let succeeded = result.is_ok();
                if reply.send(result).is_err() {
                    warn!("Caller of add went away before the reply");
                }
                if succeeded {
                    self.request_pass();
                }
            }
            Command::UseAvailableSlots => self.use_available_slots(),
            Command::Added(jobs) => {
                let jobs = jobs.iter().map(|job| self.list.to_public(job)).collect();
                self.publish(OrchestratorEvent::Added(jobs));
            }
            Command::StateChanged {
                job,
                previous,
                current,
            } => self.state_changed(job, previous, current),
            Command::ProgressChanged(job) => self.progress_changed(&job),
            Command::Boot => self.boot().await,
        }
    }

    fn add(&mut self, request: JobCreationRequest) -> Result<Vec<Job>> {
        let jobs: Vec<Arc<JobData>> = request
            .templates
            .iter()
            .map(|template| self.deps.factory.create(template))
            .collect();

        let repository = Arc::clone(&self.deps.repository);
        if let Err(e) = self
            .list
            .add(jobs.clone(), request.position, |fragment| repository.save(fragment))
        {
            error!(error = %e, position = %request.position, "Failed to add jobs");
            for job in &jobs {
                self.deps.factory.destroy(job);
            }
            return Err(e);
        }

        info!(
            count = jobs.len(),
            position = %request.position,
            "Jobs added"
        );
        Ok(jobs.iter().map(|job| self.list.to_public(job)).collect())
    }

    fn request_pass(&self) {
        if self.shutdown.is_shutdown() {
            return;
        }
        if self.commands.send(Command::UseAvailableSlots).is_err() {
            debug!("Task queue closed, scheduling pass dropped");
        }
    }

    /// Offer idle jobs to the strategy and mark the granted ones ready
    fn use_available_slots(&mut self) {
        if self.shutdown.is_shutdown() {
            debug!("Stopping, scheduling pass skipped");
            return;
        }

        let idle = self.list.idle_jobs();
        if idle.is_empty() {
            return;
        }
        let granted = self.scheduler.schedulable_jobs(&idle);
        if granted.is_empty() {
            debug!(idle = idle.len(), "No schedulable job");
            return;
        }

        for mut group in self.contiguous_runs(granted) {
            for handler in &self.deps.handlers {
                handler.handle(&mut group);
            }

            let repository = Arc::clone(&self.deps.repository);
            if let Err(e) = self.list.add(group.clone(), JobPosition::AroundExisting, |fragment| {
                repository.save(fragment)
            }) {
                error!(
                    error = %e,
                    first_job_id = group.first().map(|job| job.id()),
                    "Failed to re-place schedulable jobs"
                );
                continue;
            }

            // Only now is the position recorded, the jobs may become ready
            for job in &group {
                if job.classification() == JobClassification::Idle {
                    job.set_classification(JobClassification::Waiting);
                }
            }

            match self.scheduler.jobs_ready(&group) {
                Ok(events) => self.handle_events(events),
                Err(e) => error!(
                    error = %e,
                    strategy = self.scheduler.name(),
                    "Strategy rejected ready jobs"
                ),
            }
        }
    }

    /// Split jobs into maximal runs of direct list neighbors
    fn contiguous_runs(&self, jobs: Vec<Arc<JobData>>) -> Vec<Vec<Arc<JobData>>> {
        let mut runs: Vec<Vec<Arc<JobData>>> = Vec::new();
        for job in jobs {
            let adjacent = runs
                .last()
                .and_then(|run| run.last())
                .and_then(|last| self.list.next(last))
                .is_some_and(|next| next == job);
            match runs.last_mut() {
                Some(run) if adjacent => run.push(job),
                _ => runs.push(vec![job]),
            }
        }
        runs
    }

    fn handle_events(&self, events: Vec<SchedulerEvent>) {
        for event in events {
            match event {
                SchedulerEvent::Scheduled(job) => {
                    let public = self.list.to_public(&job);
                    info!(job_id = job.id(), recipe_id = job.recipe_id(), "Job scheduled");
                    self.deps.dispatcher.start(&public);
                    self.publish(OrchestratorEvent::Scheduled(public));
                }
                SchedulerEvent::Suspended(job) => {
                    let public = self.list.to_public(&job);
                    debug!(job_id = job.id(), "Job suspended");
                    self.deps.dispatcher.suspend(&public);
                    self.publish(OrchestratorEvent::Suspended(public));
                }
                SchedulerEvent::SlotAvailable => {
                    self.publish(OrchestratorEvent::SlotAvailable);
                    self.request_pass();
                }
            }
        }
    }

    fn state_changed(
        &mut self,
        job: Arc<JobData>,
        previous: JobClassification,
        current: JobClassification,
    ) {
        self.deps.repository.update_state(&job, current);
        self.publish(OrchestratorEvent::StateChanged {
            previous,
            current,
            job: self.list.to_public(&job),
        });

        if current >= JobClassification::Completed {
            self.complete(&job, current);
            return;
        }
        // Transitions below Running do not concern slot admission
        if current < JobClassification::Running {
            return;
        }
        match self.scheduler.job_updated(&job, current) {
            Ok(events) => self.handle_events(events),
            Err(e) => error!(
                error = %e,
                job_id = job.id(),
                classification = %current,
                "Strategy failed to process classification change"
            ),
        }
    }

    /// Finalize a completed job. Whatever the strategy does, the job leaves
    /// the list.
    fn complete(&mut self, job: &Arc<JobData>, current: JobClassification) {
        let scheduler = &mut self.scheduler;
        match execute_guarded(AssertUnwindSafe(|| scheduler.job_updated(job, current))) {
            PanicGuardResult::Success(Ok(events)) => self.handle_events(events),
            PanicGuardResult::Success(Err(e)) => error!(
                error = %e,
                job_id = job.id(),
                "Strategy failed to process completion"
            ),
            PanicGuardResult::Panicked(msg) => error!(
                panic_msg = %msg,
                job_id = job.id(),
                "Strategy panicked while processing completion"
            ),
        }

        let repository = Arc::clone(&self.deps.repository);
        if let Err(e) = self.list.remove(job, |fragment| repository.save(fragment)) {
            error!(error = %e, job_id = job.id(), "Failed to remove completed job");
            return;
        }
        self.deps.factory.destroy(job);
        info!(job_id = job.id(), "Job completed");
    }

    fn progress_changed(&self, job: &Arc<JobData>) {
        // Counters are part of the job record, resume detection depends on them
        if self.list.contains(job.id()) {
            let fragment = ModifiedJobsFragment {
                previous_id: self.list.previous(job).map(|previous| previous.id()),
                jobs: vec![Arc::clone(job)],
            };
            if let Err(e) = self.deps.repository.save(&fragment) {
                error!(error = %e, job_id = job.id(), "Failed to persist job progress");
            }
        }
        self.publish(OrchestratorEvent::ProgressChanged(self.list.to_public(job)));
    }

    async fn boot(&mut self) {
        info!("Boot: loading persisted jobs");

        let records = match self.deps.repository.load_active().await {
            Ok(records) => records,
            Err(e) => {
                error!(error = %e, "Boot: failed to load persisted jobs");
                self.boot.finish(Vec::new());
                return;
            }
        };

        let mut jobs = Vec::with_capacity(records.len());
        for record in order_by_links(records) {
            let Some(recipe) = self.deps.recipes.recipe(record.recipe_id) else {
                error!(
                    job_id = record.id,
                    recipe_id = record.recipe_id,
                    "Boot: recipe of persisted job not found, job skipped"
                );
                // The record stays in the repository, its id remains taken
                self.deps.factory.reserve(record.id);
                continue;
            };
            jobs.push(self.deps.factory.restore(&record, recipe));
        }

        let resumed: Vec<Arc<JobData>> = jobs
            .iter()
            .filter(|job| job.has_progress())
            .cloned()
            .collect();
        let restored = jobs.len();

        let repository = Arc::clone(&self.deps.repository);
        match self
            .list
            .restore(jobs, |fragment| repository.save(fragment))
        {
            Ok(()) => {
                info!(restored, resumed = resumed.len(), "Boot: jobs restored");
                self.boot.finish(resumed);
            }
            Err(e) => {
                error!(error = %e, "Boot: failed to restore jobs");
                self.boot.finish(Vec::new());
            }
        }

        self.use_available_slots();
    }

    fn publish(&self, event: OrchestratorEvent) {
        // No subscriber is not an error
        let _ = self.events.send(event);
    }
}

/// Bring persisted records into list order by following their
/// `previous_id` links. Records whose links cannot be followed are appended
/// in load order.
pub(super) fn order_by_links(records: Vec<PersistedJob>) -> Vec<PersistedJob> {
    let known: HashSet<JobId> = records.iter().map(|record| record.id).collect();
    let mut remaining = records;
    let mut ordered = Vec::with_capacity(remaining.len());
    let mut cursor: Option<JobId> = None;

    while !remaining.is_empty() {
        let next = remaining.iter().position(|record| match cursor {
            Some(id) => record.previous_id == Some(id),
            None => record
                .previous_id
                .map_or(true, |previous| !known.contains(&previous)),
        });

        match next {
            Some(index) => {
                let record = remaining.remove(index);
                cursor = Some(record.id);
                ordered.push(record);
            }
            // Chain ended, continue with the next head
            None if cursor.is_some() => cursor = None,
            None => {
                warn!(
                    count = remaining.len(),
                    "Persisted job links are broken, appending remaining jobs"
                );
                ordered.append(&mut remaining);
            }
        }
    }
    ordered
}
