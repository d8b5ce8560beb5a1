//! Job Orchestrator - serializes list mutations, scheduling passes and
//! classification reactions through one task queue
//!
//! The queue is an unbounded channel drained by a single spawned task that
//! owns the scheduler strategy. Nothing else ever touches the strategy, so it
//! needs no locking. Job list notifications are turned into queued commands
//! by a relay, callers of `add` wait on a oneshot reply.

mod command;
pub mod constants;
mod consumer;
mod panic_guard;
mod shutdown;

pub use panic_guard::{execute_guarded, PanicGuardResult};
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};

use crate::application::job_list::JobList;
use crate::application::scheduler::{build_scheduler, JobScheduler};
use crate::config::{OrchestratorConfig, StrategyConfig};
use crate::domain::{
    DomainError, Job, JobClassification, JobCreationRequest, JobId, ProgressUpdate,
};
use crate::error::{AppError, Result};
use crate::port::{JobDispatcher, JobFactory, JobHandler, JobRepository, RecipeProvider};
use command::{Command, QueueRelay};
use constants::{EVENT_CHANNEL_CAPACITY, SHUTDOWN_DRAIN_TIMEOUT};
use consumer::{BootState, Consumer};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{error, info, warn};

/// Collaborators of the orchestrator
pub struct OrchestratorDeps {
    pub repository: Arc<dyn JobRepository>,
    pub factory: Arc<dyn JobFactory>,
    pub recipes: Arc<dyn RecipeProvider>,
    pub dispatcher: Arc<dyn JobDispatcher>,
    /// Applied in order to every contiguous run of schedulable jobs
    pub handlers: Vec<Arc<dyn JobHandler>>,
}

/// Notifications published to subscribers
#[derive(Debug, Clone, PartialEq)]
pub enum OrchestratorEvent {
    Added(Vec<Job>),
    ProgressChanged(Job),
    StateChanged {
        previous: JobClassification,
        current: JobClassification,
        job: Job,
    },
    Scheduled(Job),
    Suspended(Job),
    SlotAvailable,
}

type SchedulerFactory = Box<dyn FnOnce(Arc<JobList>) -> Box<dyn JobScheduler> + Send>;

pub struct JobOrchestrator {
    list: Arc<JobList>,
    deps: Arc<OrchestratorDeps>,
    config: OrchestratorConfig,
    commands: mpsc::UnboundedSender<Command>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<Command>>>,
    scheduler_factory: Mutex<Option<SchedulerFactory>>,
    events: broadcast::Sender<OrchestratorEvent>,
    boot: Arc<BootState>,
    shutdown_sender: ShutdownSender,
    shutdown: ShutdownToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl JobOrchestrator {
    pub fn new(deps: OrchestratorDeps, config: OrchestratorConfig) -> Self {
        let list = Arc::new(JobList::new());
        let (commands, receiver) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (shutdown_sender, shutdown) = shutdown_channel();

        list.subscribe(Arc::new(QueueRelay::new(commands.clone())));

        Self {
            list,
            deps: Arc::new(deps),
            config,
            commands,
            receiver: Mutex::new(Some(receiver)),
            scheduler_factory: Mutex::new(None),
            events,
            boot: Arc::new(BootState::default()),
            shutdown_sender,
            shutdown,
            handle: Mutex::new(None),
        }
    }

    /// Select one of the built-in strategies
    pub fn configure(&self, strategy: StrategyConfig) {
        self.configure_with(move |list| build_scheduler(&strategy, list));
    }

    /// Install a custom strategy, built once the task queue starts
    pub fn configure_with<F>(&self, factory: F)
    where
        F: FnOnce(Arc<JobList>) -> Box<dyn JobScheduler> + Send + 'static,
    {
        *self.scheduler_factory.lock() = Some(Box::new(factory));
    }

    /// Spawn the task queue and queue the boot sequence.
    ///
    /// Must be called within a tokio runtime.
    pub fn start(&self) -> Result<()> {
        if self.shutdown.is_shutdown() {
            return Err(AppError::InvalidState("orchestrator was stopped".into()));
        }

        let mut receiver_slot = self.receiver.lock();
        let Some(receiver) = receiver_slot.take() else {
            return Err(AppError::InvalidState("orchestrator already started".into()));
        };
        let Some(factory) = self.scheduler_factory.lock().take() else {
            *receiver_slot = Some(receiver);
            return Err(AppError::InvalidState(
                "no scheduler strategy configured".into(),
            ));
        };

        let scheduler = factory(Arc::clone(&self.list));
        info!(strategy = scheduler.name(), "Job orchestrator starting");

        let consumer = Consumer {
            list: Arc::clone(&self.list),
            scheduler,
            deps: Arc::clone(&self.deps),
            commands: self.commands.clone(),
            events: self.events.clone(),
            boot: Arc::clone(&self.boot),
            shutdown: self.shutdown.clone(),
        };
        *self.handle.lock() = Some(tokio::spawn(consumer.run(receiver)));

        self.enqueue(Command::Boot)
    }

    /// Stop accepting work and let the queue drain
    pub async fn stop(&self) {
        self.shutdown_sender.shutdown();

        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            match tokio::time::timeout(SHUTDOWN_DRAIN_TIMEOUT, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(error = %e, "Task queue terminated abnormally"),
                Err(_) => warn!("Task queue did not drain in time"),
            }
        }
        info!("Job orchestrator stopped");
    }

    /// Create jobs and place them in the list.
    ///
    /// Resolves once the list mutation ran on the task queue; a scheduling
    /// pass is queued right after.
    pub async fn add(&self, request: JobCreationRequest) -> Result<Vec<Job>> {
        if self.shutdown.is_shutdown() {
            return Err(AppError::InvalidState("orchestrator is stopped".into()));
        }
        if self.handle.lock().is_none() {
            return Err(AppError::InvalidState("orchestrator is not started".into()));
        }

        let (reply, response) = oneshot::channel();
        self.enqueue(Command::Add { request, reply })?;
        response
            .await
            .map_err(|_| AppError::Internal("task queue dropped the add request".into()))?
    }

    /// Wait until boot finished and every resumed job reached `Running`.
    ///
    /// Returns true if the timeout was hit.
    pub async fn await_boot(&self, timeout_secs: u64) -> bool {
        let deadline = Instant::now() + Duration::from_secs(timeout_secs);
        let interval = Duration::from_millis(self.config.boot_poll_interval_ms);

        loop {
            if self.boot.is_settled(&self.list) {
                return false;
            }
            if Instant::now() >= deadline {
                warn!(timeout_secs, "Boot did not settle in time");
                return true;
            }
            tokio::time::sleep(interval).await;
        }
    }

    /// Report a classification computed by the job state machine
    pub fn update_classification(&self, id: JobId, classification: JobClassification) -> Result<()> {
        let job = self.list.get(id).ok_or(DomainError::JobNotFound(id))?;
        job.set_classification(classification);
        Ok(())
    }

    pub fn record_progress(&self, id: JobId, update: ProgressUpdate) -> Result<()> {
        let job = self.list.get(id).ok_or(DomainError::JobNotFound(id))?;
        job.apply_progress(&update);
        Ok(())
    }

    /// Public snapshot of the queue in list order
    pub fn jobs(&self) -> Vec<Job> {
        self.list
            .snapshot()
            .iter()
            .map(|job| self.list.to_public(job))
            .collect()
    }

    pub fn job(&self, id: JobId) -> Option<Job> {
        self.list.get(id).map(|job| self.list.to_public(&job))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OrchestratorEvent> {
        self.events.subscribe()
    }

    /// Read access for diagnostics
    pub fn job_list(&self) -> Arc<JobList> {
        Arc::clone(&self.list)
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    fn enqueue(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| AppError::InvalidState("task queue is closed".into()))
    }
}
