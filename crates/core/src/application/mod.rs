// Application Layer - job queue, slot admission and orchestration

pub mod job_list;
pub mod orchestrator;
pub mod scheduler;
pub mod slot_pool;

// Re-exports
pub use job_list::{JobList, JobListListener};
pub use orchestrator::{JobOrchestrator, OrchestratorDeps, OrchestratorEvent};
pub use scheduler::{
    build_scheduler, JobScheduler, ParallelScheduler, SchedulerEvent, SeamlessScheduler,
};
pub use slot_pool::SlotPool;
