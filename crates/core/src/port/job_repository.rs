// Job Repository Port (Interface)

use crate::domain::{JobClassification, JobData, ModifiedJobsFragment, PersistedJob};
use crate::error::Result;
use async_trait::async_trait;

/// Persistence interface for the job queue.
///
/// `save` runs synchronously inside every job list mutation, before any
/// listener is notified. Implementations must be idempotent; the core never
/// retries.
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Load all jobs that were still active at shutdown
    async fn load_active(&self) -> Result<Vec<PersistedJob>>;

    /// Persist the modified slice of the queue (job records and their links)
    fn save(&self, fragment: &ModifiedJobsFragment) -> Result<()>;

    /// Persist a classification change (fire-and-forget)
    fn update_state(&self, job: &JobData, classification: JobClassification);
}
