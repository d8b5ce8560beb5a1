// In-Memory JobRepository Implementation

use async_trait::async_trait;
use lineflow_core::domain::{JobClassification, JobData, JobId, ModifiedJobsFragment, PersistedJob};
use lineflow_core::error::{AppError, Result};
use lineflow_core::port::JobRepository;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

/// Serialized form of the repository, used to carry the queue across restarts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub jobs: Vec<PersistedJob>,
}

/// Job records keyed by id. Completed jobs are dropped, so the map only ever
/// holds what `load_active` should return.
#[derive(Default)]
pub struct InMemoryJobRepository {
    records: Mutex<BTreeMap<JobId, PersistedJob>>,
}

impl InMemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        let records = snapshot
            .jobs
            .into_iter()
            .map(|record| (record.id, record))
            .collect();
        Self {
            records: Mutex::new(records),
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            jobs: self.records.lock().values().cloned().collect(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.snapshot())?)
    }

    pub fn from_json(input: &str) -> Result<Self> {
        let snapshot: Snapshot = serde_json::from_str(input)?;
        Ok(Self::from_snapshot(snapshot))
    }

    /// Load a snapshot file. A missing file yields an empty repository.
    pub fn load_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!(path = %path.display(), "No snapshot found, starting empty");
            return Ok(Self::new());
        }
        let repository = Self::from_json(&std::fs::read_to_string(path)?)?;
        info!(
            path = %path.display(),
            jobs = repository.len(),
            "Snapshot loaded"
        );
        Ok(repository)
    }

    pub fn write_file(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        info!(path = %path.display(), jobs = self.len(), "Snapshot written");
        Ok(())
    }

    pub fn get(&self, id: JobId) -> Option<PersistedJob> {
        self.records.lock().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[async_trait]
impl JobRepository for InMemoryJobRepository {
    async fn load_active(&self) -> Result<Vec<PersistedJob>> {
        Ok(self.records.lock().values().cloned().collect())
    }

    fn save(&self, fragment: &ModifiedJobsFragment) -> Result<()> {
        let mut records = self.records.lock();
        for (job, previous_id) in fragment.links() {
            if previous_id == Some(job.id()) {
                return Err(AppError::Persistence(format!(
                    "job {} cannot follow itself",
                    job.id()
                )));
            }
            records.insert(job.id(), PersistedJob::from_data(job, previous_id));
        }
        debug!(
            jobs = fragment.jobs.len(),
            previous_id = ?fragment.previous_id,
            "Fragment saved"
        );
        Ok(())
    }

    fn update_state(&self, job: &JobData, classification: JobClassification) {
        let mut records = self.records.lock();
        if classification >= JobClassification::Completed {
            records.remove(&job.id());
            return;
        }
        if let Some(record) = records.get_mut(&job.id()) {
            record.classification = classification;
        }
    }
}
