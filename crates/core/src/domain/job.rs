// Job Domain Model
//
// Two shapes of the same job:
// - `JobData`: internal, shared (`Arc`) and mutable through its progress lock
// - `Job`: public read-only snapshot handed to dispatch/UI code

use crate::domain::recipe::{Recipe, RecipeId, RecipeKind};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Job ID (assigned by the job factory)
pub type JobId = u64;

/// Ordered lifecycle stage of a job.
///
/// Ordering is load-bearing: `a >= JobClassification::Completing` reads as
/// "has progressed at least into its completion tail".
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobClassification {
    #[default]
    Idle,
    /// Marked ready by the orchestrator, not yet running
    Waiting,
    Running,
    Completing,
    Completed,
}

impl std::fmt::Display for JobClassification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobClassification::Idle => write!(f, "IDLE"),
            JobClassification::Waiting => write!(f, "WAITING"),
            JobClassification::Running => write!(f, "RUNNING"),
            JobClassification::Completing => write!(f, "COMPLETING"),
            JobClassification::Completed => write!(f, "COMPLETED"),
        }
    }
}

/// Mutable progress snapshot of a job
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobProgress {
    pub classification: JobClassification,
    pub success_count: u32,
    pub failure_count: u32,
    pub rework_count: u32,
    pub running_processes: u32,
}

/// Progress report coming from process execution
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProgressUpdate {
    #[serde(default)]
    pub succeeded: u32,
    #[serde(default)]
    pub failed: u32,
    #[serde(default)]
    pub reworked: u32,
    /// Absolute number of processes currently running, if it changed
    #[serde(default)]
    pub running_processes: Option<u32>,
}

/// Receives change notifications of a single job
pub trait JobObserver: Send + Sync {
    fn progress_changed(&self, job: &Arc<JobData>);

    fn state_changed(
        &self,
        previous: JobClassification,
        current: JobClassification,
        job: &Arc<JobData>,
    );
}

/// Internal job shape carrying the full mutable job data
pub struct JobData {
    id: JobId,
    recipe: Arc<Recipe>,
    amount: u32,
    progress: RwLock<JobProgress>,
    observer: Mutex<Option<Arc<dyn JobObserver>>>,
}

impl JobData {
    pub fn new(id: JobId, recipe: Arc<Recipe>, amount: u32) -> Self {
        Self::with_progress(id, recipe, amount, JobProgress::default())
    }

    pub fn with_progress(id: JobId, recipe: Arc<Recipe>, amount: u32, progress: JobProgress) -> Self {
        Self {
            id,
            recipe,
            amount,
            progress: RwLock::new(progress),
            observer: Mutex::new(None),
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn recipe(&self) -> &Arc<Recipe> {
        &self.recipe
    }

    pub fn recipe_id(&self) -> RecipeId {
        self.recipe.id
    }

    pub fn amount(&self) -> u32 {
        self.amount
    }

    pub fn classification(&self) -> JobClassification {
        self.progress.read().classification
    }

    pub fn progress(&self) -> JobProgress {
        self.progress.read().clone()
    }

    /// True if the job ran processes before (typically before a restart)
    pub fn has_progress(&self) -> bool {
        let progress = self.progress.read();
        progress.running_processes > 0
            || progress.success_count > 0
            || progress.failure_count > 0
            || progress.rework_count > 0
    }

    pub fn is_production(&self) -> bool {
        self.recipe.kind == RecipeKind::Production
    }

    pub fn is_setup(&self) -> bool {
        self.recipe.kind == RecipeKind::Setup
    }

    pub fn is_cleanup(&self) -> bool {
        self.recipe.kind == RecipeKind::Cleanup
    }

    /// Setup job that prepares the line for `other`
    pub fn is_prepare_of(&self, other: &JobData) -> bool {
        self.is_setup() && self.recipe.target_recipe == Some(other.recipe_id())
    }

    /// Cleanup job that cleans up after `other`
    pub fn is_cleanup_of(&self, other: &JobData) -> bool {
        self.is_cleanup() && self.recipe.target_recipe == Some(other.recipe_id())
    }

    pub fn same_recipe_as(&self, other: &JobData) -> bool {
        self.recipe_id() == other.recipe_id()
    }

    /// Set a new classification and notify the attached observer.
    ///
    /// Returns the previous classification. No notification is raised if the
    /// classification did not change.
    pub fn set_classification(self: &Arc<Self>, classification: JobClassification) -> JobClassification {
        let previous = {
            let mut progress = self.progress.write();
            std::mem::replace(&mut progress.classification, classification)
        };

        if previous != classification {
            if let Some(observer) = self.observer() {
                observer.state_changed(previous, classification, self);
            }
        }
        previous
    }

    /// Apply a progress report and notify the attached observer
    pub fn apply_progress(self: &Arc<Self>, update: &ProgressUpdate) {
        {
            let mut progress = self.progress.write();
            progress.success_count = progress.success_count.saturating_add(update.succeeded);
            progress.failure_count = progress.failure_count.saturating_add(update.failed);
            progress.rework_count = progress.rework_count.saturating_add(update.reworked);
            if let Some(running) = update.running_processes {
                progress.running_processes = running;
            }
        }

        if let Some(observer) = self.observer() {
            observer.progress_changed(self);
        }
    }

    /// Register for change notification (replaces any previous observer)
    pub fn attach(&self, observer: Arc<dyn JobObserver>) {
        *self.observer.lock() = Some(observer);
    }

    pub fn detach(&self) {
        self.observer.lock().take();
    }

    pub fn is_attached(&self) -> bool {
        self.observer.lock().is_some()
    }

    fn observer(&self) -> Option<Arc<dyn JobObserver>> {
        self.observer.lock().clone()
    }
}

impl PartialEq for JobData {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for JobData {}

impl std::hash::Hash for JobData {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl std::fmt::Debug for JobData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobData")
            .field("id", &self.id)
            .field("recipe", &self.recipe.id)
            .field("amount", &self.amount)
            .field("progress", &*self.progress.read())
            .finish()
    }
}

/// Public read-only job shape (identity, classification, counts, navigation)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub recipe_id: RecipeId,
    pub recipe_kind: RecipeKind,
    pub amount: u32,
    pub classification: JobClassification,
    pub success_count: u32,
    pub failure_count: u32,
    pub rework_count: u32,
    pub running_processes: u32,
    pub previous_id: Option<JobId>,
    pub next_id: Option<JobId>,
}

impl Job {
    pub fn from_data(data: &JobData, previous_id: Option<JobId>, next_id: Option<JobId>) -> Self {
        let progress = data.progress();
        Self {
            id: data.id(),
            recipe_id: data.recipe_id(),
            recipe_kind: data.recipe().kind,
            amount: data.amount(),
            classification: progress.classification,
            success_count: progress.success_count,
            failure_count: progress.failure_count,
            rework_count: progress.rework_count,
            running_processes: progress.running_processes,
            previous_id,
            next_id,
        }
    }
}

/// Template for a job to create
#[derive(Debug, Clone)]
pub struct JobTemplate {
    pub recipe: Arc<Recipe>,
    pub amount: u32,
}

impl JobTemplate {
    pub fn new(recipe: Arc<Recipe>, amount: u32) -> Self {
        Self { recipe, amount }
    }
}

/// Persisted job record used to reconstruct the queue at boot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedJob {
    pub id: JobId,
    pub recipe_id: RecipeId,
    pub amount: u32,
    pub classification: JobClassification,
    #[serde(default)]
    pub success_count: u32,
    #[serde(default)]
    pub failure_count: u32,
    #[serde(default)]
    pub rework_count: u32,
    #[serde(default)]
    pub running_processes: u32,
    /// Job preceding this one in the queue
    pub previous_id: Option<JobId>,
}

impl PersistedJob {
    pub fn from_data(data: &JobData, previous_id: Option<JobId>) -> Self {
        let progress = data.progress();
        Self {
            id: data.id(),
            recipe_id: data.recipe_id(),
            amount: data.amount(),
            classification: progress.classification,
            success_count: progress.success_count,
            failure_count: progress.failure_count,
            rework_count: progress.rework_count,
            running_processes: progress.running_processes,
            previous_id,
        }
    }
}
