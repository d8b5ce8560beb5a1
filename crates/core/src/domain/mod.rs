// Domain Layer - Pure business logic and entities

pub mod error;
pub mod job;
pub mod position;
pub mod recipe;

// Re-exports
pub use error::DomainError;
pub use job::{
    Job, JobClassification, JobData, JobId, JobObserver, JobProgress, JobTemplate, PersistedJob,
    ProgressUpdate,
};
pub use position::{JobCreationRequest, JobPosition, ModifiedJobsFragment};
pub use recipe::{Recipe, RecipeId, RecipeKind};
