// Lineflow Infrastructure - In-Memory Adapters
// Implements: JobRepository (with JSON snapshots), RecipeProvider, JobDispatcher

mod dispatcher;
mod job_repository;
mod recipe_catalog;

pub use dispatcher::LoggingDispatcher;
pub use job_repository::{InMemoryJobRepository, Snapshot};
pub use recipe_catalog::InMemoryRecipeCatalog;
