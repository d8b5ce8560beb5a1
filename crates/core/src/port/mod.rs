// Port Layer - Interfaces for external collaborators

pub mod job_dispatcher;
pub mod job_factory; // Deterministic ids in tests
pub mod job_handler;
pub mod job_repository;
pub mod recipe_provider;

// Re-exports
pub use job_dispatcher::JobDispatcher;
pub use job_factory::{DefaultJobFactory, JobFactory};
pub use job_handler::JobHandler;
pub use job_repository::JobRepository;
pub use recipe_provider::RecipeProvider;
