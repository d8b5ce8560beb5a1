// Job placement directives and the fragment handed to persistence

use crate::domain::job::{JobData, JobId, JobTemplate};
use crate::domain::recipe::RecipeId;
use std::sync::Arc;

/// Where jobs enter the job list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPosition {
    /// After the last job
    Append,
    /// Before the first job
    Start,
    /// Directly before the referenced job
    BeforeOther(JobId),
    /// Directly after the referenced job
    AfterOther(JobId),
    /// Splice a group whose jobs are partially listed already back into the list
    AroundExisting,
    /// After the last job with the given recipe
    AppendToRecipe(RecipeId),
}

impl std::fmt::Display for JobPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobPosition::Append => write!(f, "APPEND"),
            JobPosition::Start => write!(f, "START"),
            JobPosition::BeforeOther(id) => write!(f, "BEFORE({id})"),
            JobPosition::AfterOther(id) => write!(f, "AFTER({id})"),
            JobPosition::AroundExisting => write!(f, "AROUND_EXISTING"),
            JobPosition::AppendToRecipe(recipe) => write!(f, "APPEND_TO_RECIPE({recipe})"),
        }
    }
}

/// Contiguous slice of the list touched by a mutation, in list order.
///
/// `previous_id` is the job preceding `jobs[0]`; every following entry is
/// preceded by the entry before it.
#[derive(Debug, Clone, Default)]
pub struct ModifiedJobsFragment {
    pub previous_id: Option<JobId>,
    pub jobs: Vec<Arc<JobData>>,
}

impl ModifiedJobsFragment {
    /// Pairs of (job, id of the job now preceding it)
    pub fn links(&self) -> impl Iterator<Item = (&Arc<JobData>, Option<JobId>)> {
        let mut previous = self.previous_id;
        self.jobs.iter().map(move |job| {
            let link = previous;
            previous = Some(job.id());
            (job, link)
        })
    }
}

/// Request to create and enqueue jobs
#[derive(Debug, Clone)]
pub struct JobCreationRequest {
    pub templates: Vec<JobTemplate>,
    pub position: JobPosition,
}

impl JobCreationRequest {
    pub fn new(templates: Vec<JobTemplate>, position: JobPosition) -> Self {
        Self {
            templates,
            position,
        }
    }

    pub fn append(templates: Vec<JobTemplate>) -> Self {
        Self::new(templates, JobPosition::Append)
    }
}
