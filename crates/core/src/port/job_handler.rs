// Job Handler Port
//
// Post-processing hook invoked on every contiguous run of jobs that just
// became schedulable, before the run is spliced back into the job list.
// Surrounding code uses it to attach setup/cleanup jobs.

use crate::domain::JobData;
use std::sync::Arc;

pub trait JobHandler: Send + Sync {
    /// Mutate the ordered job group in place.
    ///
    /// Jobs already in the list must keep their relative order; new jobs may
    /// be inserted anywhere in the group.
    fn handle(&self, jobs: &mut Vec<Arc<JobData>>);
}
