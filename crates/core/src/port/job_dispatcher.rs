// Job Dispatcher Port
// Physical dispatch of activities to machine cells happens behind this seam

use crate::domain::Job;

pub trait JobDispatcher: Send + Sync {
    /// Job was granted a slot and may start processes now
    fn start(&self, job: &Job);

    /// Job is ready but must not start processes until released
    fn suspend(&self, job: &Job);
}
