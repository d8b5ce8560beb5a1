// Panic isolation for strategy callbacks on the task queue
use std::panic::catch_unwind;
use tracing::error;

/// Result of a panic-guarded execution
#[derive(Debug)]
pub enum PanicGuardResult<T> {
    Success(T),
    Panicked(String),
}

/// Execute a closure with panic isolation
///
/// A panic is caught and returned as `PanicGuardResult::Panicked`, so a
/// broken strategy cannot take the task queue down with it.
///
/// # Example
/// ```text
/// let result = execute_guarded(AssertUnwindSafe(|| scheduler.job_updated(&job, current)));
///
/// if let PanicGuardResult::Panicked(msg) = result {
///     // job is still removed from the list
/// }
/// ```
pub fn execute_guarded<F, T>(f: F) -> PanicGuardResult<T>
where
    F: FnOnce() -> T + std::panic::UnwindSafe,
{
    match catch_unwind(f) {
        Ok(result) => PanicGuardResult::Success(result),
        Err(panic_info) => {
            let panic_msg = if let Some(s) = panic_info.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = panic_info.downcast_ref::<String>() {
                s.clone()
            } else {
                "Unknown panic".to_string()
            };

            error!(panic_msg = %panic_msg, "Strategy callback panicked");
            PanicGuardResult::Panicked(panic_msg)
        }
    }
}
