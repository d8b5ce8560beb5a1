// Orchestrator constants (no magic values)
use std::time::Duration;

/// Poll interval of `await_boot` (100ms)
pub const BOOT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default upper bound for the boot sequence (30s)
pub const DEFAULT_BOOT_TIMEOUT_SECS: u64 = 30;

/// Slots of the parallel strategy when nothing is configured
pub const DEFAULT_PARALLEL_SLOTS: usize = 1;

/// How long `stop` waits for the task queue to drain (5s)
pub const SHUTDOWN_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Buffered notifications per subscriber before it starts lagging
pub const EVENT_CHANNEL_CAPACITY: usize = 256;
