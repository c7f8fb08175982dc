use std::sync::atomic::{AtomicBool, Ordering};
use tracing::warn;

/// System-wide freeze flag blocking all financial execution.
///
/// Freezing never interrupts an in-flight run; it only stops new
/// approvals and executions from starting.
#[derive(Debug, Default)]
pub struct IncidentFreeze {
    frozen: AtomicBool,
}

impl IncidentFreeze {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn freeze(&self) {
        self.frozen.store(true, Ordering::SeqCst);
        warn!("incident freeze engaged, financial execution blocked");
    }

    pub fn thaw(&self) {
        self.frozen.store(false, Ordering::SeqCst);
        warn!("incident freeze lifted");
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::SeqCst)
    }
}
