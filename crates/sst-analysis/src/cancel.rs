//! Cooperative cancellation for long aggregation runs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{AnalysisError, Result};

/// Shared flag checked between independent units of work (one month, one
/// raster). Cloning shares the flag.
#[derive(Debug, Clone, Default)]
pub struct AbortFlag(Arc<AtomicBool>);

impl AbortFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request that in-flight work stops at the next checkpoint.
    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Return `Cancelled` once the flag is raised.
    pub fn check(&self) -> Result<()> {
        if self.is_aborted() {
            Err(AnalysisError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Checkpoint helper for optional flags.
pub(crate) fn checkpoint(flag: Option<&AbortFlag>) -> Result<()> {
    flag.map_or(Ok(()), AbortFlag::check)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abort_is_shared_between_clones() {
        let flag = AbortFlag::new();
        let worker = flag.clone();
        assert!(worker.check().is_ok());
        flag.abort();
        assert!(matches!(worker.check(), Err(AnalysisError::Cancelled)));
        assert!(checkpoint(None).is_ok());
    }
}
