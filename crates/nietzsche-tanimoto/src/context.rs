//! Per-query context carrying the cancellation signal.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::TanimotoError;

/// Shared, cheaply clonable query context.
///
/// Every clone observes the same cancellation flag. A [`child`](Self::child)
/// context also observes its ancestors' flags, but cancelling it leaves the
/// ancestors untouched.
#[derive(Debug, Clone, Default)]
pub struct QueryContext {
    cancelled: Arc<AtomicBool>,
    ancestors: Vec<Arc<AtomicBool>>,
}

impl QueryContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// A context cancelled whenever `self` is, with its own flag on top.
    pub fn child(&self) -> Self {
        let mut ancestors = self.ancestors.clone();
        ancestors.push(Arc::clone(&self.cancelled));
        Self { cancelled: Arc::new(AtomicBool::new(false)), ancestors }
    }

    /// Signal cancellation to every holder of this context and its children.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
            || self.ancestors.iter().any(|flag| flag.load(Ordering::Relaxed))
    }

    /// `Err(Cancelled)` once this context or an ancestor has been cancelled.
    #[inline]
    pub fn check(&self) -> Result<(), TanimotoError> {
        if self.is_cancelled() {
            Err(TanimotoError::Cancelled)
        } else {
            Ok(())
        }
    }
}
