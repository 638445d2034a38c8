use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{FmError, FmResult, IOErrorEnum};

/// Cancellation token shared between an operation and its initiator.
///
/// The loader worker polls the token between blocking steps; `cancel` is
/// safe to call from any thread. A token can be reused after [`reset`],
/// which is how the engine recycles its single generator token between
/// tasks.
///
/// [`reset`]: Cancellable::reset
#[derive(Clone, Default)]
pub struct Cancellable {
    inner: Arc<AtomicBool>,
}

impl Cancellable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.store(true, Ordering::SeqCst);
    }

    pub fn reset(&self) {
        self.inner.store(false, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> FmResult<()> {
        if self.is_cancelled() {
            Err(FmError::new(IOErrorEnum::Cancelled, "Operation cancelled"))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_and_reset() {
        let c = Cancellable::new();
        assert!(!c.is_cancelled());
        assert!(c.check().is_ok());

        c.cancel();
        assert!(c.is_cancelled());
        assert_eq!(c.check().unwrap_err().kind(), IOErrorEnum::Cancelled);

        c.reset();
        assert!(!c.is_cancelled());
    }

    #[test]
    fn clones_share_state() {
        let a = Cancellable::new();
        let b = a.clone();
        b.cancel();
        assert!(a.is_cancelled());
    }
}
