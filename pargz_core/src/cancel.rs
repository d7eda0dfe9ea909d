use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation flag shared between a caller and a running job.
///
/// Workers poll it at chunk boundaries, so a chunk that is already being
/// compressed or decompressed always completes.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Per-run stop condition: the caller's token, plus an internal flag raised
/// when any worker fails so its siblings stop taking new chunks.
pub(crate) struct StopSignal<'a> {
    token: &'a CancellationToken,
    failed: AtomicBool,
}

impl<'a> StopSignal<'a> {
    pub(crate) fn new(token: &'a CancellationToken) -> Self {
        Self {
            token,
            failed: AtomicBool::new(false),
        }
    }

    pub(crate) fn should_stop(&self) -> bool {
        self.token.is_cancelled() || self.failed.load(Ordering::Relaxed)
    }

    pub(crate) fn fail(&self) {
        self.failed.store(true, Ordering::SeqCst);
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_state() {
        let token = CancellationToken::new();
        let observer = token.clone();
        assert!(!observer.is_cancelled());
        token.cancel();
        assert!(observer.is_cancelled());
    }

    #[test]
    fn worker_failure_stops_without_cancelling() {
        let token = CancellationToken::new();
        let stop = StopSignal::new(&token);
        assert!(!stop.should_stop());
        stop.fail();
        assert!(stop.should_stop());
        assert!(!stop.is_cancelled());
    }
}
