use std::sync::atomic::{AtomicBool, Ordering};

/// Single-flight gate for image exports. A second request while one is
/// running is rejected rather than queued.
#[derive(Debug, Default)]
pub struct ExportCoordinator {
    busy: AtomicBool,
}

impl ExportCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self) -> Option<ExportGuard<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| ExportGuard { busy: &self.busy })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Holds the coordinator busy until dropped, on success and failure alike.
#[derive(Debug)]
pub struct ExportGuard<'a> {
    busy: &'a AtomicBool,
}

impl Drop for ExportGuard<'_> {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}
