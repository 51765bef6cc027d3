/// Progress tracking shared between a transfer and observers on other threads.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};

/// Transfer state constants.
pub const STATE_IDLE: u8 = 0;
pub const STATE_IN_PROGRESS: u8 = 1;
pub const STATE_COMPLETE: u8 = 2;
pub const STATE_FAILED: u8 = 3;

pub struct TransferProgress {
    pub bytes_done: AtomicU64,
    pub bytes_total: AtomicU64,
    pub chunks_done: AtomicU64,
    pub chunks_total: AtomicU64,
    pub state: AtomicU8,
    pub last_error: Mutex<Option<String>>,
}

impl TransferProgress {
    pub fn new() -> Self {
        Self {
            bytes_done: AtomicU64::new(0),
            bytes_total: AtomicU64::new(0),
            chunks_done: AtomicU64::new(0),
            chunks_total: AtomicU64::new(0),
            state: AtomicU8::new(STATE_IDLE),
            last_error: Mutex::new(None),
        }
    }

    pub(crate) fn start(&self, bytes_total: u64, chunks_total: u64) {
        self.bytes_done.store(0, Ordering::Relaxed);
        self.chunks_done.store(0, Ordering::Relaxed);
        self.bytes_total.store(bytes_total, Ordering::Relaxed);
        self.chunks_total.store(chunks_total, Ordering::Relaxed);
        self.state.store(STATE_IN_PROGRESS, Ordering::Relaxed);
    }

    pub(crate) fn chunk_done(&self, bytes: usize) {
        self.bytes_done.fetch_add(bytes as u64, Ordering::Relaxed);
        self.chunks_done.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn complete(&self) {
        self.state.store(STATE_COMPLETE, Ordering::Relaxed);
    }

    pub(crate) fn fail(&self, message: String) {
        if let Ok(mut slot) = self.last_error.lock() {
            *slot = Some(message);
        }
        self.state.store(STATE_FAILED, Ordering::Relaxed);
    }

    pub fn state(&self) -> u8 {
        self.state.load(Ordering::Relaxed)
    }

    /// Fraction of bytes done, 1.0 for an empty transfer.
    pub fn fraction(&self) -> f64 {
        let total = self.bytes_total.load(Ordering::Relaxed);
        if total == 0 {
            return 1.0;
        }
        self.bytes_done.load(Ordering::Relaxed) as f64 / total as f64
    }
}

impl Default for TransferProgress {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle() {
        let p = TransferProgress::new();
        assert_eq!(p.state(), STATE_IDLE);
        p.start(25, 3);
        p.chunk_done(10);
        assert_eq!(p.chunks_done.load(Ordering::Relaxed), 1);
        assert!((p.fraction() - 0.4).abs() < 1e-9);
        p.fail("boom".into());
        assert_eq!(p.state(), STATE_FAILED);
        assert_eq!(p.last_error.lock().unwrap().as_deref(), Some("boom"));
    }
}
