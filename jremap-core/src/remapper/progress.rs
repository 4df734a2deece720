// Progress reporting
use std::sync::atomic::{AtomicU64, Ordering};

/// Receives progress from long-running stages. Called from worker threads.
pub trait ProgressSink: Send + Sync {
    /// `done` of `total` candidate pairs have been scored.
    fn pairs_processed(&self, done: u64, total: u64);

    /// A pipeline stage started.
    fn stage(&self, _name: &str) {}
}

/// Discards all progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    #[inline]
    fn pairs_processed(&self, _done: u64, _total: u64) {}
}

/// Shared processed-pair counter for one matching job.
#[derive(Debug)]
pub struct PairCounter {
    done: AtomicU64,
    total: u64,
}

impl PairCounter {
    pub fn new(total: u64) -> Self {
        Self {
            done: AtomicU64::new(0),
            total,
        }
    }

    /// Record `pairs` more scored pairs and forward the running count.
    #[inline]
    pub fn advance(&self, pairs: u64, sink: &dyn ProgressSink) {
        let done = self.done.fetch_add(pairs, Ordering::Relaxed) + pairs;
        sink.pairs_processed(done, self.total);
    }

    pub fn done(&self) -> u64 {
        self.done.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> u64 {
        self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<(u64, u64)>>);

    impl ProgressSink for Recorder {
        fn pairs_processed(&self, done: u64, total: u64) {
            self.0.lock().unwrap().push((done, total));
        }
    }

    #[test]
    fn test_counter_is_monotonic() {
        let counter = PairCounter::new(10);
        let recorder = Recorder::default();
        counter.advance(4, &recorder);
        counter.advance(6, &recorder);
        assert_eq!(counter.done(), 10);
        assert_eq!(*recorder.0.lock().unwrap(), vec![(4, 10), (10, 10)]);
    }
}
