use bakeoff_core::{DebugSample, RequestSample};
use metrics_util::AtomicBucket;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::time::Instant;

/// How a run decides that no further iteration should start.
#[derive(Clone)]
pub(crate) enum Budget {
    /// Shared pool of iterations; each one is claimed by exactly one caller.
    Iterations(Arc<AtomicU64>),
    Deadline(Instant),
}

impl Budget {
    pub fn iterations(n: u64) -> Self {
        Budget::Iterations(Arc::new(AtomicU64::new(n)))
    }
}

/// Running call counts of one collector, readable while it runs.
#[derive(Clone, Debug, Default)]
pub struct Progress {
    completed: Arc<AtomicU64>,
    failed: Arc<AtomicU64>,
}

impl Progress {
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// Per-run accumulator shared by every virtual caller of one run.
#[derive(Clone)]
pub(crate) struct TaskAtomics {
    budget: Budget,
    progress: Progress,
    samples: Arc<AtomicBucket<RequestSample>>,
    debug_samples: Arc<AtomicBucket<DebugSample>>,
    debug_slots: Arc<AtomicUsize>,
}

impl TaskAtomics {
    pub fn new(budget: Budget, progress: Progress) -> Self {
        Self {
            budget,
            progress,
            samples: Arc::new(AtomicBucket::new()),
            debug_samples: Arc::new(AtomicBucket::new()),
            debug_slots: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Claims the next iteration, or reports that the run is over.
    pub fn next_iteration(&self) -> bool {
        match &self.budget {
            Budget::Iterations(remaining) => remaining
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
                .is_ok(),
            Budget::Deadline(deadline) => Instant::now() < *deadline,
        }
    }

    /// Reserves one of `cap` debug capture slots. Once `cap` slots are taken
    /// every later reservation fails, no matter how many callers race for it.
    pub fn reserve_debug_slot(&self, cap: usize) -> bool {
        self.debug_slots
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < cap).then_some(n + 1)
            })
            .is_ok()
    }

    pub fn record(&self, sample: RequestSample) {
        self.progress.completed.fetch_add(1, Ordering::Relaxed);
        if !sample.success {
            self.progress.failed.fetch_add(1, Ordering::Relaxed);
        }
        self.samples.push(sample);
    }

    pub fn record_debug(&self, sample: DebugSample) {
        self.debug_samples.push(sample);
    }

    pub fn collect(&self) -> (Vec<RequestSample>, Vec<DebugSample>) {
        let mut samples = vec![];
        self.samples
            .clear_with(|block| samples.extend_from_slice(block));
        let mut debug_samples = vec![];
        self.debug_samples
            .clear_with(|block| debug_samples.extend_from_slice(block));
        (samples, debug_samples)
    }
}
