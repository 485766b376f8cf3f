//! Helpers shared by the integration tests.

#![allow(dead_code)]

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tasksys::prelude::*;

pub const DISCIPLINES: [WaitDiscipline; 2] = [WaitDiscipline::Spin, WaitDiscipline::Block];

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Counts invocations per index.
#[derive(Debug)]
pub struct IndexCounter {
    hits: Vec<AtomicUsize>,
}

impl IndexCounter {
    pub fn new(total: usize) -> Arc<Self> {
        Arc::new(Self {
            hits: (0..total).map(|_| AtomicUsize::new(0)).collect(),
        })
    }

    /// True when every index ran exactly once.
    pub fn exactly_once(&self) -> bool {
        self.hits.iter().all(|h| h.load(Ordering::SeqCst) == 1)
    }

    pub fn total_calls(&self) -> usize {
        self.hits.iter().map(|h| h.load(Ordering::SeqCst)).sum()
    }
}

impl Runnable for IndexCounter {
    fn run_task(&self, index: usize, total: usize) {
        assert_eq!(total, self.hits.len());
        self.hits[index].fetch_add(1, Ordering::SeqCst);
    }
}

/// Logical clock recording when each bulk's tasks started and ended.
#[derive(Debug, Default)]
pub struct Timeline {
    clock: AtomicU64,
    spans: Mutex<HashMap<u64, (u64, u64)>>,
}

impl Timeline {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A runnable tagged `tag` that stamps its first start and last end.
    pub fn runnable(self: &Arc<Self>, tag: u64) -> Arc<dyn Runnable> {
        let timeline = self.clone();
        Arc::new(move |_: usize, _: usize| {
            let start = timeline.clock.fetch_add(1, Ordering::SeqCst);
            std::hint::spin_loop();
            let end = timeline.clock.fetch_add(1, Ordering::SeqCst);

            let mut spans = timeline.spans.lock();
            let span = spans.entry(tag).or_insert((start, end));
            span.0 = span.0.min(start);
            span.1 = span.1.max(end);
        })
    }

    /// (first start, last end) of `tag`, if any of its tasks ran.
    pub fn span(&self, tag: u64) -> Option<(u64, u64)> {
        self.spans.lock().get(&tag).copied()
    }

    /// Every task of `before` ended before any task of `after` started.
    pub fn happened_before(&self, before: u64, after: u64) -> bool {
        match (self.span(before), self.span(after)) {
            (Some((_, end)), Some((start, _))) => end < start,
            _ => false,
        }
    }
}
