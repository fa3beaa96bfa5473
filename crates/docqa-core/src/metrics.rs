//! Rolling retrieval/rerank/generation statistics.
//!
//! One `MetricsCollector` is created per process and handed to the index and
//! the orchestrator as an `Arc`. Writers use `try_lock` so a contended or
//! poisoned lock drops the sample instead of stalling a query; dropped samples
//! are counted.

use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, TryLockError};
use std::time::Duration;

use crate::config::MetricsSettings;

#[derive(Debug, Clone, Copy)]
struct RetrievalSample {
    latency: Duration,
    count: usize,
}

#[derive(Debug, Default)]
struct Inner {
    retrieval_samples: VecDeque<RetrievalSample>,
    retrievals_recorded: u64,
    last_retrieval_time: Option<Duration>,
    last_retrieval_count: usize,
    last_retrieval_sources: Vec<String>,
    last_rerank_time: Option<Duration>,
    rerank_count: u64,
    generation_samples: VecDeque<Duration>,
    last_generation_time: Option<Duration>,
}

#[derive(Debug)]
pub struct MetricsCollector {
    inner: Mutex<Inner>,
    retrieval_window: usize,
    generation_window: usize,
    dropped: AtomicU64,
}

/// Point-in-time copy of the collector. Latencies are in seconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub last_retrieval_time: Option<f64>,
    pub avg_retrieval_time: Option<f64>,
    pub last_retrieval_count: usize,
    pub last_retrieval_sources: Vec<String>,
    /// Mean candidate count over the retrieval window.
    pub avg_retrieval_count: Option<f64>,
    pub retrieval_samples: usize,
    /// Retrieval samples accepted since startup, including ones since evicted from the window.
    pub total_retrievals: u64,
    pub last_rerank_time: Option<f64>,
    pub rerank_count: u64,
    pub last_generation_time: Option<f64>,
    pub avg_generation_time: Option<f64>,
    pub generation_samples: usize,
    pub dropped_samples: u64,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new(&MetricsSettings::default())
    }
}

impl MetricsCollector {
    pub fn new(settings: &MetricsSettings) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            retrieval_window: settings.retrieval_window.max(1),
            generation_window: settings.generation_window.max(1),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn record_retrieval(&self, latency: Duration, count: usize, sources: Vec<String>) {
        let window = self.retrieval_window;
        self.with_inner(|m| {
            m.last_retrieval_time = Some(latency);
            m.last_retrieval_count = count;
            m.last_retrieval_sources = sources;
            m.retrieval_samples.push_back(RetrievalSample { latency, count });
            m.retrievals_recorded += 1;
            while m.retrieval_samples.len() > window {
                m.retrieval_samples.pop_front();
            }
        });
    }

    pub fn record_rerank(&self, latency: Duration) {
        self.with_inner(|m| {
            m.last_rerank_time = Some(latency);
            m.rerank_count += 1;
        });
    }

    pub fn record_generation(&self, latency: Duration) {
        let window = self.generation_window;
        self.with_inner(|m| {
            m.last_generation_time = Some(latency);
            m.generation_samples.push_back(latency);
            while m.generation_samples.len() > window {
                m.generation_samples.pop_front();
            }
        });
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let guard = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let avg_retrieval = average(guard.retrieval_samples.iter().map(|s| s.latency));
        let avg_generation = average(guard.generation_samples.iter().copied());
        let avg_count = if guard.retrieval_samples.is_empty() {
            None
        } else {
            let total: usize = guard.retrieval_samples.iter().map(|s| s.count).sum();
            Some(total as f64 / guard.retrieval_samples.len() as f64)
        };
        MetricsSnapshot {
            last_retrieval_time: guard.last_retrieval_time.map(|d| d.as_secs_f64()),
            avg_retrieval_time: avg_retrieval,
            last_retrieval_count: guard.last_retrieval_count,
            last_retrieval_sources: guard.last_retrieval_sources.clone(),
            avg_retrieval_count: avg_count,
            retrieval_samples: guard.retrieval_samples.len(),
            total_retrievals: guard.retrievals_recorded,
            last_rerank_time: guard.last_rerank_time.map(|d| d.as_secs_f64()),
            rerank_count: guard.rerank_count,
            last_generation_time: guard.last_generation_time.map(|d| d.as_secs_f64()),
            avg_generation_time: avg_generation,
            generation_samples: guard.generation_samples.len(),
            dropped_samples: self.dropped.load(Ordering::Relaxed),
        }
    }

    fn with_inner<F: FnOnce(&mut Inner)>(&self, f: F) {
        match self.inner.try_lock() {
            Ok(mut guard) => f(&mut guard),
            Err(TryLockError::WouldBlock) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
            Err(TryLockError::Poisoned(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("metrics lock poisoned; sample dropped");
            }
        }
    }
}

fn average<I: Iterator<Item = Duration>>(samples: I) -> Option<f64> {
    let (sum, n) = samples.fold((0.0f64, 0usize), |(sum, n), d| (sum + d.as_secs_f64(), n + 1));
    if n == 0 { None } else { Some(sum / n as f64) }
}
