//! Runtime counters and task latency statistics.

pub mod metrics;

pub use metrics::{Metrics, MetricsSnapshot};
