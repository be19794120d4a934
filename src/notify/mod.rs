//! Prometheus metrics for the transcoder worker.

pub mod prometheus;

pub use self::prometheus::{Metrics, MetricsServer};
