//! Observability module
//!
//! - Metrics collection via the `metrics` facade
//! - Structured logging helpers

pub mod metrics_collector;
pub mod structured_logger;

pub use metrics_collector::MetricsCollector;
pub use structured_logger::StructuredLogger;
