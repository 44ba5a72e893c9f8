//! Metrics collector for the job orchestrator
//!
//! Thin wrapper over the `metrics` facade. Nothing is exported unless the binary
//! installs a recorder (Prometheus exporter).

use metrics::{counter, gauge, histogram, Counter, Gauge, Histogram};

use orchestrator_core::models::{JobKind, JobStatus};

/// Metrics collector for the job orchestrator
#[derive(Clone)]
pub struct MetricsCollector {
    scheduling_passes_total: Counter,
    scheduling_pass_duration: Histogram,
    pending_jobs: Gauge,
    waiting_jobs: Gauge,
    running_jobs: Gauge,
    available_instances: Gauge,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            scheduling_passes_total: counter!("orchestrator_scheduling_passes_total"),
            scheduling_pass_duration: histogram!(
                "orchestrator_scheduling_pass_duration_seconds"
            ),
            pending_jobs: gauge!("orchestrator_pending_jobs"),
            waiting_jobs: gauge!("orchestrator_waiting_jobs"),
            running_jobs: gauge!("orchestrator_running_jobs"),
            available_instances: gauge!("orchestrator_available_instances"),
        }
    }

    // Job metrics

    pub fn record_job_launched(&self, kind: JobKind) {
        counter!("orchestrator_jobs_launched_total", "kind" => kind.as_str()).increment(1);
    }

    pub fn record_launch_rejected(&self, reason: &'static str) {
        counter!("orchestrator_launch_rejections_total", "reason" => reason).increment(1);
    }

    pub fn record_state_transition(&self, to: JobStatus) {
        counter!("orchestrator_job_transitions_total", "status" => to.as_str()).increment(1);
    }

    pub fn record_job_duration(&self, kind: JobKind, duration_seconds: f64) {
        histogram!("orchestrator_job_duration_seconds", "kind" => kind.as_str())
            .record(duration_seconds);
    }

    // Capacity metrics

    pub fn record_capacity_reserved(&self, instance_id: &str, units: u32) {
        counter!(
            "orchestrator_capacity_reserved_units_total",
            "instance" => instance_id.to_string()
        )
        .increment(units as u64);
    }

    pub fn record_capacity_rejected(&self, instance_id: &str) {
        counter!(
            "orchestrator_capacity_rejections_total",
            "instance" => instance_id.to_string()
        )
        .increment(1);
    }

    pub fn update_instance_capacity(&self, instance_id: &str, capacity: u32, consumed: u32) {
        gauge!("orchestrator_instance_capacity", "instance" => instance_id.to_string())
            .set(capacity as f64);
        gauge!("orchestrator_instance_consumed", "instance" => instance_id.to_string())
            .set(consumed as f64);
    }

    pub fn update_available_instances(&self, count: usize) {
        self.available_instances.set(count as f64);
    }

    // Scheduler metrics

    pub fn record_scheduling_pass(&self, duration_seconds: f64) {
        self.scheduling_passes_total.increment(1);
        self.scheduling_pass_duration.record(duration_seconds);
    }

    pub fn update_queue_depths(&self, pending: usize, waiting: usize, running: usize) {
        self.pending_jobs.set(pending as f64);
        self.waiting_jobs.set(waiting as f64);
        self.running_jobs.set(running as f64);
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MetricsCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsCollector").finish_non_exhaustive()
    }
}
