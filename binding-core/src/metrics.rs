//! Binding metrics, emitted through the `metrics` facade.
//!
//! No recorder is installed here; without one every call is a no-op.

use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Per-binding metric handles, labelled with the binding name
#[derive(Debug, Clone)]
pub struct BindingMetrics {
    binding: String,
}

impl BindingMetrics {
    pub fn new(binding: impl Into<String>) -> Self {
        Self {
            binding: binding.into(),
        }
    }

    pub fn binding(&self) -> &str {
        &self.binding
    }

    pub fn record_sent(&self, duration: Duration) {
        counter!("binding_messages_sent_total", "binding" => self.binding.clone()).increment(1);
        histogram!("binding_send_duration_seconds", "binding" => self.binding.clone())
            .record(duration.as_secs_f64());
    }

    pub fn record_send_error(&self, kind: &'static str) {
        counter!(
            "binding_send_errors_total",
            "binding" => self.binding.clone(),
            "kind" => kind
        )
        .increment(1);
    }

    pub fn record_received(&self, partition: &str) {
        counter!(
            "binding_messages_received_total",
            "binding" => self.binding.clone(),
            "partition" => partition.to_string()
        )
        .increment(1);
    }

    pub fn record_handler_error(&self) {
        counter!("binding_handler_errors_total", "binding" => self.binding.clone()).increment(1);
    }

    /// 1 while a read loop is active
    pub fn set_reading(&self, reading: bool) {
        gauge!("binding_reading", "binding" => self.binding.clone())
            .set(if reading { 1.0 } else { 0.0 });
    }
}
