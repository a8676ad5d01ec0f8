//! Metrics collection for safe calls.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::errors::ModerationSide;

/// Metrics collector interface.
pub trait MetricsCollector: Send + Sync {
    /// Records the outcome of the retried backend call.
    fn record_call(&self, success: bool, duration: Duration);

    /// Records a cache hit.
    fn record_cache_hit(&self);

    /// Records a cache miss.
    fn record_cache_miss(&self);

    /// Records a call rejected by the open circuit.
    fn record_circuit_rejection(&self);

    /// Records a moderation block.
    fn record_moderation_block(&self, side: ModerationSide);

    /// Records a repair attempt and whether it parsed.
    fn record_repair(&self, success: bool);

    /// Records model usage.
    fn record_model_usage(&self, model: &str);

    /// Gets current metrics.
    fn get_metrics(&self) -> SafeCallMetrics;

    /// Resets all metrics.
    fn reset(&self);
}

/// Metrics snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SafeCallMetrics {
    /// Retried backend calls made.
    pub total_calls: u64,
    /// Calls that returned text.
    pub successful_calls: u64,
    /// Calls that exhausted their retries.
    pub failed_calls: u64,
    /// Total latency of backend calls in milliseconds.
    pub total_latency_ms: u64,
    /// Cache hits.
    pub cache_hits: u64,
    /// Cache misses.
    pub cache_misses: u64,
    /// Calls rejected by the open circuit.
    pub circuit_rejections: u64,
    /// Prompts blocked by input moderation.
    pub input_blocks: u64,
    /// Responses blocked by output moderation.
    pub output_blocks: u64,
    /// Repair calls issued.
    pub repairs_attempted: u64,
    /// Repair calls whose output parsed.
    pub repairs_succeeded: u64,
    /// Model usage counts.
    pub models: HashMap<String, u64>,
}

impl SafeCallMetrics {
    /// Calculates average backend latency in milliseconds.
    pub fn average_latency_ms(&self) -> f64 {
        if self.total_calls == 0 {
            0.0
        } else {
            self.total_latency_ms as f64 / self.total_calls as f64
        }
    }

    /// Fraction of lookups served from cache, as a percentage.
    pub fn cache_hit_rate(&self) -> f64 {
        let lookups = self.cache_hits + self.cache_misses;
        if lookups == 0 {
            0.0
        } else {
            (self.cache_hits as f64 / lookups as f64) * 100.0
        }
    }
}

/// Default metrics collector implementation.
#[derive(Default)]
pub struct DefaultMetricsCollector {
    total_calls: AtomicU64,
    successful_calls: AtomicU64,
    failed_calls: AtomicU64,
    total_latency_ms: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    circuit_rejections: AtomicU64,
    input_blocks: AtomicU64,
    output_blocks: AtomicU64,
    repairs_attempted: AtomicU64,
    repairs_succeeded: AtomicU64,
    models: RwLock<HashMap<String, u64>>,
}

impl DefaultMetricsCollector {
    /// Creates a new metrics collector.
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetricsCollector for DefaultMetricsCollector {
    fn record_call(&self, success: bool, duration: Duration) {
        self.total_calls.fetch_add(1, Ordering::Relaxed);

        if success {
            self.successful_calls.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_calls.fetch_add(1, Ordering::Relaxed);
        }

        self.total_latency_ms.fetch_add(
            u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
            Ordering::Relaxed,
        );
    }

    fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    fn record_circuit_rejection(&self) {
        self.circuit_rejections.fetch_add(1, Ordering::Relaxed);
    }

    fn record_moderation_block(&self, side: ModerationSide) {
        match side {
            ModerationSide::Input => self.input_blocks.fetch_add(1, Ordering::Relaxed),
            ModerationSide::Output => self.output_blocks.fetch_add(1, Ordering::Relaxed),
        };
    }

    fn record_repair(&self, success: bool) {
        self.repairs_attempted.fetch_add(1, Ordering::Relaxed);
        if success {
            self.repairs_succeeded.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn record_model_usage(&self, model: &str) {
        *self.models.write().entry(model.to_string()).or_insert(0) += 1;
    }

    fn get_metrics(&self) -> SafeCallMetrics {
        SafeCallMetrics {
            total_calls: self.total_calls.load(Ordering::Relaxed),
            successful_calls: self.successful_calls.load(Ordering::Relaxed),
            failed_calls: self.failed_calls.load(Ordering::Relaxed),
            total_latency_ms: self.total_latency_ms.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            circuit_rejections: self.circuit_rejections.load(Ordering::Relaxed),
            input_blocks: self.input_blocks.load(Ordering::Relaxed),
            output_blocks: self.output_blocks.load(Ordering::Relaxed),
            repairs_attempted: self.repairs_attempted.load(Ordering::Relaxed),
            repairs_succeeded: self.repairs_succeeded.load(Ordering::Relaxed),
            models: self.models.read().clone(),
        }
    }

    fn reset(&self) {
        for counter in [
            &self.total_calls,
            &self.successful_calls,
            &self.failed_calls,
            &self.total_latency_ms,
            &self.cache_hits,
            &self.cache_misses,
            &self.circuit_rejections,
            &self.input_blocks,
            &self.output_blocks,
            &self.repairs_attempted,
            &self.repairs_succeeded,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        self.models.write().clear();
    }
}

impl std::fmt::Debug for DefaultMetricsCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultMetricsCollector")
            .field("total_calls", &self.total_calls.load(Ordering::Relaxed))
            .field("cache_hits", &self.cache_hits.load(Ordering::Relaxed))
            .field(
                "circuit_rejections",
                &self.circuit_rejections.load(Ordering::Relaxed),
            )
            .finish_non_exhaustive()
    }
}
