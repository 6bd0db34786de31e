// Metrics collection and tracking

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use narration_core::{SpeechSynthesizer, Voice};
use serde::Serialize;

const MAX_LATENCY_SAMPLES: usize = 1000;

/// Latency and error counters for one operation
#[derive(Debug, Clone)]
pub struct EndpointMetrics {
    pub request_count: Arc<AtomicU64>,
    pub error_count: Arc<AtomicU64>,
    pub total_latency_ms: Arc<AtomicU64>,
    pub min_latency_ms: Arc<AtomicU64>,
    pub max_latency_ms: Arc<AtomicU64>,
    latency_samples: Arc<Mutex<VecDeque<u64>>>,
}

impl EndpointMetrics {
    pub fn new() -> Self {
        Self {
            request_count: Arc::new(AtomicU64::new(0)),
            error_count: Arc::new(AtomicU64::new(0)),
            total_latency_ms: Arc::new(AtomicU64::new(0)),
            min_latency_ms: Arc::new(AtomicU64::new(u64::MAX)),
            max_latency_ms: Arc::new(AtomicU64::new(0)),
            latency_samples: Arc::new(Mutex::new(VecDeque::with_capacity(MAX_LATENCY_SAMPLES))),
        }
    }

    pub fn record_request(&self, latency_ms: u64) {
        self.request_count.fetch_add(1, Ordering::Relaxed);
        self.total_latency_ms.fetch_add(latency_ms, Ordering::Relaxed);
        self.min_latency_ms.fetch_min(latency_ms, Ordering::Relaxed);
        self.max_latency_ms.fetch_max(latency_ms, Ordering::Relaxed);

        if let Ok(mut samples) = self.latency_samples.lock() {
            if samples.len() == MAX_LATENCY_SAMPLES {
                samples.pop_front();
            }
            samples.push_back(latency_ms);
        }
    }

    pub fn record_error(&self) {
        self.error_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn avg_latency_ms(&self) -> f64 {
        let count = self.request_count.load(Ordering::Relaxed);
        if count == 0 {
            return 0.0;
        }
        let total = self.total_latency_ms.load(Ordering::Relaxed);
        total as f64 / count as f64
    }

    fn percentile(&self, p: u8) -> u64 {
        let Ok(samples) = self.latency_samples.lock() else {
            return 0;
        };
        if samples.is_empty() {
            return 0;
        }
        let mut sorted: Vec<u64> = samples.iter().copied().collect();
        sorted.sort_unstable();
        let index = (sorted.len() * p as usize / 100).min(sorted.len() - 1);
        sorted[index]
    }

    pub fn stats(&self) -> EndpointStats {
        let min = self.min_latency_ms.load(Ordering::Relaxed);
        EndpointStats {
            request_count: self.request_count.load(Ordering::Relaxed),
            error_count: self.error_count.load(Ordering::Relaxed),
            avg_latency_ms: self.avg_latency_ms(),
            min_latency_ms: if min == u64::MAX { 0 } else { min },
            max_latency_ms: self.max_latency_ms.load(Ordering::Relaxed),
            p50_latency_ms: self.percentile(50),
            p95_latency_ms: self.percentile(95),
            p99_latency_ms: self.percentile(99),
        }
    }
}

impl Default for EndpointMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Narration run outcomes
#[derive(Debug, Clone, Default)]
pub struct NarrationMetrics {
    pub runs_started: Arc<AtomicU64>,
    pub runs_completed: Arc<AtomicU64>,
    pub runs_failed: Arc<AtomicU64>,
    pub runs_cancelled: Arc<AtomicU64>,
    pub frames_emitted: Arc<AtomicU64>,
}

impl NarrationMetrics {
    pub fn record_started(&self) {
        self.runs_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_completed(&self) {
        self.runs_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.runs_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cancelled(&self) {
        self.runs_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_frame(&self) {
        self.frames_emitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stats(&self) -> NarrationStats {
        NarrationStats {
            runs_started: self.runs_started.load(Ordering::Relaxed),
            runs_completed: self.runs_completed.load(Ordering::Relaxed),
            runs_failed: self.runs_failed.load(Ordering::Relaxed),
            runs_cancelled: self.runs_cancelled.load(Ordering::Relaxed),
            frames_emitted: self.frames_emitted.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AppMetrics {
    pub narration: NarrationMetrics,
    pub provider: EndpointMetrics,
    pub quick_tts: EndpointMetrics,
}

impl AppMetrics {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Times every provider call into [`AppMetrics::provider`].
pub struct MeteredSynthesizer {
    inner: Arc<dyn SpeechSynthesizer>,
    metrics: EndpointMetrics,
}

impl MeteredSynthesizer {
    pub fn new(inner: Arc<dyn SpeechSynthesizer>, metrics: EndpointMetrics) -> Self {
        Self { inner, metrics }
    }
}

#[async_trait]
impl SpeechSynthesizer for MeteredSynthesizer {
    async fn synthesize(&self, text: &str, voice: Voice) -> anyhow::Result<Vec<u8>> {
        let start = Instant::now();
        let result = self.inner.synthesize(text, voice).await;
        self.metrics.record_request(start.elapsed().as_millis() as u64);
        if result.is_err() {
            self.metrics.record_error();
        }
        result
    }

    fn content_type(&self) -> &'static str {
        self.inner.content_type()
    }
}

#[derive(Serialize)]
pub struct MetricsResponse {
    pub timestamp: DateTime<Utc>,
    pub system: SystemMetrics,
    pub narration: NarrationStats,
    pub provider: EndpointStats,
    pub quick_tts: EndpointStats,
    pub cache: CacheStats,
}

#[derive(Serialize)]
pub struct SystemMetrics {
    pub cpu_usage_percent: f32,
    pub memory_used_mb: u64,
    pub memory_total_mb: u64,
    pub memory_usage_percent: f32,
    pub request_count: u64,
    pub uptime_seconds: u64,
    pub system_load: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct EndpointStats {
    pub request_count: u64,
    pub error_count: u64,
    pub avg_latency_ms: f64,
    pub min_latency_ms: u64,
    pub max_latency_ms: u64,
    pub p50_latency_ms: u64,
    pub p95_latency_ms: u64,
    pub p99_latency_ms: u64,
}

#[derive(Debug, Serialize)]
pub struct NarrationStats {
    pub runs_started: u64,
    pub runs_completed: u64,
    pub runs_failed: u64,
    pub runs_cancelled: u64,
    pub frames_emitted: u64,
}

#[derive(Debug, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
}

impl CacheStats {
    pub fn new(hits: u64, misses: u64) -> Self {
        let total = hits + misses;
        let hit_rate = if total == 0 { 0.0 } else { hits as f64 / total as f64 * 100.0 };
        Self { hits, misses, hit_rate }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latency_stats() {
        let m = EndpointMetrics::new();
        assert_eq!(m.stats().min_latency_ms, 0);
        for ms in [30, 10, 20] {
            m.record_request(ms);
        }
        m.record_error();
        let stats = m.stats();
        assert_eq!(stats.request_count, 3);
        assert_eq!(stats.error_count, 1);
        assert_eq!(stats.min_latency_ms, 10);
        assert_eq!(stats.max_latency_ms, 30);
        assert_eq!(stats.avg_latency_ms, 20.0);
        assert_eq!(stats.p50_latency_ms, 20);
    }

    #[test]
    fn samples_are_bounded() {
        let m = EndpointMetrics::new();
        for ms in 0..(MAX_LATENCY_SAMPLES as u64 + 10) {
            m.record_request(ms);
        }
        assert_eq!(m.latency_samples.lock().unwrap().len(), MAX_LATENCY_SAMPLES);
        assert_eq!(m.latency_samples.lock().unwrap().front(), Some(&10));
    }

    #[test]
    fn cache_hit_rate() {
        assert_eq!(CacheStats::new(0, 0).hit_rate, 0.0);
        assert_eq!(CacheStats::new(1, 3).hit_rate, 25.0);
    }

    #[tokio::test]
    async fn metered_provider_counts_failures() {
        struct Failing;
        #[async_trait]
        impl SpeechSynthesizer for Failing {
            async fn synthesize(&self, _text: &str, _voice: Voice) -> anyhow::Result<Vec<u8>> {
                anyhow::bail!("down")
            }
        }

        let metrics = EndpointMetrics::new();
        let metered = MeteredSynthesizer::new(Arc::new(Failing), metrics.clone());
        assert!(metered.synthesize("Hi.", Voice::Alloy).await.is_err());
        assert_eq!(metrics.stats().request_count, 1);
        assert_eq!(metrics.stats().error_count, 1);
    }
}
