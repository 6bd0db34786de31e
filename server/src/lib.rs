pub mod config;
pub mod error;
pub mod metrics;
pub mod streaming;
pub mod validation;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use axum::{
    extract::{Path, Request, State},
    http::{header, HeaderValue, Method},
    middleware::Next,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tower_governor::{governor::GovernorConfigBuilder, key_extractor::GlobalKeyExtractor, GovernorLayer};
use tracing::{info, warn};

use narration_core::audio::sniff_content_type;
use narration_core::{CachedSynthesizer, Orchestrator, SpeechSynthesizer, Voice};

use crate::config::ServerConfig;
use crate::error::ApiError;
use crate::metrics::{AppMetrics, CacheStats, MeteredSynthesizer, MetricsResponse, SystemMetrics};
use crate::validation::{validate_text, validate_voice};

pub type Synthesizer = CachedSynthesizer<MeteredSynthesizer>;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub synth: Arc<Synthesizer>,
    pub metrics: AppMetrics,
    pub request_count: Arc<AtomicU64>,
    pub config: ServerConfig,
}

impl AppState {
    /// Wrap `provider` with metering and the response cache and build the
    /// orchestrator on top.
    pub fn new(provider: Arc<dyn SpeechSynthesizer>, config: ServerConfig) -> Self {
        let metrics = AppMetrics::new();
        let synth = Arc::new(CachedSynthesizer::new(
            MeteredSynthesizer::new(provider, metrics.provider.clone()),
            config.response_cache_size,
            config.response_cache_ttl(),
        ));
        let orchestrator = Arc::new(Orchestrator::new(synth.clone(), config.orchestrator()));
        Self {
            orchestrator,
            synth,
            metrics,
            request_count: Arc::new(AtomicU64::new(0)),
            config,
        }
    }
}

#[derive(Deserialize)]
pub struct TtsRequest {
    text: String,
    voice: Option<String>,
}

#[derive(Serialize)]
pub struct VoiceInfo {
    id: &'static str,
    label: &'static str,
}

static START_TIME: OnceLock<Instant> = OnceLock::new();

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .allow_credentials(false);

    let origins: Vec<HeaderValue> = config
        .cors_allowed_origins
        .iter()
        .flatten()
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect();

    if origins.is_empty() {
        warn!("CORS_ALLOWED_ORIGINS not set, allowing all origins (development mode)");
        cors.allow_origin(Any)
    } else {
        info!("CORS configured for {} origin(s)", origins.len());
        cors.allow_origin(AllowOrigin::list(origins))
    }
}

// Request ID middleware for tracing
async fn add_request_id(mut request: Request, next: Next) -> Response {
    let request_id = uuid::Uuid::new_v4().to_string();
    let Ok(value) = HeaderValue::from_str(&request_id) else {
        return next.run(request).await;
    };
    request.headers_mut().insert("x-request-id", value.clone());
    let mut response = next.run(request).await;
    response.headers_mut().insert("x-request-id", value);
    response
}

/// Milliseconds between two replenished rate-limit tokens.
pub fn replenish_interval_ms(per_minute: u32) -> u64 {
    (60_000 / u64::from(per_minute.max(1))).max(1)
}

/// Build the full application router: routes at the root and under `/api`,
/// wrapped in tracing, rate limiting, timeout and CORS layers.
pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    let _ = START_TIME.get_or_init(Instant::now);
    let config = &state.config;

    // GlobalKeyExtractor: one shared budget, independent of client address
    let per_minute = config.rate_limit_per_minute.max(1);
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            // the builder takes the interval between refilled tokens
            .per_millisecond(replenish_interval_ms(per_minute))
            .burst_size(per_minute)
            .key_extractor(GlobalKeyExtractor)
            .finish()
            .ok_or_else(|| anyhow::anyhow!("invalid rate limit configuration"))?,
    );
    info!("Rate limiting: {} requests per minute", per_minute);

    let middleware_stack = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(GovernorLayer::new(governor_conf))
        // bounds the time to response headers; streaming bodies are unaffected
        .layer(TimeoutLayer::new(config.request_timeout()))
        .layer(cors_layer(config))
        .into_inner();

    let api = Router::new()
        .route("/health", get(health_check))
        .route("/healthz", get(health_check))
        .route("/voices", get(list_voices))
        .route("/tts", post(tts_endpoint))
        .route("/preview-voice/{label}", get(preview_voice))
        .route("/streaming-tts", post(streaming::streaming_tts))
        .route("/metrics", get(metrics_endpoint));

    Ok(Router::new()
        .merge(api.clone())
        .nest("/api", api)
        .layer(axum::middleware::from_fn(add_request_id))
        .layer(middleware_stack)
        .with_state(state))
}

pub async fn health_check() -> &'static str {
    "ok"
}

pub async fn list_voices() -> Json<Vec<VoiceInfo>> {
    Json(
        Voice::ALL
            .into_iter()
            .map(|v| VoiceInfo { id: v.as_str(), label: v.label() })
            .collect(),
    )
}

/// Whole-clip synthesis for short texts; the response is cacheable by
/// clients since the same `(text, voice)` always yields the same audio.
pub async fn tts_endpoint(
    State(state): State<AppState>,
    Json(req): Json<TtsRequest>,
) -> Result<Response, ApiError> {
    state.request_count.fetch_add(1, Ordering::Relaxed);
    validate_text(&req.text, state.config.quick_tts_max_length)?;
    let voice = match req.voice.as_deref() {
        Some(v) => validate_voice(v)?,
        None => Voice::default(),
    };

    let start = Instant::now();
    let result = state.synth.synthesize(req.text.trim(), voice).await;
    state.metrics.quick_tts.record_request(start.elapsed().as_millis() as u64);
    let audio = result.map_err(|e| {
        state.metrics.quick_tts.record_error();
        ApiError::ProviderError(e)
    })?;
    if audio.is_empty() {
        state.metrics.quick_tts.record_error();
        return Err(ApiError::ProviderError(anyhow::anyhow!("empty audio payload")));
    }

    Ok(clip_response(&state, audio))
}

/// Sample line spoken by `GET /preview-voice/{label}`.
pub const PREVIEW_TEXT: &str = "Hi there! Here's how I sound.";

/// Short sample of one voice. `label` is a picker label or a provider id.
pub async fn preview_voice(State(state): State<AppState>, Path(label): Path<String>) -> Result<Response, ApiError> {
    state.request_count.fetch_add(1, Ordering::Relaxed);
    let voice = validate_voice(&label)?;

    let audio = state
        .synth
        .synthesize(PREVIEW_TEXT, voice)
        .await
        .map_err(ApiError::ProviderError)?;
    if audio.is_empty() {
        return Err(ApiError::ProviderError(anyhow::anyhow!("empty audio payload")));
    }
    Ok(clip_response(&state, audio))
}

/// Whole-clip response. The type is taken from the payload header when it
/// has a recognisable one, else from the provider.
fn clip_response(state: &AppState, audio: Vec<u8>) -> Response {
    let content_type = match sniff_content_type(&audio) {
        "application/octet-stream" => state.synth.content_type(),
        sniffed => sniffed,
    };
    (
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, "public, max-age=86400, immutable"),
        ],
        audio,
    )
        .into_response()
}

pub async fn metrics_endpoint(State(state): State<AppState>) -> Json<MetricsResponse> {
    let mut system = sysinfo::System::new();
    system.refresh_cpu();
    system.refresh_memory();

    let cpu_usage = system.global_cpu_info().cpu_usage();
    let memory_used = system.used_memory();
    let memory_total = system.total_memory();
    let memory_usage_percent = if memory_total > 0 {
        (memory_used as f64 / memory_total as f64 * 100.0) as f32
    } else {
        0.0
    };

    let uptime = START_TIME.get().map(|start| start.elapsed().as_secs()).unwrap_or(0);

    // Unix-like systems only
    let system_load = {
        #[cfg(unix)]
        {
            std::fs::read_to_string("/proc/loadavg")
                .ok()
                .and_then(|l| l.split_whitespace().next().and_then(|s| s.parse::<f64>().ok()))
        }
        #[cfg(not(unix))]
        None
    };

    Json(MetricsResponse {
        timestamp: Utc::now(),
        system: SystemMetrics {
            cpu_usage_percent: cpu_usage,
            memory_used_mb: memory_used / 1024 / 1024,
            memory_total_mb: memory_total / 1024 / 1024,
            memory_usage_percent,
            request_count: state.request_count.load(Ordering::Relaxed),
            uptime_seconds: uptime,
            system_load,
        },
        narration: state.metrics.narration.stats(),
        provider: state.metrics.provider.stats(),
        quick_tts: state.metrics.quick_tts.stats(),
        cache: CacheStats::new(state.synth.hits(), state.synth.misses()),
    })
}
