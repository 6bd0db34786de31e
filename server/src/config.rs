// Configuration for the narration server

use std::time::Duration;

use narration_core::{OrchestratorConfig, DEFAULT_CHUNK_BUDGET};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub rate_limit_per_minute: u32,
    pub request_timeout_secs: u64,
    pub cors_allowed_origins: Option<Vec<String>>,
    pub chunk_budget: usize,
    pub inter_chunk_delay_ms: u64,
    pub max_text_length: usize,
    pub quick_tts_max_length: usize,
    pub response_cache_size: usize,
    pub response_cache_ttl_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8085,
            rate_limit_per_minute: 60,
            request_timeout_secs: 60,
            cors_allowed_origins: None,
            chunk_budget: DEFAULT_CHUNK_BUDGET,
            inter_chunk_delay_ms: 100,
            max_text_length: 5000,
            quick_tts_max_length: 1000,
            response_cache_size: 256,
            response_cache_ttl_secs: 3600,
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let cors_allowed_origins = std::env::var("CORS_ALLOWED_ORIGINS")
            .ok()
            .map(|origins| {
                origins
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            });

        Self {
            port: env_or("PORT", defaults.port),
            rate_limit_per_minute: env_or("RATE_LIMIT_PER_MINUTE", defaults.rate_limit_per_minute),
            request_timeout_secs: env_or("REQUEST_TIMEOUT_SECS", defaults.request_timeout_secs),
            cors_allowed_origins,
            chunk_budget: env_or("CHUNK_BUDGET", defaults.chunk_budget),
            inter_chunk_delay_ms: env_or("INTER_CHUNK_DELAY_MS", defaults.inter_chunk_delay_ms),
            max_text_length: env_or("MAX_TEXT_LENGTH", defaults.max_text_length),
            quick_tts_max_length: env_or("QUICK_TTS_MAX_LENGTH", defaults.quick_tts_max_length),
            response_cache_size: env_or("RESPONSE_CACHE_SIZE", defaults.response_cache_size),
            response_cache_ttl_secs: env_or("RESPONSE_CACHE_TTL_SECS", defaults.response_cache_ttl_secs),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn response_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.response_cache_ttl_secs)
    }

    pub fn orchestrator(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            chunk_budget: self.chunk_budget,
            inter_chunk_delay: Duration::from_millis(self.inter_chunk_delay_ms),
        }
    }
}
