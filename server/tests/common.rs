//! Common utilities for integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Request, Response},
    Router,
};
use narration_core::audio::silence_wav;
use narration_core::{SpeechSynthesizer, Voice};
use server::{build_router, config::ServerConfig, AppState};
use tower::ServiceExt;

pub const STORY: &str = "The fox ran. It jumped high. Then it slept.";

/// Fake provider: answers `AUDIO:<text>` (or a short silent WAV) after
/// `latency`, failing on one chosen call if asked to.
pub struct ScriptedSynth {
    pub calls: AtomicUsize,
    pub fail_on_call: Option<usize>,
    pub latency: Duration,
    pub wav: bool,
}

impl ScriptedSynth {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_on_call: None,
            latency: Duration::ZERO,
            wav: false,
        }
    }

    pub fn wav() -> Self {
        Self { wav: true, ..Self::new() }
    }

    pub fn failing_on(call: usize) -> Self {
        Self { fail_on_call: Some(call), ..Self::new() }
    }

    pub fn slow(latency: Duration) -> Self {
        Self { latency, ..Self::new() }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechSynthesizer for ScriptedSynth {
    async fn synthesize(&self, text: &str, _voice: Voice) -> anyhow::Result<Vec<u8>> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_on_call == Some(call) {
            anyhow::bail!("provider unavailable");
        }
        if self.wav {
            return silence_wav(Duration::from_millis(100), 8_000);
        }
        Ok(format!("AUDIO:{text}").into_bytes())
    }
}

pub fn test_config() -> ServerConfig {
    ServerConfig {
        chunk_budget: 20,
        inter_chunk_delay_ms: 0,
        ..ServerConfig::default()
    }
}

/// Build the real router around `synth`.
pub fn create_app_with(synth: Arc<ScriptedSynth>) -> (Router, AppState) {
    create_app_with_config(synth, test_config())
}

pub fn create_app_with_config(synth: Arc<ScriptedSynth>, config: ServerConfig) -> (Router, AppState) {
    let state = AppState::new(synth, config);
    let app = build_router(state.clone()).expect("router");
    (app, state)
}

/// Create a test app instance
pub fn create_test_app() -> Router {
    create_app_with(Arc::new(ScriptedSynth::new())).0
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    app.oneshot(
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap(),
    )
    .await
    .unwrap()
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    to_bytes(response.into_body(), usize::MAX).await.unwrap().to_vec()
}
