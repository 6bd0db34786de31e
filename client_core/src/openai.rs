use std::env;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

use narration_core::{SpeechSynthesizer, Voice};

pub const DEFAULT_MODEL: &str = "gpt-4o-mini-tts";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// Structure for the OpenAI speech API request
#[derive(Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    voice: &'a str,
    input: &'a str,
    response_format: &'a str,
}

#[derive(Debug, Clone)]
pub struct OpenAiSpeechConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl OpenAiSpeechConfig {
    /// Read the provider settings from the environment. `None` when
    /// `OPENAI_API_KEY` is unset or empty.
    pub fn from_env() -> Option<Self> {
        let api_key = env::var("OPENAI_API_KEY").ok().filter(|k| !k.trim().is_empty())?;
        Some(Self {
            api_key,
            model: env::var("TTS_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            base_url: env::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            timeout: Duration::from_secs(
                env::var("PROVIDER_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(60),
            ),
        })
    }

    fn speech_url(&self) -> String {
        format!("{}/v1/audio/speech", self.base_url.trim_end_matches('/'))
    }
}

/// Speech provider backed by OpenAI's `/v1/audio/speech` endpoint.
pub struct OpenAiSpeech {
    client: Client,
    config: OpenAiSpeechConfig,
}

impl OpenAiSpeech {
    pub fn new(config: OpenAiSpeechConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .context("building HTTP client")?;
        Ok(Self { client, config })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }
}

#[async_trait]
impl SpeechSynthesizer for OpenAiSpeech {
    async fn synthesize(&self, text: &str, voice: Voice) -> Result<Vec<u8>> {
        let body = SpeechRequest {
            model: &self.config.model,
            voice: voice.as_str(),
            input: text,
            response_format: "mp3",
        };

        let response = self
            .client
            .post(self.config.speech_url())
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .context("speech request failed")?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            anyhow::bail!("speech provider returned {status}: {detail}");
        }

        let audio = response.bytes().await.context("reading speech response")?;
        debug!(voice = %voice, bytes = audio.len(), "Provider returned audio");
        Ok(audio.to_vec())
    }

    fn content_type(&self) -> &'static str {
        "audio/mpeg"
    }
}
