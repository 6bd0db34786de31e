use anyhow::{Context, Result};
use futures::stream::{BoxStream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::info;

use narration_core::protocol::decode_stream;
use narration_core::{ChannelError, Session, SessionRegistry, StreamMessage, Voice};

#[derive(Serialize)]
struct StreamingRequest<'a> {
    text: &'a str,
    voice: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VoiceInfo {
    pub id: String,
    pub label: String,
}

/// Consumer side of the streaming endpoint.
///
/// Dropping the message stream closes the HTTP response, which stops the
/// producer on the server.
#[derive(Clone)]
pub struct NarrationClient {
    client: Client,
    base_url: String,
}

impl NarrationClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Start a narration and return its decoded messages. Input rejected by
    /// the server surfaces here, before any stream exists.
    pub async fn open(
        &self,
        text: &str,
        voice: Voice,
    ) -> Result<BoxStream<'static, Result<StreamMessage, ChannelError>>> {
        let response = self
            .client
            .post(format!("{}/streaming-tts", self.base_url))
            .json(&StreamingRequest { text, voice: voice.as_str() })
            .send()
            .await
            .context("streaming request failed")?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            anyhow::bail!("narration rejected ({status}): {detail}");
        }

        info!(voice = %voice, "Narration stream opened");
        Ok(decode_stream(response.bytes_stream()).boxed())
    }

    /// Open a narration and play it as the registry's current session.
    pub async fn narrate(&self, registry: &SessionRegistry, text: &str, voice: Voice) -> Result<Session> {
        let messages = self.open(text, voice).await?;
        Ok(registry.start(messages).await)
    }

    pub async fn voices(&self) -> Result<Vec<VoiceInfo>> {
        let voices = self
            .client
            .get(format!("{}/voices", self.base_url))
            .send()
            .await?
            .error_for_status()?
            .json::<Vec<VoiceInfo>>()
            .await?;
        Ok(voices)
    }
}
