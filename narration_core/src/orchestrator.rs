//! Sequential chunk synthesis.
//!
//! One provider call at a time: chunk *k* is synthesized and its frame is
//! handed to the channel before chunk *k+1* is attempted. The first provider
//! failure ends the run; frames already sent stay sent.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::cancel::CancelToken;
use crate::error::NarrationError;
use crate::frame::{Chunk, ChunkStatus, Frame};
use crate::segmenter::{self, DEFAULT_CHUNK_BUDGET};
use crate::{SpeechSynthesizer, Voice};

/// Immutable input of one narration run.
#[derive(Debug, Clone)]
pub struct NarrationRequest {
    pub id: Uuid,
    pub text: String,
    pub voice: Voice,
    pub created_at: DateTime<Utc>,
}

impl NarrationRequest {
    pub fn new(text: impl Into<String>, voice: Voice) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            voice,
            created_at: Utc::now(),
        }
    }

    /// Build a request from an untrusted voice selector (id or label).
    pub fn parse(text: impl Into<String>, voice: &str) -> Result<Self, NarrationError> {
        Ok(Self::new(text, voice.parse()?))
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Soft character budget per chunk.
    pub chunk_budget: usize,
    /// Pause after each non-final frame before the next provider call.
    pub inter_chunk_delay: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            chunk_budget: DEFAULT_CHUNK_BUDGET,
            inter_chunk_delay: Duration::from_millis(100),
        }
    }
}

/// A validated request together with its chunks, ready to run.
#[derive(Debug, Clone)]
pub struct NarrationRun {
    pub request: NarrationRequest,
    pub chunks: Vec<Chunk>,
}

impl NarrationRun {
    pub fn total(&self) -> usize {
        self.chunks.len()
    }
}

#[derive(Debug)]
pub struct RunReport {
    pub request_id: Uuid,
    pub frames_emitted: usize,
    pub chunks: Vec<Chunk>,
    pub elapsed: Duration,
}

pub struct Orchestrator {
    synth: Arc<dyn SpeechSynthesizer>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(synth: Arc<dyn SpeechSynthesizer>, config: OrchestratorConfig) -> Self {
        Self { synth, config }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Segment the request. Fails with `InvalidInput` before anything is
    /// opened or any provider call is made.
    pub fn prepare(&self, request: NarrationRequest) -> Result<NarrationRun, NarrationError> {
        let chunks = segmenter::segment(&request.text, self.config.chunk_budget)?;
        debug!(request_id = %request.id, chunks = chunks.len(), "Segmented narration text");
        Ok(NarrationRun { request, chunks })
    }

    /// Synthesize every chunk in order, sending one frame per chunk.
    ///
    /// Returns `Cancelled` if `cancel` fires or the receiver is dropped, and
    /// `Provider` on the first failed synthesis call.
    pub async fn run(
        &self,
        mut run: NarrationRun,
        frames: mpsc::Sender<Frame>,
        cancel: CancelToken,
    ) -> Result<RunReport, NarrationError> {
        let started = Instant::now();
        let request_id = run.request.id;
        let voice = run.request.voice;
        let total = run.total();
        info!(%request_id, %voice, total, "Starting narration run");

        for index in 0..total {
            if cancel.is_cancelled() || frames.is_closed() {
                info!(%request_id, index, "Narration cancelled by consumer");
                return Err(NarrationError::Cancelled);
            }

            let text = run.chunks[index].text.clone();
            run.chunks[index].status = ChunkStatus::Synthesizing;
            let call_started = Instant::now();

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                result = self.synth.synthesize(&text, voice) => Some(result),
            };
            let Some(result) = outcome else {
                run.chunks[index].status = ChunkStatus::Pending;
                info!(%request_id, index, "Narration cancelled during synthesis");
                return Err(NarrationError::Cancelled);
            };

            let audio = match result {
                Ok(audio) if !audio.is_empty() => audio,
                Ok(_) => {
                    run.chunks[index].status = ChunkStatus::Failed;
                    error!(%request_id, index, "Provider returned an empty audio payload");
                    return Err(NarrationError::Provider {
                        index,
                        source: anyhow::anyhow!("empty audio payload"),
                    });
                }
                Err(source) => {
                    run.chunks[index].status = ChunkStatus::Failed;
                    error!(%request_id, index, "Synthesis failed: {source:#}");
                    return Err(NarrationError::Provider { index, source });
                }
            };

            run.chunks[index].status = ChunkStatus::Ready;
            debug!(
                %request_id,
                index,
                bytes = audio.len(),
                latency_ms = call_started.elapsed().as_millis() as u64,
                "Chunk synthesized"
            );

            if frames.send(Frame::new(index, total, text, audio)).await.is_err() {
                info!(%request_id, index, "Frame receiver dropped, stopping run");
                return Err(NarrationError::Cancelled);
            }

            let delay = self.config.inter_chunk_delay;
            if index + 1 < total && !delay.is_zero() {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        info!(%request_id, index, "Narration cancelled between chunks");
                        return Err(NarrationError::Cancelled);
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }

        let elapsed = started.elapsed();
        info!(%request_id, total, elapsed_ms = elapsed.as_millis() as u64, "Narration run complete");
        Ok(RunReport {
            request_id,
            frames_emitted: total,
            chunks: run.chunks,
            elapsed,
        })
    }
}
