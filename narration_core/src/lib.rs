//! Incremental narration: turn a long text into a stream of synthesized audio
//! frames that a consumer can start playing before the whole narration exists.
//!
//! The producer side is [`Orchestrator`] (segment, synthesize, emit frames in
//! order); the wire side is [`protocol`] (server-sent `data:` messages); the
//! consumer side is [`PlaybackScheduler`] driven through a [`SessionRegistry`].
//! [`Highlighter`] covers the non-streaming case where one full clip is
//! mapped onto text segments by elapsed time.

pub mod audio;
pub mod cache;
pub mod cancel;
pub mod error;
pub mod frame;
pub mod highlight;
pub mod orchestrator;
pub mod protocol;
pub mod scheduler;
pub mod segmenter;
pub mod session;
pub mod voice;

use async_trait::async_trait;

pub use audio::{SilentSynthesizer, SimulatedSink};
pub use cache::CachedSynthesizer;
pub use cancel::CancelToken;
pub use error::{ChannelError, NarrationError, ProtocolError};
pub use frame::{Chunk, ChunkStatus, Frame};
pub use highlight::{HighlightTimeline, Highlighter};
pub use orchestrator::{NarrationRequest, NarrationRun, Orchestrator, OrchestratorConfig, RunReport};
pub use protocol::{FrameDecoder, FrameEncoder, StreamMessage};
pub use scheduler::{
    PlaybackScheduler, PlaybackSink, SchedulePolicy, SchedulerConfig, SessionEvent, SessionOutcome, SessionState,
};
pub use segmenter::{segment, DEFAULT_CHUNK_BUDGET};
pub use session::{Session, SessionRegistry};
pub use voice::Voice;

/// A speech synthesis provider: `(text, voice)` in, encoded audio bytes out.
///
/// Failures are opaque to the pipeline and end the current run.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, voice: Voice) -> anyhow::Result<Vec<u8>>;

    /// MIME type of the payloads this provider returns.
    fn content_type(&self) -> &'static str {
        "audio/mpeg"
    }
}
