//! Consumer-side playback scheduling.
//!
//! The scheduler reads decoded [`StreamMessage`]s, starts chunk 0 the moment
//! it arrives and starts every later chunk only once its predecessor is done
//! (or, under [`SchedulePolicy::FixedOffset`], once its estimated slot has
//! come). Progress and state changes go out as [`SessionEvent`]s until a
//! single terminal state is reached.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use futures_core::Stream;
use futures_util::future::BoxFuture;
use futures_util::stream::FuturesUnordered;
use futures_util::StreamExt;
use tokio::sync::{mpsc, watch};
use tokio::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::error::ChannelError;
use crate::frame::Frame;
use crate::protocol::StreamMessage;

#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Idle,
    Streaming,
    PlayingChunk(usize),
    Completed,
    Failed(String),
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Failed(_) | SessionState::Cancelled)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    State(SessionState),
    /// Emitted once per accepted frame, after it has been scheduled.
    Progress { index: usize, total: usize, percent: f32 },
    /// A chunk's audio started playing; drives text highlighting.
    ChunkStarted { index: usize, text: String },
    ChunkFinished { index: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutcome {
    Completed { chunks_played: usize },
    Failed { message: String, chunks_played: usize },
    Cancelled { chunks_played: usize },
}

/// The audio output a session plays into.
#[async_trait]
pub trait PlaybackSink: Send + Sync {
    /// Play one chunk; resolves when its audio has finished playing.
    async fn play(&self, frame: Frame) -> anyhow::Result<()>;

    /// Silence whatever this sink is currently playing.
    fn stop(&self);
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SchedulePolicy {
    /// Start chunk *i+1* when chunk *i* reports completion.
    AfterCompletion,
    /// Start the *k*-th chunk `k × per_chunk` after the first one started.
    FixedOffset { per_chunk: Duration },
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub policy: SchedulePolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            policy: SchedulePolicy::AfterCompletion,
        }
    }
}

impl SchedulerConfig {
    /// Estimated chunk length used by [`SchedulePolicy::FixedOffset`].
    pub const DEFAULT_CHUNK_ESTIMATE: Duration = Duration::from_secs(4);

    pub fn fixed_offset(per_chunk: Duration) -> Self {
        Self {
            policy: SchedulePolicy::FixedOffset { per_chunk },
        }
    }

    /// Fixed offsets of [`Self::DEFAULT_CHUNK_ESTIMATE`], for sinks that
    /// cannot report when a clip has finished.
    pub fn estimated() -> Self {
        Self::fixed_offset(Self::DEFAULT_CHUNK_ESTIMATE)
    }
}

/// Sends events unless the session was cancelled; after cancellation only the
/// terminal `Cancelled` state goes out.
struct Emitter {
    events: mpsc::UnboundedSender<SessionEvent>,
    state: watch::Sender<SessionState>,
    cancel: CancelToken,
}

impl Emitter {
    fn event(&self, event: SessionEvent) {
        if !self.cancel.is_cancelled() {
            let _ = self.events.send(event);
        }
    }

    fn state(&self, state: SessionState) {
        if !self.cancel.is_cancelled() {
            self.state.send_replace(state.clone());
            let _ = self.events.send(SessionEvent::State(state));
        }
    }

    fn terminal(&self, state: SessionState) -> SessionState {
        let state = if self.cancel.is_cancelled() {
            SessionState::Cancelled
        } else {
            state
        };
        self.state.send_replace(state.clone());
        let _ = self.events.send(SessionEvent::State(state.clone()));
        state
    }
}

type Playback = BoxFuture<'static, (usize, anyhow::Result<()>)>;

pub struct PlaybackScheduler {
    sink: Arc<dyn PlaybackSink>,
    config: SchedulerConfig,
}

impl PlaybackScheduler {
    pub fn new(sink: Arc<dyn PlaybackSink>, config: SchedulerConfig) -> Self {
        Self { sink, config }
    }

    pub fn sink(&self) -> &Arc<dyn PlaybackSink> {
        &self.sink
    }

    /// Drive one session to a terminal state.
    pub async fn run<S>(
        &self,
        messages: S,
        cancel: CancelToken,
        events: mpsc::UnboundedSender<SessionEvent>,
        state: watch::Sender<SessionState>,
    ) -> SessionOutcome
    where
        S: Stream<Item = Result<StreamMessage, ChannelError>> + Send,
    {
        futures_util::pin_mut!(messages);
        let emit = Emitter { events, state, cancel: cancel.clone() };

        let mut queue: VecDeque<Frame> = VecDeque::new();
        let mut scheduled: Vec<SessionEvent> = Vec::new();
        let mut playing: FuturesUnordered<Playback> = FuturesUnordered::new();
        let mut last_index: Option<usize> = None;
        let mut total: Option<usize> = None;
        let mut stream_done = false;
        let mut failure: Option<String> = None;
        let mut first_start: Option<Instant> = None;
        let mut started = 0usize;
        let mut played = 0usize;

        emit.state(SessionState::Streaming);

        loop {
            if cancel.is_cancelled() {
                // dropping `playing` abandons anything still scheduled
                self.sink.stop();
                info!(chunks_played = played, "Playback session cancelled");
                emit.terminal(SessionState::Cancelled);
                return SessionOutcome::Cancelled { chunks_played: played };
            }

            while !queue.is_empty() && self.may_start(playing.is_empty(), first_start, started) {
                let Some(frame) = queue.pop_front() else { break };
                let index = frame.index;
                first_start.get_or_insert_with(Instant::now);
                started += 1;

                emit.state(SessionState::PlayingChunk(index));
                emit.event(SessionEvent::ChunkStarted { index, text: frame.text.clone() });
                debug!(index, "Starting chunk playback");

                let sink = self.sink.clone();
                playing.push(Box::pin(async move { (index, sink.play(frame).await) }));
            }

            // progress for frames queued since the last pass, now that any
            // that could start have started
            for event in scheduled.drain(..) {
                emit.event(event);
            }

            if stream_done && queue.is_empty() && playing.is_empty() {
                return match failure {
                    Some(message) => match emit.terminal(SessionState::Failed(message.clone())) {
                        SessionState::Cancelled => SessionOutcome::Cancelled { chunks_played: played },
                        _ => {
                            warn!(chunks_played = played, "Playback session failed: {message}");
                            SessionOutcome::Failed { message, chunks_played: played }
                        }
                    },
                    None => match emit.terminal(SessionState::Completed) {
                        SessionState::Cancelled => SessionOutcome::Cancelled { chunks_played: played },
                        _ => {
                            info!(chunks_played = played, "Playback session completed");
                            SessionOutcome::Completed { chunks_played: played }
                        }
                    },
                };
            }

            let gate = match self.config.policy {
                SchedulePolicy::FixedOffset { per_chunk } if !queue.is_empty() => {
                    first_start.map(|t0| t0 + per_chunk * started as u32)
                }
                _ => None,
            };

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {}
                Some((index, result)) = playing.next(), if !playing.is_empty() => {
                    played += 1;
                    if let Err(e) = result {
                        warn!(index, "Chunk playback failed, skipping: {e:#}");
                    }
                    emit.event(SessionEvent::ChunkFinished { index });
                }
                _ = tokio::time::sleep_until(gate.unwrap_or_else(Instant::now)), if gate.is_some() => {}
                message = messages.next(), if !stream_done => {
                    match message {
                        Some(Ok(StreamMessage::Frame(frame))) => {
                            if let Some(frame) = accept_frame(frame, &mut last_index, &mut total) {
                                stream_done = frame.is_last;
                                scheduled.push(SessionEvent::Progress {
                                    index: frame.index,
                                    total: frame.total,
                                    percent: frame.percent_complete(),
                                });
                                queue.push_back(frame);
                            }
                        }
                        Some(Ok(StreamMessage::Error(message))) => {
                            stream_done = true;
                            failure = Some(ChannelError::Upstream(message).to_string());
                        }
                        Some(Err(e)) => {
                            stream_done = true;
                            failure = Some(e.to_string());
                        }
                        None => {
                            stream_done = true;
                            failure = Some(ChannelError::ClosedEarly { last_index }.to_string());
                        }
                    }
                }
            }
        }
    }

    fn may_start(&self, idle: bool, first_start: Option<Instant>, started: usize) -> bool {
        match self.config.policy {
            SchedulePolicy::AfterCompletion => idle,
            SchedulePolicy::FixedOffset { per_chunk } => match first_start {
                None => true,
                Some(t0) => Instant::now() >= t0 + per_chunk * started as u32,
            },
        }
    }
}

/// Ordering checks on the consumer side. Stale or inconsistent frames are
/// dropped; a gap left by a skipped malformed message is tolerated.
fn accept_frame(frame: Frame, last_index: &mut Option<usize>, total: &mut Option<usize>) -> Option<Frame> {
    if let Some(t) = *total {
        if t != frame.total {
            warn!(index = frame.index, expected = t, got = frame.total, "Dropping frame with inconsistent total");
            return None;
        }
    }
    let expected = last_index.map_or(0, |l| l + 1);
    if frame.index < expected {
        warn!(index = frame.index, expected, "Dropping duplicate or out-of-order frame");
        return None;
    }
    if frame.index > expected {
        warn!(index = frame.index, expected, "Frames missing from stream, continuing");
    }
    *last_index = Some(frame.index);
    *total = Some(frame.total);
    Some(frame)
}
