use std::sync::Arc;

use futures_core::Stream;
use tokio::sync::{mpsc, watch, Mutex as TokioMutex};
use tokio::task::JoinHandle;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use crate::cancel::CancelToken;
use crate::error::ChannelError;
use crate::protocol::StreamMessage;
use crate::scheduler::{PlaybackScheduler, PlaybackSink, SchedulerConfig, SessionEvent, SessionOutcome, SessionState};

/// Handle to one running playback session.
pub struct Session {
    id: Uuid,
    cancel: CancelToken,
    state: watch::Receiver<SessionState>,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    task: JoinHandle<SessionOutcome>,
}

impl Session {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// Stop playback. No further chunk starts and no event other than the
    /// terminal `Cancelled` is delivered afterwards.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.events.recv().await
    }

    /// Wait for the session to reach its terminal state.
    pub async fn finished(self) -> SessionOutcome {
        self.task.await.unwrap_or_else(|e| SessionOutcome::Failed {
            message: format!("Playback task ended abnormally: {e}"),
            chunks_played: 0,
        })
    }
}

struct Active {
    id: Uuid,
    cancel: CancelToken,
    state: watch::Receiver<SessionState>,
}

/// Owns the playback sink for one consumer context and keeps at most one
/// session live on it. Starting a session supersedes the previous one.
pub struct SessionRegistry {
    scheduler: Arc<PlaybackScheduler>,
    active: TokioMutex<Option<Active>>,
}

impl SessionRegistry {
    pub fn new(sink: Arc<dyn PlaybackSink>, config: SchedulerConfig) -> Self {
        Self {
            scheduler: Arc::new(PlaybackScheduler::new(sink, config)),
            active: TokioMutex::new(None),
        }
    }

    /// Cancel any live session, wait until it has released the sink, then
    /// start playing `messages` in a new one.
    pub async fn start<S>(&self, messages: S) -> Session
    where
        S: Stream<Item = Result<StreamMessage, ChannelError>> + Send + 'static,
    {
        let mut active = self.active.lock().await;
        if let Some(prev) = active.take() {
            info!(session_id = %prev.id, "Superseding playback session");
            Self::shut_down(prev).await;
        }

        let id = Uuid::new_v4();
        let cancel = CancelToken::new();
        let (events_tx, events) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(SessionState::Idle);

        let scheduler = self.scheduler.clone();
        let task = tokio::spawn(
            {
                let cancel = cancel.clone();
                async move { scheduler.run(messages, cancel, events_tx, state_tx).await }
            }
            .instrument(info_span!("playback_session", session_id = %id)),
        );

        *active = Some(Active {
            id,
            cancel: cancel.clone(),
            state: state.clone(),
        });
        Session { id, cancel, state, events, task }
    }

    /// Cancel the live session, if any, and wait for it to stop.
    pub async fn cancel_current(&self) {
        if let Some(prev) = self.active.lock().await.take() {
            Self::shut_down(prev).await;
        }
    }

    /// Id of the session currently playing, if it has not finished yet.
    pub async fn current(&self) -> Option<Uuid> {
        self.active
            .lock()
            .await
            .as_ref()
            .filter(|a| !a.state.borrow().is_terminal())
            .map(|a| a.id)
    }

    async fn shut_down(mut prev: Active) {
        prev.cancel.cancel();
        // Err means the task is gone already
        let _ = prev.state.wait_for(SessionState::is_terminal).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;
    use crate::scheduler::tests::{feed, frame, RecordingSink};
    use tokio::time::Duration;

    fn registry() -> (Arc<RecordingSink>, SessionRegistry) {
        let sink = Arc::new(RecordingSink::default());
        (sink.clone(), SessionRegistry::new(sink, SchedulerConfig::default()))
    }

    #[tokio::test(start_paused = true)]
    async fn starting_a_session_supersedes_the_previous_one() {
        let (sink, registry) = registry();

        let (first_tx, first_msgs) = feed();
        let mut first = registry.start(first_msgs).await;
        first_tx.send(Ok(frame(0, 2, 1000))).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(first.state(), SessionState::PlayingChunk(0));

        let (second_tx, second_msgs) = feed();
        let second = registry.start(second_msgs).await;
        assert_eq!(first.state(), SessionState::Cancelled);
        assert_eq!(*sink.stops.lock().unwrap(), 1);
        assert_eq!(registry.current().await, Some(second.id()));

        // the old feed keeps talking but nothing reaches the sink
        let _ = first_tx.send(Ok(frame(1, 2, 10)));
        second_tx
            .send(Ok(StreamMessage::Frame(Frame::new(0, 1, "Second.", vec![0; 10]))))
            .unwrap();
        assert_eq!(second.finished().await, SessionOutcome::Completed { chunks_played: 1 });
        assert_eq!(sink.started(), vec![0, 0]);

        let mut last = None;
        while let Ok(event) = first.events.try_recv() {
            last = Some(event);
        }
        assert_eq!(last, Some(SessionEvent::State(SessionState::Cancelled)));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_from_handle() {
        let (sink, registry) = registry();
        let (tx, msgs) = feed();
        let session = registry.start(msgs).await;
        tx.send(Ok(frame(0, 3, 500))).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        session.cancel();
        assert_eq!(session.finished().await, SessionOutcome::Cancelled { chunks_played: 0 });
        assert_eq!(sink.started(), vec![0]);
        assert_eq!(registry.current().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn events_are_delivered_in_order() {
        let (_sink, registry) = registry();
        let (tx, msgs) = feed();
        let mut session = registry.start(msgs).await;
        tx.send(Ok(frame(0, 1, 20))).unwrap();

        let mut events = Vec::new();
        while let Some(event) = session.next_event().await {
            events.push(event);
        }
        assert_eq!(
            events,
            vec![
                SessionEvent::State(SessionState::Streaming),
                SessionEvent::State(SessionState::PlayingChunk(0)),
                SessionEvent::ChunkStarted { index: 0, text: "Chunk 0.".into() },
                SessionEvent::Progress { index: 0, total: 1, percent: 100.0 },
                SessionEvent::ChunkFinished { index: 0 },
                SessionEvent::State(SessionState::Completed),
            ]
        );
        assert_eq!(session.state(), SessionState::Completed);
    }
}
