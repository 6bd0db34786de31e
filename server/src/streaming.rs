//! `POST /streaming-tts`: narrate a text as a server-sent stream of frames.

use std::convert::Infallible;
use std::sync::atomic::Ordering;

use axum::{
    body::Body,
    extract::State,
    http::header,
    response::Response,
    Json,
};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{error, info, info_span, warn, Instrument};

use narration_core::protocol::{self, FrameEncoder};
use narration_core::{CancelToken, Frame, NarrationError, NarrationRequest};

use crate::error::ApiError;
use crate::validation::validate_narration_request;
use crate::AppState;

/// Frames buffered between the run and the response body.
const FRAME_BUFFER: usize = 4;

#[derive(Deserialize)]
pub struct StreamingRequest {
    pub text: String,
    pub voice: String,
}

pub async fn streaming_tts(
    State(state): State<AppState>,
    Json(req): Json<StreamingRequest>,
) -> Result<Response, ApiError> {
    state.request_count.fetch_add(1, Ordering::Relaxed);
    let voice = validate_narration_request(&req.text, &req.voice, state.config.max_text_length)?;
    let run = state.orchestrator.prepare(NarrationRequest::new(req.text, voice))?;
    let request_id = run.request.id;
    info!(%request_id, %voice, chunks = run.total(), "Opening narration stream");

    let cancel = CancelToken::new();
    let (tx, mut rx) = mpsc::channel::<Frame>(FRAME_BUFFER);

    let metrics = state.metrics.narration.clone();
    metrics.record_started();
    let run_task = tokio::spawn({
        let orchestrator = state.orchestrator.clone();
        let cancel = cancel.clone();
        let metrics = metrics.clone();
        async move {
            let result = orchestrator.run(run, tx, cancel).await;
            match &result {
                Ok(_) => metrics.record_completed(),
                Err(NarrationError::Cancelled) => metrics.record_cancelled(),
                Err(_) => metrics.record_failed(),
            }
            result
        }
        .instrument(info_span!("narration", %request_id))
    });

    // the client hanging up drops the body, which stops the run
    let guard = cancel.drop_guard();
    let body = async_stream::stream! {
        let _guard = guard;
        let mut encoder = FrameEncoder::new();

        while let Some(frame) = rx.recv().await {
            match encoder.encode(&frame) {
                Ok(message) => {
                    metrics.record_frame();
                    yield Ok::<_, Infallible>(message);
                }
                Err(e) => {
                    error!(%request_id, "Refusing to send frame: {e}");
                    cancel.cancel();
                    yield Ok(encoder.encode_error(&e.to_string()));
                    break;
                }
            }
        }
        drop(rx);

        match run_task.await {
            Ok(Ok(report)) => {
                info!(%request_id, frames = report.frames_emitted, "Narration stream finished");
            }
            Ok(Err(NarrationError::Cancelled)) => {}
            Ok(Err(e)) => {
                warn!(%request_id, "Narration failed: {e}");
                yield Ok(encoder.encode_error(&e.to_string()));
            }
            Err(e) => {
                error!(%request_id, "Narration task aborted: {e}");
                yield Ok(encoder.encode_error("Narration aborted"));
            }
        }
    };

    Response::builder()
        .header(header::CONTENT_TYPE, protocol::CONTENT_TYPE)
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .body(Body::from_stream(body))
        .map_err(|e| ApiError::InternalError(e.to_string()))
}
