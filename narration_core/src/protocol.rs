//! Wire format for narration streams.
//!
//! Every frame travels as one server-sent event:
//!
//! ```text
//! data: {"index":0,"total":3,"text":"Once upon a time.","audio":"<base64>","isLast":false}
//!
//! ```
//!
//! A run that fails before its final frame ends with
//! `event: error` / `data: {"error":"..."}`. Messages are delimited by a blank
//! line, so the decoder can work on arbitrarily split byte chunks.

use base64::{engine::general_purpose, Engine as _};
use futures_core::Stream;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ChannelError, ProtocolError};
use crate::frame::Frame;

pub const CONTENT_TYPE: &str = "text/event-stream";

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireFrame {
    index: usize,
    total: usize,
    text: String,
    audio: String,
    is_last: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireError {
    error: String,
}

/// A validated message taken off the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamMessage {
    Frame(Frame),
    /// The producer aborted the run; no more frames follow.
    Error(String),
}

/// Serializes frames in run order. Refuses anything that would break the
/// contiguous `0..total` sequence.
#[derive(Debug, Default)]
pub struct FrameEncoder {
    next_index: usize,
    total: Option<usize>,
    finished: bool,
}

impl FrameEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn encode(&mut self, frame: &Frame) -> Result<String, ProtocolError> {
        if self.finished {
            return Err(ProtocolError::InvalidFrame {
                index: frame.index,
                reason: "frame after the final frame".into(),
            });
        }
        if frame.index != self.next_index {
            return Err(ProtocolError::InvalidFrame {
                index: frame.index,
                reason: format!("expected index {}", self.next_index),
            });
        }
        if let Some(total) = self.total {
            if total != frame.total {
                return Err(ProtocolError::InvalidFrame {
                    index: frame.index,
                    reason: format!("total changed from {total} to {}", frame.total),
                });
            }
        }
        frame.validate()?;

        let wire = WireFrame {
            index: frame.index,
            total: frame.total,
            text: frame.text.clone(),
            audio: general_purpose::STANDARD.encode(&frame.audio),
            is_last: frame.is_last,
        };
        let json = serde_json::to_string(&wire).map_err(|e| ProtocolError::Malformed(e.to_string()))?;

        self.total = Some(frame.total);
        self.next_index += 1;
        self.finished = frame.is_last;
        Ok(format!("data: {json}\n\n"))
    }

    /// The terminal error message for a run that stopped early.
    pub fn encode_error(&mut self, message: &str) -> String {
        self.finished = true;
        let json = serde_json::to_string(&WireError { error: message.to_string() })
            .unwrap_or_else(|_| "{\"error\":\"narration failed\"}".to_string());
        format!("event: error\ndata: {json}\n\n")
    }

    pub fn frames_encoded(&self) -> usize {
        self.next_index
    }
}

/// Incremental decoder: feed it bytes as they arrive, get back every message
/// completed so far. Malformed messages are logged and skipped.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
    skipped: usize,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) -> Vec<StreamMessage> {
        self.buf.extend_from_slice(bytes);

        let mut out = Vec::new();
        while let Some((pos, delim_len)) = find_delimiter(&self.buf) {
            let raw: Vec<u8> = self.buf.drain(..pos + delim_len).collect();
            match parse_block(&raw[..pos]) {
                Ok(Some(message)) => out.push(message),
                Ok(None) => {}
                Err(e) => {
                    self.skipped += 1;
                    warn!("Skipping malformed narration message: {e}");
                }
            }
        }
        out
    }

    /// Number of messages dropped as malformed so far.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Bytes of an incomplete trailing message still waiting for a delimiter.
    pub fn pending_bytes(&self) -> usize {
        self.buf.len()
    }

    /// Called at end of stream. Returns true if an incomplete message was
    /// discarded.
    pub fn finish(&mut self) -> bool {
        let partial = self.buf.iter().any(|b| !b.is_ascii_whitespace());
        if partial {
            warn!("Discarding {} bytes of an incomplete narration message", self.buf.len());
        }
        self.buf.clear();
        partial
    }
}

/// Adapts a byte stream (e.g. an HTTP response body) into decoded messages.
/// A transport error is yielded once and ends the stream.
pub fn decode_stream<S, B, E>(bytes: S) -> impl Stream<Item = Result<StreamMessage, ChannelError>>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    async_stream::stream! {
        let mut decoder = FrameDecoder::new();
        futures_util::pin_mut!(bytes);
        while let Some(piece) = bytes.next().await {
            match piece {
                Ok(chunk) => {
                    for message in decoder.push(chunk.as_ref()) {
                        yield Ok(message);
                    }
                }
                Err(e) => {
                    yield Err(ChannelError::Transport(e.to_string()));
                    return;
                }
            }
        }
        decoder.finish();
    }
}

fn find_delimiter(buf: &[u8]) -> Option<(usize, usize)> {
    let lf = buf.windows(2).position(|w| w == b"\n\n").map(|p| (p, 2));
    let crlf = buf.windows(4).position(|w| w == b"\r\n\r\n").map(|p| (p, 4));
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

fn parse_block(block: &[u8]) -> Result<Option<StreamMessage>, ProtocolError> {
    let text = std::str::from_utf8(block).map_err(|e| ProtocolError::Malformed(format!("invalid UTF-8: {e}")))?;

    let mut event: Option<&str> = None;
    let mut data: Vec<&str> = Vec::new();
    for line in text.lines() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((f, v)) => (f, v.strip_prefix(' ').unwrap_or(v)),
            None => (line, ""),
        };
        match field {
            "event" => event = Some(value),
            "data" => data.push(value),
            _ => debug!("Ignoring field '{field}' in narration message"),
        }
    }

    if data.is_empty() {
        return Ok(None);
    }
    let payload = data.join("\n");

    match event.unwrap_or("message") {
        "message" => parse_frame(&payload).map(|f| Some(StreamMessage::Frame(f))),
        "error" => {
            let message = serde_json::from_str::<WireError>(&payload)
                .map(|e| e.error)
                .unwrap_or(payload);
            Ok(Some(StreamMessage::Error(message)))
        }
        other => Err(ProtocolError::Malformed(format!("unknown event type '{other}'"))),
    }
}

fn parse_frame(payload: &str) -> Result<Frame, ProtocolError> {
    let wire: WireFrame = serde_json::from_str(payload).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
    let audio = general_purpose::STANDARD
        .decode(wire.audio.as_bytes())
        .map_err(|e| ProtocolError::InvalidFrame {
            index: wire.index,
            reason: format!("audio is not valid base64: {e}"),
        })?;
    let frame = Frame {
        index: wire.index,
        total: wire.total,
        text: wire.text,
        audio,
        is_last: wire.is_last,
    };
    frame.validate()?;
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames(n: usize) -> Vec<Frame> {
        (0..n).map(|i| Frame::new(i, n, format!("Sentence {i}."), vec![i as u8 + 1; 8])).collect()
    }

    fn encode_all(frames: &[Frame]) -> String {
        let mut enc = FrameEncoder::new();
        frames.iter().map(|f| enc.encode(f).unwrap()).collect()
    }

    #[test]
    fn wire_format_is_sse_data_line() {
        let mut enc = FrameEncoder::new();
        let msg = enc.encode(&Frame::new(0, 1, "Hi.", b"abc".to_vec())).unwrap();
        assert!(msg.starts_with("data: {"));
        assert!(msg.ends_with("}\n\n"));
        let json: serde_json::Value = serde_json::from_str(&msg[6..msg.len() - 2]).unwrap();
        assert_eq!(json["index"], 0);
        assert_eq!(json["total"], 1);
        assert_eq!(json["text"], "Hi.");
        assert_eq!(json["audio"], "YWJj");
        assert_eq!(json["isLast"], true);
    }

    #[test]
    fn encoder_enforces_run_order() {
        let fs = frames(3);
        let mut enc = FrameEncoder::new();
        assert!(enc.encode(&fs[1]).is_err());
        enc.encode(&fs[0]).unwrap();
        assert!(enc.encode(&fs[0]).is_err());
        enc.encode(&fs[1]).unwrap();
        assert!(enc.encode(&Frame::new(2, 4, "x", vec![1])).is_err());
        enc.encode(&fs[2]).unwrap();
        assert!(enc.encode(&Frame::new(3, 3, "x", vec![1])).is_err());
        assert_eq!(enc.frames_encoded(), 3);
    }

    #[test]
    fn decodes_across_arbitrary_splits() {
        let fs = frames(3);
        let wire = encode_all(&fs);

        for piece in [1, 3, 7, 64] {
            let mut dec = FrameDecoder::new();
            let mut got = Vec::new();
            for bytes in wire.as_bytes().chunks(piece) {
                got.extend(dec.push(bytes));
            }
            assert_eq!(got, fs.iter().cloned().map(StreamMessage::Frame).collect::<Vec<_>>());
            assert_eq!(dec.pending_bytes(), 0);
            assert!(!dec.finish());
        }
    }

    #[test]
    fn waits_for_delimiter_before_parsing() {
        let wire = encode_all(&frames(1));
        let mut dec = FrameDecoder::new();
        assert!(dec.push(&wire.as_bytes()[..wire.len() - 1]).is_empty());
        assert_eq!(dec.push(b"\n").len(), 1);
    }

    #[test]
    fn malformed_message_is_skipped_not_fatal() {
        let fs = frames(3);
        let mut enc = FrameEncoder::new();
        let mut wire = enc.encode(&fs[0]).unwrap();
        wire.push_str("data: {\"index\": 1, \"tot\n\n");
        wire.push_str("data: {\"index\":1,\"total\":3,\"text\":\"x\",\"audio\":\"!!!\",\"isLast\":false}\n\n");
        enc.encode(&fs[1]).unwrap();
        wire.push_str(&enc.encode(&fs[2]).unwrap());

        let mut dec = FrameDecoder::new();
        let got = dec.push(wire.as_bytes());
        assert_eq!(got, vec![StreamMessage::Frame(fs[0].clone()), StreamMessage::Frame(fs[2].clone())]);
        assert_eq!(dec.skipped(), 2);
    }

    #[test]
    fn inconsistent_last_flag_is_quarantined() {
        let mut dec = FrameDecoder::new();
        let got = dec.push(b"data: {\"index\":0,\"total\":2,\"text\":\"a\",\"audio\":\"AQ==\",\"isLast\":true}\n\n");
        assert!(got.is_empty());
        assert_eq!(dec.skipped(), 1);
    }

    #[test]
    fn error_event_is_decoded() {
        let mut enc = FrameEncoder::new();
        let wire = enc.encode_error("provider unavailable");
        assert!(wire.starts_with("event: error\n"));

        let mut dec = FrameDecoder::new();
        assert_eq!(dec.push(wire.as_bytes()), vec![StreamMessage::Error("provider unavailable".into())]);
    }

    #[test]
    fn tolerates_crlf_comments_and_unknown_fields() {
        let mut dec = FrameDecoder::new();
        let input = ": keep-alive\r\n\r\nid: 7\r\ndata: {\"index\":0,\"total\":1,\"text\":\"a\",\"audio\":\"AQ==\",\"isLast\":true}\r\n\r\n";
        let got = dec.push(input.as_bytes());
        assert_eq!(got, vec![StreamMessage::Frame(Frame::new(0, 1, "a", vec![1]))]);
        assert_eq!(dec.skipped(), 0);
    }

    #[test]
    fn finish_reports_partial_message() {
        let mut dec = FrameDecoder::new();
        dec.push(b"data: {\"index\":0");
        assert!(dec.finish());
        assert_eq!(dec.pending_bytes(), 0);
    }

    #[tokio::test]
    async fn decode_stream_surfaces_transport_errors() {
        let wire = encode_all(&frames(2));
        let (first, _) = wire.split_at(wire.find("\n\n").unwrap() + 2);
        let pieces: Vec<Result<Vec<u8>, String>> = vec![Ok(first.as_bytes().to_vec()), Err("connection reset".into())];

        let out: Vec<_> = decode_stream(futures_util::stream::iter(pieces)).collect().await;
        assert_eq!(out.len(), 2);
        assert!(matches!(out[0], Ok(StreamMessage::Frame(ref f)) if f.index == 0));
        assert_eq!(out[1], Err(ChannelError::Transport("connection reset".into())));
    }
}
