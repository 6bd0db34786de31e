use thiserror::Error;

/// Run-level failures on the producer side.
#[derive(Debug, Error)]
pub enum NarrationError {
    /// Rejected before any channel is opened (empty text, unknown voice, ...).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The provider failed for one chunk; the run stops there.
    #[error("Provider error on chunk {index}: {source}")]
    Provider {
        index: usize,
        #[source]
        source: anyhow::Error,
    },

    /// The consumer went away or the run was cancelled explicitly.
    #[error("Narration cancelled")]
    Cancelled,
}

impl NarrationError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}

/// A single wire message that could not be turned into a valid record.
/// Decoders log and skip these.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Malformed message: {0}")]
    Malformed(String),

    #[error("Invalid frame {index}: {reason}")]
    InvalidFrame { index: usize, reason: String },
}

/// Transport-level failures seen by the consumer. Each one ends the session.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChannelError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Stream closed before the final frame (last index seen: {last_index:?})")]
    ClosedEarly { last_index: Option<usize> },

    /// The producer closed the channel with an explicit error message.
    #[error("Narration failed upstream: {0}")]
    Upstream(String),
}
