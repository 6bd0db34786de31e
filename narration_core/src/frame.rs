use serde::Serialize;

use crate::error::ProtocolError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkStatus {
    Pending,
    Synthesizing,
    Ready,
    Failed,
}

/// A sentence-respecting slice of the narration text; the unit of synthesis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    pub index: usize,
    pub text: String,
    pub status: ChunkStatus,
}

impl Chunk {
    pub fn new(index: usize, text: impl Into<String>) -> Self {
        Self {
            index,
            text: text.into(),
            status: ChunkStatus::Pending,
        }
    }
}

/// One synthesized chunk plus its ordering metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub index: usize,
    pub total: usize,
    pub text: String,
    pub audio: Vec<u8>,
    pub is_last: bool,
}

impl Frame {
    pub fn new(index: usize, total: usize, text: impl Into<String>, audio: Vec<u8>) -> Self {
        Self {
            index,
            total,
            text: text.into(),
            audio,
            is_last: index + 1 == total,
        }
    }

    /// Checks the per-frame invariants: `index < total`, `is_last` iff the
    /// final index, and a non-empty audio payload.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        let invalid = |reason: &str| ProtocolError::InvalidFrame {
            index: self.index,
            reason: reason.to_string(),
        };
        if self.total == 0 {
            return Err(invalid("total must be at least 1"));
        }
        if self.index >= self.total {
            return Err(invalid("index out of range"));
        }
        if self.is_last != (self.index + 1 == self.total) {
            return Err(invalid("isLast does not match index/total"));
        }
        if self.audio.is_empty() {
            return Err(invalid("empty audio payload"));
        }
        Ok(())
    }

    /// `(index+1)/total*100`.
    pub fn percent_complete(&self) -> f32 {
        if self.total == 0 {
            return 0.0;
        }
        (self.index + 1) as f32 / self.total as f32 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_flag_follows_index() {
        assert!(!Frame::new(0, 3, "a.", vec![1]).is_last);
        assert!(Frame::new(2, 3, "c.", vec![1]).is_last);
        assert!(Frame::new(0, 1, "only.", vec![1]).is_last);
    }

    #[test]
    fn validate_rejects_inconsistent_frames() {
        let mut frame = Frame::new(1, 3, "b.", vec![1, 2]);
        assert!(frame.validate().is_ok());

        frame.is_last = true;
        assert!(frame.validate().is_err());

        let out_of_range = Frame { index: 3, total: 3, text: "x".into(), audio: vec![1], is_last: false };
        assert!(out_of_range.validate().is_err());

        let silent = Frame::new(0, 1, "x", Vec::new());
        assert!(matches!(silent.validate(), Err(ProtocolError::InvalidFrame { index: 0, .. })));
    }

    #[test]
    fn percent_complete() {
        assert_eq!(Frame::new(0, 4, "", vec![1]).percent_complete(), 25.0);
        assert_eq!(Frame::new(3, 4, "", vec![1]).percent_complete(), 100.0);
    }
}
