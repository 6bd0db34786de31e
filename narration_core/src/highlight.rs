//! Highlighting for a single, fully available clip.
//!
//! Without per-chunk playback events the best we can do is split the clip
//! duration evenly across the text's segments and follow the player position.

use std::time::Duration;

use crate::audio::clip_duration;
use crate::segmenter::split_sentences;

#[derive(Debug, Clone, PartialEq)]
pub struct HighlightTimeline {
    segments: Vec<String>,
    duration: Duration,
}

impl HighlightTimeline {
    pub fn new(segments: Vec<String>, duration: Duration) -> Self {
        Self { segments, duration }
    }

    /// One segment per sentence of `text`.
    pub fn from_text(text: &str, duration: Duration) -> Self {
        Self::new(split_sentences(text), duration)
    }

    /// Like [`from_text`](Self::from_text), with the duration read from a WAV
    /// payload. `None` if the clip is not WAV.
    pub fn from_clip(text: &str, audio: &[u8]) -> Option<Self> {
        clip_duration(audio).map(|d| Self::from_text(text, d))
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// `min(floor(t / (duration / N)), N - 1)`, or `None` without segments.
    pub fn active_index(&self, position: Duration) -> Option<usize> {
        let n = self.segments.len();
        if n == 0 {
            return None;
        }
        if self.duration.is_zero() {
            return Some(0);
        }
        let per_segment = self.duration.as_secs_f64() / n as f64;
        let index = (position.as_secs_f64() / per_segment).floor() as usize;
        Some(index.min(n - 1))
    }

    pub fn active_segment(&self, position: Duration) -> Option<&str> {
        self.active_index(position).map(|i| self.segments[i].as_str())
    }
}

/// Follows player position updates and reports when the active segment
/// changes.
#[derive(Debug, Clone)]
pub struct Highlighter {
    timeline: HighlightTimeline,
    current: Option<usize>,
}

impl Highlighter {
    pub fn new(timeline: HighlightTimeline) -> Self {
        Self { timeline, current: None }
    }

    pub fn timeline(&self) -> &HighlightTimeline {
        &self.timeline
    }

    pub fn current(&self) -> Option<usize> {
        self.current
    }

    /// Feed a position update. Returns the new active index when it differs
    /// from the previous one. Position zero (playback restarted) always
    /// resets to segment 0.
    pub fn update(&mut self, position: Duration) -> Option<usize> {
        let next = if position.is_zero() && !self.timeline.segments.is_empty() {
            Some(0)
        } else {
            self.timeline.active_index(position)
        };
        if next == self.current {
            return None;
        }
        self.current = next;
        next
    }

    /// The player learned the real duration (e.g. after metadata loaded).
    pub fn set_duration(&mut self, duration: Duration) {
        if duration != self.timeline.duration {
            self.timeline.duration = duration;
            self.current = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::silence_wav;

    const TEXT: &str = "First one. Second one! Third one? Fourth.";

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn active_segment_follows_even_split() {
        let timeline = HighlightTimeline::from_text(TEXT, ms(8000));
        assert_eq!(timeline.segments().len(), 4);
        assert_eq!(timeline.active_index(ms(0)), Some(0));
        assert_eq!(timeline.active_index(ms(1999)), Some(0));
        assert_eq!(timeline.active_index(ms(2000)), Some(1));
        assert_eq!(timeline.active_segment(ms(5000)), Some("Third one?"));
        assert_eq!(timeline.active_index(ms(7999)), Some(3));
    }

    #[test]
    fn positions_past_the_end_clamp_to_last_segment() {
        let timeline = HighlightTimeline::from_text(TEXT, ms(8000));
        assert_eq!(timeline.active_index(ms(8000)), Some(3));
        assert_eq!(timeline.active_index(ms(60_000)), Some(3));
    }

    #[test]
    fn degenerate_timelines() {
        assert_eq!(HighlightTimeline::new(Vec::new(), ms(1000)).active_index(ms(10)), None);
        let zero = HighlightTimeline::from_text(TEXT, Duration::ZERO);
        assert_eq!(zero.active_index(ms(500)), Some(0));
    }

    #[test]
    fn highlighter_reports_changes_and_resets_on_restart() {
        let mut hl = Highlighter::new(HighlightTimeline::from_text(TEXT, ms(4000)));
        assert_eq!(hl.update(ms(100)), Some(0));
        assert_eq!(hl.update(ms(900)), None);
        assert_eq!(hl.update(ms(1500)), Some(1));
        assert_eq!(hl.update(ms(3500)), Some(3));

        assert_eq!(hl.update(Duration::ZERO), Some(0));
        assert_eq!(hl.current(), Some(0));
    }

    #[test]
    fn duration_change_recomputes() {
        let mut hl = Highlighter::new(HighlightTimeline::from_text(TEXT, ms(4000)));
        assert_eq!(hl.update(ms(1500)), Some(1));
        hl.set_duration(ms(8000));
        assert_eq!(hl.update(ms(1500)), Some(0));
    }

    #[test]
    fn timeline_from_wav_clip() {
        let wav = silence_wav(ms(2000), 8_000).unwrap();
        let timeline = HighlightTimeline::from_clip("One. Two.", &wav).unwrap();
        assert_eq!(timeline.duration(), ms(2000));
        assert_eq!(timeline.active_segment(ms(1200)), Some("Two."));
        assert!(HighlightTimeline::from_clip("One.", b"ID3").is_none());
    }
}
