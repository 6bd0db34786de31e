//! Sentence-respecting text segmentation.
//!
//! Text is split into sentence units at `.`, `!` and `?`, then consecutive
//! units are packed greedily into chunks of at most `budget` characters. A
//! sentence longer than the budget becomes a chunk of its own; sentences are
//! never cut.

use crate::error::NarrationError;
use crate::frame::Chunk;

/// Default soft character budget per chunk.
pub const DEFAULT_CHUNK_BUDGET: usize = 100;

// Titles and Latin shorthands whose trailing period does not end a sentence.
const ABBREVIATIONS: &[&str] = &["dr.", "mr.", "mrs.", "ms.", "prof.", "st.", "jr.", "sr.", "vs.", "e.g.", "i.e."];

/// Split `text` into ordered, non-empty chunks of at most `budget` characters
/// (unless a single sentence is longer).
pub fn segment(text: &str, budget: usize) -> Result<Vec<Chunk>, NarrationError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(NarrationError::invalid("Text cannot be empty"));
    }
    if budget == 0 {
        return Err(NarrationError::invalid("Chunk budget must be at least 1"));
    }

    let mut packed: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for sentence in split_sentences(text) {
        let len = sentence.chars().count();
        if !current.is_empty() && current_len + 1 + len > budget {
            packed.push(close_chunk(std::mem::take(&mut current)));
            current_len = 0;
        }
        if !current.is_empty() {
            current.push(' ');
            current_len += 1;
        }
        current.push_str(&sentence);
        current_len += len;
    }
    if !current.is_empty() {
        packed.push(close_chunk(current));
    }

    Ok(packed
        .into_iter()
        .enumerate()
        .map(|(index, text)| Chunk::new(index, text))
        .collect())
}

/// Split text into sentence units, keeping each unit's terminal punctuation
/// and collapsing runs of whitespace to single spaces.
pub fn split_sentences(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut sentences = Vec::new();
    let mut current = String::new();

    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            if !current.is_empty() && !current.ends_with(' ') {
                current.push(' ');
            }
            i += 1;
            continue;
        }

        current.push(c);
        if is_terminal(c) {
            // "?!", "..." and closing quotes belong to the sentence they end
            while i + 1 < chars.len() && (is_terminal(chars[i + 1]) || is_closing(chars[i + 1])) {
                i += 1;
                current.push(chars[i]);
            }
            // "3.5" or "example.com" are not boundaries
            let at_boundary = i + 1 >= chars.len() || chars[i + 1].is_whitespace();
            if at_boundary && !ends_with_abbreviation(&current) {
                sentences.push(current.trim().to_string());
                current.clear();
            }
        }
        i += 1;
    }

    let rest = current.trim();
    if !rest.is_empty() {
        sentences.push(rest.to_string());
    }
    sentences
}

fn is_terminal(c: char) -> bool {
    matches!(c, '.' | '!' | '?')
}

fn is_closing(c: char) -> bool {
    matches!(c, '"' | '\'' | ')' | ']' | '\u{201D}' | '\u{2019}')
}

fn ends_with_abbreviation(sentence: &str) -> bool {
    let last_word = sentence.rsplit(' ').next().unwrap_or("").to_lowercase();
    ABBREVIATIONS.contains(&last_word.as_str())
}

fn close_chunk(mut chunk: String) -> String {
    let ends_terminated = chunk
        .trim_end_matches(is_closing)
        .chars()
        .last()
        .is_some_and(is_terminal);
    if !ends_terminated {
        chunk.push('.');
    }
    chunk
}
