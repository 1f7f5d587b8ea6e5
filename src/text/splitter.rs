//! Utterance splitter: segments input text into sentence-like utterances.
//!
//! Splitting is lazy. The input is validated up front so a malformed text
//! fails the whole call before any utterance is produced.

use crate::error::{Result, SynthError};
use crate::pipeline::types::{SynthesisParams, Utterance};
use std::collections::VecDeque;

/// Characters that end a sentence.
const TERMINALS: [char; 4] = ['.', '!', '?', '…'];

/// Closing quotes and brackets that stay attached to the sentence they end.
const CLOSERS: [char; 8] = ['"', '\'', ')', ']', '}', '”', '’', '»'];

/// Decodes raw bytes as UTF-8, mapping failures to `SynthError::Input`.
pub fn decode_text(bytes: &[u8]) -> Result<&str> {
    std::str::from_utf8(bytes).map_err(|e| SynthError::Input {
        message: format!("text is not valid UTF-8: {}", e),
    })
}

/// Rejects NUL and other non-whitespace control characters.
pub fn validate_text(text: &str) -> Result<()> {
    if let Some((pos, c)) = text
        .char_indices()
        .find(|(_, c)| c.is_control() && !c.is_whitespace())
    {
        return Err(SynthError::Input {
            message: format!("unsupported control character U+{:04X} at byte {}", c as u32, pos),
        });
    }
    Ok(())
}

/// Lazy, finite, non-restartable sequence of utterances over one text.
#[derive(Debug)]
pub struct UtteranceSplitter {
    text: String,
    cursor: usize,
    next_index: u64,
    params: SynthesisParams,
    max_utterance_chars: Option<usize>,
    /// Pieces of an overlong sentence not yet handed out.
    overflow: VecDeque<String>,
}

impl UtteranceSplitter {
    /// Creates a splitter over `text`, copying `params` onto every utterance.
    pub fn new(text: impl Into<String>, params: SynthesisParams) -> Result<Self> {
        let text = text.into();
        validate_text(&text)?;
        Ok(Self {
            text,
            cursor: 0,
            next_index: 0,
            params,
            max_utterance_chars: None,
            overflow: VecDeque::new(),
        })
    }

    /// Creates a splitter from raw bytes that must be valid UTF-8.
    pub fn from_bytes(bytes: &[u8], params: SynthesisParams) -> Result<Self> {
        Self::new(decode_text(bytes)?, params)
    }

    /// Cuts sentences longer than `max` characters at word boundaries.
    ///
    /// `None` or `Some(0)` leaves sentences whole.
    pub fn with_max_utterance_chars(mut self, max: Option<usize>) -> Self {
        self.max_utterance_chars = max.filter(|&m| m > 0);
        self
    }

    /// Number of utterances handed out so far.
    pub fn emitted(&self) -> u64 {
        self.next_index
    }

    /// Scans forward from the cursor to the end of the next sentence.
    ///
    /// Returns the raw slice bounds, or `None` once the text is exhausted.
    fn scan_sentence(&mut self) -> Option<(usize, usize)> {
        let rest = &self.text[self.cursor..];
        if rest.is_empty() {
            return None;
        }
        let start = self.cursor;
        let mut chars = rest.char_indices().peekable();

        while let Some((offset, c)) = chars.next() {
            if c == '\n' {
                self.cursor = start + offset + c.len_utf8();
                return Some((start, start + offset));
            }
            if !TERMINALS.contains(&c) {
                continue;
            }

            let mut end = offset + c.len_utf8();
            while let Some(&(o, next)) = chars.peek() {
                if TERMINALS.contains(&next) || CLOSERS.contains(&next) {
                    end = o + next.len_utf8();
                    chars.next();
                } else {
                    break;
                }
            }

            match chars.peek() {
                None => {
                    self.cursor = self.text.len();
                    return Some((start, start + end));
                }
                Some(&(_, next)) if next.is_whitespace() => {
                    self.cursor = start + end;
                    return Some((start, start + end));
                }
                // "3.14", "e.g.x": punctuation inside a word
                Some(_) => {}
            }
        }

        self.cursor = self.text.len();
        Some((start, self.text.len()))
    }

    /// Returns the next non-empty, whitespace-normalized sentence.
    fn next_sentence(&mut self) -> Option<String> {
        while let Some((start, end)) = self.scan_sentence() {
            let normalized = self.text[start..end]
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ");
            // Stray punctuation ("...", "!") has nothing to speak
            if normalized.chars().any(char::is_alphanumeric) {
                return Some(normalized);
            }
        }
        None
    }
}

impl Iterator for UtteranceSplitter {
    type Item = Utterance;

    fn next(&mut self) -> Option<Utterance> {
        if self.overflow.is_empty() {
            let sentence = self.next_sentence()?;
            match self.max_utterance_chars {
                Some(max) => self.overflow.extend(split_long(&sentence, max)),
                None => self.overflow.push_back(sentence),
            }
        }

        let text = self.overflow.pop_front()?;
        let utterance = Utterance::new(self.next_index, text, self.params);
        self.next_index += 1;
        Some(utterance)
    }
}

/// Splits `sentence` into pieces of at most `max` characters, preferring the
/// last whitespace before the limit.
fn split_long(sentence: &str, max: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut rest = sentence.trim();

    while rest.chars().count() > max {
        // Byte offset of the first char past the limit
        let limit = rest
            .char_indices()
            .nth(max)
            .map_or(rest.len(), |(i, _)| i);
        // Include the char at the limit so a space there cuts cleanly
        let window_end = rest[limit..]
            .chars()
            .next()
            .map_or(limit, |c| limit + c.len_utf8());
        let cut = match rest[..window_end].rfind(char::is_whitespace) {
            Some(ws) if ws > 0 => ws,
            _ => limit,
        };
        let (head, tail) = rest.split_at(cut);
        pieces.push(head.trim_end().to_string());
        rest = tail.trim_start();
    }
    if !rest.is_empty() {
        pieces.push(rest.to_string());
    }
    pieces
}
