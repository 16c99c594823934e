// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Line-oriented parser for the chat endpoint's event stream.
//!
//! The wire format is one event per line: `data: <payload>`, where the payload
//! is either the `[DONE]` sentinel or a JSON object carrying an `error` or a
//! `choices[0].delta.content` fragment. Every other line is ignored.
//!
//! [`LineDecoder`] turns arbitrary byte chunks into complete lines, keeping a
//! carry-over buffer so that a line (or a multi-byte UTF-8 sequence) split
//! across reads is only decoded once it is complete. [`interpret_line`] then
//! classifies each line.

use crate::types::CompletionChunk;

/// Marker that prefixes every meaningful line.
pub const DATA_PREFIX: &str = "data:";

/// Payload that ends the stream successfully.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Splits a byte stream into newline-terminated lines.
#[derive(Debug, Default)]
pub struct LineDecoder {
    carry: Vec<u8>,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk and returns every line it completed, in order.
    ///
    /// The terminating `\n` and an optional preceding `\r` are stripped.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.carry.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.carry[start..].iter().position(|&b| b == b'\n') {
            let end = start + offset;
            lines.push(decode_line(&self.carry[start..end]));
            start = end + 1;
        }
        self.carry.drain(..start);
        lines
    }

    /// Returns the unterminated remainder, if any, and empties the buffer.
    pub fn finish(&mut self) -> Option<String> {
        if self.carry.is_empty() {
            return None;
        }
        let tail = decode_line(&self.carry);
        self.carry.clear();
        Some(tail)
    }

    /// Bytes held back waiting for a line terminator.
    pub fn pending_len(&self) -> usize {
        self.carry.len()
    }
}

fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    // Invalid sequences become U+FFFD, matching a non-fatal text decoder.
    String::from_utf8_lossy(raw).into_owned()
}

/// Classification of a single line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseLine {
    /// Not a data line, or a data line with nothing to emit.
    Ignored,
    /// A content fragment to append to the assistant message.
    Content(String),
    /// The `[DONE]` sentinel.
    Done,
    /// The server reported an error; the stream is over.
    Error(String),
    /// A data line whose payload is not valid JSON.
    Noise(String),
}

/// Classifies one line of the event stream.
pub fn interpret_line(line: &str) -> SseLine {
    let Some(rest) = line.strip_prefix(DATA_PREFIX) else {
        return SseLine::Ignored;
    };
    let payload = rest.trim();
    if payload == DONE_SENTINEL {
        return SseLine::Done;
    }
    if payload.is_empty() {
        return SseLine::Ignored;
    }

    let chunk: CompletionChunk = match serde_json::from_str(payload) {
        Ok(chunk) => chunk,
        Err(e) => return SseLine::Noise(format!("{e}: {payload}")),
    };

    if let Some(message) = chunk.error_message() {
        return SseLine::Error(message);
    }
    match chunk.content() {
        Some(text) if !text.is_empty() => SseLine::Content(text.to_string()),
        _ => SseLine::Ignored,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn lines_split_across_chunks_are_reassembled() {
        let mut decoder = LineDecoder::new();
        assert!(decoder.push(b"data: {\"choi").is_empty());
        assert!(decoder.push(b"ces\":[]}").is_empty());
        let lines = decoder.push(b"\r\ndata: [DONE]\n");
        assert_eq!(lines, vec!["data: {\"choices\":[]}", "data: [DONE]"]);
        assert_eq!(decoder.pending_len(), 0);
        assert!(decoder.finish().is_none());
    }

    #[test]
    fn multibyte_character_split_across_reads() {
        // "é" is 0xC3 0xA9.
        let mut decoder = LineDecoder::new();
        assert!(decoder.push(b"data: caf\xC3").is_empty());
        let lines = decoder.push(b"\xA9\n");
        assert_eq!(lines, vec!["data: café"]);
    }

    #[test]
    fn finish_returns_unterminated_tail() {
        let mut decoder = LineDecoder::new();
        decoder.push(b"data: [DONE]");
        assert_eq!(decoder.finish().as_deref(), Some("data: [DONE]"));
        assert!(decoder.finish().is_none());
    }

    #[test]
    fn interpret_content_done_and_error() {
        assert_eq!(
            interpret_line(r#"data: {"choices":[{"delta":{"content":"He"}}]}"#),
            SseLine::Content("He".into())
        );
        assert_eq!(interpret_line("data: [DONE]"), SseLine::Done);
        assert_eq!(interpret_line("data:[DONE]  "), SseLine::Done);
        assert_eq!(
            interpret_line(r#"data: {"error":"rate limited"}"#),
            SseLine::Error("rate limited".into())
        );
        assert_eq!(
            interpret_line(r#"data: {"error":{"message":"tenant disabled"}}"#),
            SseLine::Error("tenant disabled".into())
        );
    }

    #[test]
    fn non_data_lines_and_empty_fragments_are_ignored() {
        assert_eq!(interpret_line(""), SseLine::Ignored);
        assert_eq!(interpret_line(": keep-alive"), SseLine::Ignored);
        assert_eq!(interpret_line("event: message"), SseLine::Ignored);
        assert_eq!(interpret_line("data:"), SseLine::Ignored);
        assert_eq!(
            interpret_line(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#),
            SseLine::Ignored
        );
        assert_eq!(
            interpret_line(r#"data: {"choices":[{"delta":{"content":""}}]}"#),
            SseLine::Ignored
        );
    }

    #[test]
    fn malformed_json_is_noise() {
        assert!(matches!(interpret_line("data: {oops"), SseLine::Noise(_)));
    }

    proptest! {
        #[test]
        fn any_chunking_yields_the_same_lines(
            text in "[a-zé€ \\r\\n]{0,64}",
            cuts in proptest::collection::vec(0usize..80, 0..6),
        ) {
            let bytes = text.as_bytes();
            let mut whole = LineDecoder::new();
            let mut expected = whole.push(bytes);
            expected.extend(whole.finish());

            let mut points: Vec<usize> = cuts.into_iter().map(|c| c.min(bytes.len())).collect();
            points.sort_unstable();
            let mut split = LineDecoder::new();
            let mut actual = Vec::new();
            let mut prev = 0;
            for p in points {
                actual.extend(split.push(&bytes[prev..p]));
                prev = p;
            }
            actual.extend(split.push(&bytes[prev..]));
            actual.extend(split.finish());

            prop_assert_eq!(actual, expected);
        }
    }
}
