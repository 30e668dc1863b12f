//! Turn the control connection's byte stream into discrete [`Response`]
//! records, including RFC 959 §4.2 multi-line continuations.
//!
//! This is implemented as a [`tokio_util::codec::Decoder`] so that a
//! [`tokio_util::codec::FramedRead`] gives us chunk-boundary-agnostic
//! buffering for free: `decode` is simply re-invoked with more bytes
//! appended whenever a frame isn't complete yet, and whatever we didn't
//! consume stays in the buffer across calls.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::Error;

/// A single parsed server response, possibly assembled from several wire
/// lines if the reply was multi-line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// The three-digit reply code.
    pub code: u16,
    /// All lines of the reply, newline-separated, code/separator stripped
    /// from the final line.
    pub text: String,
    /// `true` when `code` is in `[400, 599]`.
    pub is_error: bool,
    /// `true` when `code` is in `[100, 199]` — a preliminary reply.
    pub is_mark: bool,
}

impl Response {
    /// Build a `Response`, computing `is_error`/`is_mark` from `code`.
    pub fn new(code: u16, text: impl Into<String>) -> Self {
        Response {
            code,
            text: text.into(),
            is_error: (400..=599).contains(&code),
            is_mark: (100..=199).contains(&code),
        }
    }
}

/// Byte-stream decoder that turns control-connection bytes into
/// [`Response`] records.
///
/// Accepts `\r\n` per the wire format but tolerates bare `\n`, since some
/// servers (and most test fixtures) don't bother with the carriage
/// return. A line that doesn't look like a reply while we're not inside a
/// multi-line body is discarded and parsing resumes at the next line —
/// resilience over strictness, per RFC 959 §4.2.
#[derive(Debug, Default)]
pub struct ResponseParser {
    multiline: Option<MultilineState>,
}

#[derive(Debug)]
struct MultilineState {
    code: u16,
    lines: Vec<String>,
}

impl ResponseParser {
    /// Create a fresh parser with no partial multi-line reply pending.
    pub fn new() -> Self {
        ResponseParser::default()
    }
}

/// Find the first complete line (terminated by `\n`) in `src`, returning
/// its content (with a trailing `\r` stripped, if present) and the number
/// of bytes to advance past (including the terminator). Returns `None` if
/// no complete line is buffered yet.
fn next_line(src: &[u8]) -> Option<(&str, usize)> {
    let newline_pos = src.iter().position(|&b| b == b'\n')?;
    let mut end = newline_pos;
    if end > 0 && src[end - 1] == b'\r' {
        end -= 1;
    }
    // Lossy: server text is not guaranteed to be valid UTF-8, and the
    // parser favors resilience over strictness.
    let line = std::str::from_utf8(&src[..end]).unwrap_or("");
    Some((line, newline_pos + 1))
}

/// If `line` starts with three ASCII digits followed by `sep`, return the
/// parsed code and the remaining text.
fn split_code(line: &str, sep: u8) -> Option<(u16, &str)> {
    let bytes = line.as_bytes();
    if bytes.len() < 4 || !bytes[..3].iter().all(u8::is_ascii_digit) || bytes[3] != sep {
        return None;
    }
    let code: u16 = line[..3].parse().ok()?;
    Some((code, &line[4..]))
}

impl Decoder for ResponseParser {
    type Item = Response;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Response>, Error> {
        loop {
            let (line, consumed) = match next_line(&src) {
                Some(found) => found,
                None => return Ok(None),
            };

            match &mut self.multiline {
                None => {
                    if let Some((code, text)) = split_code(line, b' ') {
                        let text = text.to_string();
                        src.advance(consumed);
                        return Ok(Some(Response::new(code, text)));
                    }
                    if let Some((code, text)) = split_code(line, b'-') {
                        let lines = vec![text.to_string()];
                        self.multiline = Some(MultilineState { code, lines });
                        src.advance(consumed);
                        continue;
                    }
                    // Not a recognizable reply line; discard and resync.
                    src.advance(consumed);
                    continue;
                }
                Some(state) => {
                    let terminator = split_code(line, b' ')
                        .filter(|(code, _)| *code == state.code);
                    if let Some((code, text)) = terminator {
                        state.lines.push(text.to_string());
                        let full_text = state.lines.join("\n");
                        src.advance(consumed);
                        self.multiline = None;
                        return Ok(Some(Response::new(code, full_text)));
                    }
                    state.lines.push(line.to_string());
                    src.advance(consumed);
                    continue;
                }
            }
        }
    }
}

/// Writes a command line as `line + "\r\n"`; a no-op for an empty line,
/// per spec §4.2.
impl Encoder<&str> for ResponseParser {
    type Error = Error;

    fn encode(&mut self, line: &str, dst: &mut BytesMut) -> Result<(), Error> {
        if line.is_empty() {
            return Ok(());
        }
        dst.reserve(line.len() + 2);
        dst.put_slice(line.as_bytes());
        dst.put_slice(b"\r\n");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(input: &[u8]) -> Vec<Response> {
        let mut parser = ResponseParser::new();
        let mut buf = BytesMut::from(input);
        let mut out = Vec::new();
        while let Some(r) = parser.decode(&mut buf).unwrap() {
            out.push(r);
        }
        out
    }

    #[test]
    fn single_line_reply() {
        let responses = decode_all(b"220 ready\r\n");
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].code, 220);
        assert_eq!(responses[0].text, "ready");
        assert!(!responses[0].is_error);
        assert!(!responses[0].is_mark);
    }

    #[test]
    fn tolerates_bare_newline() {
        let responses = decode_all(b"200 ok\n");
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].code, 200);
        assert_eq!(responses[0].text, "ok");
    }

    #[test]
    fn multiline_reply_with_embedded_code_like_text() {
        let responses = decode_all(b"257-first\r\nmid 257 stuff\r\n257 last\r\n");
        assert_eq!(responses.len(), 1);
        let r = &responses[0];
        assert_eq!(r.code, 257);
        assert_eq!(r.text, "first\nmid 257 stuff\nlast");
    }

    #[test]
    fn mark_and_error_classification() {
        let responses = decode_all(b"150 opening\r\n451 local error\r\n");
        assert_eq!(responses.len(), 2);
        assert!(responses[0].is_mark);
        assert!(!responses[0].is_error);
        assert!(responses[1].is_error);
        assert!(!responses[1].is_mark);
    }

    #[test]
    fn malformed_line_is_skipped_outside_multiline() {
        let responses = decode_all(b"garbage not a reply\r\n226 done\r\n");
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].code, 226);
    }

    #[test]
    fn chunk_boundary_agnostic() {
        let input: &[u8] = b"211-Features:\r\n UTF8\r\n EPSV\r\n211 End\r\n";
        let whole = decode_all(input);

        for split_at in 0..input.len() {
            let mut parser = ResponseParser::new();
            let mut buf = BytesMut::new();
            buf.extend_from_slice(&input[..split_at]);
            let mut out = Vec::new();
            while let Some(r) = parser.decode(&mut buf).unwrap() {
                out.push(r);
            }
            buf.extend_from_slice(&input[split_at..]);
            while let Some(r) = parser.decode(&mut buf).unwrap() {
                out.push(r);
            }
            assert_eq!(out, whole, "mismatch when splitting at byte {}", split_at);
        }
    }

    #[test]
    fn pending_partial_reply_survives_across_calls() {
        let mut parser = ResponseParser::new();
        let mut buf = BytesMut::from(&b"200 par"[..]);
        assert_eq!(parser.decode(&mut buf).unwrap(), None);
        buf.extend_from_slice(b"tial\r\n");
        let response = parser.decode(&mut buf).unwrap().unwrap();
        assert_eq!(response.code, 200);
        assert_eq!(response.text, "partial");
    }
}
