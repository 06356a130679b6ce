//! Line-oriented event-stream decoding.
//!
//! The backend frames every event as a single `data: <json>\n` line, so the
//! body is decoded into newline-delimited records rather than blank-line
//! separated SSE events. Bytes are decoded as UTF-8 with continuation across
//! reads: a multi-byte sequence split between two chunks is completed by the
//! next chunk instead of being replaced.

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use ac_protocol::StreamChunk;
use bytes::Bytes;
use futures::Stream;

const DATA_PREFIX: &str = "data: ";

/// Incremental UTF-8 decoder.
///
/// Invalid sequences decode to U+FFFD. An incomplete sequence at the end of
/// the input is held until more bytes arrive.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode `bytes`, appending complete characters to `out`.
    pub fn decode(&mut self, bytes: &[u8], out: &mut String) {
        self.pending.extend_from_slice(bytes);

        let mut start = 0;
        loop {
            match std::str::from_utf8(&self.pending[start..]) {
                Ok(text) => {
                    out.push_str(text);
                    start = self.pending.len();
                    break;
                }
                Err(e) => {
                    let valid_end = start + e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[start..valid_end]));
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            start = valid_end + len;
                        }
                        // Truncated sequence: wait for the rest.
                        None => {
                            start = valid_end;
                            break;
                        }
                    }
                }
            }
        }

        self.pending.drain(..start);
    }

    /// Flush at end of input. A dangling partial sequence becomes U+FFFD.
    pub fn finish(&mut self, out: &mut String) {
        if !self.pending.is_empty() {
            self.pending.clear();
            out.push(char::REPLACEMENT_CHARACTER);
        }
    }
}

/// Splits decoded text into newline-terminated lines.
#[derive(Debug, Default)]
pub struct LineBuffer {
    decoder: Utf8Decoder,
    buf: String,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes. Returns every line completed by them, without the
    /// trailing `\n`. The unterminated remainder stays buffered.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.decoder.decode(bytes, &mut self.buf);

        let Some(last_newline) = self.buf.rfind('\n') else {
            return Vec::new();
        };

        let rest = self.buf.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.buf, rest);
        complete[..last_newline]
            .split('\n')
            .map(str::to_string)
            .collect()
    }

    /// End of input: returns the buffered partial line, if any.
    pub fn finish(&mut self) -> Option<String> {
        self.decoder.finish(&mut self.buf);
        if self.buf.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.buf))
        }
    }
}

/// Parse one line of the event stream.
///
/// Returns `None` for lines that carry no payload (blank, or without the
/// `data: ` prefix), otherwise the result of decoding the JSON remainder.
pub fn parse_data_line(line: &str) -> Option<Result<StreamChunk, serde_json::Error>> {
    let json = line.trim().strip_prefix(DATA_PREFIX)?;
    if json.is_empty() {
        return None;
    }
    Some(serde_json::from_str(json))
}

/// Stream wrapper that turns a byte stream into lines.
///
/// After the inner stream ends, any unterminated trailing text is yielded
/// as a final line.
pub struct SseLines<S> {
    inner: S,
    lines: LineBuffer,
    pending: VecDeque<String>,
    finished: bool,
}

impl<S> SseLines<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            lines: LineBuffer::new(),
            pending: VecDeque::new(),
            finished: false,
        }
    }
}

impl<S, E> Stream for SseLines<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
{
    type Item = Result<String, E>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;

        loop {
            if let Some(line) = this.pending.pop_front() {
                return Poll::Ready(Some(Ok(line)));
            }
            if this.finished {
                return Poll::Ready(None);
            }

            match Pin::new(&mut this.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    this.pending.extend(this.lines.push(&bytes));
                }
                Poll::Ready(Some(Err(e))) => {
                    this.finished = true;
                    return Poll::Ready(Some(Err(e)));
                }
                Poll::Ready(None) => {
                    this.finished = true;
                    if let Some(rest) = this.lines.finish() {
                        this.pending.push_back(rest);
                    }
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// Create a line stream from a byte stream.
pub fn sse_lines<S, E>(stream: S) -> SseLines<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
{
    SseLines::new(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn bytes_stream(
        chunks: Vec<&'static str>,
    ) -> impl Stream<Item = Result<Bytes, std::io::Error>> {
        futures::stream::iter(chunks.into_iter().map(|s| Ok(Bytes::from(s))))
    }

    async fn collect_lines(chunks: Vec<&'static str>) -> Vec<String> {
        sse_lines(bytes_stream(chunks))
            .map(|r| r.unwrap())
            .collect()
            .await
    }

    #[test]
    fn decoder_completes_split_multibyte() {
        // "é" is 0xC3 0xA9
        let mut decoder = Utf8Decoder::new();
        let mut out = String::new();
        decoder.decode(b"caf\xC3", &mut out);
        assert_eq!(out, "caf");
        decoder.decode(b"\xA9!", &mut out);
        assert_eq!(out, "café!");
    }

    #[test]
    fn decoder_four_byte_split_three_ways() {
        // U+1F600 is F0 9F 98 80
        let mut decoder = Utf8Decoder::new();
        let mut out = String::new();
        decoder.decode(b"\xF0", &mut out);
        decoder.decode(b"\x9F\x98", &mut out);
        assert!(out.is_empty());
        decoder.decode(b"\x80", &mut out);
        assert_eq!(out, "\u{1F600}");
    }

    #[test]
    fn decoder_replaces_invalid_bytes() {
        let mut decoder = Utf8Decoder::new();
        let mut out = String::new();
        decoder.decode(b"a\xFFb", &mut out);
        assert_eq!(out, "a\u{FFFD}b");
    }

    #[test]
    fn decoder_finish_flushes_truncated_sequence() {
        let mut decoder = Utf8Decoder::new();
        let mut out = String::new();
        decoder.decode(b"x\xE2\x82", &mut out);
        assert_eq!(out, "x");
        decoder.finish(&mut out);
        assert_eq!(out, "x\u{FFFD}");
    }

    #[test]
    fn line_buffer_keeps_partial_line() {
        let mut buf = LineBuffer::new();
        assert_eq!(buf.push(b"data: {\"chunk\""), Vec::<String>::new());
        assert_eq!(
            buf.push(b":\"a\"}\ndata: x\n\ndata: {\"cl"),
            vec!["data: {\"chunk\":\"a\"}", "data: x", ""]
        );
        assert_eq!(buf.finish().as_deref(), Some("data: {\"cl"));
        assert_eq!(buf.finish(), None);
    }

    #[test]
    fn parse_data_line_variants() {
        assert!(parse_data_line("").is_none());
        assert!(parse_data_line("   \r").is_none());
        assert!(parse_data_line(": keep-alive").is_none());
        assert!(parse_data_line("event: message").is_none());
        assert!(parse_data_line("data:").is_none());
        assert!(parse_data_line("data: {oops").unwrap().is_err());

        let chunk = parse_data_line("  data: {\"chunk\":\"hi\"}\r").unwrap().unwrap();
        assert_eq!(chunk, StreamChunk::text("hi"));
    }

    #[tokio::test]
    async fn lines_from_single_chunk() {
        let lines = collect_lines(vec!["data: one\ndata: two\n"]).await;
        assert_eq!(lines, vec!["data: one", "data: two"]);
    }

    #[tokio::test]
    async fn lines_across_chunks() {
        let lines = collect_lines(vec!["data: hel", "lo wor", "ld\n"]).await;
        assert_eq!(lines, vec!["data: hello world"]);
    }

    #[tokio::test]
    async fn crlf_is_left_for_trimming() {
        let lines = collect_lines(vec!["data: hello\r\n"]).await;
        assert_eq!(lines, vec!["data: hello\r"]);
    }

    #[tokio::test]
    async fn trailing_text_without_newline_is_yielded() {
        let lines = collect_lines(vec!["data: a\n", "data: final"]).await;
        assert_eq!(lines, vec!["data: a", "data: final"]);
    }

    #[tokio::test]
    async fn multibyte_split_across_chunks() {
        let stream = futures::stream::iter(vec![
            Ok::<_, std::io::Error>(Bytes::from_static(b"data: na\xC3")),
            Ok(Bytes::from_static(b"\xAFve\n")),
        ]);
        let lines: Vec<String> = sse_lines(stream).map(|r| r.unwrap()).collect().await;
        assert_eq!(lines, vec!["data: naïve"]);
    }

    #[tokio::test]
    async fn error_ends_stream() {
        let stream = futures::stream::iter(vec![
            Ok(Bytes::from_static(b"data: a\n")),
            Err(std::io::Error::other("reset")),
            Ok(Bytes::from_static(b"data: b\n")),
        ]);
        let mut lines = sse_lines(stream);
        assert_eq!(lines.next().await.unwrap().unwrap(), "data: a");
        assert!(lines.next().await.unwrap().is_err());
        assert!(lines.next().await.is_none());
    }
}
