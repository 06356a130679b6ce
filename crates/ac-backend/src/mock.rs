//! Scripted response bodies for testing.
//!
//! Produces the same `Result<Bytes, BackendError>` stream a real HTTP body
//! does, so ingestion can be exercised with exact split points, delays and
//! transport failures without a server.

use std::time::Duration;

use ac_protocol::StreamChunk;
use async_stream::stream;
use bytes::Bytes;
use futures::Stream;
use tokio::time::sleep;

use crate::error::BackendError;

/// One step of a scripted body.
#[derive(Debug, Clone)]
pub enum MockPart {
    /// Deliver these bytes as a single read.
    Bytes(Vec<u8>),
    /// Wait before the next part.
    Delay { ms: u64 },
    /// Fail the body read.
    Fail { message: String },
    /// Never produce another read.
    Hang,
}

/// A scripted response body.
#[derive(Debug, Clone, Default)]
pub struct MockBody {
    parts: Vec<MockPart>,
    /// Optional delay before every read (ms).
    chunk_delay_ms: Option<u64>,
}

impl MockBody {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn part(mut self, part: MockPart) -> Self {
        self.parts.push(part);
        self
    }

    pub fn text(self, text: &str) -> Self {
        self.part(MockPart::Bytes(text.as_bytes().to_vec()))
    }

    pub fn event(self, chunk: &StreamChunk) -> Self {
        let json = serde_json::to_string(chunk).unwrap_or_default();
        self.text(&format!("data: {json}\n"))
    }

    pub fn with_chunk_delay(mut self, ms: u64) -> Self {
        self.chunk_delay_ms = Some(ms);
        self
    }
}

/// Create a byte stream from a scripted body.
pub fn mock_body(body: MockBody) -> impl Stream<Item = Result<Bytes, BackendError>> + Send {
    stream! {
        for part in body.parts {
            if let Some(delay_ms) = body.chunk_delay_ms {
                sleep(Duration::from_millis(delay_ms)).await;
            }

            match part {
                MockPart::Bytes(bytes) => {
                    yield Ok(Bytes::from(bytes));
                }
                MockPart::Delay { ms } => {
                    sleep(Duration::from_millis(ms)).await;
                }
                MockPart::Fail { message } => {
                    yield Err(BackendError::Stream(message));
                    return;
                }
                MockPart::Hang => {
                    futures::future::pending::<()>().await;
                }
            }
        }
    }
}

/// Built-in bodies for common scenarios.
pub mod fixtures {
    use super::*;

    /// Split `bytes` into separate reads at each offset in `points`.
    pub fn split_at(bytes: &[u8], points: &[usize]) -> MockBody {
        let mut body = MockBody::new();
        let mut start = 0;
        for &point in points {
            let point = point.clamp(start, bytes.len());
            body = body.part(MockPart::Bytes(bytes[start..point].to_vec()));
            start = point;
        }
        body.part(MockPart::Bytes(bytes[start..].to_vec()))
    }

    /// Text chunks, one event each, followed by `done`.
    pub fn streaming_text(chunks: &[&str]) -> MockBody {
        chunks
            .iter()
            .fold(MockBody::new(), |body, text| {
                body.event(&StreamChunk::text(*text))
            })
            .event(&StreamChunk::done())
    }

    /// A tool call announcement, text, then `done` listing the tool.
    pub fn tool_then_text(tool: &str, text: &str) -> MockBody {
        MockBody::new()
            .event(&StreamChunk {
                tool: Some(tool.to_string()),
                ..StreamChunk::default()
            })
            .event(&StreamChunk::text(text))
            .event(&StreamChunk {
                done: true,
                tools_used: Some(vec![tool.to_string()]),
                ..StreamChunk::default()
            })
    }

    /// Some text, then a transport failure.
    pub fn error_mid_stream(text_before: &str, error: &str) -> MockBody {
        MockBody::new()
            .event(&StreamChunk::text(text_before))
            .part(MockPart::Fail {
                message: error.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    async fn reads(body: MockBody) -> Vec<Result<Bytes, BackendError>> {
        mock_body(body).collect().await
    }

    #[tokio::test]
    async fn mock_body_emits_parts() {
        let body = MockBody::new().text("data: a\n").text("data: b\n");
        let reads = reads(body).await;

        assert_eq!(reads.len(), 2);
        assert_eq!(reads[0].as_ref().unwrap(), &Bytes::from("data: a\n"));
        assert_eq!(reads[1].as_ref().unwrap(), &Bytes::from("data: b\n"));
    }

    #[tokio::test]
    async fn mock_body_fail_ends_stream() {
        let body = MockBody::new()
            .part(MockPart::Fail {
                message: "reset".to_string(),
            })
            .text("unreachable");
        let reads = reads(body).await;

        assert_eq!(reads.len(), 1);
        assert!(matches!(&reads[0], Err(BackendError::Stream(m)) if m == "reset"));
    }

    #[tokio::test]
    async fn delay_does_not_emit() {
        let body = MockBody::new()
            .part(MockPart::Delay { ms: 1 })
            .text("x")
            .with_chunk_delay(1);
        assert_eq!(reads(body).await.len(), 1);
    }

    #[test]
    fn split_at_partitions_bytes() {
        let body = fixtures::split_at(b"abcdef", &[2, 2, 5, 99]);
        let sizes: Vec<usize> = body
            .parts
            .iter()
            .map(|p| match p {
                MockPart::Bytes(b) => b.len(),
                _ => panic!("unexpected part"),
            })
            .collect();
        assert_eq!(sizes, vec![2, 0, 3, 1, 0]);
    }

    #[tokio::test]
    async fn fixture_streaming_text() {
        let reads = reads(fixtures::streaming_text(&["Think", "ing"])).await;
        let wire: Vec<u8> = reads.into_iter().flat_map(|r| r.unwrap().to_vec()).collect();
        assert_eq!(
            String::from_utf8(wire).unwrap(),
            "data: {\"chunk\":\"Think\"}\ndata: {\"chunk\":\"ing\"}\ndata: {\"done\":true}\n"
        );
    }

    #[tokio::test]
    async fn fixture_tool_then_text() {
        let reads = reads(fixtures::tool_then_text("calculator", "4")).await;
        assert_eq!(reads.len(), 3);
        assert_eq!(
            reads[2].as_ref().unwrap(),
            &Bytes::from("data: {\"done\":true,\"tools_used\":[\"calculator\"]}\n")
        );
    }
}
