//! Shared SSE (Server-Sent Events) stream parser.

use futures::{Stream, StreamExt};

use mindmap_core::error::{MindmapError, ModelError, Result};

/// Incremental decoder that turns arbitrary byte chunks into SSE `data` payloads.
///
/// Bytes are buffered until a full line arrives, so a UTF-8 sequence split
/// across chunks is decoded intact.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and collect every complete `data:` line it finishes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut out = Vec::new();
        while let Some(newline_pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=newline_pos).collect();
            let line = String::from_utf8_lossy(&raw[..newline_pos]);
            if let Some(data) = data_payload(line.trim_end_matches('\r')) {
                out.push(data.to_string());
            }
        }
        out
    }

    /// Flush a trailing line that was not newline-terminated.
    pub fn finish(&mut self) -> Option<String> {
        let remaining = std::mem::take(&mut self.buffer);
        let line = String::from_utf8_lossy(&remaining);
        data_payload(line.trim_end()).map(str::to_string)
    }
}

fn data_payload(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(|d| d.strip_prefix(' ').unwrap_or(d))
}

/// Parse SSE data lines from a reqwest response.
///
/// A transport failure mid-stream is yielded as `ModelError::ApiRequest`
/// and ends the stream.
pub fn sse_data_stream(response: reqwest::Response) -> impl Stream<Item = Result<String>> + Send {
    async_stream::stream! {
        let mut decoder = SseDecoder::new();
        let mut byte_stream = Box::pin(response.bytes_stream());
        let mut interrupted = false;

        while let Some(result) = byte_stream.next().await {
            let chunk = match result {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!(error = %e, "SSE byte stream aborted");
                    yield Err(MindmapError::Model(ModelError::ApiRequest(format!(
                        "stream interrupted: {e}"
                    ))));
                    interrupted = true;
                    break;
                }
            };
            for data in decoder.push(&chunk) {
                yield Ok(data);
            }
        }

        if !interrupted {
            if let Some(data) = decoder.finish() {
                yield Ok(data);
            }
        }
    }
}

/// Error for a provider stream that closed before its completion marker.
pub fn truncated_stream_error() -> MindmapError {
    MindmapError::Model(ModelError::ApiRequest(
        "stream ended before the completion marker".into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_basic() {
        let mut decoder = SseDecoder::new();
        let raw = "event: message_start\ndata: {\"type\":\"message_start\"}\n\ndata: {\"type\":\"ping\"}\n\n";
        let lines = decoder.push(raw.as_bytes());
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], r#"{"type":"message_start"}"#);
        assert_eq!(lines[1], r#"{"type":"ping"}"#);
    }

    #[test]
    fn decode_done() {
        let mut decoder = SseDecoder::new();
        assert_eq!(decoder.push(b"data: [DONE]\n\n"), vec!["[DONE]"]);
    }

    #[test]
    fn decode_ignores_non_data_lines() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"event: ping\n\n: comment\n").is_empty());
    }

    #[test]
    fn decode_line_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: {\"a\"").is_empty());
        assert_eq!(decoder.push(b":1}\r\n"), vec![r#"{"a":1}"#]);
    }

    #[test]
    fn decode_without_space_after_colon() {
        let mut decoder = SseDecoder::new();
        assert_eq!(decoder.push(b"data:{}\n"), vec!["{}"]);
    }

    #[test]
    fn decode_multibyte_split_across_chunks() {
        let raw = "data: {\"t\":\"## A \u{2014} b\"}\n".as_bytes();
        // split right after the first byte of the em dash
        let split = raw.iter().position(|&b| b == 0xE2).unwrap() + 1;

        let mut decoder = SseDecoder::new();
        assert!(decoder.push(&raw[..split]).is_empty());
        assert_eq!(
            decoder.push(&raw[split..]),
            vec!["{\"t\":\"## A \u{2014} b\"}".to_string()]
        );
    }

    #[test]
    fn finish_flushes_unterminated_line() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: tail").is_empty());
        assert_eq!(decoder.finish().as_deref(), Some("tail"));
        assert_eq!(decoder.finish(), None);
    }
}
