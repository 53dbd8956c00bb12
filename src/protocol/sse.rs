//! Server-Sent-Event framing and client-side decoding.

use bytes::Bytes;
use serde::Serialize;

use crate::error::Result;

/// Encode one value as a `data:` frame terminated by a blank line.
pub fn frame<T: Serialize>(value: &T) -> Result<Bytes> {
    let json = serde_json::to_string(value)?;
    Ok(Bytes::from(format!("data: {json}\n\n")))
}

/// Client-side decoder for the `message/stream` response body.
///
/// Feed it body chunks as they arrive; it yields the `data` payload of each
/// complete event and keeps partial frames buffered across calls. Comment
/// lines and other fields are skipped.
///
/// ```
/// use warden::protocol::SseDecoder;
///
/// let mut decoder = SseDecoder::new();
/// assert!(decoder.push(b"data: {\"kind\"").is_empty());
/// assert_eq!(decoder.push(b":\"task\"}\n\n"), vec![r#"{"kind":"task"}"#.to_string()]);
/// ```
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return the payloads of every event it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer
            .extend(chunk.iter().copied().filter(|byte| *byte != b'\r'));
        let mut events = Vec::new();
        while let Some(end) = self.buffer.windows(2).position(|pair| pair == b"\n\n") {
            let raw: Vec<u8> = self.buffer.drain(..end + 2).collect();
            let block = String::from_utf8_lossy(&raw);
            let data: Vec<&str> = block
                .lines()
                .filter_map(|line| line.strip_prefix("data:"))
                .map(|rest| rest.strip_prefix(' ').unwrap_or(rest))
                .collect();
            if !data.is_empty() {
                events.push(data.join("\n"));
            }
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn frame_is_data_prefixed_and_blank_line_terminated() {
        let bytes = frame(&json!({"a": 1})).unwrap();
        assert_eq!(&bytes[..], b"data: {\"a\":1}\n\n");
    }

    #[test]
    fn decoder_handles_split_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: {\"a\"").is_empty());
        let events = decoder.push(b":1}\n\ndata: 2\n\n: comment\n\n");
        assert_eq!(events, vec!["{\"a\":1}".to_string(), "2".to_string()]);
    }

    #[test]
    fn decoder_reads_frames_produced_by_the_server() {
        let mut decoder = SseDecoder::new();
        let mut body = frame(&json!({"kind": "task"})).unwrap().to_vec();
        body.extend_from_slice(b"event: status\r\ndata: line one\r\ndata: line two\r\n\r\n");
        assert_eq!(
            decoder.push(&body),
            vec![
                "{\"kind\":\"task\"}".to_string(),
                "line one\nline two".to_string(),
            ]
        );
    }
}
