//! NDJSON decoding of streamed Ollama responses.
//!
//! Ollama emits one JSON object per line:
//! ```text
//! {"model":"llama3.2","response":"Hello","done":false}
//! {"model":"llama3.2","response":" world","done":false}
//! {"model":"llama3.2","response":"","done":true,"eval_count":10,"eval_duration":250000000}
//! ```
//!
//! Lines that are blank, not UTF-8 or not valid JSON are dropped without
//! surfacing an error. Keep-alive and partial lines must not abort a stream.

use futures::{Stream, StreamExt};
use tracing::debug;

use crate::error::Error;
use crate::protocol::StreamRecord;

/// Decode a chunked byte stream into a stream of [`StreamRecord`]s.
///
/// Partial lines are buffered across chunks. A transport error is yielded once
/// and ends the stream.
pub fn decode_records<S, B, E>(byte_stream: S) -> impl Stream<Item = Result<StreamRecord, Error>>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::error::Error + Send + Sync + 'static,
{
    async_stream::stream! {
        let mut byte_stream = std::pin::pin!(byte_stream);
        let mut line_buf: Vec<u8> = Vec::new();

        while let Some(chunk) = byte_stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    yield Err(Error::Stream(Box::new(e)));
                    return;
                }
            };
            line_buf.extend_from_slice(chunk.as_ref());

            while let Some(newline_pos) = line_buf.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = line_buf.drain(..=newline_pos).collect();
                if let Some(record) = decode_line(&line[..newline_pos]) {
                    yield Ok(record);
                }
            }
        }

        if let Some(record) = decode_line(&line_buf) {
            yield Ok(record);
        }
    }
}

/// Decode a single line, or `None` when it should be skipped.
fn decode_line(raw: &[u8]) -> Option<StreamRecord> {
    let line = match std::str::from_utf8(raw) {
        Ok(line) => line.trim_end_matches('\r'),
        Err(e) => {
            debug!("Dropping non UTF-8 stream line: {}", e);
            return None;
        }
    };
    if line.trim().is_empty() {
        return None;
    }
    match serde_json::from_str(line) {
        Ok(record) => Some(record),
        Err(e) => {
            debug!("Dropping malformed stream line ({}): {}", e, line);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Endpoint;
    use futures::stream;
    use std::io;

    async fn collect(chunks: Vec<Result<&'static str, io::Error>>) -> Vec<Result<StreamRecord, Error>> {
        decode_records(stream::iter(chunks)).collect().await
    }

    fn fragments(records: &[Result<StreamRecord, Error>]) -> Vec<String> {
        records
            .iter()
            .map(|r| r.as_ref().unwrap().fragment(Endpoint::Generate).to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_malformed_lines_are_dropped_in_order() {
        let body = concat!(
            "{\"response\":\"a\"}\n",
            "not json\n",
            "\n",
            "{\"response\":\"b\"}\n",
            "{\"response\":\n",
            "   \n",
            "{\"response\":\"c\",\"done\":true}\n",
        );
        let records = collect(vec![Ok(body)]).await;
        assert_eq!(fragments(&records), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_lines_split_across_chunks() {
        let records = collect(vec![
            Ok("{\"respo"),
            Ok("nse\":\"Hel"),
            Ok("lo\"}\r\n{\"response\":\" there\"}"),
        ])
        .await;
        assert_eq!(fragments(&records), vec!["Hello", " there"]);
    }

    #[tokio::test]
    async fn test_repeated_fragments_are_kept() {
        let records = collect(vec![Ok("{\"response\":\"ha\"}\n{\"response\":\"ha\"}\n")]).await;
        assert_eq!(fragments(&records), vec!["ha", "ha"]);
    }

    #[tokio::test]
    async fn test_invalid_utf8_line_is_dropped() {
        let chunks: Vec<Result<Vec<u8>, io::Error>> = vec![
            Ok(b"{\"response\":\"\xff\xfe\"}\n".to_vec()),
            Ok(b"{\"response\":\"ok\"}\n".to_vec()),
        ];
        let records: Vec<_> = decode_records(stream::iter(chunks)).collect().await;
        assert_eq!(fragments(&records), vec!["ok"]);
    }

    #[tokio::test]
    async fn test_transport_error_ends_stream() {
        let records = collect(vec![
            Ok("{\"response\":\"a\"}\n"),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")),
            Ok("{\"response\":\"b\"}\n"),
        ])
        .await;
        assert_eq!(records.len(), 2);
        assert!(records[0].is_ok());
        assert!(matches!(records[1], Err(Error::Stream(_))));
    }
}
