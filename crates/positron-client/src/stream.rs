//! Decoding of the relay's `data: {"text": ...}` event stream.

use futures_util::StreamExt;
use futures_util::stream::BoxStream;

use positron_types::api::StreamChunk;
use positron_types::sse::EventLineBuffer;

use crate::error::ClientError;

/// Incremental decoder: raw body bytes in, chunk texts out.
///
/// Lines and UTF-8 sequences split across reads are buffered until complete.
#[derive(Debug, Default)]
pub struct ChunkDecoder {
    lines: EventLineBuffer,
}

impl ChunkDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one read's worth of bytes. Fails on the first malformed payload.
    pub fn push(&mut self, bytes: &[u8]) -> Result<Vec<String>, ClientError> {
        self.lines.push(bytes).iter().map(|data| parse(data)).collect()
    }

    /// Flush a final event that arrived without its trailing newline.
    pub fn finish(&mut self) -> Result<Option<String>, ClientError> {
        self.lines.finish().map(|data| parse(&data)).transpose()
    }
}

fn parse(data: &str) -> Result<String, ClientError> {
    Ok(serde_json::from_str::<StreamChunk>(data)?.text)
}

/// Chunk texts of a relay response, in arrival order.
pub fn text_chunks(resp: reqwest::Response) -> BoxStream<'static, Result<String, ClientError>> {
    let mut body = resp.bytes_stream();

    async_stream::stream! {
        let mut decoder = ChunkDecoder::new();
        while let Some(read) = body.next().await {
            let bytes = match read {
                Ok(bytes) => bytes,
                Err(e) => {
                    yield Err(ClientError::from(e));
                    return;
                }
            };
            match decoder.push(&bytes) {
                Ok(texts) => {
                    for text in texts {
                        yield Ok(text);
                    }
                }
                Err(e) => {
                    yield Err(e);
                    return;
                }
            }
        }
        match decoder.finish() {
            Ok(Some(text)) => yield Ok(text),
            Ok(None) => {}
            Err(e) => yield Err(e),
        }
    }
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_events_across_reads() {
        let mut decoder = ChunkDecoder::new();
        assert!(decoder.push(b"data: {\"te").unwrap().is_empty());
        assert_eq!(
            decoder.push(b"xt\":\"Fasc\"}\n\ndata: {\"text\":\"inating\"}\n\n").unwrap(),
            vec!["Fasc".to_string(), "inating".to_string()]
        );
        assert_eq!(decoder.finish().unwrap(), None);
    }

    #[test]
    fn multibyte_split_survives() {
        let event = "data: {\"text\":\"Spock \u{1F596}\"}\n\n".as_bytes();
        let split = event.len() - 6;
        let mut decoder = ChunkDecoder::new();
        assert!(decoder.push(&event[..split]).unwrap().is_empty());
        assert_eq!(decoder.push(&event[split..]).unwrap(), vec!["Spock \u{1F596}"]);
    }

    #[test]
    fn malformed_chunk_is_an_error() {
        let mut decoder = ChunkDecoder::new();
        assert!(matches!(
            decoder.push(b"data: {not json}\n\n"),
            Err(ClientError::Malformed(_))
        ));
    }

    #[test]
    fn unterminated_tail_is_flushed() {
        let mut decoder = ChunkDecoder::new();
        assert!(decoder.push(b"data: {\"text\":\"end\"}").unwrap().is_empty());
        assert_eq!(decoder.finish().unwrap(), Some("end".to_string()));
    }
}
