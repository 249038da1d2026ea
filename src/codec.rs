//! Line framing.
//!
//! A [`FramingStrategy`] turns outbound payloads into bytes and splits the
//! inbound byte stream back into messages. [`TextLineFraming`] is the default:
//! UTF-8 text, each message terminated by CRLF, at most 1 MiB per line.
//! [`LineCodec`] plugs any strategy into `tokio_util::codec::Framed`.

use std::fmt;
use std::sync::Arc;

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::types::SocketError;

/// CRLF, used for both directions by default.
pub const CRLF: &[u8] = b"\r\n";

/// Default maximum length of a single line, delimiter excluded.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 1024 * 1024;

/// Encode/decode rule applied to every session of a client.
///
/// Implementations hold no per-session state: partial input stays in the
/// buffer handed to [`decode`](FramingStrategy::decode) until a full message
/// is available.
pub trait FramingStrategy: Send + Sync + fmt::Debug + 'static {
    /// Append the encoded form of `payload` to `dst`.
    fn encode(&self, payload: &str, dst: &mut BytesMut) -> Result<(), SocketError>;

    /// Remove and return the next complete message from `src`, if any.
    fn decode(&self, src: &mut BytesMut) -> Result<Option<String>, SocketError>;

    /// Like [`decode`](FramingStrategy::decode), resuming a search. The first
    /// `*next_index` bytes of `src` are already known not to complete a
    /// message; implementations may skip them and must keep the index in step
    /// with `src`. The default ignores the hint.
    fn decode_from(
        &self,
        src: &mut BytesMut,
        next_index: &mut usize,
    ) -> Result<Option<String>, SocketError> {
        let decoded = self.decode(src)?;
        *next_index = 0;
        Ok(decoded)
    }

    /// Called once the stream has ended. The default returns any trailing
    /// unterminated bytes as a final message.
    fn decode_eof(&self, src: &mut BytesMut) -> Result<Option<String>, SocketError> {
        if let Some(message) = self.decode(src)? {
            return Ok(Some(message));
        }
        if src.is_empty() {
            return Ok(None);
        }
        let rest = src.split();
        String::from_utf8(rest.to_vec())
            .map(Some)
            .map_err(|e| SocketError::Decode(e.to_string()))
    }
}

/// Delimiter-terminated UTF-8 text lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextLineFraming {
    delimiter: Vec<u8>,
    max_line_length: usize,
}

impl Default for TextLineFraming {
    fn default() -> Self {
        Self {
            delimiter: CRLF.to_vec(),
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
        }
    }
}

impl TextLineFraming {
    /// Framing with a custom delimiter and line limit.
    pub fn new(delimiter: impl Into<Vec<u8>>, max_line_length: usize) -> Result<Self, SocketError> {
        let delimiter = delimiter.into();
        if delimiter.is_empty() {
            return Err(SocketError::Validation("line delimiter must not be empty".into()));
        }
        if max_line_length == 0 {
            return Err(SocketError::Validation("max line length must be positive".into()));
        }
        Ok(Self {
            delimiter,
            max_line_length,
        })
    }

    /// Same delimiter, different line limit.
    pub fn with_max_line_length(mut self, max_line_length: usize) -> Result<Self, SocketError> {
        if max_line_length == 0 {
            return Err(SocketError::Validation("max line length must be positive".into()));
        }
        self.max_line_length = max_line_length;
        Ok(self)
    }

    pub fn delimiter(&self) -> &[u8] {
        &self.delimiter
    }

    pub fn max_line_length(&self) -> usize {
        self.max_line_length
    }

    fn find_delimiter(&self, src: &[u8]) -> Option<usize> {
        src.windows(self.delimiter.len())
            .position(|window| window == self.delimiter.as_slice())
    }
}

impl FramingStrategy for TextLineFraming {
    fn encode(&self, payload: &str, dst: &mut BytesMut) -> Result<(), SocketError> {
        if payload.len() > self.max_line_length {
            return Err(SocketError::FrameTooLarge {
                len: payload.len(),
                max: self.max_line_length,
            });
        }
        dst.reserve(payload.len() + self.delimiter.len());
        dst.put_slice(payload.as_bytes());
        dst.put_slice(&self.delimiter);
        Ok(())
    }

    fn decode(&self, src: &mut BytesMut) -> Result<Option<String>, SocketError> {
        self.decode_from(src, &mut 0)
    }

    fn decode_from(
        &self,
        src: &mut BytesMut,
        next_index: &mut usize,
    ) -> Result<Option<String>, SocketError> {
        let start = (*next_index).min(src.len());
        let Some(offset) = self.find_delimiter(&src[start..]) else {
            // A delimiter may still straddle the end of what has arrived.
            let scanned = src.len().saturating_sub(self.delimiter.len() - 1);
            *next_index = scanned;
            // `scanned` is also the shortest line these bytes can still become.
            if scanned > self.max_line_length {
                return Err(SocketError::FrameTooLarge {
                    len: src.len(),
                    max: self.max_line_length,
                });
            }
            return Ok(None);
        };
        let pos = start + offset;
        *next_index = 0;

        if pos > self.max_line_length {
            return Err(SocketError::FrameTooLarge {
                len: pos,
                max: self.max_line_length,
            });
        }

        let line = src.split_to(pos);
        src.advance(self.delimiter.len());
        String::from_utf8(line.to_vec())
            .map(Some)
            .map_err(|e| SocketError::Decode(e.to_string()))
    }
}

/// Adapts a shared [`FramingStrategy`] to tokio-util's codec traits.
///
/// One codec serves one session and remembers how far the read buffer has
/// been searched, so a long line arriving in small reads is scanned once.
#[derive(Debug, Clone)]
pub struct LineCodec {
    strategy: Arc<dyn FramingStrategy>,
    next_index: usize,
}

impl LineCodec {
    pub fn new(strategy: Arc<dyn FramingStrategy>) -> Self {
        Self {
            strategy,
            next_index: 0,
        }
    }

    pub fn strategy(&self) -> &Arc<dyn FramingStrategy> {
        &self.strategy
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new(Arc::new(TextLineFraming::default()))
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = SocketError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        self.strategy.decode_from(src, &mut self.next_index)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        self.next_index = 0;
        self.strategy.decode_eof(src)
    }
}

impl Encoder<String> for LineCodec {
    type Error = SocketError;

    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.strategy.encode(&item, dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::distributions::Alphanumeric;
    use rand::Rng;
    use tokio_stream::StreamExt;
    use tokio_util::codec::FramedRead;

    fn decode_all(framing: &TextLineFraming, bytes: &[u8]) -> Vec<String> {
        let mut buf = BytesMut::from(bytes);
        let mut out = Vec::new();
        while let Some(line) = framing.decode(&mut buf).unwrap() {
            out.push(line);
        }
        out
    }

    #[test]
    fn test_encode_appends_crlf() {
        let framing = TextLineFraming::default();
        let mut buf = BytesMut::new();
        framing.encode("PING", &mut buf).unwrap();
        assert_eq!(&buf[..], b"PING\r\n");
    }

    #[test]
    fn test_random_payloads_survive_encode_decode() {
        let framing = TextLineFraming::default();
        let mut rng = rand::thread_rng();
        let payloads: Vec<String> = (0..32)
            .map(|_| {
                let len = rng.gen_range(0..512);
                (&mut rng)
                    .sample_iter(&Alphanumeric)
                    .take(len)
                    .map(char::from)
                    .collect()
            })
            .collect();

        let mut buf = BytesMut::new();
        for payload in &payloads {
            framing.encode(payload, &mut buf).unwrap();
        }
        assert_eq!(decode_all(&framing, &buf), payloads);
    }

    #[test]
    fn test_partial_line_stays_buffered() {
        let framing = TextLineFraming::default();
        let mut buf = BytesMut::from(&b"hel"[..]);
        assert_eq!(framing.decode(&mut buf).unwrap(), None);
        assert_eq!(&buf[..], b"hel");

        buf.extend_from_slice(b"lo\r");
        assert_eq!(framing.decode(&mut buf).unwrap(), None);

        buf.extend_from_slice(b"\nwor");
        assert_eq!(framing.decode(&mut buf).unwrap().as_deref(), Some("hello"));
        assert_eq!(&buf[..], b"wor");
    }

    #[test]
    fn test_bare_lf_is_not_a_delimiter() {
        let framing = TextLineFraming::default();
        assert_eq!(decode_all(&framing, b"a\nb\r\n"), vec!["a\nb".to_string()]);
    }

    #[test]
    fn test_oversized_terminated_line_fails() {
        let framing = TextLineFraming::default().with_max_line_length(4).unwrap();
        let mut buf = BytesMut::from(&b"abcdef\r\n"[..]);
        assert!(matches!(
            framing.decode(&mut buf),
            Err(SocketError::FrameTooLarge { len: 6, max: 4 })
        ));
    }

    #[test]
    fn test_oversized_unterminated_line_fails_without_waiting() {
        let framing = TextLineFraming::default().with_max_line_length(4).unwrap();

        // "abcd\r" can still become a legal line.
        let mut buf = BytesMut::from(&b"abcd\r"[..]);
        assert_eq!(framing.decode(&mut buf).unwrap(), None);

        let mut buf = BytesMut::from(&b"abcde\r"[..]);
        assert!(matches!(
            framing.decode(&mut buf),
            Err(SocketError::FrameTooLarge { .. })
        ));
    }

    #[test]
    fn test_line_at_limit_is_accepted() {
        let framing = TextLineFraming::default().with_max_line_length(4).unwrap();
        assert_eq!(decode_all(&framing, b"abcd\r\n"), vec!["abcd".to_string()]);
    }

    #[test]
    fn test_encode_rejects_oversized_payload() {
        let framing = TextLineFraming::default().with_max_line_length(2).unwrap();
        let mut buf = BytesMut::new();
        assert!(matches!(
            framing.encode("abc", &mut buf),
            Err(SocketError::FrameTooLarge { len: 3, max: 2 })
        ));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_invalid_utf8_is_a_decode_error() {
        let framing = TextLineFraming::default();
        let mut buf = BytesMut::from(&b"\xff\xfe\r\n"[..]);
        assert!(matches!(framing.decode(&mut buf), Err(SocketError::Decode(_))));
    }

    #[test]
    fn test_custom_delimiter() {
        let framing = TextLineFraming::new(b"\n".to_vec(), 16).unwrap();
        assert_eq!(decode_all(&framing, b"a\nb\n"), vec!["a", "b"]);
        assert!(TextLineFraming::new(Vec::new(), 16).is_err());
        assert!(TextLineFraming::new(b"\n".to_vec(), 0).is_err());
    }

    #[test]
    fn test_decode_eof_flushes_trailing_bytes() {
        let framing = TextLineFraming::default();
        let mut buf = BytesMut::from(&b"tail"[..]);
        assert_eq!(framing.decode_eof(&mut buf).unwrap().as_deref(), Some("tail"));
        assert_eq!(framing.decode_eof(&mut buf).unwrap(), None);
    }

    #[test]
    fn test_resumed_search_finds_straddling_delimiter() {
        let framing = TextLineFraming::default();
        let mut next_index = 0;
        let mut buf = BytesMut::from(&b"hello\r"[..]);
        assert_eq!(framing.decode_from(&mut buf, &mut next_index).unwrap(), None);
        assert_eq!(next_index, 5);

        buf.extend_from_slice(b"\nnext");
        assert_eq!(
            framing.decode_from(&mut buf, &mut next_index).unwrap().as_deref(),
            Some("hello")
        );
        assert_eq!(next_index, 0);
        assert_eq!(&buf[..], b"next");
    }

    #[test]
    fn test_codec_scans_long_line_incrementally() {
        let mut codec = LineCodec::default();
        let mut buf = BytesMut::new();
        let chunk = [b'x'; 1024];
        for _ in 0..256 {
            buf.extend_from_slice(&chunk);
            assert_eq!(Decoder::decode(&mut codec, &mut buf).unwrap(), None);
            assert_eq!(codec.next_index, buf.len() - 1);
        }

        buf.extend_from_slice(b"\r\n");
        let line = Decoder::decode(&mut codec, &mut buf).unwrap().unwrap();
        assert_eq!(line.len(), 256 * 1024);
        assert_eq!(codec.next_index, 0);
        assert!(buf.is_empty());
    }

    #[tokio::test]
    async fn test_codec_reassembles_split_reads() {
        let io = tokio_test::io::Builder::new()
            .read(b"fir")
            .read(b"st\r\nsec")
            .read(b"ond\r\n")
            .build();
        let mut framed = FramedRead::new(io, LineCodec::default());

        assert_eq!(framed.next().await.unwrap().unwrap(), "first");
        assert_eq!(framed.next().await.unwrap().unwrap(), "second");
        assert!(framed.next().await.is_none());
    }
}
