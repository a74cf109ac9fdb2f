//! Line framing for the structured output channel.

use futures::StreamExt;
use thiserror::Error;
use tokio::io::AsyncRead;
use tokio_util::codec::{AnyDelimiterCodec, AnyDelimiterCodecError, FramedRead};

use crate::protocol::{DecodeError, Envelope, parse_line};

/// Longest accepted envelope line (2 MiB).
pub const MAX_LINE_LENGTH: usize = 2 * 1024 * 1024;

/// Envelope read error.
#[derive(Debug, Error)]
pub enum ReadError {
    /// A single line could not be decoded; reading may continue.
    #[error(transparent)]
    Decode(#[from] DecodeError),
    /// The byte stream itself failed or a line was too long; no further
    /// envelopes follow.
    #[error("stream read error: {0}")]
    Stream(#[from] AnyDelimiterCodecError),
}

impl ReadError {
    /// Whether the reader is finished after this error.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Stream(_))
    }
}

/// Reads envelopes from a newline-delimited byte stream.
///
/// Lines are split as bytes, so a line that is not UTF-8 is only a decode
/// error. `next` is cancel-safe: partially read lines stay buffered.
pub struct EnvelopeReader<R> {
    lines: FramedRead<R, AnyDelimiterCodec>,
    finished: bool,
}

impl<R: AsyncRead + Unpin> EnvelopeReader<R> {
    /// Wrap a byte stream.
    #[must_use]
    pub fn new(reader: R) -> Self {
        Self::with_max_length(reader, MAX_LINE_LENGTH)
    }

    /// Wrap a byte stream with a custom line length limit.
    #[must_use]
    pub fn with_max_length(reader: R, max_length: usize) -> Self {
        Self {
            lines: FramedRead::new(
                reader,
                AnyDelimiterCodec::new_with_max_length(b"\n".to_vec(), Vec::new(), max_length),
            ),
            finished: false,
        }
    }

    /// Next envelope, skipping blank lines. `None` once the stream ends or
    /// after a fatal error.
    pub async fn next(&mut self) -> Option<Result<Envelope, ReadError>> {
        if self.finished {
            return None;
        }

        loop {
            match self.lines.next().await {
                None => {
                    self.finished = true;
                    return None;
                }
                Some(Err(e)) => {
                    self.finished = true;
                    return Some(Err(ReadError::Stream(e)));
                }
                Some(Ok(line)) => match parse_line(&line) {
                    Ok(None) => {}
                    Ok(Some(envelope)) => return Some(Ok(envelope)),
                    Err(e) => {
                        tracing::debug!(error = %e, "Skipping undecodable envelope");
                        return Some(Err(ReadError::Decode(e)));
                    }
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RawEnvelope;

    fn line(raw: &RawEnvelope) -> String {
        serde_json::to_string(raw).unwrap()
    }

    #[tokio::test]
    async fn test_reads_envelopes_in_order() {
        let input = [
            line(&RawEnvelope::output("stdout", b"a")),
            String::new(),
            "   ".to_string(),
            line(&RawEnvelope::output("stderr", b"b")),
            line(&RawEnvelope::exit(2)),
        ]
        .join("\r\n");

        let mut reader = EnvelopeReader::new(input.as_bytes());
        assert_eq!(reader.next().await.unwrap().unwrap(), Envelope::Stdout(b"a".to_vec()));
        assert_eq!(reader.next().await.unwrap().unwrap(), Envelope::Stderr(b"b".to_vec()));
        assert_eq!(reader.next().await.unwrap().unwrap(), Envelope::Exit(2));
        assert!(reader.next().await.is_none());
        assert!(reader.next().await.is_none());
    }

    #[tokio::test]
    async fn test_decode_errors_are_not_fatal() {
        let input = format!("garbage\n{}\n", line(&RawEnvelope::exit(0)));
        let mut reader = EnvelopeReader::new(input.as_bytes());

        let err = reader.next().await.unwrap().unwrap_err();
        assert!(!err.is_fatal());
        assert_eq!(reader.next().await.unwrap().unwrap(), Envelope::Exit(0));
    }

    #[tokio::test]
    async fn test_non_utf8_line_is_not_fatal() {
        let mut input = b"\xff\xfe not utf8\r\n".to_vec();
        input.extend_from_slice(line(&RawEnvelope::output("stdout", b"ok")).as_bytes());
        input.push(b'\n');
        input.extend_from_slice(line(&RawEnvelope::exit(7)).as_bytes());
        input.push(b'\n');
        let mut reader = EnvelopeReader::new(input.as_slice());

        let err = reader.next().await.unwrap().unwrap_err();
        assert!(!err.is_fatal());
        assert!(matches!(err, ReadError::Decode(DecodeError::Json(_))));
        assert_eq!(reader.next().await.unwrap().unwrap(), Envelope::Stdout(b"ok".to_vec()));
        assert_eq!(reader.next().await.unwrap().unwrap(), Envelope::Exit(7));
    }

    #[tokio::test]
    async fn test_unterminated_last_line_is_read() {
        let input = line(&RawEnvelope::exit(3));
        let mut reader = EnvelopeReader::new(input.as_bytes());

        assert_eq!(reader.next().await.unwrap().unwrap(), Envelope::Exit(3));
        assert!(reader.next().await.is_none());
    }

    #[tokio::test]
    async fn test_overlong_line_ends_stream() {
        let input = format!("{}\n{}\n", "x".repeat(64), line(&RawEnvelope::exit(0)));
        let mut reader = EnvelopeReader::with_max_length(input.as_bytes(), 16);

        let err = reader.next().await.unwrap().unwrap_err();
        assert!(err.is_fatal());
        assert!(reader.next().await.is_none());
    }

    #[tokio::test]
    async fn test_chunked_input() {
        let exit = line(&RawEnvelope::exit(5));
        let (head, tail) = exit.split_at(6);
        let mock = tokio_test::io::Builder::new()
            .read(head.as_bytes())
            .read(tail.as_bytes())
            .read(b"\n")
            .build();

        let mut reader = EnvelopeReader::new(mock);
        assert_eq!(reader.next().await.unwrap().unwrap(), Envelope::Exit(5));
        assert!(reader.next().await.is_none());
    }
}
