//! Envelope format of the structured output channel.
//!
//! Each line is one compact JSON object:
//!
//! ```text
//! {"stream":"stdout","data":"<base64>"}
//! {"stream":"stderr","data":"<base64>"}
//! {"stream":"exit","code":0}
//! ```

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Envelope decode error. Never fatal to the command being read.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("decode stream message: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unexpected stream message type: {0}")]
    UnknownStream(String),
    #[error("decode {stream} payload: {source}")]
    Payload {
        stream: &'static str,
        #[source]
        source: base64::DecodeError,
    },
}

/// Envelope as it appears on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEnvelope {
    /// One of `stdout`, `stderr`, `exit`.
    pub stream: String,
    /// Base64 payload for `stdout` / `stderr`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub data: String,
    /// Exit code for `exit`.
    #[serde(default)]
    pub code: i32,
}

impl RawEnvelope {
    /// Encode a payload for the given stream.
    #[must_use]
    pub fn output(stream: &str, data: &[u8]) -> Self {
        Self {
            stream: stream.to_string(),
            data: BASE64.encode(data),
            code: 0,
        }
    }

    /// Exit envelope.
    #[must_use]
    pub fn exit(code: i32) -> Self {
        Self {
            stream: "exit".to_string(),
            data: String::new(),
            code,
        }
    }
}

/// Decoded envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope {
    /// Guest stdout bytes.
    Stdout(Vec<u8>),
    /// Guest stderr bytes.
    Stderr(Vec<u8>),
    /// Guest command exit code. Always the last envelope that matters.
    Exit(i32),
}

impl TryFrom<RawEnvelope> for Envelope {
    type Error = DecodeError;

    fn try_from(raw: RawEnvelope) -> Result<Self, Self::Error> {
        match raw.stream.as_str() {
            "stdout" => decode_payload("stdout", &raw.data).map(Self::Stdout),
            "stderr" => decode_payload("stderr", &raw.data).map(Self::Stderr),
            "exit" => Ok(Self::Exit(raw.code)),
            _ => Err(DecodeError::UnknownStream(raw.stream)),
        }
    }
}

/// Decode one line. Blank lines yield `None`.
///
/// Lines are raw bytes; invalid UTF-8 is a decode error like any other
/// malformed JSON.
///
/// # Errors
/// Returns error if the line is not a valid envelope.
pub fn parse_line(line: impl AsRef<[u8]>) -> Result<Option<Envelope>, DecodeError> {
    let line = line.as_ref().trim_ascii();
    if line.is_empty() {
        return Ok(None);
    }
    let raw: RawEnvelope = serde_json::from_slice(line)?;
    Envelope::try_from(raw).map(Some)
}

/// Decode a base64 payload. Blank input decodes to nothing.
///
/// # Errors
/// Returns error if the input is not valid standard base64.
pub fn decode_base64(value: &str) -> Result<Vec<u8>, base64::DecodeError> {
    if value.trim().is_empty() {
        return Ok(Vec::new());
    }
    BASE64.decode(value)
}

fn decode_payload(stream: &'static str, data: &str) -> Result<Vec<u8>, DecodeError> {
    decode_base64(data).map_err(|source| DecodeError::Payload { stream, source })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_base64() {
        assert_eq!(decode_base64("aGVsbG8=").unwrap(), b"hello");
        assert!(decode_base64("").unwrap().is_empty());
        assert!(decode_base64("   ").unwrap().is_empty());
        assert!(decode_base64("not-base64").is_err());
    }

    #[test]
    fn test_parse_output_envelopes() {
        let line = serde_json::to_string(&RawEnvelope::output("stdout", b"hello\r\n")).unwrap();
        assert_eq!(
            parse_line(&line).unwrap(),
            Some(Envelope::Stdout(b"hello\r\n".to_vec()))
        );

        let line = format!(r#"  {{"stream":"stderr","data":"{}"}}  "#, BASE64.encode("oops"));
        assert_eq!(
            parse_line(&line).unwrap(),
            Some(Envelope::Stderr(b"oops".to_vec()))
        );
    }

    #[test]
    fn test_parse_exit_envelope() {
        assert_eq!(
            parse_line(r#"{"stream":"exit","code":7}"#).unwrap(),
            Some(Envelope::Exit(7))
        );
        assert_eq!(
            parse_line(r#"{"stream":"exit"}"#).unwrap(),
            Some(Envelope::Exit(0))
        );
    }

    #[test]
    fn test_parse_blank_line() {
        assert_eq!(parse_line("").unwrap(), None);
        assert_eq!(parse_line(" \t ").unwrap(), None);
    }

    #[test]
    fn test_missing_data_is_empty_payload() {
        assert_eq!(
            parse_line(r#"{"stream":"stdout"}"#).unwrap(),
            Some(Envelope::Stdout(Vec::new()))
        );
    }

    #[test]
    fn test_decode_errors() {
        assert!(matches!(parse_line("not json"), Err(DecodeError::Json(_))));
        assert!(matches!(
            parse_line(r#"{"stream":"progress","data":""}"#),
            Err(DecodeError::UnknownStream(s)) if s == "progress"
        ));

        let err = parse_line(r#"{"stream":"stderr","data":"%%%"}"#).unwrap_err();
        assert!(matches!(err, DecodeError::Payload { stream: "stderr", .. }));
        assert!(err.to_string().starts_with("decode stderr payload"));
    }

    #[test]
    fn test_exit_serialization_omits_data() {
        let json = serde_json::to_string(&RawEnvelope::exit(3)).unwrap();
        assert_eq!(json, r#"{"stream":"exit","code":3}"#);
    }
}
