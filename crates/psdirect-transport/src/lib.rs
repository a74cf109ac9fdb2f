//! Wire protocol for the structured output channel.
//!
//! Provides:
//! - `Envelope` - One decoded line (stdout chunk, stderr chunk or exit code)
//! - `EnvelopeReader` - Line framing over an async byte stream

pub mod protocol;
pub mod reader;

pub use protocol::{DecodeError, Envelope, RawEnvelope, decode_base64, parse_line};
pub use reader::{EnvelopeReader, MAX_LINE_LENGTH, ReadError};
