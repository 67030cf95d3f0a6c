use std::fmt::{Display, Formatter};

/// Error returned while encoding or decoding an entry envelope or a peer wire message.
#[derive(Debug)]
pub enum CodecError {
    Truncated,
    Prost(String),
    BadEntryType(u8),
    /// A client request wasn't a RESP array of bulk strings, so it has no argv to encode.
    NotArgv,
}

impl Display for CodecError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Truncated => write!(f, "buffer shorter than its own framing declares"),
            Self::Prost(e) => write!(f, "{}", e),
            Self::BadEntryType(b) => write!(f, "unknown entry type tag {}", b),
            Self::NotArgv => write!(f, "request is not a RESP array of bulk strings"),
        }
    }
}

impl std::error::Error for CodecError {}

impl From<prost::EncodeError> for CodecError {
    fn from(err: prost::EncodeError) -> Self {
        Self::Prost(err.to_string())
    }
}

impl From<prost::DecodeError> for CodecError {
    fn from(err: prost::DecodeError) -> Self {
        Self::Prost(err.to_string())
    }
}
