use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GgufError {
    #[error("invalid GGUF signature: expected {expected:?}, got {found:?}")]
    BadSignature { expected: [u8; 4], found: [u8; 4] },

    #[error("unsupported GGUF version {found} (minimum is {minimum})")]
    UnsupportedVersion { found: u32, minimum: u32 },

    #[error("unexpected end of input while reading {context}")]
    TruncatedInput { context: &'static str },

    #[error("string is not valid UTF-8: {0}")]
    InvalidEncoding(#[from] std::string::FromUtf8Error),

    #[error("unsupported metadata value type: {0}")]
    UnsupportedValueType(u32),

    #[error("tensor '{0}' not found")]
    UnknownTensor(String),

    #[error("unsupported tensor type {ty} for tensor '{name}'")]
    UnsupportedTensorType { name: String, ty: u32 },

    #[error("{what} of {value} exceeds the limit of {limit}")]
    LimitExceeded {
        what: &'static str,
        value: u64,
        limit: u64,
    },

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl GgufError {
    pub(crate) fn truncated(context: &'static str) -> Self {
        GgufError::TruncatedInput { context }
    }

    /// Maps an I/O error raised mid-decode, turning short reads into
    /// `TruncatedInput`.
    pub(crate) fn from_read(err: io::Error, context: &'static str) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            GgufError::truncated(context)
        } else {
            GgufError::Io(err)
        }
    }

    pub fn is_truncated(&self) -> bool {
        matches!(self, GgufError::TruncatedInput { .. })
    }
}

pub type Result<T> = std::result::Result<T, GgufError>;
