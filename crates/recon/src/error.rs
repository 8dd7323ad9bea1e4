use std::fmt;

#[derive(Debug)]
pub enum ReconError {
    /// A serialized report or snapshot could not be decoded.
    Decode(String),
    /// A report could not be encoded.
    Encode(String),
    /// A snapshot violates a loader guarantee (duplicate target id, etc.).
    InvalidSnapshot(String),
}

impl fmt::Display for ReconError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decode(msg) => write!(f, "decode error: {msg}"),
            Self::Encode(msg) => write!(f, "encode error: {msg}"),
            Self::InvalidSnapshot(msg) => write!(f, "invalid snapshot: {msg}"),
        }
    }
}

impl std::error::Error for ReconError {}
