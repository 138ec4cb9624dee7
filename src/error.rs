use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Connect, write or read failed, including timeouts and unexpected EOF.
    #[error("connection error: {0}")]
    Connection(#[from] io::Error),

    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// A full frame that failed validation but whose sequence field could still be read.
    #[error("malformed frame for sequence {sequence}: {reason}")]
    CorruptFrame { sequence: i32, reason: String },

    /// Resume requests carry the target in a single byte.
    #[error("unsupported sequence {0}: resume requests can only address 0..=255")]
    UnsupportedSequence(i32),

    #[error("streaming failed: {0}")]
    StreamingFailed(#[source] Box<Error>),

    #[error("invalid config: {0}")]
    Config(String),

    #[error("output error: {0}")]
    Output(String),
}

impl Error {
    pub fn is_connection(&self) -> bool {
        matches!(self, Error::Connection(_))
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, Error::MalformedFrame(_) | Error::CorruptFrame { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
