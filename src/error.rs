use thiserror::Error;

/// Errors raised while reading length-prefixed chunk streams and binary containers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("truncated chunk header at 0x{offset:X}: need 6 bytes, have {available}")]
    TruncatedHeader { offset: usize, available: usize },
    #[error("chunk 0x{id:04X} at 0x{offset:X} declares length {length}, smaller than its header")]
    ChunkTooShort { id: u16, offset: usize, length: u32 },
    #[error(
        "chunk 0x{id:04X} at 0x{offset:X} declares length {length}, but only {available} bytes remain"
    )]
    ChunkOutOfBounds {
        id: u16,
        offset: usize,
        length: u32,
        available: usize,
    },
    #[error("invalid container magic 0x{0:08X}")]
    InvalidMagic(u32),
    #[error("unsupported container version {0}")]
    UnsupportedVersion(u32),
    #[error("container declares length {declared}, but the data is {actual} bytes")]
    LengthMismatch { declared: usize, actual: usize },
    #[error("container chunk at 0x{offset:X} has length {length}, not a multiple of 4")]
    UnalignedChunk { offset: usize, length: usize },
    #[error("container is missing its JSON chunk")]
    MissingJsonChunk,
    #[error("winnow parse error at 0x{offset:X}: {detail}")]
    WinnowError { offset: usize, detail: String },
}

impl ParseError {
    /// Wrap a winnow failure that happened `consumed` bytes into a payload starting at `base`.
    pub fn winnow(
        base: usize,
        consumed: usize,
        e: winnow::error::ErrMode<winnow::error::ContextError>,
    ) -> Self {
        ParseError::WinnowError {
            offset: base + consumed,
            detail: format!("{e}"),
        }
    }
}

impl From<winnow::error::ErrMode<winnow::error::ContextError>> for ParseError {
    fn from(e: winnow::error::ErrMode<winnow::error::ContextError>) -> Self {
        ParseError::WinnowError {
            offset: 0,
            detail: format!("{e}"),
        }
    }
}
