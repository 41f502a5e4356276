//! Reader for streams of nested, length-prefixed binary chunks.
//!
//! A chunk is a little-endian `u16` id and a `u32` total length (header included)
//! followed by its payload. Composite chunks hold further chunks in their payload,
//! possibly after a fixed-size prefix, so the reader is reentrant: a handler creates
//! a new [`ChunkReader`] over the nested byte range.

use rootcause::Report;
use winnow::Parser;
use winnow::binary::{le_u16, le_u32};

use crate::data::parser_utils::WResult;
use crate::error::ParseError;

pub const CHUNK_HEADER_SIZE: usize = 6;

/// A single chunk borrowed from the source buffer.
#[derive(Debug, Clone, Copy)]
pub struct Chunk<'a> {
    pub id: u16,
    /// Absolute offset of the chunk header.
    pub offset: usize,
    /// Payload, header excluded.
    pub data: &'a [u8],
}

impl<'a> Chunk<'a> {
    /// Absolute offset of the first payload byte.
    pub fn payload_offset(&self) -> usize {
        self.offset + CHUNK_HEADER_SIZE
    }

    /// Reader over nested chunks filling the whole payload.
    pub fn children(&self) -> ChunkReader<'a> {
        ChunkReader::with_base(self.data, self.payload_offset())
    }

    /// Reader over nested chunks that follow a `prefix_len` byte prefix.
    pub fn children_after(&self, prefix_len: usize) -> ChunkReader<'a> {
        let prefix_len = prefix_len.min(self.data.len());
        ChunkReader::with_base(&self.data[prefix_len..], self.payload_offset() + prefix_len)
    }
}

fn parse_header(input: &mut &[u8]) -> WResult<(u16, u32)> {
    let id = le_u16.parse_next(input)?;
    let length = le_u32.parse_next(input)?;
    Ok((id, length))
}

/// Iterator over the chunks of one byte range.
///
/// Trailing bytes too short to hold a chunk header are ignored. A header whose
/// declared length does not fit the range yields an error and ends iteration.
pub struct ChunkReader<'a> {
    data: &'a [u8],
    base: usize,
    position: usize,
    failed: bool,
}

impl<'a> ChunkReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        ChunkReader::with_base(data, 0)
    }

    /// Reader over `data`, reporting offsets relative to `base`.
    pub fn with_base(data: &'a [u8], base: usize) -> Self {
        ChunkReader {
            data,
            base,
            position: 0,
            failed: false,
        }
    }

    /// Bytes consumed so far, relative to the start of the range.
    pub fn position(&self) -> usize {
        self.position
    }

    fn read_chunk(&mut self) -> Result<Chunk<'a>, Report<ParseError>> {
        let offset = self.base + self.position;
        let input = &mut &self.data[self.position..];
        let (id, length) = parse_header(input).map_err(|e| ParseError::winnow(offset, 0, e))?;

        if (length as usize) < CHUNK_HEADER_SIZE {
            return Err(Report::new(ParseError::ChunkTooShort { id, offset, length }));
        }
        let payload_len = length as usize - CHUNK_HEADER_SIZE;
        if payload_len > input.len() {
            return Err(Report::new(ParseError::ChunkOutOfBounds {
                id,
                offset,
                length,
                available: input.len(),
            }));
        }

        let start = self.position + CHUNK_HEADER_SIZE;
        self.position = start + payload_len;
        Ok(Chunk {
            id,
            offset,
            data: &self.data[start..self.position],
        })
    }
}

impl<'a> Iterator for ChunkReader<'a> {
    type Item = Result<Chunk<'a>, Report<ParseError>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.data.len() - self.position < CHUNK_HEADER_SIZE {
            return None;
        }
        let result = self.read_chunk();
        if result.is_err() {
            self.failed = true;
        }
        Some(result)
    }
}

/// Serialize a chunk header and payload. Used to build fixtures and by writers.
pub fn write_chunk(id: u16, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + CHUNK_HEADER_SIZE);
    out.extend_from_slice(&id.to_le_bytes());
    out.extend_from_slice(&((payload.len() + CHUNK_HEADER_SIZE) as u32).to_le_bytes());
    out.extend_from_slice(payload);
    out
}
