//! Binary glTF container: a 12-byte header followed by a JSON chunk and an optional BIN chunk.

use rootcause::Report;
use std::iter::repeat_n;
use winnow::Parser;
use winnow::binary::le_u32;
use winnow::token::take;

use crate::data::parser_utils::{WResult, align_to_4, consumed};
use crate::error::ParseError;

/// "glTF" read as a little-endian u32.
pub const GLB_MAGIC: u32 = 0x4654_6C67;
pub const GLB_VERSION: u32 = 2;
/// "JSON"
pub const CHUNK_TYPE_JSON: u32 = 0x4E4F_534A;
/// "BIN\0"
pub const CHUNK_TYPE_BIN: u32 = 0x004E_4942;
pub const GLB_HEADER_SIZE: usize = 12;
pub const GLB_CHUNK_HEADER_SIZE: usize = 8;

/// Total container size for the given unpadded chunk sizes.
pub fn glb_byte_length(json_len: usize, bin_len: usize) -> usize {
    GLB_HEADER_SIZE
        + GLB_CHUNK_HEADER_SIZE
        + align_to_4(json_len)
        + GLB_CHUNK_HEADER_SIZE
        + align_to_4(bin_len)
}

/// Assemble a GLB file. JSON is padded with spaces and the binary chunk with zeros.
pub fn assemble_glb(json: &[u8], bin: &[u8]) -> Vec<u8> {
    let json_chunk_len = align_to_4(json.len());
    let bin_chunk_len = align_to_4(bin.len());
    let total_length = glb_byte_length(json.len(), bin.len());

    let mut out = Vec::with_capacity(total_length);
    out.extend_from_slice(&GLB_MAGIC.to_le_bytes());
    out.extend_from_slice(&GLB_VERSION.to_le_bytes());
    out.extend_from_slice(&(total_length as u32).to_le_bytes());

    out.extend_from_slice(&(json_chunk_len as u32).to_le_bytes());
    out.extend_from_slice(&CHUNK_TYPE_JSON.to_le_bytes());
    out.extend_from_slice(json);
    out.extend(repeat_n(0x20u8, json_chunk_len - json.len()));

    out.extend_from_slice(&(bin_chunk_len as u32).to_le_bytes());
    out.extend_from_slice(&CHUNK_TYPE_BIN.to_le_bytes());
    out.extend_from_slice(bin);
    out.extend(repeat_n(0u8, bin_chunk_len - bin.len()));

    assert_eq!(out.len(), total_length);
    out
}

/// Chunks of a parsed GLB file, borrowed from the source.
#[derive(Debug, Clone, Copy)]
pub struct GlbContainer<'a> {
    pub version: u32,
    pub length: usize,
    pub json: &'a [u8],
    pub bin: Option<&'a [u8]>,
}

fn parse_header(input: &mut &[u8]) -> WResult<(u32, u32, u32)> {
    let magic = le_u32.parse_next(input)?;
    let version = le_u32.parse_next(input)?;
    let length = le_u32.parse_next(input)?;
    Ok((magic, version, length))
}

fn parse_chunk_header(input: &mut &[u8]) -> WResult<(u32, u32)> {
    let length = le_u32.parse_next(input)?;
    let chunk_type = le_u32.parse_next(input)?;
    Ok((length, chunk_type))
}

pub fn is_glb(data: &[u8]) -> bool {
    data.len() >= 4 && data[..4] == GLB_MAGIC.to_le_bytes()
}

/// Parse a GLB container. Unknown chunk types after the JSON chunk are skipped.
pub fn parse_glb(data: &[u8]) -> Result<GlbContainer<'_>, Report<ParseError>> {
    if data.len() < GLB_HEADER_SIZE {
        return Err(Report::new(ParseError::TruncatedHeader {
            offset: 0,
            available: data.len(),
        }));
    }

    let input = &mut &data[..];
    let (magic, version, length) = parse_header(input).map_err(ParseError::from)?;
    if magic != GLB_MAGIC {
        return Err(Report::new(ParseError::InvalidMagic(magic)));
    }
    if version != GLB_VERSION {
        return Err(Report::new(ParseError::UnsupportedVersion(version)));
    }
    let length = length as usize;
    if length != data.len() {
        return Err(Report::new(ParseError::LengthMismatch {
            declared: length,
            actual: data.len(),
        }));
    }

    let mut json = None;
    let mut bin = None;
    while !input.is_empty() {
        let offset = consumed(data, input);
        let (chunk_length, chunk_type) =
            parse_chunk_header(input).map_err(|e| ParseError::winnow(offset, 0, e))?;
        let chunk_length = chunk_length as usize;
        if chunk_length % 4 != 0 {
            return Err(Report::new(ParseError::UnalignedChunk {
                offset,
                length: chunk_length,
            }));
        }
        let payload: &[u8] = take(chunk_length)
            .parse_next(input)
            .map_err(|e| ParseError::winnow(offset, GLB_CHUNK_HEADER_SIZE, e))?;

        match chunk_type {
            CHUNK_TYPE_JSON if json.is_none() => json = Some(payload),
            CHUNK_TYPE_BIN if json.is_some() && bin.is_none() => bin = Some(payload),
            other => tracing::trace!("skipping GLB chunk type 0x{other:08X} at 0x{offset:X}"),
        }
    }

    let json = json.ok_or_else(|| Report::new(ParseError::MissingJsonChunk))?;
    Ok(GlbContainer {
        version,
        length,
        json,
        bin,
    })
}
