//! Shared winnow-based parsing utilities used by the chunk and container readers.

use winnow::Parser;
use winnow::binary::{le_f32, le_u8};
use winnow::error::ContextError;

/// Common result type for winnow parsers.
pub type WResult<T> = Result<T, winnow::error::ErrMode<ContextError>>;

/// Longest name stored in a chunk stream, excluding the terminator.
pub const MAX_NAME_LENGTH: usize = 64;

/// Read a null-terminated name of at most [`MAX_NAME_LENGTH`] bytes.
///
/// When the limit is reached before a terminator, reading stops there and the
/// next byte is left in the input.
pub fn parse_name(input: &mut &[u8]) -> WResult<String> {
    let mut bytes = Vec::new();
    while bytes.len() < MAX_NAME_LENGTH {
        let byte = le_u8.parse_next(input)?;
        if byte == 0 {
            break;
        }
        bytes.push(byte);
    }
    Ok(bytes.iter().map(|&b| b as char).collect())
}

/// Read three consecutive little-endian f32 values.
pub fn parse_vector(input: &mut &[u8]) -> WResult<[f64; 3]> {
    let x = le_f32.parse_next(input)?;
    let y = le_f32.parse_next(input)?;
    let z = le_f32.parse_next(input)?;
    Ok([x as f64, y as f64, z as f64])
}

/// Number of bytes a parser consumed, given the slice before and after.
pub fn consumed(start: &[u8], rest: &[u8]) -> usize {
    start.len() - rest.len()
}

/// Round `size` up to the next multiple of four.
pub fn align_to_4(size: usize) -> usize {
    (size + 3) & !3
}
