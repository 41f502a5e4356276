/// Recursive reader for length-prefixed binary chunks
pub mod chunk;
/// Binary glTF container reading and assembly
pub mod glb;
pub mod parser_utils;
