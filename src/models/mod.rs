//! Format-independent scene representation and the passes that operate on it.

pub mod color;
/// Post-import repair and validation
pub mod finalization;
pub mod material;
pub mod mesh;
/// Per-material indexed vertex buffers
pub mod mesh_buffer;
pub mod mesh_utils;
pub mod model;
pub mod node;
pub mod property;
