//! Exporter contract and format dispatch.

pub mod gltf_export;

use rootcause::Report;
use thiserror::Error;

use crate::models::model::Model;

pub use gltf_export::{GltfExportOptions, GltfExporter};

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("no exporter for {format:?} files with extension {extension:?}")]
    UnsupportedFormat { format: FileFormat, extension: String },
    #[error("the model doesn't contain any triangles")]
    EmptyModel,
    #[error("glTF serialization error: {0}")]
    Serialize(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FileFormat {
    Text,
    Binary,
}

/// A named output blob: the main document, a sidecar buffer or a texture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedFile {
    pub name: String,
    pub content: Vec<u8>,
}

impl ExportedFile {
    pub fn new(name: impl Into<String>, content: Vec<u8>) -> Self {
        ExportedFile {
            name: name.into(),
            content,
        }
    }

    /// Content as UTF-8 text, `None` for binary files.
    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.content).ok()
    }
}

pub trait Exporter: Send + Sync {
    fn can_export(&self, format: FileFormat, extension: &str) -> bool;
    fn export(
        &self,
        model: &Model,
        format: FileFormat,
    ) -> Result<Vec<ExportedFile>, Report<ExportError>>;
}

/// Export with the first exporter accepting `format` and `extension`.
pub fn export_model(
    exporters: &[&dyn Exporter],
    model: &Model,
    format: FileFormat,
    extension: &str,
) -> Result<Vec<ExportedFile>, Report<ExportError>> {
    let exporter = exporters
        .iter()
        .find(|exporter| exporter.can_export(format, extension))
        .ok_or_else(|| {
            Report::new(ExportError::UnsupportedFormat {
                format,
                extension: extension.to_string(),
            })
        })?;
    exporter.export(model, format)
}
