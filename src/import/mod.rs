//! Importer contract, collaborator callbacks and the extension-keyed import driver.

pub mod gltf_import;
pub mod three_ds;

use std::collections::HashMap;

use rootcause::Report;
use thiserror::Error;
use tracing::debug;

use crate::Rc;
use crate::error::ParseError;
use crate::models::finalization::{FinalizeOptions, ModelCheckError, check_model, finalize_model};
use crate::models::material::Material;
use crate::models::model::Model;

pub use gltf_import::GltfImporter;
pub use three_ds::ThreeDsImporter;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("no importer for extension {0:?}")]
    UnsupportedExtension(String),
    #[error("malformed file: {0}")]
    Parse(#[from] ParseError),
    #[error("invalid glTF document: {0}")]
    InvalidDocument(String),
    #[error("missing external buffer {0:?}")]
    MissingBuffer(String),
    #[error("unsupported glTF feature: {0}")]
    Unsupported(String),
    #[error("the model doesn't contain any meshes")]
    EmptyModel,
    #[error("invalid model: {0}")]
    InvalidModel(#[from] ModelCheckError),
}

impl ImportError {
    /// Lift a chunk or container reading failure into an import failure, keeping
    /// the reading report as its child.
    pub fn from_parse_report(report: Report<ParseError>) -> Report<ImportError> {
        let context = ImportError::Parse(report.current_context().clone());
        report.context(context)
    }
}

/// Axis pointing up in an importer's native coordinate system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Direction {
    X,
    Y,
    Z,
}

/// Content of an external texture resolved by name.
#[derive(Debug, Clone)]
pub struct TextureBuffer {
    pub url: String,
    pub buffer: Rc<[u8]>,
}

/// Collaborators an importer consults while parsing.
pub trait ImportCallbacks {
    /// Template for materials synthesized during finalization.
    fn default_material(&self) -> Material {
        Material::phong()
    }

    fn file_buffer(&self, name: &str) -> Option<Rc<[u8]>>;

    fn texture_buffer(&self, name: &str) -> Option<TextureBuffer> {
        let buffer = self.file_buffer(name)?;
        Some(TextureBuffer {
            url: file_name(name).to_string(),
            buffer,
        })
    }
}

/// Receives the outcome of [`import_file_content`]. `on_complete` is always called last.
pub trait ImportListener {
    fn on_success(&mut self, model: Model);
    fn on_error(&mut self, message: String);
    fn on_complete(&mut self) {}
}

pub trait Importer: Send + Sync {
    fn can_import_extension(&self, extension: &str) -> bool;
    fn up_direction(&self) -> Direction;
    fn import(
        &self,
        content: &[u8],
        callbacks: &dyn ImportCallbacks,
    ) -> Result<Model, Report<ImportError>>;
}

static IMPORTERS: &[&dyn Importer] = &[&ThreeDsImporter, &GltfImporter];

/// Last path component with any URL query stripped.
pub fn file_name(path: &str) -> &str {
    let path = path.split('?').next().unwrap_or(path);
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

/// Lowercase extension of a path, empty when there is none.
pub fn file_extension(path: &str) -> String {
    file_name(path)
        .rsplit_once('.')
        .map(|(_, extension)| extension.to_ascii_lowercase())
        .unwrap_or_default()
}

pub fn importer_for_extension(extension: &str) -> Option<&'static dyn Importer> {
    IMPORTERS
        .iter()
        .copied()
        .find(|importer| importer.can_import_extension(extension))
}

pub fn importer_for_file(name: &str) -> Option<&'static dyn Importer> {
    importer_for_extension(&file_extension(name))
}

/// Import, finalize and validate one file.
pub fn import_file(
    name: &str,
    content: &[u8],
    callbacks: &dyn ImportCallbacks,
) -> Result<Model, Report<ImportError>> {
    let extension = file_extension(name);
    let importer = importer_for_extension(&extension)
        .ok_or_else(|| Report::new(ImportError::UnsupportedExtension(extension.clone())))?;

    let mut model = importer.import(content, callbacks)?;
    if model.triangle_count() == 0 {
        return Err(Report::new(ImportError::EmptyModel));
    }
    let options = FinalizeOptions::builder()
        .default_material(callbacks.default_material())
        .build();
    finalize_model(&mut model, options);
    check_model(&model).map_err(|e| Report::new(ImportError::InvalidModel(e)))?;

    debug!(
        "imported {name}: {} meshes, {} materials, {} triangles",
        model.mesh_count(),
        model.material_count(),
        model.triangle_count()
    );
    Ok(model)
}

/// Listener-style driver around [`import_file`].
pub fn import_file_content(
    name: &str,
    content: &[u8],
    callbacks: &dyn ImportCallbacks,
    listener: &mut dyn ImportListener,
) {
    match import_file(name, content, callbacks) {
        Ok(model) => listener.on_success(model),
        Err(e) => listener.on_error(e.current_context().to_string()),
    }
    listener.on_complete();
}

/// Callbacks serving files from memory, looked up by case-insensitive file name.
#[derive(Debug, Clone, Default)]
pub struct BufferCallbacks {
    files: HashMap<String, Rc<[u8]>>,
    default_material: Option<Material>,
}

impl BufferCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_material(mut self, material: Material) -> Self {
        self.default_material = Some(material);
        self
    }

    pub fn add_file(&mut self, name: &str, content: impl Into<Rc<[u8]>>) {
        self.files
            .insert(file_name(name).to_lowercase(), content.into());
    }
}

impl ImportCallbacks for BufferCallbacks {
    fn default_material(&self) -> Material {
        self.default_material.clone().unwrap_or_else(Material::phong)
    }

    fn file_buffer(&self, name: &str) -> Option<Rc<[u8]>> {
        self.files.get(&file_name(name).to_lowercase()).cloned()
    }
}
