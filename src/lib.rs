/// Binary readers and writers: nested chunk streams and the GLB container
pub mod data;
/// Error definitions
pub mod error;
/// Model exporters (glTF text and binary)
pub mod export;
/// Model importers (3DS, glTF) and the extension-keyed import driver
pub mod import;
/// Format-independent geometry model, finalization and indexed buffers
pub mod models;

#[cfg(feature = "arc")]
pub type Rc<T> = std::sync::Arc<T>;

#[cfg(not(feature = "arc"))]
pub type Rc<T> = std::rc::Rc<T>;
