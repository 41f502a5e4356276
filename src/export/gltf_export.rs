//! Export a model to glTF 2.0, either as JSON plus a sidecar buffer or as a GLB container.

use std::collections::{BTreeMap, HashMap};

use bon::Builder;
use gltf_json as json;
use json::validation::Checked::Valid;
use json::validation::USize64;
use rootcause::Report;
use tracing::debug;

use crate::data::glb::assemble_glb;
use crate::data::parser_utils::align_to_4;
use crate::export::{ExportError, ExportedFile, Exporter, FileFormat};
use crate::models::color::{Color, srgb_to_linear};
use crate::models::material::{Material, Shading, TextureMap};
use crate::models::mesh_buffer::{MeshBuffer, PrimitiveBuffer, build_mesh_buffer};
use crate::models::model::Model;

/// Bytes per exported index (`u32`).
const INDEX_SIZE: usize = 4;
/// Bytes per exported number (`f32`).
const NUMBER_SIZE: usize = 4;
const TEXTURE_TRANSFORM_EXTENSION: &str = "KHR_texture_transform";

#[derive(Debug, Clone, Builder)]
pub struct GltfExportOptions {
    /// Value of `asset.generator`.
    #[builder(default = "modelconv".to_string(), into)]
    pub generator: String,
    /// Pretty-print the JSON document of the text form.
    #[builder(default)]
    pub pretty: bool,
    /// Output file stem: `<base>.gltf`, `<base>.bin` or `<base>.glb`.
    #[builder(default = "model".to_string(), into)]
    pub base_name: String,
}

impl Default for GltfExportOptions {
    fn default() -> Self {
        GltfExportOptions::builder().build()
    }
}

#[derive(Debug, Clone, Default)]
pub struct GltfExporter {
    options: GltfExportOptions,
}

impl GltfExporter {
    pub fn new(options: GltfExportOptions) -> Self {
        GltfExporter { options }
    }

    fn export_text(&self, model: &Model) -> Result<Vec<ExportedFile>, Report<ExportError>> {
        let bin_name = format!("{}.bin", self.options.base_name);
        let mut meshes = collect_mesh_data(model)?;
        let bin = write_main_buffer(&mut meshes);
        let mut root = self.create_root(&meshes);
        root.push(json::Buffer {
            byte_length: USize64::from(bin.len()),
            uri: Some(bin_name.clone()),
            name: None,
            extensions: Default::default(),
            extras: Default::default(),
        });

        let mut textures = TextureRegistry::new(TextureStorage::SiblingFiles(Vec::new()));
        export_materials(&mut root, model, &mut textures);

        let document = if self.options.pretty {
            json::serialize::to_string_pretty(&root)
        } else {
            json::serialize::to_string(&root)
        }
        .map_err(|e| Report::new(ExportError::Serialize(e.to_string())))?;

        let mut files = vec![
            ExportedFile::new(format!("{}.gltf", self.options.base_name), document.into_bytes()),
            ExportedFile::new(bin_name, bin),
        ];
        if let TextureStorage::SiblingFiles(texture_files) = textures.storage {
            files.extend(texture_files);
        }
        Ok(files)
    }

    fn export_binary(&self, model: &Model) -> Result<Vec<ExportedFile>, Report<ExportError>> {
        let mut meshes = collect_mesh_data(model)?;
        let mut bin = write_main_buffer(&mut meshes);
        let mut root = self.create_root(&meshes);

        let mut textures = TextureRegistry::new(TextureStorage::Embedded {
            data: Vec::new(),
            byte_offset: bin.len(),
        });
        export_materials(&mut root, model, &mut textures);
        if let TextureStorage::Embedded { data, .. } = textures.storage {
            bin.extend(data);
        }

        root.push(json::Buffer {
            byte_length: USize64::from(align_to_4(bin.len())),
            uri: None,
            name: None,
            extensions: Default::default(),
            extras: Default::default(),
        });
        let document = json::serialize::to_vec(&root)
            .map_err(|e| Report::new(ExportError::Serialize(e.to_string())))?;

        let glb = assemble_glb(&document, &bin);
        debug!("GLB: {} bytes, {} JSON, {} binary", glb.len(), document.len(), bin.len());
        Ok(vec![ExportedFile::new(
            format!("{}.glb", self.options.base_name),
            glb,
        )])
    }

    /// Document skeleton: asset, one scene, and a node, mesh, buffer views and
    /// accessors per exported mesh. Buffers and materials are added by the caller.
    fn create_root(&self, meshes: &[MeshData]) -> json::Root {
        let mut root = json::Root::default();
        root.asset = json::Asset {
            version: "2.0".to_string(),
            generator: Some(self.options.generator.clone()),
            ..Default::default()
        };

        let mut scene_nodes = Vec::with_capacity(meshes.len());
        for mesh_data in meshes {
            let primitives = mesh_data
                .buffer
                .primitives
                .iter()
                .zip(&mesh_data.offsets)
                .map(|(primitive, &offset)| add_primitive(&mut root, primitive, offset))
                .collect();
            let mesh = root.push(json::Mesh {
                primitives,
                weights: None,
                name: Some(exported_name(&mesh_data.name, "Mesh")),
                extensions: Default::default(),
                extras: Default::default(),
            });
            scene_nodes.push(root.push(json::Node {
                mesh: Some(mesh),
                ..Default::default()
            }));
        }

        let scene = root.push(json::Scene {
            nodes: scene_nodes,
            name: None,
            extensions: Default::default(),
            extras: Default::default(),
        });
        root.scene = Some(scene);
        root
    }
}

impl Exporter for GltfExporter {
    fn can_export(&self, format: FileFormat, extension: &str) -> bool {
        matches!(
            (format, extension),
            (FileFormat::Text, "gltf") | (FileFormat::Binary, "glb")
        )
    }

    fn export(
        &self,
        model: &Model,
        format: FileFormat,
    ) -> Result<Vec<ExportedFile>, Report<ExportError>> {
        match format {
            FileFormat::Text => self.export_text(model),
            FileFormat::Binary => self.export_binary(model),
        }
    }
}

fn exported_name(name: &str, fallback: &str) -> String {
    if name.is_empty() {
        fallback.to_string()
    } else {
        name.to_string()
    }
}

/// One transformed mesh instance and where its primitives landed in the main buffer.
struct MeshData {
    name: String,
    buffer: MeshBuffer,
    offsets: Vec<usize>,
}

fn collect_mesh_data(model: &Model) -> Result<Vec<MeshData>, Report<ExportError>> {
    let meshes: Vec<MeshData> = model
        .transformed_mesh_instances()
        .into_iter()
        .filter_map(|mesh| {
            let buffer = build_mesh_buffer(&mesh)?;
            Some(MeshData {
                name: mesh.name,
                buffer,
                offsets: Vec::new(),
            })
        })
        .collect();
    if meshes.is_empty() {
        return Err(Report::new(ExportError::EmptyModel));
    }
    Ok(meshes)
}

fn extend_f32(out: &mut Vec<u8>, values: impl IntoIterator<Item = f64>) {
    out.extend(values.into_iter().flat_map(|v| (v as f32).to_le_bytes()));
}

/// Write every primitive as indices, positions, colors, normals and uvs, recording
/// each primitive's start offset in its [`MeshData`].
fn write_main_buffer(meshes: &mut [MeshData]) -> Vec<u8> {
    let total: usize = meshes
        .iter()
        .map(|mesh| mesh.buffer.byte_length(INDEX_SIZE, NUMBER_SIZE))
        .sum();

    let mut bin = Vec::with_capacity(total);
    for mesh in meshes.iter_mut() {
        for primitive in &mesh.buffer.primitives {
            mesh.offsets.push(bin.len());
            bin.extend(primitive.indices.iter().flat_map(|index| index.to_le_bytes()));
            extend_f32(&mut bin, primitive.vertices.iter().copied());
            extend_f32(&mut bin, primitive.colors.iter().map(|&c| srgb_to_linear(c)));
            extend_f32(&mut bin, primitive.normals.iter().copied());
            // glTF uv origin is top left
            extend_f32(
                &mut bin,
                primitive
                    .uvs
                    .iter()
                    .enumerate()
                    .map(|(i, &t)| if i % 2 == 1 { -t } else { t }),
            );
        }
    }
    assert_eq!(bin.len(), total, "main buffer length accounting");
    bin
}

fn push_buffer_view(
    root: &mut json::Root,
    byte_offset: usize,
    byte_length: usize,
    target: json::buffer::Target,
) -> json::Index<json::buffer::View> {
    root.push(json::buffer::View {
        buffer: json::Index::new(0),
        byte_length: USize64::from(byte_length),
        byte_offset: Some(USize64::from(byte_offset)),
        byte_stride: None,
        target: Some(Valid(target)),
        name: None,
        extensions: Default::default(),
        extras: Default::default(),
    })
}

fn push_accessor(
    root: &mut json::Root,
    buffer_view: json::Index<json::buffer::View>,
    component_type: json::accessor::ComponentType,
    type_: json::accessor::Type,
    count: usize,
    bounds: Option<([f64; 3], [f64; 3])>,
) -> json::Index<json::Accessor> {
    let (min, max) = match bounds {
        Some((min, max)) => (
            Some(json::Value::from(min.map(|v| v as f32).to_vec())),
            Some(json::Value::from(max.map(|v| v as f32).to_vec())),
        ),
        None => (None, None),
    };
    root.push(json::Accessor {
        buffer_view: Some(buffer_view),
        byte_offset: Some(USize64(0)),
        count: USize64::from(count),
        component_type: Valid(json::accessor::GenericComponentType(component_type)),
        type_: Valid(type_),
        min,
        max,
        name: None,
        normalized: false,
        sparse: None,
        extensions: Default::default(),
        extras: Default::default(),
    })
}

/// Views and accessors for one primitive laid out contiguously from `byte_offset`.
fn add_primitive(
    root: &mut json::Root,
    primitive: &PrimitiveBuffer,
    byte_offset: usize,
) -> json::mesh::Primitive {
    use json::accessor::{ComponentType, Type};
    use json::buffer::Target;

    let mut offset = byte_offset;
    let mut next_view = |root: &mut json::Root, byte_length: usize, target: Target| {
        let view = push_buffer_view(root, offset, byte_length, target);
        offset += byte_length;
        view
    };

    let indices_view = next_view(
        root,
        primitive.indices.len() * INDEX_SIZE,
        Target::ElementArrayBuffer,
    );
    let indices = push_accessor(
        root,
        indices_view,
        ComponentType::U32,
        Type::Scalar,
        primitive.indices.len(),
        None,
    );

    let mut attributes = BTreeMap::new();
    let vertex_count = primitive.vertex_count();
    let positions_view = next_view(
        root,
        primitive.vertices.len() * NUMBER_SIZE,
        Target::ArrayBuffer,
    );
    let positions = push_accessor(
        root,
        positions_view,
        ComponentType::F32,
        Type::Vec3,
        vertex_count,
        Some(primitive.bounds()),
    );
    attributes.insert(Valid(json::mesh::Semantic::Positions), positions);

    if !primitive.colors.is_empty() {
        let view = next_view(root, primitive.colors.len() * NUMBER_SIZE, Target::ArrayBuffer);
        let colors = push_accessor(root, view, ComponentType::F32, Type::Vec3, vertex_count, None);
        attributes.insert(Valid(json::mesh::Semantic::Colors(0)), colors);
    }

    let normals_view = next_view(root, primitive.normals.len() * NUMBER_SIZE, Target::ArrayBuffer);
    let normals = push_accessor(
        root,
        normals_view,
        ComponentType::F32,
        Type::Vec3,
        vertex_count,
        None,
    );
    attributes.insert(Valid(json::mesh::Semantic::Normals), normals);

    if !primitive.uvs.is_empty() {
        let view = next_view(root, primitive.uvs.len() * NUMBER_SIZE, Target::ArrayBuffer);
        let uvs = push_accessor(root, view, ComponentType::F32, Type::Vec2, vertex_count, None);
        attributes.insert(Valid(json::mesh::Semantic::TexCoords(0)), uvs);
    }

    json::mesh::Primitive {
        attributes,
        indices: Some(indices),
        material: primitive.material.map(|m| json::Index::new(m as u32)),
        mode: Valid(json::mesh::Mode::Triangles),
        targets: None,
        extensions: None,
        extras: Default::default(),
    }
}

/// Where registered texture images end up.
enum TextureStorage {
    /// Written next to the document, referenced by file name.
    SiblingFiles(Vec<ExportedFile>),
    /// Appended to the main buffer starting at `byte_offset`.
    Embedded { data: Vec<u8>, byte_offset: usize },
}

/// Registers each distinct texture file once and hands out `texture::Info` references.
struct TextureRegistry {
    storage: TextureStorage,
    by_file_name: HashMap<String, json::Index<json::Texture>>,
}

impl TextureRegistry {
    fn new(storage: TextureStorage) -> Self {
        TextureRegistry {
            storage,
            by_file_name: HashMap::new(),
        }
    }

    fn add_image(
        &mut self,
        root: &mut json::Root,
        file_name: &str,
        texture: &TextureMap,
    ) -> Option<json::Index<json::Image>> {
        let buffer = texture.buffer.as_ref()?;
        let image = match &mut self.storage {
            TextureStorage::SiblingFiles(files) => {
                files.push(ExportedFile::new(file_name, buffer.to_vec()));
                json::Image {
                    buffer_view: None,
                    mime_type: None,
                    uri: Some(file_name.to_string()),
                    name: None,
                    extensions: Default::default(),
                    extras: Default::default(),
                }
            }
            TextureStorage::Embedded { data, byte_offset } => {
                let view = root.push(json::buffer::View {
                    buffer: json::Index::new(0),
                    byte_length: USize64::from(buffer.len()),
                    byte_offset: Some(USize64::from(*byte_offset + data.len())),
                    byte_stride: None,
                    target: None,
                    name: None,
                    extensions: Default::default(),
                    extras: Default::default(),
                });
                data.extend_from_slice(buffer);
                json::Image {
                    buffer_view: Some(view),
                    mime_type: Some(json::image::MimeType(format!(
                        "image/{}",
                        texture.extension().unwrap_or_default()
                    ))),
                    uri: None,
                    name: None,
                    extensions: Default::default(),
                    extras: Default::default(),
                }
            }
        };
        Some(root.push(image))
    }

    fn register(
        &mut self,
        root: &mut json::Root,
        texture: Option<&TextureMap>,
    ) -> Option<json::texture::Info> {
        let texture = texture.filter(|texture| texture.is_valid())?;
        let file_name = texture.file_name()?;

        let index = match self.by_file_name.get(file_name) {
            Some(&index) => index,
            None => {
                let source = self.add_image(root, file_name, texture)?;
                let index = root.push(json::Texture {
                    source,
                    sampler: None,
                    name: None,
                    extensions: Default::default(),
                    extras: Default::default(),
                });
                self.by_file_name.insert(file_name.to_string(), index);
                index
            }
        };

        let extensions = texture.has_transformation().then(|| {
            if !root.extensions_used.iter().any(|e| e == TEXTURE_TRANSFORM_EXTENSION) {
                root.extensions_used.push(TEXTURE_TRANSFORM_EXTENSION.to_string());
            }
            json::extensions::texture::Info {
                texture_transform: Some(json::extensions::texture::TextureTransform {
                    offset: json::extensions::texture::TextureTransformOffset([
                        texture.offset.x as f32,
                        -texture.offset.y as f32,
                    ]),
                    rotation: json::extensions::texture::TextureTransformRotation(
                        -texture.rotation as f32,
                    ),
                    scale: json::extensions::texture::TextureTransformScale([
                        texture.scale.x as f32,
                        texture.scale.y as f32,
                    ]),
                    tex_coord: None,
                    extras: Default::default(),
                }),
                ..Default::default()
            }
        });

        Some(json::texture::Info {
            index,
            tex_coord: 0,
            extensions,
            extras: Default::default(),
        })
    }
}

fn linear_rgba(color: Color, opacity: f64) -> [f32; 4] {
    let [r, g, b] = color.to_linear();
    [r as f32, g as f32, b as f32, opacity as f32]
}

fn export_materials(root: &mut json::Root, model: &Model, textures: &mut TextureRegistry) {
    for material in &model.materials {
        let exported = export_material(root, material, textures);
        root.push(exported);
    }
}

fn export_material(
    root: &mut json::Root,
    material: &Material,
    textures: &mut TextureRegistry,
) -> json::Material {
    let mut pbr = json::material::PbrMetallicRoughness {
        base_color_factor: json::material::PbrBaseColorFactor(linear_rgba(
            material.color,
            material.opacity,
        )),
        ..Default::default()
    };

    if let Some(info) = textures.register(root, material.diffuse_map.as_ref()) {
        if !material.multiply_diffuse_map {
            pbr.base_color_factor =
                json::material::PbrBaseColorFactor(linear_rgba(Color::WHITE, material.opacity));
        }
        pbr.base_color_texture = Some(info);
    }
    if let Shading::Physical(physical) = &material.shading {
        match textures.register(root, physical.metalness_map.as_ref()) {
            Some(info) => pbr.metallic_roughness_texture = Some(info),
            None => {
                pbr.metallic_factor = json::material::StrengthFactor(physical.metalness as f32);
                pbr.roughness_factor = json::material::StrengthFactor(physical.roughness as f32);
            }
        }
    }

    let normal_texture = textures
        .register(root, material.normal_map.as_ref())
        .map(|info| json::material::NormalTexture {
            index: info.index,
            scale: 1.0,
            tex_coord: 0,
            extensions: None,
            extras: Default::default(),
        });
    let emissive_texture = textures.register(root, material.emissive_map.as_ref());
    let [r, g, b] = material.emissive.to_linear();

    json::Material {
        name: Some(exported_name(&material.name, "Material")),
        pbr_metallic_roughness: pbr,
        emissive_factor: json::material::EmissiveFactor([r as f32, g as f32, b as f32]),
        double_sided: true,
        alpha_mode: Valid(if material.transparent {
            json::material::AlphaMode::Blend
        } else {
            json::material::AlphaMode::Opaque
        }),
        normal_texture,
        emissive_texture,
        ..Default::default()
    }
}
